//! # Conversational Dialogue Engine
//!
//! A finite-state-machine driven interaction model that multiplexes many
//! concurrent per-user wizards over one inbound event stream. Machines are
//! declared as transition tables ([`machine`]), a [`dispatcher`] resolves
//! each event against the active conversation or the entry points, the
//! conversation record survives restarts through the [`store`], and a
//! [`runner`] keeps events for one user strictly sequential.

pub mod dispatcher;
pub mod machine;
pub mod runner;
pub mod store;

pub use dispatcher::{Dispatcher, Services, TurnCtx};
pub use machine::{
    handler, EventPattern, Flow, Guard, Handler, HandlerFuture, HandlerResult, Machine,
    MachineBuilder, MediaFilter, Outcome, Registry, StateId, Transition, TransitionBlock,
};
pub use runner::EventRunner;
pub use store::{ConversationRecord, ConversationStore};
