//! Declarative state-machine tables.
//!
//! A [`Machine`] is a named graph: entry points that open a conversation,
//! per-state transition lists, and fallbacks shared by every state. Handlers
//! are async closures over ([`TurnCtx`], [`Event`], [`Scratch`]) returning an
//! [`Outcome`] that tells the dispatcher where the conversation goes next.

use crate::dialogue::Scratch;
use crate::errors::AppResult;
use crate::event::{Event, EventPayload, MediaKind};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::dispatcher::TurnCtx;

/// States are compile-time names; the store persists them as strings.
pub type StateId = &'static str;

/// Where a handler sends the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Re-enter the current state (validation failures re-prompt here).
    /// From an entry point this means "handled statelessly, stay idle".
    Stay,
    /// Move to another state of the same machine.
    Goto(StateId),
    /// Terminal: clear the conversation and run the machine's cleanup hook.
    End,
}

/// A handler's verdict for one turn: the next flow plus the scratch to
/// persist. Scratch returned with `End` is still handed to the cleanup hook.
#[derive(Clone, Debug, PartialEq)]
pub struct Outcome {
    pub flow: Flow,
    pub scratch: Scratch,
}

impl Outcome {
    pub fn stay(scratch: Scratch) -> Self {
        Self {
            flow: Flow::Stay,
            scratch,
        }
    }

    pub fn goto(state: StateId, scratch: Scratch) -> Self {
        Self {
            flow: Flow::Goto(state),
            scratch,
        }
    }

    pub fn end(scratch: Scratch) -> Self {
        Self {
            flow: Flow::End,
            scratch,
        }
    }
}

pub type HandlerResult = AppResult<Outcome>;
pub type HandlerFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send>>;

/// Boxed async transition handler.
pub type Handler = Arc<dyn Fn(TurnCtx, Event, Scratch) -> HandlerFuture + Send + Sync>;

/// Box a plain async fn into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(TurnCtx, Event, Scratch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx, event, scratch| Box::pin(f(ctx, event, scratch)))
}

/// Async hook run when a conversation ends or is cancelled, receiving the
/// final scratch so it can prune partial entities.
pub type CleanupHook =
    Arc<dyn Fn(TurnCtx, Scratch) -> Pin<Box<dyn Future<Output = AppResult<()>> + Send>> + Send + Sync>;

/// Box a plain async fn into a [`CleanupHook`].
pub fn cleanup_hook<F, Fut>(f: F) -> CleanupHook
where
    F: Fn(TurnCtx, Scratch) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = AppResult<()>> + Send + 'static,
{
    Arc::new(move |ctx, scratch| Box::pin(f(ctx, scratch)))
}

/// Media sub-filter for [`EventPattern::Media`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaFilter {
    Any,
    Kind(MediaKind),
}

/// What an event must look like for a transition to fire.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventPattern {
    /// A specific command by name (without the slash).
    Command(&'static str),
    /// Any command at all; used by fallbacks.
    AnyCommand,
    /// Non-command free text.
    AnyText,
    Media(MediaFilter),
    Location,
    /// A button press in the given namespace, optionally pinned to one action.
    Callback {
        ns: &'static str,
        action: Option<&'static str>,
    },
    /// A successful-payment notification.
    Payment,
    /// A background-job completion with the given kind tag.
    Job(&'static str),
    /// Matches everything; used by catch-all fallbacks.
    Any,
}

impl EventPattern {
    pub fn matches(&self, payload: &EventPayload) -> bool {
        match (self, payload) {
            (EventPattern::Command(want), EventPayload::Command { name, .. }) => name == want,
            (EventPattern::AnyCommand, EventPayload::Command { .. }) => true,
            (EventPattern::AnyText, EventPayload::Text(_)) => true,
            (EventPattern::Media(MediaFilter::Any), EventPayload::Media(_)) => true,
            (EventPattern::Media(MediaFilter::Kind(kind)), EventPayload::Media(item)) => {
                item.kind == *kind
            }
            (EventPattern::Location, EventPayload::Location { .. }) => true,
            (EventPattern::Callback { ns, action }, EventPayload::Callback(data)) => {
                data.ns == *ns && action.map_or(true, |a| data.action == a)
            }
            (EventPattern::Payment, EventPayload::PaymentDone(_)) => true,
            (EventPattern::Job(kind), EventPayload::JobDone(outcome)) => outcome.kind() == *kind,
            (EventPattern::Any, _) => true,
            _ => false,
        }
    }
}

/// Who may trigger an entry point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Guard {
    Anyone,
    /// Restricted to the configured operator allow-list.
    Operators,
}

/// One (pattern, handler) rule.
#[derive(Clone)]
pub struct Transition {
    pub pattern: EventPattern,
    pub handler: Handler,
}

/// An entry point opens a conversation for an idle user.
#[derive(Clone)]
pub struct EntryPoint {
    pub pattern: EventPattern,
    pub guard: Guard,
    pub handler: Handler,
}

/// A reusable bundle of states that a builder merges into a machine's table.
/// Selector flows (pick a tour, pick a language) are provided this way and
/// share the parent machine's conversation identity.
#[derive(Default)]
pub struct TransitionBlock {
    states: Vec<(StateId, Vec<Transition>)>,
}

impl TransitionBlock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F, Fut>(mut self, state: StateId, pattern: EventPattern, f: F) -> Self
    where
        F: Fn(TurnCtx, Event, Scratch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.push(state, pattern, handler(f));
        self
    }

    pub fn push(&mut self, state: StateId, pattern: EventPattern, handler: Handler) {
        if let Some((_, transitions)) = self.states.iter_mut().find(|(id, _)| *id == state) {
            transitions.push(Transition { pattern, handler });
        } else {
            self.states
                .push((state, vec![Transition { pattern, handler }]));
        }
    }
}

/// A named wizard: its entry points, per-state transitions and fallbacks.
pub struct Machine {
    name: &'static str,
    entry_points: Vec<EntryPoint>,
    states: HashMap<StateId, Vec<Transition>>,
    fallbacks: Vec<Transition>,
    cleanup: Option<CleanupHook>,
}

impl Machine {
    pub fn builder(name: &'static str) -> MachineBuilder {
        MachineBuilder {
            machine: Machine {
                name,
                entry_points: Vec::new(),
                states: HashMap::new(),
                fallbacks: Vec::new(),
                cleanup: None,
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn has_state(&self, state: &str) -> bool {
        self.states.contains_key(state)
    }

    /// First transition of `state` matching the event, then the fallbacks,
    /// in declaration order.
    pub fn resolve(&self, state: &str, payload: &EventPayload) -> Option<&Transition> {
        self.states
            .get(state)
            .and_then(|transitions| transitions.iter().find(|t| t.pattern.matches(payload)))
            .or_else(|| self.fallbacks.iter().find(|t| t.pattern.matches(payload)))
    }

    pub fn cleanup(&self) -> Option<&CleanupHook> {
        self.cleanup.as_ref()
    }
}

/// Fluent construction of a [`Machine`].
pub struct MachineBuilder {
    machine: Machine,
}

impl MachineBuilder {
    pub fn entry<F, Fut>(mut self, pattern: EventPattern, guard: Guard, f: F) -> Self
    where
        F: Fn(TurnCtx, Event, Scratch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.machine.entry_points.push(EntryPoint {
            pattern,
            guard,
            handler: handler(f),
        });
        self
    }

    pub fn on<F, Fut>(mut self, state: StateId, pattern: EventPattern, f: F) -> Self
    where
        F: Fn(TurnCtx, Event, Scratch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.machine
            .states
            .entry(state)
            .or_default()
            .push(Transition {
                pattern,
                handler: handler(f),
            });
        self
    }

    /// Merge a reusable transition block into this machine's table.
    pub fn merge(mut self, block: TransitionBlock) -> Self {
        for (state, transitions) in block.states {
            self.machine
                .states
                .entry(state)
                .or_default()
                .extend(transitions);
        }
        self
    }

    pub fn fallback<F, Fut>(mut self, pattern: EventPattern, f: F) -> Self
    where
        F: Fn(TurnCtx, Event, Scratch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.machine.fallbacks.push(Transition {
            pattern,
            handler: handler(f),
        });
        self
    }

    pub fn cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(TurnCtx, Scratch) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = AppResult<()>> + Send + 'static,
    {
        self.machine.cleanup = Some(cleanup_hook(f));
        self
    }

    pub fn build(self) -> Machine {
        self.machine
    }
}

/// All machines, in registration order. Entry points are consulted in this
/// order when an idle user sends an event, first match wins.
pub struct Registry {
    machines: Vec<Machine>,
}

impl Registry {
    pub fn new(machines: Vec<Machine>) -> Self {
        Self { machines }
    }

    pub fn get(&self, name: &str) -> Option<&Machine> {
        self.machines.iter().find(|m| m.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Machine> {
        self.machines.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CallbackData, JobOutcome, MediaItem, TranscodeResult};

    fn text(s: &str) -> EventPayload {
        EventPayload::Text(s.to_string())
    }

    #[test]
    fn command_patterns_match_by_name() {
        let cmd = EventPayload::Command {
            name: "done".to_string(),
            args: String::new(),
        };
        assert!(EventPattern::Command("done").matches(&cmd));
        assert!(!EventPattern::Command("cancel").matches(&cmd));
        assert!(EventPattern::AnyCommand.matches(&cmd));
        assert!(!EventPattern::AnyCommand.matches(&text("done")));
    }

    #[test]
    fn media_patterns_filter_by_kind() {
        let photo = EventPayload::Media(MediaItem {
            kind: MediaKind::Photo,
            file_id: "f1".to_string(),
            media_group_id: None,
            ordinal: 1,
            caption: None,
        });
        assert!(EventPattern::Media(MediaFilter::Any).matches(&photo));
        assert!(EventPattern::Media(MediaFilter::Kind(MediaKind::Photo)).matches(&photo));
        assert!(!EventPattern::Media(MediaFilter::Kind(MediaKind::Audio)).matches(&photo));
    }

    #[test]
    fn callback_patterns_match_namespace_and_action() {
        let press = EventPayload::Callback(CallbackData::with_arg("tour", "pick", 3));
        assert!(EventPattern::Callback {
            ns: "tour",
            action: None
        }
        .matches(&press));
        assert!(EventPattern::Callback {
            ns: "tour",
            action: Some("pick")
        }
        .matches(&press));
        assert!(!EventPattern::Callback {
            ns: "tour",
            action: Some("abort")
        }
        .matches(&press));
        assert!(!EventPattern::Callback {
            ns: "price",
            action: None
        }
        .matches(&press));
    }

    #[test]
    fn job_patterns_match_kind_tag() {
        let done = EventPayload::JobDone(JobOutcome::Transcode(TranscodeResult::Converted {
            voice_file_id: "v1".to_string(),
        }));
        assert!(EventPattern::Job("transcode").matches(&done));
        assert!(!EventPattern::Job("reindex").matches(&done));
        assert!(EventPattern::Any.matches(&done));
    }
}
