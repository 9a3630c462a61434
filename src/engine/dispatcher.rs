//! Event dispatch against the machine registry.
//!
//! For each inbound event: load the user's live conversation if any, resolve
//! the transition (state table, then fallbacks), invoke the handler, persist
//! the outcome. Idle users are matched against entry points in registration
//! order. Handler failures and panics are absorbed here: the user gets a
//! generic apology and the conversation stays exactly as it was.

use crate::config::AppConfig;
use crate::currency::CurrencyCache;
use crate::db::ContentStore;
use crate::dialogue::{Scratch, SCRATCH_SCHEMA_VERSION};
use crate::errors::{error_logging, AppError, AppResult};
use crate::event::Event;
use crate::gateway::MessagingGateway;
use crate::jobs::JobRunner;
use crate::localization::{t_args_lang, t_lang};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::machine::{Flow, Guard, Handler, HandlerResult, Machine, Outcome, Registry};
use super::store::{ConversationRecord, ConversationStore};

/// Shared collaborators handed to every handler.
pub struct Services {
    pub gateway: Arc<dyn MessagingGateway>,
    pub content: Arc<dyn ContentStore>,
    pub currencies: Arc<CurrencyCache>,
    pub jobs: Arc<JobRunner>,
    pub config: AppConfig,
    /// Serializes the read-modify-write of a media group's file list when
    /// files of one batch arrive as near-simultaneous events.
    pub content_lock: tokio::sync::Mutex<()>,
}

/// Per-turn view a handler receives: the shared services plus who is
/// talking, where, and in which language.
#[derive(Clone)]
pub struct TurnCtx {
    pub services: Arc<Services>,
    pub user: i64,
    pub chat: i64,
    pub lang: Option<String>,
}

impl TurnCtx {
    pub fn gateway(&self) -> &dyn MessagingGateway {
        self.services.gateway.as_ref()
    }

    pub fn content(&self) -> &dyn ContentStore {
        self.services.content.as_ref()
    }

    pub fn is_operator(&self) -> bool {
        self.services.config.bot.operator_ids.contains(&self.user)
    }

    /// Localized message in this user's language.
    pub fn t(&self, key: &str) -> String {
        t_lang(key, self.lang.as_deref())
    }

    /// Localized message with arguments in this user's language.
    pub fn t_args(&self, key: &str, args: &[(&str, &str)]) -> String {
        t_args_lang(key, args, self.lang.as_deref())
    }
}

enum Resumed {
    Handled,
    /// The stored record no longer decodes against the current registry;
    /// it was dropped and the event should be treated as from an idle user.
    RecordDropped,
}

pub struct Dispatcher {
    registry: Registry,
    conversations: Arc<dyn ConversationStore>,
    services: Arc<Services>,
}

impl Dispatcher {
    pub fn new(
        registry: Registry,
        conversations: Arc<dyn ConversationStore>,
        services: Arc<Services>,
    ) -> Self {
        Self {
            registry,
            conversations,
            services,
        }
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    /// Process one inbound event to completion. Never propagates errors;
    /// whatever goes wrong is logged and answered with a generic apology.
    pub async fn dispatch(&self, event: Event) {
        let ctx = TurnCtx {
            services: self.services.clone(),
            user: event.user,
            chat: event.chat,
            lang: event.language_code.clone(),
        };

        if let Err(err) = self.dispatch_inner(&ctx, &event).await {
            error_logging::log_database_error(&err, "dispatch", Some(event.user));
            self.apologize(&ctx).await;
        }
    }

    async fn dispatch_inner(&self, ctx: &TurnCtx, event: &Event) -> AppResult<()> {
        match self.conversations.active_for_user(event.user).await? {
            Some(record) => match self.resume(ctx, event, record).await? {
                Resumed::Handled => Ok(()),
                Resumed::RecordDropped => self.enter(ctx, event).await,
            },
            None => self.enter(ctx, event).await,
        }
    }

    /// Feed the event to the user's live conversation.
    async fn resume(
        &self,
        ctx: &TurnCtx,
        event: &Event,
        record: ConversationRecord,
    ) -> AppResult<Resumed> {
        let machine = match self.registry.get(&record.machine) {
            Some(machine) => machine,
            None => {
                warn!(
                    user_id = %record.user_id,
                    machine = %record.machine,
                    "Dropping conversation for unregistered machine"
                );
                self.conversations.clear(record.user_id, &record.machine).await?;
                return Ok(Resumed::RecordDropped);
            }
        };

        if record.schema_version != SCRATCH_SCHEMA_VERSION || !machine.has_state(&record.state) {
            warn!(
                user_id = %record.user_id,
                machine = %record.machine,
                state = %record.state,
                schema_version = record.schema_version,
                "Dropping stale conversation record"
            );
            self.conversations.clear(record.user_id, &record.machine).await?;
            return Ok(Resumed::RecordDropped);
        }

        let scratch = match Scratch::decode(&record.scratch_json) {
            Ok(scratch) => scratch,
            Err(err) => {
                warn!(
                    user_id = %record.user_id,
                    machine = %record.machine,
                    error = %err,
                    "Dropping conversation with undecodable scratch"
                );
                self.conversations.clear(record.user_id, &record.machine).await?;
                return Ok(Resumed::RecordDropped);
            }
        };

        let transition = match machine.resolve(&record.state, &event.payload) {
            Some(transition) => transition,
            None => {
                // No state transition and no fallback: commands get an
                // explanation, everything else is dropped quietly.
                debug!(
                    user_id = %event.user,
                    machine = %record.machine,
                    state = %record.state,
                    "No transition matched event"
                );
                if event.is_command() {
                    self.send_quietly(ctx, &ctx.t("unknown-command")).await;
                }
                return Ok(Resumed::Handled);
            }
        };

        let handler = transition.handler.clone();
        match self.invoke(ctx, event, handler, scratch).await {
            Ok(outcome) => {
                self.apply(ctx, machine, &record, outcome).await?;
            }
            Err(err) => {
                error_logging::log_dispatch_error(&err, &record.machine, &record.state, ctx.user);
                self.apologize(ctx).await;
            }
        }
        Ok(Resumed::Handled)
    }

    /// Try the registered entry points for an idle user.
    async fn enter(&self, ctx: &TurnCtx, event: &Event) -> AppResult<()> {
        let mut operator_blocked = false;

        for machine in self.registry.iter() {
            for entry in machine.entry_points() {
                if !entry.pattern.matches(&event.payload) {
                    continue;
                }
                if entry.guard == Guard::Operators && !ctx.is_operator() {
                    operator_blocked = true;
                    continue;
                }

                let handler = entry.handler.clone();
                match self.invoke(ctx, event, handler, Scratch::default()).await {
                    Ok(outcome) => {
                        self.apply_entry(ctx, machine, outcome).await?;
                    }
                    Err(err) => {
                        error_logging::log_dispatch_error(&err, machine.name(), "(entry)", ctx.user);
                        self.apologize(ctx).await;
                    }
                }
                return Ok(());
            }
        }

        if operator_blocked {
            self.send_quietly(ctx, &ctx.t("operators-only")).await;
        } else if event.is_command() {
            self.send_quietly(ctx, &ctx.t("unknown-command")).await;
        }
        Ok(())
    }

    /// Run the handler on its own task so a panic cannot take down the
    /// worker loop; it surfaces as an internal error instead.
    async fn invoke(
        &self,
        ctx: &TurnCtx,
        event: &Event,
        handler: Handler,
        scratch: Scratch,
    ) -> HandlerResult {
        let fut = handler(ctx.clone(), event.clone(), scratch);
        match tokio::spawn(fut).await {
            Ok(result) => result,
            Err(join_err) if join_err.is_panic() => {
                Err(AppError::Internal("handler panicked".to_string()))
            }
            Err(_) => Err(AppError::Internal("handler task cancelled".to_string())),
        }
    }

    /// Persist a resumed conversation's outcome.
    async fn apply(
        &self,
        ctx: &TurnCtx,
        machine: &Machine,
        record: &ConversationRecord,
        outcome: Outcome,
    ) -> AppResult<()> {
        match outcome.flow {
            Flow::Stay => {
                self.save(ctx.user, machine.name(), &record.state, &outcome.scratch)
                    .await
            }
            Flow::Goto(next) => {
                if !machine.has_state(next) {
                    return Err(AppError::Internal(format!(
                        "machine '{}' has no state '{}'",
                        machine.name(),
                        next
                    )));
                }
                self.save(ctx.user, machine.name(), next, &outcome.scratch).await
            }
            Flow::End => {
                self.finish(ctx, machine, outcome.scratch).await
            }
        }
    }

    /// Persist an entry point's outcome. Only `Goto` opens a conversation;
    /// anything else means the event was handled statelessly.
    async fn apply_entry(&self, ctx: &TurnCtx, machine: &Machine, outcome: Outcome) -> AppResult<()> {
        match outcome.flow {
            Flow::Goto(next) => {
                if !machine.has_state(next) {
                    return Err(AppError::Internal(format!(
                        "machine '{}' has no state '{}'",
                        machine.name(),
                        next
                    )));
                }
                info!(user_id = %ctx.user, machine = %machine.name(), "Conversation opened");
                self.save(ctx.user, machine.name(), next, &outcome.scratch).await
            }
            Flow::Stay | Flow::End => Ok(()),
        }
    }

    async fn save(&self, user: i64, machine: &str, state: &str, scratch: &Scratch) -> AppResult<()> {
        let record = ConversationRecord {
            user_id: user,
            machine: machine.to_string(),
            state: state.to_string(),
            scratch_json: scratch.encode()?,
            schema_version: SCRATCH_SCHEMA_VERSION,
        };
        self.conversations.save(&record).await
    }

    /// Terminal flow: cleanup hook first, then the record goes away.
    async fn finish(&self, ctx: &TurnCtx, machine: &Machine, scratch: Scratch) -> AppResult<()> {
        if let Some(hook) = machine.cleanup() {
            if let Err(err) = hook(ctx.clone(), scratch).await {
                // A failed cleanup must not wedge the user in a dead
                // conversation; log it and clear anyway.
                error_logging::log_dispatch_error(&err, machine.name(), "(cleanup)", ctx.user);
            }
        }
        info!(user_id = %ctx.user, machine = %machine.name(), "Conversation closed");
        self.conversations.clear(ctx.user, machine.name()).await
    }

    async fn apologize(&self, ctx: &TurnCtx) {
        self.send_quietly(ctx, &ctx.t("error-generic")).await;
    }

    async fn send_quietly(&self, ctx: &TurnCtx, text: &str) {
        if let Err(err) = self.services.gateway.send_text(ctx.chat, text).await {
            error_logging::log_gateway_error(&err, "send_text", Some(ctx.chat));
        }
    }
}
