//! Sequential per-user event delivery.
//!
//! Every event source (the platform adapter, background jobs) feeds one
//! intake queue. The runner fans events out to a lightweight worker task per
//! user, so one user's events are processed strictly in arrival order while
//! different users proceed concurrently.

use crate::event::Event;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

use super::dispatcher::Dispatcher;

pub struct EventRunner {
    dispatcher: Arc<Dispatcher>,
    workers: Mutex<HashMap<i64, mpsc::UnboundedSender<Event>>>,
}

impl EventRunner {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Arc<Self> {
        Arc::new(Self {
            dispatcher,
            workers: Mutex::new(HashMap::new()),
        })
    }

    /// Drain the intake queue until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut intake: mpsc::UnboundedReceiver<Event>) {
        while let Some(event) = intake.recv().await {
            self.route(event);
        }
        debug!("Event intake closed");
    }

    /// Hand the event to its user's worker, spawning one on first contact.
    pub fn route(&self, event: Event) {
        let mut workers = self.workers.lock();
        let sender = workers
            .entry(event.user)
            .or_insert_with(|| self.spawn_worker(event.user));
        if let Err(mpsc::error::SendError(event)) = sender.send(event) {
            // Worker is gone; start a fresh one and requeue.
            let user = event.user;
            let sender = self.spawn_worker(user);
            let _ = sender.send(event);
            workers.insert(user, sender);
        }
    }

    fn spawn_worker(&self, user: i64) -> mpsc::UnboundedSender<Event> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            debug!(user_id = %user, "User worker started");
            while let Some(event) = rx.recv().await {
                dispatcher.dispatch(event).await;
            }
            debug!(user_id = %user, "User worker stopped");
        });
        tx
    }
}
