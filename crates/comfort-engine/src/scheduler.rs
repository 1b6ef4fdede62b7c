//! Scheduler for delayed and timed action batches
//!
//! The queue itself lives in the store (`scheduler.json`); this type owns
//! the in-process timers. Each queued entry gets one timer task that sleeps
//! until the entry's due time and then announces it on a broadcast channel.
//! Firing is done by whoever listens (the engine), after claiming the entry
//! through [`Scheduler::claim`].
//!
//! Cancellation races firing. Whichever removes the entry from the queue
//! first wins; a cancel that arrives after the claim finds nothing and is a
//! no-op.

use crate::error::EngineError;
use crate::model::{ScheduledAction, SchedulerQueue};
use chrono::{DateTime, Utc};
use comfort_core::Store;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Events emitted by the scheduler
#[derive(Debug, Clone)]
pub struct SchedulerEvent {
    pub action_id: String,
}

/// Result of trying to claim a scheduled action for firing
#[derive(Debug, Clone, PartialEq)]
pub enum Claim {
    /// The entry was due and has been removed from the queue
    Ready(ScheduledAction),
    /// The entry is still queued but not due before this instant
    NotDue(DateTime<Utc>),
    /// No such entry: already fired or cancelled
    Missing,
}

/// Scheduler for managing delayed action batches
pub struct Scheduler {
    store: Store,
    /// Active timer handles (keyed by scheduled action ID)
    timers: Arc<DashMap<String, JoinHandle<()>>>,
    /// Event sender for due actions
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl Scheduler {
    /// Create a new scheduler over the store's queue
    #[must_use]
    pub fn new(store: Store) -> Self {
        let (event_tx, _) = broadcast::channel(64);
        Self {
            store,
            timers: Arc::new(DashMap::new()),
            event_tx,
        }
    }

    /// Subscribe to due-action events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Snapshot of the queue
    pub async fn list(&self) -> Vec<ScheduledAction> {
        self.store
            .load::<SchedulerQueue>()
            .await
            .scheduled_actions
    }

    /// Queue an action and arm its timer
    ///
    /// An id that is already queued is rejected and the queue is left as is.
    pub async fn insert(&self, action: ScheduledAction) -> Result<(), EngineError> {
        let id = action.id.clone();
        let due_at = action.due_at;

        let inserted = self
            .store
            .update::<SchedulerQueue, _, _>(|queue| queue.insert(action))
            .await?;
        if !inserted {
            tracing::warn!("Rejected duplicate scheduled action {}", id);
            return Err(EngineError::DuplicateScheduleId(id));
        }

        self.arm(&id, due_at);
        Ok(())
    }

    /// Claim an entry for firing
    ///
    /// Membership and due time are checked and the entry removed inside one
    /// critical section on the queue, so at most one caller ever gets
    /// [`Claim::Ready`] for a given id.
    pub async fn claim(&self, id: &str, now: DateTime<Utc>) -> Result<Claim, EngineError> {
        let claim = self
            .store
            .update::<SchedulerQueue, _, _>(|queue| match queue.get(id) {
                None => Claim::Missing,
                Some(action) if !action.is_due(now) => Claim::NotDue(action.due_at),
                Some(_) => queue.remove(id).map_or(Claim::Missing, Claim::Ready),
            })
            .await?;
        Ok(claim)
    }

    /// Cancel one entry; `None` if it already fired or never existed
    pub async fn cancel(&self, id: &str) -> Result<Option<ScheduledAction>, EngineError> {
        let removed = self
            .store
            .update::<SchedulerQueue, _, _>(|queue| queue.remove(id))
            .await?;
        self.disarm(id);
        match &removed {
            Some(action) => tracing::info!("Cancelled scheduled action {}", action.id),
            None => tracing::debug!("Nothing to cancel for {}", id),
        }
        Ok(removed)
    }

    /// Cancel every queued entry
    pub async fn cancel_all(&self) -> Result<Vec<ScheduledAction>, EngineError> {
        let removed = self
            .store
            .update::<SchedulerQueue, _, _>(|queue| std::mem::take(&mut queue.scheduled_actions))
            .await?;
        for action in &removed {
            self.disarm(&action.id);
        }
        tracing::info!("Cancelled {} scheduled actions", removed.len());
        Ok(removed)
    }

    /// Re-arm timers for every persisted entry (e.g. after a restart)
    ///
    /// Overdue entries are announced right away.
    pub async fn restore(&self) -> usize {
        let queued = self.list().await;
        for action in &queued {
            self.arm(&action.id, action.due_at);
        }
        if !queued.is_empty() {
            tracing::info!("Restored {} scheduled actions", queued.len());
        }
        queued.len()
    }

    /// Ids of queued entries that are due at `now`
    pub async fn due_ids(&self, now: DateTime<Utc>) -> Vec<String> {
        self.list()
            .await
            .into_iter()
            .filter(|action| action.is_due(now))
            .map(|action| action.id)
            .collect()
    }

    /// Start (or restart) the timer for an entry
    pub fn arm(&self, id: &str, due_at: DateTime<Utc>) {
        let action_id = id.to_string();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            sleep_until(due_at).await;
            tracing::debug!("Timer fired for scheduled action {}", action_id);
            let _ = event_tx.send(SchedulerEvent { action_id });
        });

        if let Some(previous) = self.timers.insert(id.to_string(), handle) {
            previous.abort();
        }
        tracing::debug!("Armed timer for scheduled action {} at {}", id, due_at);
    }

    /// Stop and forget the timer for an entry
    pub fn disarm(&self, id: &str) {
        if let Some((_, handle)) = self.timers.remove(id) {
            handle.abort();
        }
    }

    /// Get the number of armed timers
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.timers.len()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // Abort all timer tasks
        for entry in self.timers.iter() {
            entry.value().abort();
        }
    }
}

/// Sleep until the wall clock reaches `due_at`
///
/// The clock is re-read after every wake-up, so a clock change while
/// sleeping can delay the wake-up but never make it early.
async fn sleep_until(due_at: DateTime<Utc>) {
    loop {
        let Ok(remaining) = (due_at - Utc::now()).to_std() else {
            return;
        };
        if remaining.is_zero() {
            return;
        }
        tokio::time::sleep(remaining).await;
    }
}
