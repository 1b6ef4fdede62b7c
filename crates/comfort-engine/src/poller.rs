//! Background poller
//!
//! Once per interval: resolve the active rule set against the current
//! sensors, merge the result into the persisted device state and publish a
//! status snapshot. A failed cycle is recorded in the status and the loop
//! keeps going.

use crate::describe::status_text;
use crate::error::EngineError;
use crate::evaluator::resolve;
use crate::executor::merge;
use crate::model::{ActiveConfig, RuleSet, RuleSetName};
use chrono::{DateTime, Local};
use comfort_core::{Document, StatusSnapshot, Store};
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Outcome of one successful cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PollReport {
    pub document: Document,
    pub active_rule_set: RuleSetName,
}

/// Periodic rule evaluation
#[derive(Clone)]
pub struct Poller {
    store: Store,
    interval: Duration,
}

impl Poller {
    #[must_use]
    pub fn new(store: Store, interval: Duration) -> Self {
        Self { store, interval }
    }

    /// Run one cycle at the given local time
    ///
    /// The rules are resolved against the sensors read inside the document
    /// lock, so a concurrent user action is never overwritten with a stale
    /// copy of the state.
    pub async fn tick(&self, now: DateTime<Local>) -> Result<PollReport, EngineError> {
        let active_rule_set = self.store.load::<ActiveConfig>().await.active_rule_set;
        let rules: RuleSet = self.store.load().await;
        let time_of_day = now.time();

        let document = self
            .store
            .update::<Document, _, _>(|doc| {
                let resolved = resolve(&doc.sensors, &rules, active_rule_set, time_of_day);
                doc.action = merge(&doc.action, &resolved);
                doc.clone()
            })
            .await?;

        let clock = now.format("%H:%M:%S").to_string();
        self.store
            .save(&StatusSnapshot {
                status: status_text(&clock, &document, active_rule_set.as_str()),
            })
            .await?;

        Ok(PollReport {
            document,
            active_rule_set,
        })
    }

    /// Run one cycle, recording a failure in the status snapshot
    pub async fn run_once(&self) -> StatusSnapshot {
        let now = Local::now();
        match self.tick(now).await {
            Ok(report) => {
                tracing::trace!("Poll cycle done: {:?}", report.document.action);
                self.store.load().await
            }
            Err(e) => {
                tracing::warn!("Poll cycle failed: {}", e);
                let snapshot = StatusSnapshot {
                    status: format!(
                        "[{}] Error during update: {}",
                        now.format("%Y-%m-%d %H:%M:%S"),
                        e
                    ),
                };
                if let Err(e) = self.store.save(&snapshot).await {
                    tracing::error!("Failed to record poll error: {}", e);
                }
                snapshot
            }
        }
    }

    /// Poll forever
    pub async fn run(self) {
        tracing::info!("Starting poller (interval {:?})", self.interval);
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            self.run_once().await;
        }
    }
}
