//! Core comfort engine
//!
//! Front door for every actor that touches the shared state: the HTTP
//! layer submitting intents, the scheduler firing due batches and the
//! background poller. Each resource is changed through [`Store::update`]
//! and no code path holds two resource locks at once.

use crate::describe::describe_actions;
use crate::error::EngineError;
use crate::evaluator::{parse_time, parse_time_range};
use crate::executor::apply;
use crate::learner::{learn, time_band};
use crate::model::{
    ActionDelta, ActionType, ActiveConfig, Intent, Rule, RuleSet, RuleSetName, ScheduleKind,
    ScheduleRequest, ScheduledAction,
};
use crate::poller::Poller;
use crate::scheduler::{Claim, Scheduler, SchedulerEvent};
use crate::settings::EngineSettings;
use chrono::{DateTime, Local, TimeDelta, TimeZone, Utc};
use comfort_core::{
    DeviceState, Document, PendingUpdate, PendingUpdates, SensorReading, StatusSnapshot, Store,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Events emitted by the comfort engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A batch was applied right away
    ActionsApplied {
        description: String,
        state: DeviceState,
    },
    /// A batch was queued for later
    ActionScheduled {
        id: String,
        description: String,
        due_at: DateTime<Utc>,
    },
    /// A queued batch ran
    ScheduledFired { id: String, text: String },
    /// A queued batch was cancelled before it ran
    ScheduledCancelled { id: String },
    /// The active rule set changed
    RuleSetChanged { rule_set: RuleSetName },
    /// Preference rules were learned from a user action
    PreferencesLearned { labels: Vec<String> },
    /// Preference rules were reset to the fixed rules
    PreferencesReset,
    /// New sensor readings were stored
    SensorsUpdated { sensors: SensorReading },
}

/// Everything an applied batch changed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub description: String,
    /// Device state after the batch, if it carried device actions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<DeviceState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_set: Option<RuleSetName>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub cancelled: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub learned: Vec<String>,
}

/// What happened to a submitted intent
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IntentOutcome {
    Applied(BatchReport),
    Scheduled(ScheduledAction),
}

/// What happened to a fire request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FireOutcome {
    /// The batch ran; carries the pending update text
    Fired(String),
    /// Still queued, not due yet
    NotDue,
    /// Already fired or cancelled
    Skipped,
}

/// The main comfort engine
pub struct ComfortEngine {
    store: Store,
    /// Timers for queued batches
    scheduler: Arc<Scheduler>,
    /// Event broadcaster
    event_tx: broadcast::Sender<EngineEvent>,
    settings: EngineSettings,
}

impl ComfortEngine {
    /// Create a new engine, writing default resources that are missing
    pub async fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let store = Store::new(settings.data_dir.clone());
        store.ensure::<Document>().await?;
        store.ensure::<RuleSet>().await?;
        store.ensure::<ActiveConfig>().await?;

        let (event_tx, _) = broadcast::channel(64);
        Ok(Self {
            scheduler: Arc::new(Scheduler::new(store.clone())),
            store,
            event_tx,
            settings,
        })
    }

    /// Start the engine (scheduler timers and background poller)
    pub async fn start(self: &Arc<Self>) {
        self.start_scheduler().await;
        tokio::spawn(self.poller().run());
    }

    /// Start only the scheduler: listen for due batches and re-arm the
    /// persisted queue
    pub async fn start_scheduler(self: &Arc<Self>) {
        // Subscribe before restoring so overdue entries are not missed
        let rx = self.scheduler.subscribe();
        self.start_scheduler_listener(rx);
        self.scheduler.restore().await;
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }

    /// Poller over this engine's store
    #[must_use]
    pub fn poller(&self) -> Poller {
        Poller::new(self.store.clone(), self.settings.poll_interval)
    }

    #[must_use]
    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    // ---- intents ----

    /// Apply or schedule a structured intent
    pub async fn submit(&self, intent: Intent) -> Result<IntentOutcome, EngineError> {
        if intent.actions.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        match intent.schedule {
            None => {
                let report = self.apply_batch(&intent.actions, None).await?;
                Ok(IntentOutcome::Applied(report))
            }
            Some(request) => {
                let scheduled = self.schedule(intent.actions, request).await?;
                Ok(IntentOutcome::Scheduled(scheduled))
            }
        }
    }

    /// Apply a batch now
    ///
    /// Cancellations run first, then a rule set switch, then the device
    /// actions. Device actions are learned as user preferences, scoped to
    /// `schedule_label` when the batch comes from an absolute-time schedule.
    pub async fn apply_batch(
        &self,
        actions: &[ActionDelta],
        schedule_label: Option<&str>,
    ) -> Result<BatchReport, EngineError> {
        let rule_set = requested_rule_set(actions)?;
        let band = time_band(Local::now().time(), schedule_label);

        let mut report = BatchReport {
            description: describe_actions(actions),
            ..BatchReport::default()
        };

        for delta in actions
            .iter()
            .filter(|d| d.action_type == ActionType::CancelScheduled)
        {
            match delta.value_text().as_str() {
                "all" => {
                    let removed = self.cancel_all().await?;
                    report.cancelled.extend(removed.into_iter().map(|a| a.id));
                }
                id => {
                    if let Some(removed) = self.cancel(id).await? {
                        report.cancelled.push(removed.id);
                    }
                }
            }
        }

        if let Some(name) = rule_set {
            self.set_active_rule_set(name).await?;
            report.rule_set = Some(name);
        }

        if actions.iter().any(|d| d.device_change().is_some()) {
            let document = self
                .store
                .update::<Document, _, _>(|doc| {
                    doc.action = apply(&doc.action, actions);
                    doc.clone()
                })
                .await?;

            report.learned = self
                .store
                .update::<RuleSet, _, _>(|rules| {
                    learn(&mut rules.user_preference, &document.sensors, actions, &band)
                })
                .await?;

            if !report.learned.is_empty() {
                self.emit(EngineEvent::PreferencesLearned {
                    labels: report.learned.clone(),
                });
            }
            self.emit(EngineEvent::ActionsApplied {
                description: report.description.clone(),
                state: document.action,
            });
            report.state = Some(document.action);
        }

        tracing::info!("Applied actions: {}", report.description);
        Ok(report)
    }

    // ---- scheduling ----

    /// Queue a batch for later
    pub async fn schedule(
        &self,
        actions: Vec<ActionDelta>,
        request: ScheduleRequest,
    ) -> Result<ScheduledAction, EngineError> {
        if actions.is_empty() {
            return Err(EngineError::EmptyBatch);
        }
        requested_rule_set(&actions)?;

        let now = Utc::now();
        let (due_at, schedule_kind, schedule_time_label, delay_seconds) = match request {
            ScheduleRequest::DelaySeconds(seconds) => {
                let due_at = i64::try_from(seconds)
                    .ok()
                    .and_then(TimeDelta::try_seconds)
                    .and_then(|delay| now.checked_add_signed(delay))
                    .ok_or_else(|| {
                        EngineError::InvalidTimeFormat(format!("delay of {seconds} seconds"))
                    })?;
                (due_at, ScheduleKind::Delay, None, Some(seconds))
            }
            ScheduleRequest::AbsoluteTime(label) => {
                let label = label.trim().to_string();
                let due_at = next_occurrence(&label, &Local::now())?;
                (due_at, ScheduleKind::AbsoluteTime, Some(label), None)
            }
        };

        let scheduled = ScheduledAction {
            id: uuid::Uuid::new_v4().to_string(),
            description: describe_actions(&actions),
            actions,
            due_at,
            schedule_kind,
            schedule_time_label,
            delay_seconds,
        };
        self.schedule_action(scheduled.clone()).await?;
        Ok(scheduled)
    }

    /// Queue a fully built entry; its id must be new
    pub async fn schedule_action(&self, scheduled: ScheduledAction) -> Result<(), EngineError> {
        let id = scheduled.id.clone();
        let description = scheduled.description.clone();
        let due_at = scheduled.due_at;

        self.scheduler.insert(scheduled).await?;

        tracing::info!(
            "Scheduled action {} at {}: {}",
            id,
            due_at.with_timezone(&Local).format("%H:%M:%S"),
            description
        );
        self.emit(EngineEvent::ActionScheduled {
            id,
            description,
            due_at,
        });
        Ok(())
    }

    /// Fire a queued batch if it is due
    ///
    /// Safe to call more than once for the same id: only the call that
    /// claims the entry applies it.
    pub async fn fire_scheduled(&self, id: &str) -> Result<FireOutcome, EngineError> {
        let scheduled = match self.scheduler.claim(id, Utc::now()).await? {
            Claim::Ready(scheduled) => scheduled,
            Claim::NotDue(due_at) => {
                tracing::debug!("Scheduled action {} not due until {}, re-arming", id, due_at);
                self.scheduler.arm(id, due_at);
                return Ok(FireOutcome::NotDue);
            }
            Claim::Missing => {
                tracing::debug!("Scheduled action {} already fired or cancelled", id);
                self.scheduler.disarm(id);
                return Ok(FireOutcome::Skipped);
            }
        };
        self.scheduler.disarm(id);

        let clock = Local::now().format("%H:%M:%S").to_string();
        let text = match self
            .apply_batch(&scheduled.actions, scheduled.schedule_time_label.as_deref())
            .await
        {
            Ok(report) => format!(
                "Action executed at {} ({}): {}",
                clock,
                scheduled.display_time(),
                report.description
            ),
            Err(e) => {
                tracing::error!("Failed to execute scheduled action {}: {}", id, e);
                format!(
                    "Scheduled action failed at {} ({}): {}",
                    clock,
                    scheduled.display_time(),
                    e
                )
            }
        };

        let update = PendingUpdate::now(text.clone());
        self.store
            .update::<PendingUpdates, _, _>(|queue| queue.push(update))
            .await?;

        self.emit(EngineEvent::ScheduledFired {
            id: id.to_string(),
            text: text.clone(),
        });
        Ok(FireOutcome::Fired(text))
    }

    /// Fire every queued batch that is due; returns how many ran
    pub async fn fire_due(&self) -> usize {
        let mut fired = 0;
        for id in self.scheduler.due_ids(Utc::now()).await {
            match self.fire_scheduled(&id).await {
                Ok(FireOutcome::Fired(_)) => fired += 1,
                Ok(_) => {}
                Err(e) => tracing::error!("Failed to fire scheduled action {}: {}", id, e),
            }
        }
        fired
    }

    /// Cancel one queued batch; `None` if it already ran or never existed
    pub async fn cancel(&self, id: &str) -> Result<Option<ScheduledAction>, EngineError> {
        let removed = self.scheduler.cancel(id).await?;
        if let Some(scheduled) = &removed {
            self.emit(EngineEvent::ScheduledCancelled {
                id: scheduled.id.clone(),
            });
        }
        Ok(removed)
    }

    /// Cancel every queued batch
    pub async fn cancel_all(&self) -> Result<Vec<ScheduledAction>, EngineError> {
        let removed = self.scheduler.cancel_all().await?;
        for scheduled in &removed {
            self.emit(EngineEvent::ScheduledCancelled {
                id: scheduled.id.clone(),
            });
        }
        Ok(removed)
    }

    /// Queued batches
    pub async fn scheduled(&self) -> Vec<ScheduledAction> {
        self.scheduler.list().await
    }

    // ---- state ----

    pub async fn document(&self) -> Document {
        self.store.load().await
    }

    pub async fn status(&self) -> StatusSnapshot {
        self.store.load().await
    }

    /// Store new sensor readings, keeping the device state
    pub async fn update_sensors(&self, sensors: SensorReading) -> Result<Document, EngineError> {
        let document = self
            .store
            .update::<Document, _, _>(|doc| {
                doc.sensors = sensors;
                doc.clone()
            })
            .await?;
        tracing::debug!("Sensors updated: {:?}", sensors);
        self.emit(EngineEvent::SensorsUpdated { sensors });
        Ok(document)
    }

    /// Take every pending notification, oldest first
    pub async fn drain_updates(&self) -> Result<Vec<PendingUpdate>, EngineError> {
        let drained = self
            .store
            .update::<PendingUpdates, _, _>(PendingUpdates::drain)
            .await?;
        Ok(drained)
    }

    // ---- rules ----

    pub async fn active_rule_set(&self) -> RuleSetName {
        self.store.load::<ActiveConfig>().await.active_rule_set
    }

    pub async fn set_active_rule_set(&self, name: RuleSetName) -> Result<(), EngineError> {
        self.store
            .save(&ActiveConfig {
                active_rule_set: name,
            })
            .await?;
        tracing::info!("Active rule set is now {}", name.label());
        self.emit(EngineEvent::RuleSetChanged { rule_set: name });
        Ok(())
    }

    pub async fn rules(&self) -> RuleSet {
        self.store.load().await
    }

    /// Replace the learned preferences with a copy of the fixed rules
    pub async fn reset_preferences(&self) -> Result<RuleSet, EngineError> {
        let rules = self
            .store
            .update::<RuleSet, _, _>(|rules| {
                rules.reset_preferences();
                rules.clone()
            })
            .await?;
        tracing::info!("User preferences reset to fixed rules");
        self.emit(EngineEvent::PreferencesReset);
        Ok(rules)
    }

    /// Set or clear the time range of one user preference rule
    pub async fn set_rule_time(
        &self,
        sensor: &str,
        label: &str,
        time: Option<String>,
    ) -> Result<Rule, EngineError> {
        let time = time
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(range) = &time {
            parse_time_range(range)?;
        }

        let updated = self
            .store
            .update::<RuleSet, _, _>(|rules| {
                let rule = rules
                    .user_preference
                    .get_mut(sensor)?
                    .iter_mut()
                    .find(|rule| rule.label == label && !rule.is_unreadable())?;
                rule.time = time;
                Some(rule.clone())
            })
            .await?;

        updated.ok_or_else(|| EngineError::RuleNotFound {
            sensor: sensor.to_string(),
            label: label.to_string(),
        })
    }

    /// Start listening for scheduler events
    fn start_scheduler_listener(self: &Arc<Self>, mut rx: broadcast::Receiver<SchedulerEvent>) {
        let engine = Arc::clone(self);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if let Err(e) = engine.fire_scheduled(&event.action_id).await {
                            tracing::error!(
                                "Failed to fire scheduled action {}: {}",
                                event.action_id,
                                e
                            );
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("Scheduler listener lagged by {} events, sweeping", n);
                        engine.fire_due().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Scheduler event channel closed");
                        break;
                    }
                }
            }
        });
    }
}

/// Rule set a batch switches to, if any
///
/// Checked before anything is applied so a bad name rejects the whole
/// batch. The last `rule_set` delta wins.
fn requested_rule_set(actions: &[ActionDelta]) -> Result<Option<RuleSetName>, EngineError> {
    actions
        .iter()
        .filter(|d| d.action_type == ActionType::RuleSet)
        .map(|d| d.value_text().parse::<RuleSetName>())
        .last()
        .transpose()
}

/// Next instant the wall clock of `now`'s time zone reads `label` ("HH:MM")
///
/// A time earlier than `now` means tomorrow.
pub fn next_occurrence<Tz: TimeZone>(
    label: &str,
    now: &DateTime<Tz>,
) -> Result<DateTime<Utc>, EngineError> {
    let time = parse_time(label)?;
    let mut target = now.date_naive().and_time(time);
    if target < now.naive_local() {
        target += TimeDelta::days(1);
    }
    target
        .and_local_timezone(now.timezone())
        .earliest()
        .map(|local| local.with_timezone(&Utc))
        .ok_or_else(|| EngineError::InvalidTimeFormat(label.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_next_occurrence_later_today() {
        let now = utc("2026-10-19T10:00:00Z");
        assert_eq!(
            next_occurrence("14:30", &now).unwrap(),
            utc("2026-10-19T14:30:00Z")
        );
    }

    #[test]
    fn test_next_occurrence_rolls_to_tomorrow() {
        let now = utc("2026-10-19T10:00:00Z");
        assert_eq!(
            next_occurrence("09:00", &now).unwrap(),
            utc("2026-10-20T09:00:00Z")
        );
    }

    #[test]
    fn test_next_occurrence_rejects_garbage() {
        let now = utc("2026-10-19T10:00:00Z");
        assert!(matches!(
            next_occurrence("half past", &now),
            Err(EngineError::InvalidTimeFormat(_))
        ));
    }

    #[test]
    fn test_requested_rule_set() {
        let batch = [
            ActionDelta::new(ActionType::Fan, "on"),
            ActionDelta::new(ActionType::RuleSet, "user_preference"),
        ];
        assert_eq!(
            requested_rule_set(&batch).unwrap(),
            Some(RuleSetName::UserPreference)
        );
        assert_eq!(requested_rule_set(&batch[..1]).unwrap(), None);

        let bad = [ActionDelta::new(ActionType::RuleSet, "chaos")];
        assert!(matches!(
            requested_rule_set(&bad),
            Err(EngineError::InvalidRuleSet(_))
        ));
    }

    #[tokio::test]
    async fn test_stale_timer_is_dropped_when_entry_is_gone() {
        let tmp = tempfile::TempDir::new().unwrap();
        let engine = ComfortEngine::new(EngineSettings::with_data_dir(tmp.path()))
            .await
            .unwrap();

        // A timer left behind for an id that is no longer queued
        engine
            .scheduler
            .arm("gone", Utc::now() + TimeDelta::hours(1));
        assert_eq!(engine.scheduler.active_count(), 1);

        assert_eq!(
            engine.fire_scheduled("gone").await.unwrap(),
            FireOutcome::Skipped
        );
        assert_eq!(engine.scheduler.active_count(), 0);

        // Firing again stays a no-op
        assert_eq!(
            engine.fire_scheduled("gone").await.unwrap(),
            FireOutcome::Skipped
        );
        assert_eq!(engine.scheduler.active_count(), 0);
    }
}
