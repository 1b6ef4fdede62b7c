use chrono::{Duration, Utc};
use comfort_core::{Document, Power};
use comfort_engine::presets::preset;
use comfort_engine::{
    ActionDelta, ActionType, ComfortEngine, EngineError, EngineEvent, EngineSettings,
    FireOutcome, Intent, IntentOutcome, ScheduleKind, ScheduleRequest, ScheduledAction,
};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;

async fn engine(tmp: &TempDir) -> Arc<ComfortEngine> {
    Arc::new(
        ComfortEngine::new(EngineSettings::with_data_dir(tmp.path()))
            .await
            .unwrap(),
    )
}

fn entry(id: &str, offset: Duration) -> ScheduledAction {
    let actions = vec![ActionDelta::new(ActionType::Fan, "off")];
    ScheduledAction {
        id: id.to_string(),
        description: "Turned off the fan".to_string(),
        actions,
        due_at: Utc::now() + offset,
        schedule_kind: ScheduleKind::Delay,
        schedule_time_label: None,
        delay_seconds: Some(0),
    }
}

async fn next_fired(rx: &mut broadcast::Receiver<EngineEvent>) -> (String, String) {
    tokio::time::timeout(std::time::Duration::from_secs(5), async {
        loop {
            if let Ok(EngineEvent::ScheduledFired { id, text }) = rx.recv().await {
                return (id, text);
            }
        }
    })
    .await
    .expect("scheduled action did not fire")
}

#[tokio::test]
async fn delay_zero_fires_exactly_once() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    let mut events = engine.subscribe();
    engine.start_scheduler().await;

    let outcome = engine
        .submit(Intent::scheduled(
            preset("Turn off everything").unwrap(),
            ScheduleRequest::DelaySeconds(0),
        ))
        .await
        .unwrap();
    let IntentOutcome::Scheduled(scheduled) = outcome else {
        panic!("expected a scheduled outcome");
    };

    let (id, text) = next_fired(&mut events).await;
    assert_eq!(id, scheduled.id);
    assert!(text.starts_with("Action executed at "));
    assert!(text.contains("(after 0 seconds): Turned off the fan"));

    let document = engine.document().await;
    assert_eq!(document.action.fan, Power::Off);
    assert_eq!(document.action.light, Power::Off);
    assert!(engine.scheduled().await.is_empty());

    // A late duplicate timer must not apply the batch again
    assert_eq!(
        engine.fire_scheduled(&id).await.unwrap(),
        FireOutcome::Skipped
    );

    let updates = engine.drain_updates().await.unwrap();
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0].text, text);
    assert!(engine.drain_updates().await.unwrap().is_empty());
}

#[tokio::test]
async fn concurrent_fire_requests_apply_once() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    engine
        .schedule_action(entry("race", Duration::seconds(-1)))
        .await
        .unwrap();

    let (a, b, c) = tokio::join!(
        engine.fire_scheduled("race"),
        engine.fire_scheduled("race"),
        engine.fire_scheduled("race"),
    );
    let fired = [a.unwrap(), b.unwrap(), c.unwrap()]
        .into_iter()
        .filter(|outcome| matches!(outcome, FireOutcome::Fired(_)))
        .count();

    assert_eq!(fired, 1);
    assert_eq!(engine.drain_updates().await.unwrap().len(), 1);
}

#[tokio::test]
async fn cancelled_action_never_runs() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    let before = engine.document().await;

    let scheduled = engine
        .schedule(
            vec![ActionDelta::new(ActionType::Fan, "off")],
            ScheduleRequest::DelaySeconds(3600),
        )
        .await
        .unwrap();

    let cancelled = engine.cancel(&scheduled.id).await.unwrap();
    assert_eq!(cancelled.map(|a| a.id), Some(scheduled.id.clone()));

    assert_eq!(
        engine.fire_scheduled(&scheduled.id).await.unwrap(),
        FireOutcome::Skipped
    );
    assert_eq!(engine.document().await, before);
    assert!(engine.drain_updates().await.unwrap().is_empty());

    // Cancelling again is a no-op
    assert!(engine.cancel(&scheduled.id).await.unwrap().is_none());
}

#[tokio::test]
async fn not_due_action_stays_queued() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    let before = engine.document().await;

    engine
        .schedule_action(entry("later", Duration::hours(1)))
        .await
        .unwrap();

    assert_eq!(
        engine.fire_scheduled("later").await.unwrap(),
        FireOutcome::NotDue
    );
    assert_eq!(engine.scheduled().await.len(), 1);
    assert_eq!(engine.document().await, before);
}

#[tokio::test]
async fn duplicate_schedule_id_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;

    engine
        .schedule_action(entry("dup", Duration::hours(1)))
        .await
        .unwrap();
    let err = engine
        .schedule_action(entry("dup", Duration::hours(2)))
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::DuplicateScheduleId(id) if id == "dup"));
    assert_eq!(engine.scheduled().await.len(), 1);
}

#[tokio::test]
async fn cancel_all_through_a_batch() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;
    for id in ["one", "two"] {
        engine
            .schedule_action(entry(id, Duration::hours(1)))
            .await
            .unwrap();
    }

    let outcome = engine
        .submit(Intent::immediate(vec![ActionDelta::new(
            ActionType::CancelScheduled,
            "all",
        )]))
        .await
        .unwrap();

    let IntentOutcome::Applied(report) = outcome else {
        panic!("expected an applied outcome");
    };
    assert_eq!(report.cancelled.len(), 2);
    assert_eq!(report.description, "Cancelled all scheduled actions");
    assert!(engine.scheduled().await.is_empty());
}

#[tokio::test]
async fn queued_actions_survive_restart() {
    let tmp = TempDir::new().unwrap();
    {
        let engine = engine(&tmp).await;
        engine
            .schedule_action(entry("persisted", Duration::seconds(-1)))
            .await
            .unwrap();
    }

    let engine = engine(&tmp).await;
    let mut events = engine.subscribe();
    engine.start_scheduler().await;

    let (id, _) = next_fired(&mut events).await;
    assert_eq!(id, "persisted");
    assert_eq!(engine.document().await.action.fan, Power::Off);
    assert!(engine.scheduled().await.is_empty());
}

#[tokio::test]
async fn absolute_time_schedule_keeps_its_label() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp).await;

    let scheduled = engine
        .schedule(
            vec![ActionDelta::new(ActionType::Light, "on")],
            ScheduleRequest::AbsoluteTime("07:30".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(scheduled.schedule_kind, ScheduleKind::AbsoluteTime);
    assert_eq!(scheduled.display_time(), "07:30");
    assert!(scheduled.due_at > Utc::now());
    assert!(scheduled.due_at <= Utc::now() + Duration::days(1));

    let err = engine
        .schedule(
            vec![ActionDelta::new(ActionType::Light, "on")],
            ScheduleRequest::AbsoluteTime("7.30pm".to_string()),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTimeFormat(_)));
}

#[tokio::test]
async fn document_survives_restart_with_defaults_written() {
    let tmp = TempDir::new().unwrap();
    let _engine = engine(&tmp).await;

    assert!(tmp.path().join("data.json").exists());
    assert!(tmp.path().join("rule.json").exists());
    assert!(tmp.path().join("config.json").exists());

    let raw = std::fs::read_to_string(tmp.path().join("data.json")).unwrap();
    let document: Document = serde_json::from_str(&raw).unwrap();
    assert_eq!(document, Document::default());
}
