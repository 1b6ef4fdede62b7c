//! Natural-language summaries of action batches

use crate::model::{ActionDelta, ActionType, DeviceChange};
use comfort_core::{DeviceState, Document, Power};

const NO_CHANGES: &str = "No changes made";

fn switched(power: Power, device: &str) -> String {
    match power {
        Power::On => format!("Turned on the {device}"),
        Power::Off => format!("Turned off the {device}"),
    }
}

fn describe_delta(delta: &ActionDelta) -> Option<String> {
    if let Some(change) = delta.device_change() {
        return Some(match change {
            DeviceChange::Fan(power) => switched(power, "fan"),
            DeviceChange::Light(power) => switched(power, "light"),
            DeviceChange::FanSpeed(level) => format!("Set fan speed to {level}%"),
            DeviceChange::Brightness(level) => format!("Set brightness to {level}%"),
        });
    }
    match delta.action_type {
        ActionType::None => Some(NO_CHANGES.to_string()),
        ActionType::RuleSet => Some(format!("Switched rule set to {}", delta.value_text())),
        ActionType::CancelScheduled => Some(match delta.value_text().as_str() {
            "all" => "Cancelled all scheduled actions".to_string(),
            id => format!("Cancelled scheduled action {id}"),
        }),
        _ => None,
    }
}

/// Describe a batch, e.g. "Turned on the fan, Set fan speed to 50%"
///
/// Repeated phrases are only listed once.
#[must_use]
pub fn describe_actions(actions: &[ActionDelta]) -> String {
    if actions.is_empty() {
        return format!("{NO_CHANGES}.");
    }

    let mut messages: Vec<String> = Vec::new();
    for message in actions.iter().filter_map(describe_delta) {
        if !messages.contains(&message) {
            messages.push(message);
        }
    }

    if messages.is_empty() {
        NO_CHANGES.to_string()
    } else {
        messages.join(", ")
    }
}

/// One-line summary of a device state
#[must_use]
pub fn describe_state(state: &DeviceState) -> String {
    format!(
        "Fan: {}, Speed: {}%, Light: {}, Brightness: {}%",
        state.fan.label(),
        state.fan_speed,
        state.light.label(),
        state.set_brightness
    )
}

/// Multi-line status text for a completed update cycle
#[must_use]
pub fn status_text(clock: &str, document: &Document, active_rule_set: &str) -> String {
    let sensors = &document.sensors;
    format!(
        "Updated {clock}\nSensors: Light: {}, Temp: {}°C, Humidity: {}%\nActions: {}\nActive Rule Set: {active_rule_set}",
        sensors.light_level,
        sensors.temperature,
        sensors.humidity,
        describe_state(&document.action),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_batch() {
        assert_eq!(describe_actions(&[]), "No changes made.");
    }

    #[test]
    fn test_batch_description_deduplicates() {
        let actions = vec![
            ActionDelta::new(ActionType::Fan, "on"),
            ActionDelta::new(ActionType::FanSpeed, "50"),
            ActionDelta::new(ActionType::Fan, "on"),
        ];
        assert_eq!(
            describe_actions(&actions),
            "Turned on the fan, Set fan speed to 50%"
        );
    }

    #[test]
    fn test_unknown_only_batch() {
        let actions = vec![ActionDelta::new(ActionType::Unknown, "x")];
        assert_eq!(describe_actions(&actions), "No changes made");
    }

    #[test]
    fn test_status_text() {
        let text = status_text("10:00:00", &Document::default(), "fixed_rule");
        assert!(text.starts_with("Updated 10:00:00\n"));
        assert!(text.contains("Temp: 32°C"));
        assert!(text.contains("Fan: On, Speed: 100%, Light: Off, Brightness: 0%"));
        assert!(text.ends_with("Active Rule Set: fixed_rule"));
    }
}
