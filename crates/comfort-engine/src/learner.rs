//! Preference learning from explicit user actions
//!
//! Every accepted device change is recorded as a `user_preference` rule for
//! the sensor that governs the device, pinned to the current reading and
//! scoped to a time band. Repeating the same change under the same
//! conditions updates that rule instead of adding another one.

use crate::evaluator::{parse_time, parse_time_range, time_range_contains};
use crate::executor::apply_change_to_patch;
use crate::model::{ActionDelta, ActionPatch, Bound, Rule, SensorRules};
use chrono::NaiveTime;
use comfort_core::SensorReading;

/// Daytime band
pub const DAY_BAND: &str = "06:00-18:00";
/// Night band, the complement of [`DAY_BAND`]
pub const NIGHT_BAND: &str = "18:01-05:59";

/// Day or night band for a time of day
#[must_use]
pub fn day_night_band(now: NaiveTime) -> &'static str {
    if time_range_contains(DAY_BAND, now) {
        DAY_BAND
    } else {
        NIGHT_BAND
    }
}

/// Band a learned rule is scoped to
///
/// A schedule label "HH:MM" becomes the one-minute band "HH:MM-HH:MM"; a
/// label that is already a range is used as is. Anything else falls back
/// to the day/night split.
#[must_use]
pub fn time_band(now: NaiveTime, schedule_label: Option<&str>) -> String {
    if let Some(label) = schedule_label.map(str::trim) {
        if parse_time(label).is_ok() {
            return format!("{label}-{label}");
        }
        if parse_time_range(label).is_ok() {
            return label.to_string();
        }
        tracing::debug!("Ignoring unusable schedule label {:?}", label);
    }
    day_night_band(now).to_string()
}

fn rule_label(sensor: &str, value: f64, band: &str) -> String {
    format!("{sensor}_{value}_{}", band.replace(':', ""))
}

fn find_or_create<'a>(rules: &'a mut Vec<Rule>, sensor: &str, value: f64, band: &str) -> &'a mut Rule {
    let existing = rules
        .iter()
        .position(|rule| rule.contains(value) && rule.time_range().map_or(true, |t| t == band));

    let index = match existing {
        Some(index) => index,
        None => {
            let label = rule_label(sensor, value, band);
            tracing::info!("Learning new preference rule {}", label);
            rules.push(Rule {
                label,
                min: Some(Bound::Value(value)),
                max: Some(Bound::Value(value)),
                time: Some(band.to_string()),
                actions: ActionPatch::default(),
                unreadable: None,
            });
            rules.len() - 1
        }
    };
    &mut rules[index]
}

/// Record an accepted batch into the preference rules
///
/// Returns the labels of the rules that were created or updated.
pub fn learn(
    preferences: &mut SensorRules,
    sensors: &SensorReading,
    deltas: &[ActionDelta],
    band: &str,
) -> Vec<String> {
    let mut touched: Vec<String> = Vec::new();

    for change in deltas.iter().filter_map(ActionDelta::device_change) {
        let sensor = change.governing_sensor();
        let Some(value) = sensors.value(sensor) else {
            continue;
        };

        let rules = preferences.entry(sensor.to_string()).or_default();
        let rule = find_or_create(rules, sensor, value, band);
        apply_change_to_patch(&mut rule.actions, change);

        if !touched.contains(&rule.label) {
            touched.push(rule.label.clone());
        }
    }

    touched
}
