//! Rule resolution against sensor readings and time of day

use crate::error::EngineError;
use crate::model::{ActionPatch, Rule, RuleSet, RuleSetName};
use chrono::{NaiveTime, Timelike};
use comfort_core::SensorReading;

/// Parse a time string in HH:MM format
pub fn parse_time(s: &str) -> Result<NaiveTime, EngineError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M")
        .map_err(|_| EngineError::InvalidTimeFormat(s.to_string()))
}

/// Parse a "HH:MM-HH:MM" range into its endpoints
pub fn parse_time_range(range: &str) -> Result<(NaiveTime, NaiveTime), EngineError> {
    let (start, end) = range
        .split_once('-')
        .ok_or_else(|| EngineError::InvalidTimeFormat(range.to_string()))?;
    Ok((parse_time(start)?, parse_time(end)?))
}

/// Drop seconds and sub-seconds; ranges are written to the minute
#[must_use]
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// Check whether `now` falls inside a time range, both ends inclusive
///
/// Comparison happens at minute granularity, so the whole of the end
/// minute is inside the range. A malformed range contains nothing.
#[must_use]
pub fn time_range_contains(range: &str, now: NaiveTime) -> bool {
    let now = truncate_to_minute(now);
    let Ok((start, end)) = parse_time_range(range) else {
        tracing::trace!("Skipping malformed time range {:?}", range);
        return false;
    };

    // Handle wrap-around (e.g., 22:00 to 06:00)
    if start <= end {
        now >= start && now <= end
    } else {
        now >= start || now <= end
    }
}

/// String form of [`time_range_contains`]; an empty range always matches
#[must_use]
pub fn is_time_in_range(range: &str, current: &str) -> bool {
    if range.trim().is_empty() {
        return true;
    }
    match parse_time(current) {
        Ok(now) => time_range_contains(range, now),
        Err(_) => false,
    }
}

/// Check a single rule against a reading and the time of day
#[must_use]
pub fn rule_matches(rule: &Rule, value: f64, now: NaiveTime) -> bool {
    rule.contains(value) && rule.time_range().map_or(true, |r| time_range_contains(r, now))
}

/// First rule in list order that matches
#[must_use]
pub fn first_match(rules: &[Rule], value: f64, now: NaiveTime) -> Option<&Rule> {
    rules.iter().find(|rule| rule_matches(rule, value, now))
}

/// Resolve the device actions the active rule set asks for
///
/// Sensors are visited in [`SensorReading::readings`] order and each one
/// contributes the actions of its first matching rule; a later sensor
/// overwrites fields set by an earlier one.
#[must_use]
pub fn resolve(
    sensors: &SensorReading,
    rules: &RuleSet,
    active: RuleSetName,
    now: NaiveTime,
) -> ActionPatch {
    let active_rules = rules.get(active);
    let mut resolved = ActionPatch::default();

    for (sensor, value) in sensors.readings() {
        let Some(sensor_rules) = active_rules.get(sensor) else {
            continue;
        };
        if let Some(rule) = first_match(sensor_rules, value, now) {
            tracing::trace!("Sensor {} = {} matched rule {}", sensor, value, rule.label);
            resolved.overlay(&rule.actions);
        }
    }

    resolved
}
