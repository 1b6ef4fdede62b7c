//! Data models for the comfort engine

use crate::error::EngineError;
use chrono::{DateTime, Utc};
use comfort_core::device::{LIGHT_LEVEL, MAX_LEVEL, TEMPERATURE};
use comfort_core::{Power, Resource};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Kind of change requested by an action delta
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Fan,
    Light,
    FanSpeed,
    Brightness,
    /// Explicit "do nothing"
    None,
    /// Switch the active rule set
    RuleSet,
    /// Cancel one scheduled action by id, or `"all"`
    CancelScheduled,
    /// Anything else; ignored by the applier
    #[serde(other)]
    Unknown,
}

/// One atomic requested change
///
/// `action_value` is kept as raw JSON because callers send levels both as
/// numbers and as numeric strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDelta {
    pub action_type: ActionType,
    #[serde(default)]
    pub action_value: serde_json::Value,
}

impl ActionDelta {
    pub fn new(action_type: ActionType, action_value: impl Into<serde_json::Value>) -> Self {
        Self {
            action_type,
            action_value: action_value.into(),
        }
    }

    /// The device change this delta maps to, if any
    ///
    /// Returns `None` for non-device types and for values that cannot be
    /// parsed.
    #[must_use]
    pub fn device_change(&self) -> Option<DeviceChange> {
        match self.action_type {
            ActionType::Fan => parse_power(&self.action_value).map(DeviceChange::Fan),
            ActionType::Light => parse_power(&self.action_value).map(DeviceChange::Light),
            ActionType::FanSpeed => parse_level(&self.action_value).map(DeviceChange::FanSpeed),
            ActionType::Brightness => {
                parse_level(&self.action_value).map(DeviceChange::Brightness)
            }
            _ => None,
        }
    }

    /// The action value as plain text (strings unquoted)
    #[must_use]
    pub fn value_text(&self) -> String {
        match &self.action_value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// A single device field change, already validated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceChange {
    Fan(Power),
    FanSpeed(u8),
    Light(Power),
    Brightness(u8),
}

impl DeviceChange {
    /// Sensor whose readings govern this device field
    #[must_use]
    pub fn governing_sensor(self) -> &'static str {
        match self {
            Self::Fan(_) | Self::FanSpeed(_) => TEMPERATURE,
            Self::Light(_) | Self::Brightness(_) => LIGHT_LEVEL,
        }
    }
}

/// Parse an on/off value (string or boolean)
#[must_use]
pub fn parse_power(value: &serde_json::Value) -> Option<Power> {
    match value {
        serde_json::Value::String(s) => Power::parse(s),
        serde_json::Value::Bool(true) => Some(Power::On),
        serde_json::Value::Bool(false) => Some(Power::Off),
        _ => None,
    }
}

/// Parse a 0..=100 level (number or numeric string), clamping out-of-range values
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_level(value: &serde_json::Value) -> Option<u8> {
    let raw = match value {
        serde_json::Value::Number(n) => n.as_f64()?,
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    if !raw.is_finite() {
        return None;
    }
    // clamped into 0..=100 so the cast cannot truncate
    Some(raw.round().clamp(0.0, f64::from(MAX_LEVEL)) as u8)
}

fn lenient_level<'de, D>(deserializer: D) -> Result<Option<u8>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_level))
}

fn lenient_power<'de, D>(deserializer: D) -> Result<Option<Power>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_power))
}

/// Partial device state: the fields a rule (or resolution) sets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPatch {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_power"
    )]
    pub fan: Option<Power>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_level"
    )]
    pub fan_speed: Option<u8>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_power"
    )]
    pub light: Option<Power>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient_level"
    )]
    pub set_brightness: Option<u8>,
}

impl ActionPatch {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fan.is_none()
            && self.fan_speed.is_none()
            && self.light.is_none()
            && self.set_brightness.is_none()
    }

    /// Overwrite the fields `other` sets, keep the rest
    pub fn overlay(&mut self, other: &ActionPatch) {
        if other.fan.is_some() {
            self.fan = other.fan;
        }
        if other.fan_speed.is_some() {
            self.fan_speed = other.fan_speed;
        }
        if other.light.is_some() {
            self.light = other.light;
        }
        if other.set_brightness.is_some() {
            self.set_brightness = other.set_brightness;
        }
    }

    /// The patch as device changes, in field order fan, fan_speed, light,
    /// set_brightness
    #[must_use]
    pub fn changes(&self) -> Vec<DeviceChange> {
        [
            self.fan.map(DeviceChange::Fan),
            self.fan_speed.map(DeviceChange::FanSpeed),
            self.light.map(DeviceChange::Light),
            self.set_brightness.map(DeviceChange::Brightness),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// A numeric rule bound
///
/// Non-numeric bounds are kept verbatim so a hand-edited rule file
/// round-trips, but a rule carrying one never matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Bound {
    Value(f64),
    Malformed(serde_json::Value),
}

impl From<f64> for Bound {
    fn from(value: f64) -> Self {
        Self::Value(value)
    }
}

/// A present bound, including an explicit `null`, which is malformed
fn present_bound<'de, D>(deserializer: D) -> Result<Option<Bound>, D::Error>
where
    D: Deserializer<'de>,
{
    Bound::deserialize(deserializer).map(Some)
}

/// A sensor rule: when the reading is in `[min, max]` (and the time of day
/// is in `time`, if set), apply `actions`
///
/// An entry of the rule file that cannot be read as a rule is kept as its
/// original JSON. It never matches and is written back unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule {
    pub label: String,
    pub min: Option<Bound>,
    pub max: Option<Bound>,
    /// Time-of-day range "HH:MM-HH:MM"; may wrap past midnight
    pub time: Option<String>,
    pub actions: ActionPatch,
    pub(crate) unreadable: Option<serde_json::Value>,
}

/// Wire form of a readable rule
#[derive(Serialize, Deserialize)]
struct RuleFields {
    #[serde(default)]
    label: String,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_bound"
    )]
    min: Option<Bound>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "present_bound"
    )]
    max: Option<Bound>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    time: Option<String>,
    #[serde(default)]
    actions: ActionPatch,
}

impl From<RuleFields> for Rule {
    fn from(fields: RuleFields) -> Self {
        Self {
            label: fields.label,
            min: fields.min,
            max: fields.max,
            time: fields.time,
            actions: fields.actions,
            unreadable: None,
        }
    }
}

impl Serialize for Rule {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if let Some(raw) = &self.unreadable {
            return raw.serialize(serializer);
        }
        RuleFields {
            label: self.label.clone(),
            min: self.min.clone(),
            max: self.max.clone(),
            time: self.time.clone(),
            actions: self.actions,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Rule {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = serde_json::Value::deserialize(deserializer)?;
        match RuleFields::deserialize(&raw) {
            Ok(fields) => Ok(fields.into()),
            Err(e) => {
                tracing::warn!("Keeping unreadable rule {} as inert: {}", raw, e);
                Ok(Rule::from_unreadable(raw))
            }
        }
    }
}

impl Rule {
    fn from_unreadable(raw: serde_json::Value) -> Self {
        let label = raw
            .get("label")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();
        Self {
            label,
            min: None,
            max: None,
            time: None,
            actions: ActionPatch::default(),
            unreadable: Some(raw),
        }
    }

    /// Whether the rule file entry could not be read as a rule
    #[must_use]
    pub fn is_unreadable(&self) -> bool {
        self.unreadable.is_some()
    }

    /// Numeric range of the rule; `None` when a bound is malformed or the
    /// rule is unreadable
    #[must_use]
    pub fn range(&self) -> Option<(f64, f64)> {
        if self.is_unreadable() {
            return None;
        }
        let bound = |b: &Option<Bound>, missing: f64| match b {
            None => Some(missing),
            Some(Bound::Value(v)) if !v.is_nan() => Some(*v),
            Some(_) => None,
        };
        Some((
            bound(&self.min, f64::NEG_INFINITY)?,
            bound(&self.max, f64::INFINITY)?,
        ))
    }

    /// Check whether a reading lies within the rule's range
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.range()
            .is_some_and(|(min, max)| min <= value && value <= max)
    }

    /// Time range, treating an empty string as "always"
    #[must_use]
    pub fn time_range(&self) -> Option<&str> {
        self.time.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Rules per sensor name, in priority order
pub type SensorRules = BTreeMap<String, Vec<Rule>>;

/// Read a rule collection sensor by sensor; a sensor whose entry is not a
/// list is dropped rather than failing the whole file
fn lenient_sensor_rules<'de, D>(deserializer: D) -> Result<SensorRules, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    let map = match value {
        Some(serde_json::Value::Object(map)) => map,
        None => return Ok(SensorRules::new()),
        Some(other) => {
            tracing::warn!("Ignoring rule collection that is not an object: {}", other);
            return Ok(SensorRules::new());
        }
    };

    let mut rules = SensorRules::new();
    for (sensor, entries) in map {
        match Vec::<Rule>::deserialize(entries) {
            Ok(list) => {
                rules.insert(sensor, list);
            }
            Err(e) => tracing::warn!("Ignoring rules for sensor {}: {}", sensor, e),
        }
    }
    Ok(rules)
}

/// Name of a rule collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSetName {
    #[default]
    FixedRule,
    UserPreference,
}

impl RuleSetName {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FixedRule => "fixed_rule",
            Self::UserPreference => "user_preference",
        }
    }

    /// Human-readable name
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::FixedRule => "Fixed Rules",
            Self::UserPreference => "User Preferences",
        }
    }
}

impl fmt::Display for RuleSetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RuleSetName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fixed_rule" | "fixed" => Ok(Self::FixedRule),
            "user_preference" | "user" => Ok(Self::UserPreference),
            other => Err(EngineError::InvalidRuleSet(other.to_string())),
        }
    }
}

/// Both rule collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default, deserialize_with = "lenient_sensor_rules")]
    pub fixed_rule: SensorRules,
    #[serde(default, deserialize_with = "lenient_sensor_rules")]
    pub user_preference: SensorRules,
}

impl RuleSet {
    #[must_use]
    pub fn get(&self, name: RuleSetName) -> &SensorRules {
        match name {
            RuleSetName::FixedRule => &self.fixed_rule,
            RuleSetName::UserPreference => &self.user_preference,
        }
    }

    pub fn get_mut(&mut self, name: RuleSetName) -> &mut SensorRules {
        match name {
            RuleSetName::FixedRule => &mut self.fixed_rule,
            RuleSetName::UserPreference => &mut self.user_preference,
        }
    }

    /// Replace the user preferences with a copy of the fixed rules
    pub fn reset_preferences(&mut self) {
        self.user_preference = self.fixed_rule.clone();
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        let fixed_rule = default_fixed_rules();
        Self {
            user_preference: fixed_rule.clone(),
            fixed_rule,
        }
    }
}

impl Resource for RuleSet {
    const FILE_NAME: &'static str = "rule.json";
}

fn fan_rule(label: &str, min: Option<f64>, power: Power, speed: u8) -> Rule {
    Rule {
        label: label.to_string(),
        min: min.map(Bound::from),
        max: None,
        time: None,
        actions: ActionPatch {
            fan: Some(power),
            fan_speed: Some(speed),
            ..ActionPatch::default()
        },
        unreadable: None,
    }
}

fn light_rule(label: &str, max: Option<f64>, time: Option<&str>, power: Power, level: u8) -> Rule {
    Rule {
        label: label.to_string(),
        min: None,
        max: max.map(Bound::from),
        time: time.map(str::to_string),
        actions: ActionPatch {
            light: Some(power),
            set_brightness: Some(level),
            ..ActionPatch::default()
        },
        unreadable: None,
    }
}

/// Built-in fixed rules, used when no rule file exists
fn default_fixed_rules() -> SensorRules {
    let mut rules = SensorRules::new();
    rules.insert(
        TEMPERATURE.to_string(),
        vec![
            fan_rule("hot", Some(30.0), Power::On, 100),
            fan_rule("warm", Some(26.0), Power::On, 60),
            fan_rule("mild", Some(22.0), Power::On, 30),
            fan_rule("cool", None, Power::Off, 0),
        ],
    );
    rules.insert(
        LIGHT_LEVEL.to_string(),
        vec![
            light_rule("dark_night", Some(30.0), Some("18:01-05:59"), Power::On, 80),
            light_rule("dark_day", Some(30.0), Some("06:00-18:00"), Power::On, 50),
            light_rule("dim", Some(60.0), None, Power::On, 30),
            light_rule("bright", None, None, Power::Off, 0),
        ],
    );
    rules
}

/// Which rule collection drives automatic resolution
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveConfig {
    #[serde(default)]
    pub active_rule_set: RuleSetName,
}

impl Resource for ActiveConfig {
    const FILE_NAME: &'static str = "config.json";
}

/// How a scheduled action's due time was given
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleKind {
    Delay,
    AbsoluteTime,
}

/// An action batch waiting for its due time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledAction {
    /// Unique identifier
    pub id: String,
    pub actions: Vec<ActionDelta>,
    /// Earliest instant the batch may fire
    pub due_at: DateTime<Utc>,
    /// Natural-language summary of `actions`
    pub description: String,
    pub schedule_kind: ScheduleKind,
    /// The "HH:MM" the user asked for (absolute-time schedules)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_time_label: Option<String>,
    /// The requested delay (delay schedules)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<u64>,
}

impl ScheduledAction {
    /// When the action runs, as shown to the user
    #[must_use]
    pub fn display_time(&self) -> String {
        match (&self.schedule_time_label, self.delay_seconds) {
            (Some(label), _) => label.clone(),
            (None, Some(seconds)) => format!("after {seconds} seconds"),
            (None, None) => self.due_at.to_rfc3339(),
        }
    }

    #[must_use]
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at
    }
}

/// Persisted queue of scheduled actions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchedulerQueue {
    #[serde(default)]
    pub scheduled_actions: Vec<ScheduledAction>,
}

impl SchedulerQueue {
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.scheduled_actions.iter().any(|a| a.id == id)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ScheduledAction> {
        self.scheduled_actions.iter().find(|a| a.id == id)
    }

    /// Append an entry unless its id is taken; returns whether it was added
    pub fn insert(&mut self, action: ScheduledAction) -> bool {
        if self.contains(&action.id) {
            return false;
        }
        self.scheduled_actions.push(action);
        true
    }

    pub fn remove(&mut self, id: &str) -> Option<ScheduledAction> {
        let index = self.scheduled_actions.iter().position(|a| a.id == id)?;
        Some(self.scheduled_actions.remove(index))
    }
}

impl Resource for SchedulerQueue {
    const FILE_NAME: &'static str = "scheduler.json";
}

/// When a batch should run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleRequest {
    /// Run after this many seconds
    DelaySeconds(u64),
    /// Run at the next local occurrence of "HH:MM"
    AbsoluteTime(String),
}

/// Structured intent handed over by the chat/LLM side
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub actions: Vec<ActionDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleRequest>,
}

impl Intent {
    /// Apply `actions` right away
    #[must_use]
    pub fn immediate(actions: Vec<ActionDelta>) -> Self {
        Self {
            actions,
            schedule: None,
        }
    }

    #[must_use]
    pub fn scheduled(actions: Vec<ActionDelta>, schedule: ScheduleRequest) -> Self {
        Self {
            actions,
            schedule: Some(schedule),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_action_type_deserializes() {
        let delta: ActionDelta =
            serde_json::from_value(json!({"action_type": "thermostat", "action_value": "21"}))
                .unwrap();
        assert_eq!(delta.action_type, ActionType::Unknown);
        assert_eq!(delta.device_change(), None);
    }

    #[test]
    fn test_level_parsing() {
        assert_eq!(parse_level(&json!("50")), Some(50));
        assert_eq!(parse_level(&json!(75)), Some(75));
        assert_eq!(parse_level(&json!(250)), Some(100));
        assert_eq!(parse_level(&json!(-3)), Some(0));
        assert_eq!(parse_level(&json!("fast")), None);
    }

    #[test]
    fn test_device_change_from_delta() {
        let delta = ActionDelta::new(ActionType::FanSpeed, "40");
        assert_eq!(delta.device_change(), Some(DeviceChange::FanSpeed(40)));
        let delta = ActionDelta::new(ActionType::Light, "OFF");
        assert_eq!(delta.device_change(), Some(DeviceChange::Light(Power::Off)));
        let delta = ActionDelta::new(ActionType::RuleSet, "user_preference");
        assert_eq!(delta.device_change(), None);
    }

    #[test]
    fn test_malformed_bound_never_matches() {
        let rule: Rule = serde_json::from_value(json!({
            "label": "broken",
            "min": "cold",
            "max": 30,
            "actions": {"fan": "off"}
        }))
        .unwrap();
        assert_eq!(rule.range(), None);
        assert!(!rule.contains(10.0));
        // round-trips verbatim
        assert_eq!(serde_json::to_value(&rule).unwrap()["min"], "cold");
    }

    #[test]
    fn test_missing_bounds_are_unbounded() {
        let rule: Rule = serde_json::from_value(json!({"label": "any"})).unwrap();
        assert!(rule.contains(-1000.0));
        assert!(rule.contains(1000.0));
    }

    #[test]
    fn test_null_bound_never_matches() {
        let rule: Rule =
            serde_json::from_value(json!({"label": "nulled", "min": null, "max": 10})).unwrap();
        assert_eq!(rule.range(), None);
        assert!(!rule.contains(5.0));
        assert_eq!(
            serde_json::to_value(&rule).unwrap(),
            json!({"label": "nulled", "min": null, "max": 10.0, "actions": {}})
        );
    }

    #[test]
    fn test_unreadable_rule_is_kept_but_inert() {
        let raw = json!({"label": "odd", "time": 5, "actions": {"fan": "on"}});
        let rule: Rule = serde_json::from_value(raw.clone()).unwrap();
        assert!(rule.is_unreadable());
        assert_eq!(rule.label, "odd");
        assert!(!rule.contains(20.0));
        assert_eq!(serde_json::to_value(&rule).unwrap(), raw);
    }

    #[test]
    fn test_one_bad_rule_keeps_the_rest_of_the_file() {
        let rules: RuleSet = serde_json::from_value(json!({
            "fixed_rule": {
                "temperature": [{"label": "only_fixed", "min": 0, "actions": {"fan": "ON"}}]
            },
            "user_preference": {
                "temperature": [
                    {"label": "keep_me", "min": 20, "max": 30, "actions": {"fan_speed": 40}},
                    {"time": 5},
                    {"max": 10, "actions": {"fan": "off"}}
                ],
                "humidity": "not a list"
            }
        }))
        .unwrap();

        assert_eq!(rules.fixed_rule[TEMPERATURE][0].label, "only_fixed");
        assert_eq!(rules.fixed_rule[TEMPERATURE][0].actions.fan, Some(Power::On));
        assert_ne!(rules.fixed_rule, RuleSet::default().fixed_rule);

        let prefs = &rules.user_preference[TEMPERATURE];
        assert_eq!(prefs.len(), 3);
        assert_eq!(prefs[0].label, "keep_me");
        assert!(prefs[1].is_unreadable());
        // a missing label is not a reason to drop the rule
        assert_eq!(prefs[2].label, "");
        assert!(prefs[2].contains(5.0));
        assert!(!rules.user_preference.contains_key("humidity"));

        let written = serde_json::to_value(&rules).unwrap();
        assert_eq!(written["user_preference"]["temperature"][1], json!({"time": 5}));
    }

    #[test]
    fn test_patch_accepts_string_levels() {
        let patch: ActionPatch =
            serde_json::from_value(json!({"fan": "on", "fan_speed": "70"})).unwrap();
        assert_eq!(patch.fan_speed, Some(70));
        assert_eq!(patch.light, None);
    }

    #[test]
    fn test_rule_set_wire_names() {
        let config = ActiveConfig {
            active_rule_set: RuleSetName::UserPreference,
        };
        assert_eq!(
            serde_json::to_value(config).unwrap(),
            json!({"active_rule_set": "user_preference"})
        );
        assert!("bogus".parse::<RuleSetName>().is_err());
    }

    #[test]
    fn test_default_rule_set_copies_fixed_into_preferences() {
        let rules = RuleSet::default();
        assert_eq!(rules.fixed_rule, rules.user_preference);
        assert!(rules.fixed_rule.contains_key(TEMPERATURE));
    }

    #[test]
    fn test_queue_rejects_duplicate_ids() {
        let action = ScheduledAction {
            id: "a".into(),
            actions: vec![],
            due_at: Utc::now(),
            description: String::new(),
            schedule_kind: ScheduleKind::Delay,
            schedule_time_label: None,
            delay_seconds: Some(0),
        };
        let mut queue = SchedulerQueue::default();
        assert!(queue.insert(action.clone()));
        assert!(!queue.insert(action));
        assert_eq!(queue.scheduled_actions.len(), 1);
    }

    #[test]
    fn test_schedule_request_wire_format() {
        let intent: Intent = serde_json::from_value(json!({
            "actions": [{"action_type": "fan", "action_value": "on"}],
            "schedule": {"absolute_time": "14:30"}
        }))
        .unwrap();
        assert_eq!(
            intent.schedule,
            Some(ScheduleRequest::AbsoluteTime("14:30".into()))
        );
    }
}
