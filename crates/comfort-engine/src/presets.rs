//! Named action batches offered to the user

use crate::error::EngineError;
use crate::model::{ActionDelta, ActionType};

/// Names of the predefined batches, in display order
pub const PRESET_NAMES: [&str; 6] = [
    "Turn on everything",
    "Turn off everything",
    "Turn on the fan",
    "Turn off the fan",
    "Turn on the light",
    "Turn off the light",
];

fn batch(items: &[(ActionType, &str)]) -> Vec<ActionDelta> {
    items
        .iter()
        .map(|(kind, value)| ActionDelta::new(*kind, *value))
        .collect()
}

/// Look up a preset by name (case-insensitive)
pub fn preset(name: &str) -> Result<Vec<ActionDelta>, EngineError> {
    use ActionType::{Brightness, Fan, FanSpeed, Light};

    let actions = match name.trim().to_ascii_lowercase().as_str() {
        "turn on everything" => batch(&[
            (Fan, "on"),
            (FanSpeed, "100"),
            (Light, "on"),
            (Brightness, "100"),
        ]),
        "turn off everything" => batch(&[
            (Fan, "off"),
            (FanSpeed, "0"),
            (Light, "off"),
            (Brightness, "0"),
        ]),
        "turn on the fan" => batch(&[(Fan, "on"), (FanSpeed, "50")]),
        "turn off the fan" => batch(&[(Fan, "off"), (FanSpeed, "0")]),
        "turn on the light" => batch(&[(Light, "on"), (Brightness, "50")]),
        "turn off the light" => batch(&[(Light, "off"), (Brightness, "0")]),
        _ => return Err(EngineError::UnknownPreset(name.to_string())),
    };
    Ok(actions)
}

/// Every preset with its actions
#[must_use]
pub fn all_presets() -> Vec<(&'static str, Vec<ActionDelta>)> {
    PRESET_NAMES
        .iter()
        .filter_map(|name| preset(name).ok().map(|actions| (*name, actions)))
        .collect()
}
