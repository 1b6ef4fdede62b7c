//! Action applier: turns requested changes into a consistent device state

use crate::model::{ActionDelta, ActionPatch, DeviceChange};
use comfort_core::{DeviceState, Power};

/// Apply one change to a device state, enforcing the on/off-level invariants
pub fn apply_change(state: &mut DeviceState, change: DeviceChange) {
    match change {
        DeviceChange::Fan(power) => {
            state.fan = power;
            if power == Power::Off {
                state.fan_speed = 0;
            }
        }
        DeviceChange::FanSpeed(level) => {
            state.fan_speed = level;
            if level > 0 {
                state.fan = Power::On;
            }
        }
        DeviceChange::Light(power) => {
            state.light = power;
            if power == Power::Off {
                state.set_brightness = 0;
            }
        }
        DeviceChange::Brightness(level) => {
            state.set_brightness = level;
            if level > 0 {
                state.light = Power::On;
            }
        }
    }
}

/// Apply an action batch in order and return the resulting state
///
/// Non-device deltas (rule set switches, cancellations, `none`, unknown
/// types) and unparseable values leave the state untouched.
#[must_use]
pub fn apply(current: &DeviceState, deltas: &[ActionDelta]) -> DeviceState {
    let mut state = *current;
    for delta in deltas {
        match delta.device_change() {
            Some(change) => apply_change(&mut state, change),
            None => tracing::trace!("Ignoring {:?} for device state", delta.action_type),
        }
    }
    state
}

/// Merge a resolved patch into the current state
///
/// Only fields set in the patch change. Fields are applied in the order
/// fan, fan_speed, light, set_brightness with the same invariants as
/// [`apply`], so a patch of just `fan: on` keeps the current speed.
#[must_use]
pub fn merge(current: &DeviceState, patch: &ActionPatch) -> DeviceState {
    let mut state = *current;
    for change in patch.changes() {
        apply_change(&mut state, change);
    }
    state
}

/// Apply one change to a partial state with the same invariants
pub fn apply_change_to_patch(patch: &mut ActionPatch, change: DeviceChange) {
    match change {
        DeviceChange::Fan(power) => {
            patch.fan = Some(power);
            if power == Power::Off {
                patch.fan_speed = Some(0);
            }
        }
        DeviceChange::FanSpeed(level) => {
            patch.fan_speed = Some(level);
            if level > 0 {
                patch.fan = Some(Power::On);
            }
        }
        DeviceChange::Light(power) => {
            patch.light = Some(power);
            if power == Power::Off {
                patch.set_brightness = Some(0);
            }
        }
        DeviceChange::Brightness(level) => {
            patch.set_brightness = Some(level);
            if level > 0 {
                patch.light = Some(Power::On);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ActionType;

    fn state(fan: Power, fan_speed: u8, light: Power, set_brightness: u8) -> DeviceState {
        DeviceState {
            fan,
            fan_speed,
            light,
            set_brightness,
        }
    }

    #[test]
    fn test_fan_off_zeroes_speed() {
        let current = state(Power::On, 80, Power::Off, 0);
        let next = apply(&current, &[ActionDelta::new(ActionType::Fan, "off")]);
        assert_eq!(next.fan, Power::Off);
        assert_eq!(next.fan_speed, 0);
    }

    #[test]
    fn test_speed_turns_fan_on() {
        let current = state(Power::Off, 0, Power::Off, 0);
        let next = apply(&current, &[ActionDelta::new(ActionType::FanSpeed, "35")]);
        assert_eq!(next, state(Power::On, 35, Power::Off, 0));
    }

    #[test]
    fn test_brightness_and_light_invariants() {
        let current = state(Power::Off, 0, Power::On, 60);
        let next = apply(&current, &[ActionDelta::new(ActionType::Light, "off")]);
        assert_eq!(next.set_brightness, 0);

        let next = apply(&next, &[ActionDelta::new(ActionType::Brightness, 20)]);
        assert_eq!(next.light, Power::On);
        assert_eq!(next.set_brightness, 20);
    }

    #[test]
    fn test_deltas_apply_in_order() {
        let current = state(Power::Off, 0, Power::Off, 0);
        let next = apply(
            &current,
            &[
                ActionDelta::new(ActionType::FanSpeed, "70"),
                ActionDelta::new(ActionType::Fan, "off"),
            ],
        );
        assert_eq!(next, state(Power::Off, 0, Power::Off, 0));
    }

    #[test]
    fn test_unknown_and_invalid_deltas_are_ignored() {
        let current = state(Power::On, 50, Power::On, 50);
        let next = apply(
            &current,
            &[
                ActionDelta::new(ActionType::Unknown, "boom"),
                ActionDelta::new(ActionType::None, "none"),
                ActionDelta::new(ActionType::FanSpeed, "fast"),
                ActionDelta::new(ActionType::RuleSet, "user_preference"),
            ],
        );
        assert_eq!(next, current);
    }

    #[test]
    fn test_invariants_hold_for_every_batch() {
        let values = ["on", "off", "0", "1", "50", "100"];
        let kinds = [
            ActionType::Fan,
            ActionType::FanSpeed,
            ActionType::Light,
            ActionType::Brightness,
        ];
        let start = DeviceState::default();
        for kind_a in kinds {
            for kind_b in kinds {
                for value_a in values {
                    for value_b in values {
                        let next = apply(
                            &start,
                            &[
                                ActionDelta::new(kind_a, value_a),
                                ActionDelta::new(kind_b, value_b),
                            ],
                        );
                        assert!(next.is_consistent(), "{next:?}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_merge_only_touches_patched_fields() {
        let current = state(Power::Off, 0, Power::On, 80);
        let patch = ActionPatch {
            fan: Some(Power::On),
            ..ActionPatch::default()
        };
        assert_eq!(merge(&current, &patch), state(Power::On, 0, Power::On, 80));
    }

    #[test]
    fn test_merge_enforces_invariants() {
        let current = state(Power::On, 90, Power::On, 80);
        let patch = ActionPatch {
            light: Some(Power::Off),
            ..ActionPatch::default()
        };
        let merged = merge(&current, &patch);
        assert_eq!(merged, state(Power::On, 90, Power::Off, 0));
    }

    #[test]
    fn test_patch_changes_mirror_state_invariants() {
        let mut patch = ActionPatch::default();
        apply_change_to_patch(&mut patch, DeviceChange::Brightness(40));
        assert_eq!(patch.light, Some(Power::On));
        apply_change_to_patch(&mut patch, DeviceChange::Fan(Power::Off));
        assert_eq!(patch.fan_speed, Some(0));
    }
}
