//! Property tests for the speed curve and the start/stop state machine.

use fan_common::{
    ControllerState, CurveConfig, EngineAction, FanEngine, NightConfig, RuntimeConfig,
    SpeedPercent, SpeedPolicy,
};
use proptest::prelude::*;

fn policy() -> SpeedPolicy {
    SpeedPolicy::new(CurveConfig::default(), NightConfig::default())
}

fn speed() -> impl Strategy<Value = SpeedPercent> {
    (0u8..=100u8).prop_map(SpeedPercent::new)
}

proptest! {
    #[test]
    fn at_or_below_stop_point_is_always_stopped(
        temp in -40.0f32..=41.0f32,
        last in speed(),
    ) {
        prop_assert_eq!(policy().compute_raw_speed(temp, last), SpeedPercent::STOPPED);
    }

    #[test]
    fn at_or_above_max_is_always_full(
        temp in 70.0f32..=150.0f32,
        last in speed(),
    ) {
        prop_assert_eq!(policy().compute_raw_speed(temp, last), SpeedPercent::FULL);
    }

    #[test]
    fn small_changes_inside_the_curve_hold_last_speed(
        temp in 45.1f32..69.9f32,
        last in speed(),
    ) {
        let policy = policy();
        // Reference value with no history to compare against.
        let raw = {
            let curve = policy.curve();
            let ratio = (temp - curve.t_start_c) / (curve.t_max_c - curve.t_start_c);
            let min = f32::from(curve.min_speed);
            SpeedPercent::from_curve(min + ratio * (100.0 - min))
        };
        let result = policy.compute_raw_speed(temp, last);

        if raw.abs_diff(last) < policy.curve().change_deadband {
            prop_assert_eq!(result, last);
        } else {
            prop_assert_eq!(result, raw);
        }
    }

    #[test]
    fn result_is_always_a_valid_percent(
        temp in proptest::num::f32::ANY,
        last in speed(),
        hour in 0u32..24,
    ) {
        prop_assert!(policy().final_speed(temp, last, hour).get() <= 100);
    }

    #[test]
    fn night_cap_is_idempotent(value in speed(), hour in 0u32..24) {
        let policy = policy();
        let once = policy.apply_night_cap(value, hour);
        prop_assert_eq!(policy.apply_night_cap(once, hour), once);
    }

    #[test]
    fn boost_never_fires_twice_without_a_stop(
        temps in proptest::collection::vec(45.0f32..90.0f32, 1..40),
        hour in 0u32..24,
    ) {
        let mut engine = FanEngine::from_config(&RuntimeConfig::default(), ControllerState::default());
        let mut boosts = 0;

        for temp in temps {
            for action in engine.plan(temp, hour) {
                match action {
                    EngineAction::Boost { .. } => {
                        boosts += 1;
                        engine.record_boost();
                    }
                    EngineAction::SetSpeed(speed) => {
                        engine.record_applied(speed);
                        engine.record_persisted();
                    }
                }
            }
        }

        // From 45°C up the curve never returns 0, so there is a single
        // Stopped -> Running edge at most.
        prop_assert!(boosts <= 1);
    }

    #[test]
    fn restored_running_fan_never_boosts(
        restored in 1u8..=100u8,
        temps in proptest::collection::vec(45.0f32..90.0f32, 1..20),
        hour in 0u32..24,
    ) {
        let mut engine = FanEngine::from_config(
            &RuntimeConfig::default(),
            ControllerState::new(SpeedPercent::new(restored)),
        );

        for temp in temps {
            let actions = engine.plan(temp, hour);
            let boosted = actions.iter().any(|action| matches!(action, EngineAction::Boost { .. }));
            prop_assert!(!boosted);
            for action in actions {
                if let EngineAction::SetSpeed(speed) = action {
                    engine.record_applied(speed);
                    engine.record_persisted();
                }
            }
        }
    }
}
