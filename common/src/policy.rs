use crate::{
    config::{CurveConfig, NightConfig},
    types::{DutyCycle, SpeedPercent},
};

/// Maps temperature readings to fan speeds. Holds no state besides its
/// configuration; every input arrives as an argument.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeedPolicy {
    curve: CurveConfig,
    night: NightConfig,
}

impl SpeedPolicy {
    pub fn new(curve: CurveConfig, night: NightConfig) -> Self {
        Self { curve, night }
    }

    pub fn curve(&self) -> &CurveConfig {
        &self.curve
    }

    /// Curve speed for `temp_c`, sticky to `last_speed` inside the change
    /// deadband. The stop and full-speed branches ignore `last_speed`.
    pub fn compute_raw_speed(&self, temp_c: f32, last_speed: SpeedPercent) -> SpeedPercent {
        let curve = &self.curve;

        if temp_c <= curve.stop_temp_c() {
            return SpeedPercent::STOPPED;
        }
        if temp_c >= curve.t_max_c {
            return SpeedPercent::FULL;
        }

        // Negative between t_min and t_start; the clamp takes care of it.
        let ratio = (temp_c - curve.t_start_c) / (curve.t_max_c - curve.t_start_c);
        let min_speed = f32::from(curve.min_speed);
        let raw = SpeedPercent::from_curve(min_speed + ratio * (100.0 - min_speed));

        if raw.abs_diff(last_speed) < curve.change_deadband {
            return last_speed;
        }
        raw
    }

    /// Caps `speed` at the night ceiling during quiet hours.
    pub fn apply_night_cap(&self, speed: SpeedPercent, hour: u32) -> SpeedPercent {
        if self.night.contains(hour) {
            speed.min(self.night.cap())
        } else {
            speed
        }
    }

    pub fn final_speed(&self, temp_c: f32, last_speed: SpeedPercent, hour: u32) -> SpeedPercent {
        self.apply_night_cap(self.compute_raw_speed(temp_c, last_speed), hour)
    }

    /// Output duty for a commanded speed. Anything below the minimum speed
    /// cannot reliably spin the fan, so it is driven to zero.
    pub fn duty_for(&self, speed: SpeedPercent) -> DutyCycle {
        if speed < self.curve.min_speed() {
            DutyCycle::OFF
        } else {
            DutyCycle::from_percent(speed)
        }
    }
}

impl Default for SpeedPolicy {
    fn default() -> Self {
        Self::new(CurveConfig::default(), NightConfig::default())
    }
}
