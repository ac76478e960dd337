use serde::{Deserialize, Serialize};

use crate::types::SpeedPercent;

/// Temperature curve thresholds, in °C and percent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CurveConfig {
    pub t_min_c: f32,
    pub t_start_c: f32,
    pub t_max_c: f32,
    pub hysteresis_c: f32,
    pub min_speed: u8,
    pub change_deadband: u8,
}

impl Default for CurveConfig {
    fn default() -> Self {
        Self {
            t_min_c: 45.0,
            t_start_c: 50.0,
            t_max_c: 70.0,
            hysteresis_c: 4.0,
            min_speed: 22,
            change_deadband: 5,
        }
    }
}

impl CurveConfig {
    /// Temperature at or below which the fan is stopped.
    pub fn stop_temp_c(&self) -> f32 {
        self.t_min_c - self.hysteresis_c
    }

    pub fn min_speed(&self) -> SpeedPercent {
        SpeedPercent::new(self.min_speed)
    }

    pub fn sanitize(&mut self) {
        let defaults = Self::default();
        if !self.t_min_c.is_finite() {
            self.t_min_c = defaults.t_min_c;
        }
        if !self.t_start_c.is_finite() {
            self.t_start_c = defaults.t_start_c;
        }
        if !self.t_max_c.is_finite() {
            self.t_max_c = defaults.t_max_c;
        }
        if !self.hysteresis_c.is_finite() {
            self.hysteresis_c = defaults.hysteresis_c;
        }

        self.hysteresis_c = self.hysteresis_c.clamp(0.0, 20.0);
        // Interpolation divides by (t_max - t_start).
        if self.t_max_c <= self.t_start_c {
            self.t_max_c = self.t_start_c + 1.0;
        }
        self.min_speed = self.min_speed.min(100);
        self.change_deadband = self.change_deadband.min(100);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BoostConfig {
    pub speed: u8,
    pub duration_ms: u64,
}

impl Default for BoostConfig {
    fn default() -> Self {
        Self {
            speed: 40,
            duration_ms: 800,
        }
    }
}

impl BoostConfig {
    pub fn speed(&self) -> SpeedPercent {
        SpeedPercent::new(self.speed)
    }

    pub fn sanitize(&mut self) {
        self.speed = self.speed.min(100);
        self.duration_ms = self.duration_ms.min(10_000);
    }
}

/// Quiet hours: `[start_hour, end_hour)` in local time, wrapping past midnight
/// when `start_hour > end_hour`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NightConfig {
    pub enabled: bool,
    pub cap: u8,
    pub start_hour: u32,
    pub end_hour: u32,
}

impl Default for NightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cap: 50,
            start_hour: 23,
            end_hour: 7,
        }
    }
}

impl NightConfig {
    pub fn cap(&self) -> SpeedPercent {
        SpeedPercent::new(self.cap)
    }

    pub fn contains(&self, hour: u32) -> bool {
        if !self.enabled {
            return false;
        }
        let hour = hour % 24;
        if self.start_hour <= self.end_hour {
            (self.start_hour..self.end_hour).contains(&hour)
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }

    pub fn sanitize(&mut self) {
        self.cap = self.cap.min(100);
        self.start_hour %= 24;
        self.end_hour %= 24;
    }
}

/// Output stage: which PWM line, at what switching frequency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PwmConfig {
    pub chip: u32,
    pub channel: u32,
    pub frequency_hz: u32,
    pub dry_run: bool,
}

impl Default for PwmConfig {
    fn default() -> Self {
        Self {
            chip: 0,
            channel: 0,
            frequency_hz: 25_000,
            dry_run: false,
        }
    }
}

impl PwmConfig {
    pub fn sanitize(&mut self) {
        self.frequency_hz = self.frequency_hz.clamp(1, 1_000_000);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub curve: CurveConfig,
    pub boost: BoostConfig,
    pub night: NightConfig,
    pub pwm: PwmConfig,
    pub poll_interval_ms: u64,
    pub max_consecutive_failures: u32,
    pub restore_on_start: bool,
    pub sensor_path: String,
    pub state_path: String,
    /// IANA zone for night hours; local time when unset.
    pub timezone: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            curve: CurveConfig::default(),
            boost: BoostConfig::default(),
            night: NightConfig::default(),
            pwm: PwmConfig::default(),
            poll_interval_ms: 5_000,
            max_consecutive_failures: 12,
            restore_on_start: true,
            sensor_path: "/sys/class/thermal/thermal_zone0/temp".to_string(),
            state_path: "/data/fan_state.json".to_string(),
            timezone: None,
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.curve.sanitize();
        self.boost.sanitize();
        self.night.sanitize();
        self.pwm.sanitize();
        self.poll_interval_ms = self.poll_interval_ms.clamp(100, 600_000);
        if self.max_consecutive_failures == 0 {
            self.max_consecutive_failures = 1;
        }
        if self.timezone.as_deref().is_some_and(|tz| tz.trim().is_empty()) {
            self.timezone = None;
        }
    }
}
