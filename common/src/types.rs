use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FanError, Result};

/// Fan duty intent in percent, always within 0..=100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct SpeedPercent(u8);

impl SpeedPercent {
    pub const STOPPED: Self = Self(0);
    pub const FULL: Self = Self(100);

    /// Clamps `value` into 0..=100.
    pub fn new(value: u8) -> Self {
        Self(value.min(100))
    }

    /// Truncates a curve value toward zero after clamping it into 0..=100.
    /// NaN maps to 0.
    pub fn from_curve(value: f32) -> Self {
        if value.is_nan() {
            return Self::STOPPED;
        }
        Self(value.clamp(0.0, 100.0) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn is_stopped(self) -> bool {
        self.0 == 0
    }

    pub fn abs_diff(self, other: Self) -> u8 {
        self.0.abs_diff(other.0)
    }
}

impl TryFrom<i64> for SpeedPercent {
    type Error = FanError;

    fn try_from(value: i64) -> Result<Self> {
        if (0..=100).contains(&value) {
            Ok(Self(value as u8))
        } else {
            Err(FanError::InvalidState(value))
        }
    }
}

impl fmt::Display for SpeedPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

impl<'de> Deserialize<'de> for SpeedPercent {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = i64::deserialize(deserializer)?;
        Self::try_from(raw).map_err(serde::de::Error::custom)
    }
}

/// Duty cycle in parts per million of the driver's full-scale range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DutyCycle(u32);

impl DutyCycle {
    pub const OFF: Self = Self(0);
    pub const FULL_SCALE: u32 = 1_000_000;

    pub fn from_ppm(ppm: u32) -> Self {
        Self(ppm.min(Self::FULL_SCALE))
    }

    pub fn from_percent(speed: SpeedPercent) -> Self {
        Self(u32::from(speed.get()) * (Self::FULL_SCALE / 100))
    }

    pub fn ppm(self) -> u32 {
        self.0
    }

    pub fn fraction(self) -> f64 {
        f64::from(self.0) / f64::from(Self::FULL_SCALE)
    }
}

impl fmt::Display for DutyCycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.fraction() * 100.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FanState {
    Stopped,
    Running,
}

impl FanState {
    pub fn of(speed: SpeedPercent) -> Self {
        if speed.is_stopped() {
            Self::Stopped
        } else {
            Self::Running
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Stopped => "STOPPED",
            Self::Running => "RUNNING",
        }
    }
}

/// The only record that survives a restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    // Older controllers wrote `{"speed": N}`.
    #[serde(alias = "speed")]
    pub last_speed: SpeedPercent,
}

impl ControllerState {
    pub fn new(last_speed: SpeedPercent) -> Self {
        Self { last_speed }
    }

    /// Parses a stored record. Out-of-range speeds surface as
    /// [`FanError::InvalidState`], anything else unreadable as
    /// [`FanError::Storage`].
    pub fn decode(raw: &[u8]) -> Result<Self> {
        #[derive(Deserialize)]
        struct Record {
            #[serde(alias = "speed")]
            last_speed: i64,
        }

        let record: Record = serde_json::from_slice(raw)
            .map_err(|err| FanError::Storage(format!("malformed state record: {err}")))?;
        let last_speed = SpeedPercent::try_from(record.last_speed)?;
        Ok(Self { last_speed })
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|err| FanError::Storage(format!("failed to encode state: {err}")))
    }
}
