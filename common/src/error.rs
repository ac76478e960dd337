use thiserror::Error;

/// Failures reported by the collaborators around the fan engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FanError {
    /// The temperature reading could not be obtained.
    #[error("temperature sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// The PWM driver is missing or refused the command.
    #[error("pwm hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Reading or writing persisted controller state failed.
    #[error("state storage error: {0}")]
    Storage(String),

    /// Persisted speed is outside 0..=100.
    #[error("invalid persisted speed {0}, expected 0-100")]
    InvalidState(i64),
}

impl FanError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SensorUnavailable(_) => "sensor",
            Self::HardwareUnavailable(_) => "hardware",
            Self::Storage(_) => "storage",
            Self::InvalidState(_) => "invalid_state",
        }
    }
}

pub type Result<T> = std::result::Result<T, FanError>;
