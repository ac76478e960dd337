//! Collaborator traits the control loop drives.
//!
//! All calls are synchronous and expected to return quickly. The loop imposes
//! no timeout, so a call that hangs stalls the loop until it returns.

use crate::{
    error::Result,
    types::{ControllerState, DutyCycle},
};

/// Source of the current temperature in °C.
pub trait TemperatureSource {
    /// Fails with [`FanError::SensorUnavailable`](crate::FanError::SensorUnavailable).
    fn read(&mut self) -> Result<f32>;
}

/// PWM output stage.
pub trait PwmSink {
    /// Fails with [`FanError::HardwareUnavailable`](crate::FanError::HardwareUnavailable)
    /// when the driver is not connected or rejects the command.
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, duty: DutyCycle) -> Result<()>;
}

/// Durable home of [`ControllerState`].
pub trait StateStore {
    /// `Ok(None)` when nothing has been stored yet.
    fn load(&self) -> Result<Option<ControllerState>>;

    /// Must be atomic: a later `load` sees either the old or the new record.
    fn save(&mut self, state: &ControllerState) -> Result<()>;
}

/// Wall clock, reduced to what night mode needs.
pub trait Clock {
    /// Local hour, 0..=23.
    fn hour(&self) -> u32;
}
