pub mod config;
pub mod engine;
pub mod error;
pub mod policy;
pub mod ports;
pub mod types;

pub use config::{BoostConfig, CurveConfig, NightConfig, PwmConfig, RuntimeConfig};
pub use engine::{EngineAction, FanEngine};
pub use error::FanError;
pub use policy::SpeedPolicy;
pub use ports::{Clock, PwmSink, StateStore, TemperatureSource};
pub use types::{ControllerState, DutyCycle, FanState, SpeedPercent};
