use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use fan_common::{
    error::Result, Clock, ControllerState, EngineAction, FanEngine, FanError, PwmSink,
    RuntimeConfig, SpeedPercent, StateStore, TemperatureSource,
};

#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Unchanged {
        temp_c: f32,
        speed: SpeedPercent,
    },
    Applied {
        temp_c: f32,
        from: SpeedPercent,
        to: SpeedPercent,
        boosted: bool,
    },
    /// Shutdown arrived while a boost pulse was being held.
    Interrupted,
}

/// Drives the fan: poll, decide, act, persist, sleep.
pub struct ControlLoop<T, P, S, C> {
    engine: FanEngine,
    sensor: T,
    pwm: P,
    store: S,
    clock: C,

    pin: u32,
    frequency_hz: u32,
    poll_interval: Duration,
    max_consecutive_failures: u32,
    consecutive_failures: u32,
}

impl<T, P, S, C> ControlLoop<T, P, S, C>
where
    T: TemperatureSource,
    P: PwmSink,
    S: StateStore,
    C: Clock,
{
    /// Restores persisted state and checks the sensor and output stage.
    /// Either of those failing here is fatal.
    pub fn start(
        config: &RuntimeConfig,
        mut sensor: T,
        pwm: P,
        store: S,
        clock: C,
    ) -> Result<Self> {
        let restored = restore_state(&store);
        let temp_c = sensor.read()?;

        let mut control = Self {
            engine: FanEngine::from_config(config, restored),
            sensor,
            pwm,
            store,
            clock,
            pin: config.pwm.channel,
            frequency_hz: config.pwm.frequency_hz,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            max_consecutive_failures: config.max_consecutive_failures,
            consecutive_failures: 0,
        };

        if config.restore_on_start {
            // After a reboot the output may have reset while the record says
            // otherwise. No boost: the record is the state we resume from.
            control.drive(restored.last_speed)?;
        }

        info!(
            "fan controller started at {temp_c:.1}°C, last speed {} ({})",
            restored.last_speed,
            control.engine.state().as_str()
        );
        Ok(control)
    }

    /// One poll. Any collaborator error ends the cycle before a speed derived
    /// from it is applied.
    pub async fn run_cycle(&mut self, shutdown: &mut watch::Receiver<bool>) -> Result<CycleOutcome> {
        let temp_c = self.sensor.read()?;
        let hour = self.clock.hour();
        let from = self.engine.last_speed();

        let mut boosted = false;
        let mut applied = None;

        for action in self.engine.plan(temp_c, hour) {
            match action {
                EngineAction::Boost { speed, hold_ms } => {
                    self.drive(speed)?;
                    self.engine.record_boost();
                    boosted = true;
                    debug!("boost pulse at {speed} for {hold_ms} ms");

                    if !pause(Duration::from_millis(hold_ms), shutdown).await {
                        return Ok(CycleOutcome::Interrupted);
                    }
                }
                EngineAction::SetSpeed(speed) => {
                    self.drive(speed)?;
                    self.engine.record_applied(speed);
                    applied = Some(speed);
                    info!("{temp_c:.1}°C → {speed}");
                }
            }
        }

        self.flush_state()?;

        Ok(match applied {
            Some(to) => CycleOutcome::Applied {
                temp_c,
                from,
                to,
                boosted,
            },
            None => CycleOutcome::Unchanged {
                temp_c,
                speed: from,
            },
        })
    }

    /// Runs until shutdown is signalled. Single failed cycles are logged and
    /// retried; `max_consecutive_failures` in a row end the loop with the
    /// last error.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        loop {
            match self.run_cycle(&mut shutdown).await {
                Ok(CycleOutcome::Interrupted) => break,
                Ok(outcome) => {
                    if self.consecutive_failures > 0 {
                        info!(
                            "control recovered after {} failed cycle(s)",
                            self.consecutive_failures
                        );
                    }
                    self.consecutive_failures = 0;

                    match outcome {
                        CycleOutcome::Unchanged { temp_c, speed } => {
                            debug!("{temp_c:.1}°C, holding {speed}");
                        }
                        CycleOutcome::Applied {
                            temp_c,
                            from,
                            to,
                            boosted,
                        } => {
                            debug!("{temp_c:.1}°C, {from} → {to} (boosted: {boosted})");
                        }
                        CycleOutcome::Interrupted => {}
                    }
                }
                Err(err) => {
                    self.consecutive_failures += 1;
                    warn!(
                        "control cycle failed ({}/{}, {}): {err}",
                        self.consecutive_failures,
                        self.max_consecutive_failures,
                        err.kind()
                    );

                    if self.consecutive_failures >= self.max_consecutive_failures {
                        error!("giving up, last speed {}", self.engine.last_speed());
                        return Err(err).with_context(|| {
                            format!(
                                "{} consecutive control cycles failed",
                                self.consecutive_failures
                            )
                        });
                    }
                }
            }

            if !pause(self.poll_interval, &mut shutdown).await {
                break;
            }
        }

        info!("fan controller stopped at {}", self.engine.last_speed());
        Ok(())
    }

    fn drive(&mut self, speed: SpeedPercent) -> Result<()> {
        let duty = self.engine.policy().duty_for(speed);
        self.pwm.set_duty(self.pin, self.frequency_hz, duty)
    }

    /// Writes the applied speed, including one a previous cycle failed to
    /// save.
    fn flush_state(&mut self) -> Result<()> {
        if let Some(state) = self.engine.pending_state() {
            self.store.save(&state)?;
            self.engine.record_persisted();
        }
        Ok(())
    }
}

fn restore_state(store: &impl StateStore) -> ControllerState {
    match store.load() {
        Ok(Some(state)) => state,
        Ok(None) => {
            info!("no saved fan state, starting stopped");
            ControllerState::default()
        }
        Err(err @ FanError::InvalidState(_)) => {
            warn!("ignoring saved fan state: {err}");
            ControllerState::default()
        }
        Err(err) => {
            warn!("failed to load fan state, starting stopped: {err}");
            ControllerState::default()
        }
    }
}

/// Sleeps for `duration` unless shutdown is requested first. Returns false
/// on shutdown.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = shutdown.wait_for(|stop| *stop) => false,
    }
}
