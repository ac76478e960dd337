use std::{
    fs::{self, File},
    future::Future,
    io::{self, ErrorKind, Write},
    path::{Path, PathBuf},
};

use anyhow::Context;
use chrono::{Local, Timelike, Utc};
use chrono_tz::Tz;
use tokio::sync::watch;
use tracing::{info, warn};

use fan_common::{
    error::Result, Clock, ControllerState, FanError, RuntimeConfig, StateStore, TemperatureSource,
};

use crate::{
    control::ControlLoop,
    pwm::{DryRunPwm, PwmOutput, SysfsPwm, SYSFS_PWM_ROOT},
};

const DEFAULT_CONFIG_PATH: &str = "./.fan/config.json";

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config_path = std::env::var("FAN_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let mut config = load_runtime_config(&config_path)
        .await
        .unwrap_or_else(|err| {
            warn!(
                "failed to load config from {}: {err:#}",
                config_path.display()
            );
            RuntimeConfig::default()
        });
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    config.sanitize();

    let sensor = ThermalZoneSensor::new(&config.sensor_path);
    let store = JsonStateStore::new(&config.state_path);
    let clock = ZonedClock::from_config(config.timezone.as_deref());
    let pwm = if config.pwm.dry_run {
        info!("dry run: pwm commands are logged, not applied");
        PwmOutput::DryRun(DryRunPwm::default())
    } else {
        let chip = SysfsPwm::open(Path::new(SYSFS_PWM_ROOT), config.pwm.chip)
            .context("pwm output unavailable")?;
        PwmOutput::Sysfs(chip)
    };

    let mut control = ControlLoop::start(&config, sensor, pwm, store, clock)
        .context("fan controller failed to start")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    spawn_shutdown_listener(shutdown_tx);

    info!(
        "polling {} every {} ms",
        config.sensor_path, config.poll_interval_ms
    );
    control.run(shutdown_rx).await
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

fn apply_env_overrides(config: &mut RuntimeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(path) = var("FAN_STATE_PATH") {
        config.state_path = path;
    }
    if let Some(path) = var("FAN_SENSOR_PATH") {
        config.sensor_path = path;
    }
    if let Some(timezone) = var("FAN_TIMEZONE") {
        config.timezone = Some(timezone);
    }
    if let Some(flag) = var("FAN_DRY_RUN") {
        config.pwm.dry_run = matches!(flag.trim(), "1" | "true" | "yes" | "on");
    }
}

fn spawn_shutdown_listener(shutdown: watch::Sender<bool>) {
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown requested");
        let _ = shutdown.send(true);
    });
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = interrupt(tokio::signal::ctrl_c()) => {}
                _ = terminate.recv() => {}
            }
        }
        Err(err) => {
            warn!("failed to install SIGTERM handler: {err}");
            interrupt(tokio::signal::ctrl_c()).await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    interrupt(tokio::signal::ctrl_c()).await;
}

/// Resolves on Ctrl-C. A handler that cannot be installed never resolves,
/// so it is not mistaken for a shutdown request.
async fn interrupt(ctrl_c: impl Future<Output = io::Result<()>>) {
    if let Err(err) = ctrl_c.await {
        warn!("failed to install Ctrl-C handler: {err}");
        std::future::pending::<()>().await;
    }
}

/// Kernel thermal zone, reporting millidegrees Celsius.
pub struct ThermalZoneSensor {
    path: PathBuf,
}

impl ThermalZoneSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl TemperatureSource for ThermalZoneSensor {
    fn read(&mut self) -> Result<f32> {
        let raw = fs::read_to_string(&self.path).map_err(|err| {
            FanError::SensorUnavailable(format!("{}: {err}", self.path.display()))
        })?;
        let millidegrees: f64 = raw.trim().parse().map_err(|_| {
            FanError::SensorUnavailable(format!(
                "{}: unexpected reading {:?}",
                self.path.display(),
                raw.trim()
            ))
        })?;

        let celsius = (millidegrees / 1000.0) as f32;
        if !celsius.is_finite() {
            return Err(FanError::SensorUnavailable(format!(
                "{}: non-finite reading",
                self.path.display()
            )));
        }
        Ok(celsius)
    }
}

/// Single JSON record on disk, replaced atomically on every save.
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn storage_error(&self, action: &str, err: std::io::Error) -> FanError {
        FanError::Storage(format!("failed to {action} {}: {err}", self.path.display()))
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<Option<ControllerState>> {
        match fs::read(&self.path) {
            Ok(raw) => ControllerState::decode(&raw).map(Some),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(self.storage_error("read", err)),
        }
    }

    fn save(&mut self, state: &ControllerState) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| self.storage_error("prepare", err))?;
        }

        let payload = state.encode()?;
        let temp = self.temp_path();
        let mut file = File::create(&temp).map_err(|err| self.storage_error("write", err))?;
        file.write_all(&payload)
            .and_then(|()| file.sync_all())
            .map_err(|err| self.storage_error("write", err))?;
        fs::rename(&temp, &self.path).map_err(|err| self.storage_error("replace", err))
    }
}

/// Hour of day in a configured IANA zone, or the host's local time.
#[derive(Debug, Clone)]
pub enum ZonedClock {
    Local,
    Zone(Tz),
}

impl ZonedClock {
    pub fn from_config(timezone: Option<&str>) -> Self {
        let Some(name) = timezone else {
            return Self::Local;
        };
        match name.parse::<Tz>() {
            Ok(tz) => Self::Zone(tz),
            Err(err) => {
                warn!("unknown timezone {name:?} ({err}), using local time");
                Self::Local
            }
        }
    }
}

impl Clock for ZonedClock {
    fn hour(&self) -> u32 {
        match self {
            Self::Local => Local::now().hour(),
            Self::Zone(tz) => Utc::now().with_timezone(tz).hour(),
        }
    }
}
