use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};

use tracing::{debug, info};

use fan_common::{error::Result, DutyCycle, FanError, PwmSink};

pub const SYSFS_PWM_ROOT: &str = "/sys/class/pwm";

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Linux PWM class device (`/sys/class/pwm/pwmchipN`). The pin passed to
/// [`PwmSink::set_duty`] is the channel on that chip; it is exported on first
/// use.
pub struct SysfsPwm {
    chip_dir: PathBuf,
    periods_ns: HashMap<u32, u64>,
}

impl SysfsPwm {
    pub fn open(root: &Path, chip: u32) -> Result<Self> {
        let chip_dir = root.join(format!("pwmchip{chip}"));
        if !chip_dir.is_dir() {
            return Err(FanError::HardwareUnavailable(format!(
                "{} not found, is the pwm overlay enabled?",
                chip_dir.display()
            )));
        }

        Ok(Self {
            chip_dir,
            periods_ns: HashMap::new(),
        })
    }

    fn channel_dir(&self, pin: u32) -> Result<PathBuf> {
        let dir = self.chip_dir.join(format!("pwm{pin}"));
        if dir.is_dir() {
            return Ok(dir);
        }

        write_attr(&self.chip_dir.join("export"), &pin.to_string())?;
        if !dir.is_dir() {
            return Err(FanError::HardwareUnavailable(format!(
                "channel {pin} did not appear after export under {}",
                self.chip_dir.display()
            )));
        }
        debug!("exported pwm channel {pin}");
        Ok(dir)
    }
}

impl PwmSink for SysfsPwm {
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, duty: DutyCycle) -> Result<()> {
        let dir = self.channel_dir(pin)?;
        let period_ns = NANOS_PER_SECOND / u64::from(frequency_hz.max(1));
        let duty_ns = period_ns * u64::from(duty.ppm()) / u64::from(DutyCycle::FULL_SCALE);

        if self.periods_ns.get(&pin) != Some(&period_ns) {
            // The kernel rejects a period shorter than the current duty.
            write_attr(&dir.join("duty_cycle"), "0")?;
            write_attr(&dir.join("period"), &period_ns.to_string())?;
            write_attr(&dir.join("enable"), "1")?;
            self.periods_ns.insert(pin, period_ns);
        }
        write_attr(&dir.join("duty_cycle"), &duty_ns.to_string())?;

        Ok(())
    }
}

fn write_attr(path: &Path, value: &str) -> Result<()> {
    fs::write(path, value).map_err(|err| {
        FanError::HardwareUnavailable(format!("failed to write {}: {err}", path.display()))
    })
}

/// Logs duty changes instead of touching hardware.
#[derive(Debug, Default)]
pub struct DryRunPwm {
    last: Option<(u32, u32, DutyCycle)>,
}

impl PwmSink for DryRunPwm {
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, duty: DutyCycle) -> Result<()> {
        let command = (pin, frequency_hz, duty);
        if self.last != Some(command) {
            info!("dry-run pwm: pin {pin} @ {frequency_hz} Hz, duty {duty}");
        }
        self.last = Some(command);
        Ok(())
    }
}

pub enum PwmOutput {
    Sysfs(SysfsPwm),
    DryRun(DryRunPwm),
}

impl PwmSink for PwmOutput {
    fn set_duty(&mut self, pin: u32, frequency_hz: u32, duty: DutyCycle) -> Result<()> {
        match self {
            Self::Sysfs(pwm) => pwm.set_duty(pin, frequency_hz, duty),
            Self::DryRun(pwm) => pwm.set_duty(pin, frequency_hz, duty),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testutil::ScratchDir;

    fn read(path: PathBuf) -> String {
        fs::read_to_string(path).unwrap()
    }

    #[test]
    fn writes_period_duty_and_enable() {
        let scratch = ScratchDir::new("pwm-write");
        let channel = scratch.path().join("pwmchip0/pwm0");
        fs::create_dir_all(&channel).unwrap();

        let mut pwm = SysfsPwm::open(scratch.path(), 0).unwrap();
        pwm.set_duty(0, 25_000, DutyCycle::from_ppm(610_000)).unwrap();

        assert_eq!(read(channel.join("period")), "40000");
        assert_eq!(read(channel.join("duty_cycle")), "24400");
        assert_eq!(read(channel.join("enable")), "1");
    }

    #[test]
    fn same_frequency_only_rewrites_duty() {
        let scratch = ScratchDir::new("pwm-duty-only");
        let channel = scratch.path().join("pwmchip0/pwm1");
        fs::create_dir_all(&channel).unwrap();

        let mut pwm = SysfsPwm::open(scratch.path(), 0).unwrap();
        pwm.set_duty(1, 25_000, DutyCycle::from_ppm(400_000)).unwrap();
        fs::remove_file(channel.join("period")).unwrap();
        pwm.set_duty(1, 25_000, DutyCycle::OFF).unwrap();

        assert!(!channel.join("period").exists());
        assert_eq!(read(channel.join("duty_cycle")), "0");
    }

    #[test]
    fn missing_chip_is_hardware_unavailable() {
        let scratch = ScratchDir::new("pwm-missing-chip");
        let err = SysfsPwm::open(scratch.path(), 3).err().unwrap();
        assert!(matches!(err, FanError::HardwareUnavailable(_)));
    }

    #[test]
    fn channel_that_never_appears_is_hardware_unavailable() {
        let scratch = ScratchDir::new("pwm-no-export");
        fs::create_dir_all(scratch.path().join("pwmchip0")).unwrap();

        let mut pwm = SysfsPwm::open(scratch.path(), 0).unwrap();
        let err = pwm.set_duty(2, 25_000, DutyCycle::OFF).unwrap_err();

        assert!(matches!(err, FanError::HardwareUnavailable(_)));
        assert_eq!(read(scratch.path().join("pwmchip0/export")), "2");
    }

    #[test]
    fn dry_run_remembers_last_command() {
        let mut pwm = PwmOutput::DryRun(DryRunPwm::default());
        pwm.set_duty(18, 25_000, DutyCycle::from_ppm(220_000)).unwrap();

        let PwmOutput::DryRun(inner) = pwm else {
            unreachable!()
        };
        assert_eq!(inner.last, Some((18, 25_000, DutyCycle::from_ppm(220_000))));
    }
}
