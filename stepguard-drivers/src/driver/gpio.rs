//! STEP/DIR-only drivers (A4988, A5984, DRV8825, LV8729, TB6560, TB6600)
//!
//! These chips have no data interface. Direction and enable are plain pin
//! writes; currents and microstepping are set by trimmers and jumpers, so
//! parameters are only remembered for reporting.

use stepguard_core::config::{ChannelSettings, DriverFamily};
use stepguard_core::traits::{ParamKey, StepperDriver};
use stepguard_hal::gpio::{ActiveLevel, OutputPin};

/// Pin-driven stepper driver
pub struct GpioDriver<DIR, EN> {
    family: DriverFamily,
    dir: DIR,
    enable: ActiveLevel<EN>,
    settings: ChannelSettings,
}

impl<DIR: OutputPin, EN: OutputPin> GpioDriver<DIR, EN> {
    /// Create a driver; `enable_active_low` matches nearly every carrier board
    pub fn new(family: DriverFamily, dir: DIR, enable: EN, enable_active_low: bool) -> Self {
        let mut enable = ActiveLevel::new(enable, enable_active_low);
        enable.assert(false);
        Self {
            family,
            dir,
            enable,
            settings: ChannelSettings::default(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enable.is_asserted()
    }
}

impl<DIR: OutputPin, EN: OutputPin> StepperDriver for GpioDriver<DIR, EN> {
    fn family(&self) -> DriverFamily {
        self.family
    }

    fn configure(&mut self, settings: &ChannelSettings) {
        self.settings = *settings;
    }

    fn get_status(&mut self) -> u32 {
        0
    }

    fn get_param(&mut self, key: ParamKey) -> u32 {
        match key {
            ParamKey::RunCurrent => self.settings.run_current_ma as u32,
            ParamKey::HoldCurrent => self.settings.hold_current_ma as u32,
            ParamKey::Microsteps => self.settings.microsteps as u32,
            ParamKey::StallThreshold => self.settings.stall_threshold as u32,
            ParamKey::OvercurrentThreshold => self.settings.overcurrent_threshold_ma as u32,
            ParamKey::Register(_) => 0,
        }
    }

    fn set_param(&mut self, key: ParamKey, value: u32) -> u32 {
        let narrow = value.min(u16::MAX as u32) as u16;
        match key {
            ParamKey::RunCurrent => self.settings.run_current_ma = narrow,
            ParamKey::HoldCurrent => self.settings.hold_current_ma = narrow,
            ParamKey::Microsteps => self.settings.microsteps = narrow,
            ParamKey::StallThreshold => self.settings.stall_threshold = narrow,
            ParamKey::OvercurrentThreshold => self.settings.overcurrent_threshold_ma = narrow,
            ParamKey::Register(_) => return 0,
        }
        narrow as u32
    }

    #[inline]
    fn enable(&mut self, enabled: bool) {
        self.enable.assert(enabled);
    }

    #[inline]
    fn set_direction(&mut self, forward: bool) {
        self.dir.set_state(forward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockPin;
    use stepguard_core::status::FaultFlags;

    fn driver() -> GpioDriver<MockPin, MockPin> {
        GpioDriver::new(DriverFamily::Drv8825, MockPin::default(), MockPin::default(), true)
    }

    #[test]
    fn test_starts_disabled() {
        let d = driver();
        assert!(!d.is_enabled());
        assert!(d.enable.into_inner().high);
    }

    #[test]
    fn test_immediate_pin_writes() {
        let mut d = driver();
        d.enable(true);
        d.set_direction(true);
        assert!(d.is_enabled());
        assert!(d.dir.high);
        d.set_direction(false);
        assert!(!d.dir.high);

        d.shutdown();
        assert!(!d.is_enabled());
    }

    #[test]
    fn test_no_status() {
        let mut d = driver();
        let snapshot = d.poll_status();
        assert_eq!(snapshot.flags, FaultFlags::empty());
        assert!(!snapshot.is_comm_lost());
    }

    #[test]
    fn test_params_remembered() {
        let mut d = driver();
        assert_eq!(d.set_param(ParamKey::HoldCurrent, 70_000), u16::MAX as u32);
        assert_eq!(d.get_param(ParamKey::HoldCurrent), u16::MAX as u32);
        assert_eq!(d.set_param(ParamKey::Register(3), 1), 0);
    }
}
