//! Stepper driver capability trait
//!
//! This trait abstracts over the driver chip families (L64xx daisy
//! chains, TMC register-mapped chips, STEP/DIR-only drivers) so the fault
//! monitor and the step ISR drive all of them the same way.

use crate::config::{ChannelSettings, DriverFamily};
use crate::status::{StatusLayout, StatusSnapshot};

/// Tunable driver parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParamKey {
    /// Run current in mA
    RunCurrent,
    /// Hold current in mA
    HoldCurrent,
    /// Microstep resolution
    Microsteps,
    /// Stall detection threshold
    StallThreshold,
    /// Overcurrent detection threshold in mA
    OvercurrentThreshold,
    /// Raw chip register
    Register(u8),
}

/// Trait for stepper driver chips
///
/// Implementations never fail: out-of-range values are clamped to the
/// chip's range and transport errors read back as the communication-loss
/// sentinel (0).
pub trait StepperDriver {
    /// Chip family behind this driver
    fn family(&self) -> DriverFamily;

    /// Write the full configuration (currents, microsteps, thresholds)
    fn configure(&mut self, settings: &ChannelSettings);

    /// Read the raw status word
    fn get_status(&mut self) -> u32;

    /// Read the raw status word and decode it
    fn poll_status(&mut self) -> StatusSnapshot {
        if !self.status_layout().readable {
            return StatusSnapshot::unreadable();
        }
        let raw = self.get_status();
        StatusSnapshot::decode(raw, self.status_layout())
    }

    /// Status word layout of this chip
    fn status_layout(&self) -> &'static StatusLayout {
        StatusLayout::for_family(self.family())
    }

    /// Read a parameter
    fn get_param(&mut self, key: ParamKey) -> u32;

    /// Write a parameter, returning the value actually applied
    fn set_param(&mut self, key: ParamKey, value: u32) -> u32;

    /// Enable or disable the power stage
    fn enable(&mut self, enabled: bool);

    /// Set the rotation direction
    ///
    /// Called from the step ISR. Takes the electrical direction; axis
    /// inversion is applied by the channel.
    fn set_direction(&mut self, forward: bool);

    /// Disable the power stage immediately
    fn shutdown(&mut self) {
        self.enable(false);
    }
}
