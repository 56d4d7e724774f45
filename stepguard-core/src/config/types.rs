//! Configuration type definitions
//!
//! Axis identifiers, driver families and the tunable parts of a channel
//! and of the fault monitor.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::status::FaultFlags;

/// Motion axis identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Axis {
    X,
    Y,
    Z,
    X2,
    Y2,
    Z2,
    Z3,
    Z4,
    E0,
    E1,
    E2,
    E3,
    E4,
    E5,
    E6,
    E7,
}

impl Axis {
    /// Every axis, in report order
    pub const ALL: [Axis; 16] = [
        Axis::X,
        Axis::Y,
        Axis::Z,
        Axis::X2,
        Axis::Y2,
        Axis::Z2,
        Axis::Z3,
        Axis::Z4,
        Axis::E0,
        Axis::E1,
        Axis::E2,
        Axis::E3,
        Axis::E4,
        Axis::E5,
        Axis::E6,
        Axis::E7,
    ];

    /// Position in [`Axis::ALL`]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable label
    pub const fn label(self) -> &'static str {
        match self {
            Axis::X => "X",
            Axis::Y => "Y",
            Axis::Z => "Z",
            Axis::X2 => "X2",
            Axis::Y2 => "Y2",
            Axis::Z2 => "Z2",
            Axis::Z3 => "Z3",
            Axis::Z4 => "Z4",
            Axis::E0 => "E0",
            Axis::E1 => "E1",
            Axis::E2 => "E2",
            Axis::E3 => "E3",
            Axis::E4 => "E4",
            Axis::E5 => "E5",
            Axis::E6 => "E6",
            Axis::E7 => "E7",
        }
    }

    /// Look up an axis by label (case-insensitive)
    pub fn from_label(label: &str) -> Option<Axis> {
        Axis::ALL
            .iter()
            .copied()
            .find(|a| a.label().eq_ignore_ascii_case(label))
    }
}

impl core::fmt::Display for Axis {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

/// How the MCU talks to a driver chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverInterface {
    /// STEP/DIR/EN pins only, no status
    Gpio,
    /// Byte-per-position SPI daisy chain
    DaisyChainSpi,
    /// Register datagrams over SPI with a chip select per device
    AddressedSpi,
    /// Register datagrams over a shared single-wire UART
    AddressedUart,
}

/// Driver chip family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DriverFamily {
    A4988,
    A5984,
    Drv8825,
    Lv8729,
    Tb6560,
    Tb6600,
    L6470,
    L6474,
    L6480,
    Powerstep01,
    Tmc2130,
    Tmc2160,
    Tmc5130,
    Tmc5160,
    Tmc2208,
    Tmc2209,
}

impl DriverFamily {
    /// Transport used by the family
    pub const fn interface(self) -> DriverInterface {
        use DriverFamily::*;
        match self {
            A4988 | A5984 | Drv8825 | Lv8729 | Tb6560 | Tb6600 => DriverInterface::Gpio,
            L6470 | L6474 | L6480 | Powerstep01 => DriverInterface::DaisyChainSpi,
            Tmc2130 | Tmc2160 | Tmc5130 | Tmc5160 => DriverInterface::AddressedSpi,
            Tmc2208 | Tmc2209 => DriverInterface::AddressedUart,
        }
    }

    /// Chip name as printed in reports
    pub const fn name(self) -> &'static str {
        use DriverFamily::*;
        match self {
            A4988 => "A4988",
            A5984 => "A5984",
            Drv8825 => "DRV8825",
            Lv8729 => "LV8729",
            Tb6560 => "TB6560",
            Tb6600 => "TB6600",
            L6470 => "L6470",
            L6474 => "L6474",
            L6480 => "L6480",
            Powerstep01 => "POWERSTEP01",
            Tmc2130 => "TMC2130",
            Tmc2160 => "TMC2160",
            Tmc5130 => "TMC5130",
            Tmc5160 => "TMC5160",
            Tmc2208 => "TMC2208",
            Tmc2209 => "TMC2209",
        }
    }

    /// Check if the chip reports a status word
    pub const fn has_status(self) -> bool {
        !matches!(self.interface(), DriverInterface::Gpio)
    }
}

/// Mutable per-channel settings
///
/// Current and threshold fields are rewritten by remediation and by
/// maintenance commands; everything else about a channel is fixed at boot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelSettings {
    /// Run current in mA
    pub run_current_ma: u16,
    /// Hold current in mA
    pub hold_current_ma: u16,
    /// Microstep resolution (1, 2, 4, ... 256)
    pub microsteps: u16,
    /// Stall detection threshold (mA on L64xx, StallGuard units on TMC)
    pub stall_threshold: u16,
    /// Overcurrent detection threshold in mA
    pub overcurrent_threshold_ma: u16,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            run_current_ma: 800,
            hold_current_ma: 400,
            microsteps: 16,
            stall_threshold: 1500,
            overcurrent_threshold_ma: 2250,
        }
    }
}

/// Fault monitor tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MonitorPolicy {
    /// Minimum time between sweeps
    pub period_ms: u32,
    /// Consecutive thermal-warning polls before hold current drops
    pub warning_streak: u8,
    /// Communication-loss polls between reminder reports
    pub comm_reminder_polls: u16,
    /// Hold-current reduction per remediation step in mA
    pub hold_step_ma: u16,
    /// Remediation enabled (reports continue when off)
    pub auto_throttle: bool,
    /// Fault categories that stop the machine
    #[cfg_attr(feature = "serde", serde(skip))]
    pub halt_on: FaultFlags,
}

impl MonitorPolicy {
    /// Categories that halt when built with `stop-on-error`
    pub const STOP_ON_ERROR: FaultFlags = FaultFlags::UNDERVOLTAGE
        .union(FaultFlags::THERMAL_WARNING)
        .union(FaultFlags::THERMAL_SHUTDOWN);
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            period_ms: 500,
            warning_streak: 4,
            comm_reminder_polls: 240,
            hold_step_ma: 31,
            auto_throttle: true,
            halt_on: if cfg!(feature = "stop-on-error") {
                Self::STOP_ON_ERROR
            } else {
                FaultFlags::empty()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_labels() {
        assert_eq!(Axis::from_label("x2"), Some(Axis::X2));
        assert_eq!(Axis::from_label("E7"), Some(Axis::E7));
        assert_eq!(Axis::from_label("W"), None);
        assert_eq!(Axis::Z4.label(), "Z4");
        for (i, axis) in Axis::ALL.iter().enumerate() {
            assert_eq!(axis.index(), i);
        }
    }

    #[test]
    fn test_family_interfaces() {
        assert_eq!(DriverFamily::Tb6600.interface(), DriverInterface::Gpio);
        assert_eq!(DriverFamily::Powerstep01.interface(), DriverInterface::DaisyChainSpi);
        assert_eq!(DriverFamily::Tmc5160.interface(), DriverInterface::AddressedSpi);
        assert_eq!(DriverFamily::Tmc2208.interface(), DriverInterface::AddressedUart);
        assert!(!DriverFamily::A4988.has_status());
        assert!(DriverFamily::L6474.has_status());
    }

    #[test]
    fn test_policy_defaults() {
        let policy = MonitorPolicy::default();
        assert_eq!(policy.period_ms, 500);
        assert_eq!(policy.warning_streak, 4);
        assert_eq!(policy.comm_reminder_polls, 240);
        assert!(policy.auto_throttle);
        #[cfg(not(feature = "stop-on-error"))]
        assert!(policy.halt_on.is_empty());
    }
}
