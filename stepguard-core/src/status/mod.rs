//! Canonical driver status
//!
//! Every supported chip reports faults in its own bit positions and
//! polarities. Adapters decode the raw word through the family's
//! [`StatusLayout`] so nothing above the adapter boundary ever sees a raw
//! word: the monitor reasons only about [`FaultFlags`].

pub mod layout;

pub use layout::StatusLayout;

bitflags::bitflags! {
    /// Canonical fault categories
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FaultFlags: u16 {
        /// Bridge disabled by over-temperature
        const THERMAL_SHUTDOWN = 1 << 0;
        /// Temperature pre-warning
        const THERMAL_WARNING = 1 << 1;
        /// Overcurrent / short to ground
        const OVERCURRENT = 1 << 2;
        /// Stall or step loss on bridge A
        const STALL_A = 1 << 3;
        /// Step loss on bridge B
        const STALL_B = 1 << 4;
        /// Supply undervoltage lockout
        const UNDERVOLTAGE = 1 << 5;
        /// Command not recognized
        const WRONG_COMMAND = 1 << 6;
        /// Command could not be performed
        const COMMAND_ERROR = 1 << 7;
        /// Bridges in high impedance
        const HI_Z = 1 << 8;
        /// Read returned the all-0 or all-1 sentinel
        const COMM_LOST = 1 << 15;
    }
}

impl FaultFlags {
    /// Either thermal category
    pub const THERMAL: FaultFlags = FaultFlags::THERMAL_SHUTDOWN.union(FaultFlags::THERMAL_WARNING);

    /// Either stall category
    pub const STALL: FaultFlags = FaultFlags::STALL_A.union(FaultFlags::STALL_B);

    /// Check if the read was the communication-loss sentinel
    pub const fn is_comm_lost(self) -> bool {
        self.contains(FaultFlags::COMM_LOST)
    }

    /// Check if any thermal category is set
    pub const fn is_over_temperature(self) -> bool {
        self.intersects(FaultFlags::THERMAL)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for FaultFlags {
    fn format(&self, f: defmt::Formatter) {
        defmt::write!(f, "FaultFlags({=u16:#06x})", self.bits())
    }
}

impl core::fmt::Display for FaultFlags {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        if self.is_empty() {
            return f.write_str("ok");
        }
        let mut first = true;
        for (name, _) in self.iter_names() {
            if !first {
                f.write_str(" ")?;
            }
            f.write_str(name)?;
            first = false;
        }
        Ok(())
    }
}

/// One status read, decoded
///
/// Ephemeral: produced by an adapter for a single monitor poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusSnapshot {
    /// Raw chip word as read
    pub raw: u32,
    /// Canonical categories
    pub flags: FaultFlags,
}

impl StatusSnapshot {
    /// Decode a raw word through a layout
    pub fn decode(raw: u32, layout: &StatusLayout) -> Self {
        Self {
            raw,
            flags: layout.decode(raw),
        }
    }

    /// Snapshot of a chip without a status register
    pub const fn unreadable() -> Self {
        Self {
            raw: 0,
            flags: FaultFlags::empty(),
        }
    }

    /// Check if the read hit the communication-loss sentinel
    pub const fn is_comm_lost(&self) -> bool {
        self.flags.is_comm_lost()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_names() {
        assert_eq!(FaultFlags::empty().to_string(), "ok");
        assert_eq!(
            (FaultFlags::THERMAL_WARNING | FaultFlags::HI_Z).to_string(),
            "THERMAL_WARNING HI_Z"
        );
    }

    #[test]
    fn test_thermal_group() {
        assert!(FaultFlags::THERMAL_SHUTDOWN.is_over_temperature());
        assert!(FaultFlags::THERMAL_WARNING.is_over_temperature());
        assert!(!FaultFlags::OVERCURRENT.is_over_temperature());
        assert!(FaultFlags::COMM_LOST.is_comm_lost());
    }
}
