//! Per-family status word layouts
//!
//! A layout names which bits of the chip's status word carry each
//! canonical category and which of those bits are active-low. Decoding
//! XORs the active-low mask first, so every category reads as "bit set
//! means fault" afterwards.

use super::FaultFlags;
use crate::config::DriverFamily;

/// Bit layout of one family's status word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusLayout {
    /// The chip has a readable status word
    pub readable: bool,
    /// Significant bits of the word (also the all-ones sentinel)
    pub word_mask: u32,
    /// Bits that read 0 when their condition is active
    pub active_low: u32,
    /// Status word of an idle, healthy chip
    pub idle: u32,
    pub thermal_shutdown: u32,
    pub thermal_warning: u32,
    pub overcurrent: u32,
    pub stall_a: u32,
    pub stall_b: u32,
    pub undervoltage: u32,
    pub wrong_command: u32,
    pub command_error: u32,
    pub hi_z: u32,
}

impl StatusLayout {
    /// Layout with every category absent
    const NONE: StatusLayout = StatusLayout {
        readable: true,
        word_mask: 0,
        active_low: 0,
        idle: 0,
        thermal_shutdown: 0,
        thermal_warning: 0,
        overcurrent: 0,
        stall_a: 0,
        stall_b: 0,
        undervoltage: 0,
        wrong_command: 0,
        command_error: 0,
        hi_z: 0,
    };

    /// STEP/DIR-only drivers
    pub const GPIO: StatusLayout = StatusLayout {
        readable: false,
        ..Self::NONE
    };

    /// L6470 STATUS register
    pub const L6470: StatusLayout = StatusLayout {
        word_mask: 0xFFFF,
        // UVLO, TH_WRN, TH_SD, OCD, STEP_LOSS_A, STEP_LOSS_B
        active_low: 0x7E00,
        // not busy, all active-low flags released
        idle: 0x7E02,
        hi_z: 1 << 0,
        command_error: 1 << 7,
        wrong_command: 1 << 8,
        undervoltage: 1 << 9,
        thermal_warning: 1 << 10,
        thermal_shutdown: 1 << 11,
        overcurrent: 1 << 12,
        stall_a: 1 << 13,
        stall_b: 1 << 14,
        ..Self::NONE
    };

    /// L6474 STATUS register (no step-loss detection)
    pub const L6474: StatusLayout = StatusLayout {
        word_mask: 0xFFFF,
        // UVLO, TH_WRN, TH_SD, OCD
        active_low: 0x1E00,
        idle: 0x1E10,
        hi_z: 1 << 0,
        command_error: 1 << 7,
        wrong_command: 1 << 8,
        undervoltage: 1 << 9,
        thermal_warning: 1 << 10,
        thermal_shutdown: 1 << 11,
        overcurrent: 1 << 12,
        ..Self::NONE
    };

    /// L6480 / powerSTEP01 STATUS register
    ///
    /// TH_STATUS is a two-bit field at 11..12: 01 warning, 10 bridge
    /// shutdown, 11 device shutdown. Both bits are active-high.
    pub const L6480: StatusLayout = StatusLayout {
        word_mask: 0xFFFF,
        // UVLO, OCD, STEP_LOSS_A, STEP_LOSS_B
        active_low: 0xE200,
        idle: 0xE202,
        hi_z: 1 << 0,
        command_error: 1 << 7,
        undervoltage: 1 << 9,
        thermal_warning: 0x0800,
        thermal_shutdown: 0x1000,
        overcurrent: 1 << 13,
        stall_a: 1 << 14,
        stall_b: 1 << 15,
        ..Self::NONE
    };

    /// TMC2130 / TMC2160 / TMC5130 / TMC5160 DRV_STATUS
    pub const TMC_SPI: StatusLayout = StatusLayout {
        word_mask: 0xFFFF_FFFF,
        // stst
        idle: 1 << 31,
        stall_a: 1 << 24,
        thermal_shutdown: 1 << 25,
        thermal_warning: 1 << 26,
        // s2ga, s2gb
        overcurrent: (1 << 27) | (1 << 28),
        ..Self::NONE
    };

    /// TMC2208 / TMC2209 DRV_STATUS
    pub const TMC_UART: StatusLayout = StatusLayout {
        word_mask: 0xFFFF_FFFF,
        // stst
        idle: 1 << 31,
        thermal_warning: 1 << 0,
        thermal_shutdown: 1 << 1,
        // s2ga, s2gb, s2vsa, s2vsb
        overcurrent: 0x3C,
        ..Self::NONE
    };

    /// Layout used by a driver family
    pub const fn for_family(family: DriverFamily) -> &'static StatusLayout {
        use DriverFamily::*;
        match family {
            A4988 | A5984 | Drv8825 | Lv8729 | Tb6560 | Tb6600 => &Self::GPIO,
            L6470 => &Self::L6470,
            L6474 => &Self::L6474,
            L6480 | Powerstep01 => &Self::L6480,
            Tmc2130 | Tmc2160 | Tmc5130 | Tmc5160 => &Self::TMC_SPI,
            Tmc2208 | Tmc2209 => &Self::TMC_UART,
        }
    }

    fn categories(&self) -> [(u32, FaultFlags); 9] {
        [
            (self.thermal_shutdown, FaultFlags::THERMAL_SHUTDOWN),
            (self.thermal_warning, FaultFlags::THERMAL_WARNING),
            (self.overcurrent, FaultFlags::OVERCURRENT),
            (self.stall_a, FaultFlags::STALL_A),
            (self.stall_b, FaultFlags::STALL_B),
            (self.undervoltage, FaultFlags::UNDERVOLTAGE),
            (self.wrong_command, FaultFlags::WRONG_COMMAND),
            (self.command_error, FaultFlags::COMMAND_ERROR),
            (self.hi_z, FaultFlags::HI_Z),
        ]
    }

    /// Flip active-low bits so every category reads active-high
    ///
    /// Applying it twice gives back the original word.
    pub const fn normalize(&self, word: u32) -> u32 {
        (word ^ self.active_low) & self.word_mask
    }

    /// Check if a raw word is the all-0 / all-1 communication sentinel
    pub const fn is_sentinel(&self, raw: u32) -> bool {
        let word = raw & self.word_mask;
        word == 0 || word == self.word_mask
    }

    /// Decode a raw status word into canonical categories
    ///
    /// All-zero or all-one words (within the word mask) decode to
    /// [`FaultFlags::COMM_LOST`] alone. Unreadable layouts decode to empty.
    pub fn decode(&self, raw: u32) -> FaultFlags {
        if !self.readable {
            return FaultFlags::empty();
        }
        if self.is_sentinel(raw) {
            return FaultFlags::COMM_LOST;
        }

        let bits = self.normalize(raw);
        self.categories()
            .iter()
            .filter(|(mask, _)| *mask != 0 && bits & mask != 0)
            .fold(FaultFlags::empty(), |acc, (_, flag)| acc | *flag)
    }

    /// Categories this layout can report
    pub fn supported(&self) -> FaultFlags {
        self.categories()
            .iter()
            .filter(|(mask, _)| *mask != 0)
            .fold(FaultFlags::empty(), |acc, (_, flag)| acc | *flag)
    }

    /// Compose the raw word an idle chip reports with `flags` active
    ///
    /// Categories the layout cannot express are ignored. Used by simulated
    /// chips and bench tooling.
    pub fn raw_for(&self, flags: FaultFlags) -> u32 {
        let mut bits = self.normalize(self.idle);
        for (mask, flag) in self.categories() {
            if flags.contains(flag) {
                bits |= mask;
            }
        }
        self.normalize(bits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const READABLE: [&StatusLayout; 5] = [
        &StatusLayout::L6470,
        &StatusLayout::L6474,
        &StatusLayout::L6480,
        &StatusLayout::TMC_SPI,
        &StatusLayout::TMC_UART,
    ];

    #[test]
    fn test_idle_words_are_healthy() {
        for layout in READABLE {
            assert_eq!(layout.decode(layout.idle), FaultFlags::empty());
        }
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(StatusLayout::L6470.decode(0x0000), FaultFlags::COMM_LOST);
        assert_eq!(StatusLayout::L6470.decode(0xFFFF), FaultFlags::COMM_LOST);
        // Bits above the word are ignored
        assert_eq!(StatusLayout::L6470.decode(0xABCD_FFFF), FaultFlags::COMM_LOST);
        assert_eq!(StatusLayout::TMC_UART.decode(0), FaultFlags::COMM_LOST);
        assert_eq!(StatusLayout::TMC_SPI.decode(u32::MAX), FaultFlags::COMM_LOST);
    }

    #[test]
    fn test_unreadable_layout() {
        assert_eq!(StatusLayout::GPIO.decode(0), FaultFlags::empty());
        assert_eq!(StatusLayout::GPIO.decode(0x1234), FaultFlags::empty());
        assert!(StatusLayout::GPIO.supported().is_empty());
    }

    #[test]
    fn test_l6470_active_low() {
        // TH_WRN pulled low, everything else idle
        let raw = 0x7E02 & !(1 << 10);
        assert_eq!(StatusLayout::L6470.decode(raw), FaultFlags::THERMAL_WARNING);

        // HiZ is active-high
        assert_eq!(StatusLayout::L6470.decode(0x7E03), FaultFlags::HI_Z);
    }

    #[test]
    fn test_l6480_thermal_field() {
        let layout = StatusLayout::L6480;
        assert_eq!(layout.decode(0xE202 | 0x0800), FaultFlags::THERMAL_WARNING);
        assert_eq!(layout.decode(0xE202 | 0x1000), FaultFlags::THERMAL_SHUTDOWN);
        assert_eq!(layout.decode(0xE202 | 0x1800), FaultFlags::THERMAL);
        assert_eq!(layout.decode(0xE202 & !(1 << 13)), FaultFlags::OVERCURRENT);
    }

    #[test]
    fn test_tmc_layouts() {
        let stst = 1 << 31;
        assert_eq!(
            StatusLayout::TMC_SPI.decode(stst | (1 << 26)),
            FaultFlags::THERMAL_WARNING
        );
        assert_eq!(StatusLayout::TMC_SPI.decode(stst | (1 << 28)), FaultFlags::OVERCURRENT);
        assert_eq!(
            StatusLayout::TMC_UART.decode(stst | 0b11),
            FaultFlags::THERMAL
        );
        assert!(!StatusLayout::TMC_UART.supported().intersects(FaultFlags::STALL));
    }

    #[test]
    fn test_family_lookup() {
        assert_eq!(StatusLayout::for_family(DriverFamily::Powerstep01), &StatusLayout::L6480);
        assert_eq!(StatusLayout::for_family(DriverFamily::Tmc2208), &StatusLayout::TMC_UART);
        assert!(!StatusLayout::for_family(DriverFamily::Drv8825).readable);
    }

    proptest! {
        #[test]
        fn normalize_is_an_involution(idx in 0usize..5, word in any::<u32>()) {
            let layout = READABLE[idx];
            let masked = word & layout.word_mask;
            prop_assert_eq!(layout.normalize(layout.normalize(masked)), masked);
        }

        #[test]
        fn sentinel_decodes_to_comm_lost_only(idx in 0usize..5, ones in any::<bool>(), high in any::<u32>()) {
            let layout = READABLE[idx];
            let word = if ones { layout.word_mask } else { 0 };
            // Bits outside the word never rescue a sentinel
            let raw = word | (high & !layout.word_mask);
            prop_assert_eq!(layout.decode(raw), FaultFlags::COMM_LOST);
        }

        #[test]
        fn composed_words_decode_to_supported_flags(idx in 0usize..5, bits in any::<u16>()) {
            let layout = READABLE[idx];
            let wanted = FaultFlags::from_bits_truncate(bits) - FaultFlags::COMM_LOST;
            let raw = layout.raw_for(wanted);
            prop_assume!(!layout.is_sentinel(raw));
            prop_assert_eq!(layout.decode(raw), wanted & layout.supported());
        }
    }
}
