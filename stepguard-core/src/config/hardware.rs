//! Hardware configuration types
//!
//! These types describe how each channel is wired: driver family, chain
//! slot or bus address, and the pins the adapter drives. A board is a list
//! of channels plus monitor tuning, validated once before anything is
//! constructed.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use super::types::{Axis, ChannelSettings, DriverFamily, DriverInterface, MonitorPolicy};

/// Maximum channels per board
pub const MAX_CHANNELS: usize = 16;

/// Highest single-wire UART slave address (MS1/MS2 straps)
pub const MAX_UART_ADDRESS: u8 = 3;

/// Pin configuration with optional inversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PinConfig {
    /// GPIO pin number
    pub pin: u8,
    /// Pin is active-low (inverted)
    pub inverted: bool,
}

impl PinConfig {
    /// Create a new pin config
    pub const fn new(pin: u8) -> Self {
        Self {
            pin,
            inverted: false,
        }
    }

    /// Create an inverted (active-low) pin
    pub const fn inverted(pin: u8) -> Self {
        Self {
            pin,
            inverted: true,
        }
    }
}

/// Position of a device on a daisy-chained SPI bus
///
/// Position 1 is the device whose byte is clocked out first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChainSlot {
    /// Physical bus index
    #[cfg_attr(feature = "serde", serde(default))]
    pub bus: u8,
    /// 1-based chain position
    pub position: u8,
}

/// Static description of one channel
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChannelConfig {
    /// Axis driven by this channel
    pub axis: Axis,
    /// Driver chip family
    pub family: DriverFamily,
    /// Chain slot (daisy-chain families only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub chain: Option<ChainSlot>,
    /// Slave address (addressed UART families only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub address: Option<u8>,
    /// Swap the meaning of the direction signal
    #[cfg_attr(feature = "serde", serde(default))]
    pub invert_direction: bool,
    /// Step pulse pin
    pub step_pin: PinConfig,
    /// Direction pin (not used by daisy-chain families)
    #[cfg_attr(feature = "serde", serde(default))]
    pub dir_pin: Option<PinConfig>,
    /// Enable pin (not used by daisy-chain families)
    #[cfg_attr(feature = "serde", serde(default))]
    pub enable_pin: Option<PinConfig>,
    /// Chip select (addressed SPI families only)
    #[cfg_attr(feature = "serde", serde(default))]
    pub cs_pin: Option<PinConfig>,
    /// Initial current and threshold settings
    #[cfg_attr(feature = "serde", serde(default))]
    pub settings: ChannelSettings,
}

impl ChannelConfig {
    /// Create a channel config with default settings and no optional wiring
    pub fn new(axis: Axis, family: DriverFamily, step_pin: PinConfig) -> Self {
        Self {
            axis,
            family,
            chain: None,
            address: None,
            invert_direction: false,
            step_pin,
            dir_pin: None,
            enable_pin: None,
            cs_pin: None,
            settings: ChannelSettings::default(),
        }
    }

    /// Check that the wiring matches what the family's interface needs
    pub fn validate(&self) -> Result<(), ConfigError> {
        let needs_pins = |c: &Self| {
            if c.dir_pin.is_none() || c.enable_pin.is_none() {
                Err(ConfigError::MissingPin(c.axis))
            } else {
                Ok(())
            }
        };

        match self.family.interface() {
            DriverInterface::Gpio => needs_pins(self)?,
            DriverInterface::DaisyChainSpi => match self.chain {
                Some(slot) if slot.position > 0 => {}
                _ => return Err(ConfigError::MissingChainPosition(self.axis)),
            },
            DriverInterface::AddressedSpi => {
                needs_pins(self)?;
                if self.cs_pin.is_none() {
                    return Err(ConfigError::MissingPin(self.axis));
                }
            }
            DriverInterface::AddressedUart => {
                needs_pins(self)?;
                match self.address {
                    Some(addr) if addr <= MAX_UART_ADDRESS => {}
                    _ => return Err(ConfigError::MissingAddress(self.axis)),
                }
            }
        }
        Ok(())
    }
}

/// Complete board configuration
#[derive(Debug, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct BoardConfig {
    /// Board name
    #[cfg_attr(feature = "serde", serde(default))]
    pub name: heapless::String<32>,
    /// Fault monitor tuning
    #[cfg_attr(feature = "serde", serde(default))]
    pub monitor: MonitorPolicy,
    /// Driver channels
    #[cfg_attr(feature = "serde", serde(rename = "channel"))]
    pub channels: Vec<ChannelConfig, MAX_CHANNELS>,
}

impl BoardConfig {
    /// Validate the whole board
    ///
    /// Axes are unique across the board, chain positions are unique per
    /// bus, UART addresses are unique, and each channel carries the wiring
    /// its interface needs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, ch) in self.channels.iter().enumerate() {
            ch.validate()?;

            for other in &self.channels[..i] {
                if other.axis == ch.axis {
                    return Err(ConfigError::DuplicateAxis(ch.axis));
                }
                if ch.chain.is_some() && other.chain == ch.chain {
                    return Err(ConfigError::DuplicateChainPosition(ch.axis));
                }
                let both_uart = ch.family.interface() == DriverInterface::AddressedUart
                    && other.family.interface() == DriverInterface::AddressedUart;
                if both_uart && other.address == ch.address {
                    return Err(ConfigError::DuplicateAddress(ch.axis));
                }
            }
        }
        Ok(())
    }

    /// Channels of one interface class
    pub fn channels_of(&self, interface: DriverInterface) -> impl Iterator<Item = &ChannelConfig> {
        self.channels
            .iter()
            .filter(move |c| c.family.interface() == interface)
    }

    /// Number of positions on a daisy-chain bus
    pub fn chain_length(&self, bus: u8) -> u8 {
        self.channels
            .iter()
            .filter_map(|c| c.chain)
            .filter(|slot| slot.bus == bus)
            .map(|slot| slot.position)
            .max()
            .unwrap_or(0)
    }
}

/// Configuration errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Axis configured twice
    DuplicateAxis(Axis),
    /// Chain slot used twice on one bus
    DuplicateChainPosition(Axis),
    /// UART slave address used twice
    DuplicateAddress(Axis),
    /// Daisy-chain channel without a chain position
    MissingChainPosition(Axis),
    /// Addressed UART channel without a valid slave address
    MissingAddress(Axis),
    /// Pin required by the interface not configured
    MissingPin(Axis),
    /// Arena capacity exceeded
    ArenaFull,
}

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ConfigError::DuplicateAxis(a) => write!(f, "axis {} configured twice", a),
            ConfigError::DuplicateChainPosition(a) => {
                write!(f, "axis {} reuses a chain position", a)
            }
            ConfigError::DuplicateAddress(a) => write!(f, "axis {} reuses a UART address", a),
            ConfigError::MissingChainPosition(a) => {
                write!(f, "axis {} needs a chain position", a)
            }
            ConfigError::MissingAddress(a) => {
                write!(f, "axis {} needs a UART address 0..={}", a, MAX_UART_ADDRESS)
            }
            ConfigError::MissingPin(a) => write!(f, "axis {} is missing a required pin", a),
            ConfigError::ArenaFull => write!(f, "too many channels"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uart(axis: Axis, address: u8) -> ChannelConfig {
        let mut c = ChannelConfig::new(axis, DriverFamily::Tmc2209, PinConfig::new(11));
        c.dir_pin = Some(PinConfig::new(10));
        c.enable_pin = Some(PinConfig::inverted(12));
        c.address = Some(address);
        c
    }

    fn chained(axis: Axis, position: u8) -> ChannelConfig {
        let mut c = ChannelConfig::new(axis, DriverFamily::L6470, PinConfig::new(2));
        c.chain = Some(ChainSlot { bus: 0, position });
        c
    }

    fn board(channels: &[ChannelConfig]) -> BoardConfig {
        BoardConfig {
            channels: channels.iter().cloned().collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_board() {
        let b = board(&[uart(Axis::X, 0), uart(Axis::Y, 2), chained(Axis::Z, 1), chained(Axis::E0, 2)]);
        assert_eq!(b.validate(), Ok(()));
        assert_eq!(b.chain_length(0), 2);
        assert_eq!(b.channels_of(DriverInterface::AddressedUart).count(), 2);
    }

    #[test]
    fn test_duplicate_axis() {
        let b = board(&[uart(Axis::X, 0), uart(Axis::X, 1)]);
        assert_eq!(b.validate(), Err(ConfigError::DuplicateAxis(Axis::X)));
    }

    #[test]
    fn test_duplicate_chain_position() {
        let b = board(&[chained(Axis::X, 1), chained(Axis::Y, 1)]);
        assert_eq!(b.validate(), Err(ConfigError::DuplicateChainPosition(Axis::Y)));

        // Same position on another bus is fine
        let mut other_bus = chained(Axis::Y, 1);
        other_bus.chain = Some(ChainSlot { bus: 1, position: 1 });
        assert_eq!(board(&[chained(Axis::X, 1), other_bus]).validate(), Ok(()));
    }

    #[test]
    fn test_missing_wiring() {
        let mut no_slot = chained(Axis::X, 1);
        no_slot.chain = None;
        assert_eq!(no_slot.validate(), Err(ConfigError::MissingChainPosition(Axis::X)));

        let mut bad_addr = uart(Axis::Y, 0);
        bad_addr.address = Some(4);
        assert_eq!(bad_addr.validate(), Err(ConfigError::MissingAddress(Axis::Y)));

        let mut no_dir = uart(Axis::Z, 1);
        no_dir.dir_pin = None;
        assert_eq!(no_dir.validate(), Err(ConfigError::MissingPin(Axis::Z)));
    }

    #[test]
    fn test_duplicate_uart_address() {
        let b = board(&[uart(Axis::X, 1), uart(Axis::Y, 1)]);
        assert_eq!(b.validate(), Err(ConfigError::DuplicateAddress(Axis::Y)));
    }
}
