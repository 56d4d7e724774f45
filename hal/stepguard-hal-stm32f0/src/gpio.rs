//! GPIO support for STM32F0
//!
//! Pin-string parsing for board files and an [`OutputPin`] adapter over
//! embassy outputs.

use embassy_stm32::gpio::Output;
use stepguard_hal::OutputPin;

/// Push-pull output usable by the driver adapters
pub struct Stm32f0Output<'d> {
    pin: Output<'d>,
}

impl<'d> Stm32f0Output<'d> {
    /// Wrap an embassy output
    pub fn new(pin: Output<'d>) -> Self {
        Self { pin }
    }
}

impl OutputPin for Stm32f0Output<'_> {
    #[inline]
    fn set_high(&mut self) {
        self.pin.set_high();
    }

    #[inline]
    fn set_low(&mut self) {
        self.pin.set_low();
    }

    #[inline]
    fn is_set_high(&self) -> bool {
        self.pin.is_set_high()
    }
}

/// Parsed pin reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PinRef {
    /// Port letter, 'A'..='F'
    pub port: char,
    /// Pin within the port, 0..=15
    pub pin: u8,
    /// Active-low marker (`!` prefix)
    pub inverted: bool,
}

/// Parse a pin string from config
///
/// Supports formats:
/// - "PA0" -> port A, pin 0
/// - "!PB1" -> port B, pin 1, inverted
pub fn parse_pin_string(s: &str) -> Option<PinRef> {
    let s = s.trim();
    let (s, inverted) = match s.strip_prefix('!') {
        Some(rest) => (rest, true),
        None => (s, false),
    };

    let rest = s.strip_prefix('P')?;
    let port = rest.chars().next()?;
    if !('A'..='F').contains(&port) {
        return None;
    }

    let pin: u8 = rest[1..].parse().ok()?;
    if pin > 15 {
        return None;
    }

    Some(PinRef {
        port,
        pin,
        inverted,
    })
}
