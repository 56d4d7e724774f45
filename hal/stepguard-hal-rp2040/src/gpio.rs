//! Output pin adapter
//!
//! Exposes embassy outputs through the shared [`OutputPin`] trait so driver
//! adapters never see the chip HAL. Pin ownership is tracked by
//! [`PinBank`](crate::pins::PinBank).

use embassy_rp::gpio::{AnyPin, Level, Output};
use embassy_rp::Peri;
use stepguard_hal::OutputPin;

/// Maximum number of GPIO pins on RP2040
pub const GPIO_COUNT: usize = 30;

/// Push-pull output usable by the driver adapters
pub struct Rp2040Output<'d> {
    pin: Output<'d>,
}

impl<'d> Rp2040Output<'d> {
    /// Configure a pin as output at the given initial level
    pub fn new(pin: Peri<'d, AnyPin>, initial_high: bool) -> Self {
        let level = if initial_high { Level::High } else { Level::Low };
        Self {
            pin: Output::new(pin, level),
        }
    }
}

impl OutputPin for Rp2040Output<'_> {
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
