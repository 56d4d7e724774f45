//! Dynamic pin allocation for config-driven hardware setup
//!
//! Step, direction, enable and chip-select pins come from the board file
//! as numbers. Bus pins (SPI clock/data, UART TX/RX) need their concrete
//! types for embassy's pin-function traits and are taken out of
//! [`PinBankPeripherals`] before the bank is built.

use embassy_rp::gpio::AnyPin;
use embassy_rp::peripherals;
use embassy_rp::{Peri, Peripherals};

use crate::gpio::GPIO_COUNT;

/// Error when requesting a pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PinError {
    /// Pin number out of range (0-29 valid)
    InvalidPin,
    /// Pin already taken (by the bank or a bus)
    AlreadyTaken,
}

/// Pin bank that holds the remaining GPIO pins and hands them out by number
pub struct PinBank {
    pins: [Option<Peri<'static, AnyPin>>; GPIO_COUNT],
}

macro_rules! bank_pins {
    ($p:expr, $($field:ident),* $(,)?) => {
        [$($p.$field.take().map(Peri::<AnyPin>::from)),*]
    };
}

impl PinBank {
    /// Move every pin still present in `p` into the bank
    pub fn new(p: &mut PinBankPeripherals) -> Self {
        Self {
            pins: bank_pins!(
                p, pin0, pin1, pin2, pin3, pin4, pin5, pin6, pin7, pin8, pin9, pin10, pin11, pin12,
                pin13, pin14, pin15, pin16, pin17, pin18, pin19, pin20, pin21, pin22, pin23, pin24,
                pin25, pin26, pin27, pin28, pin29,
            ),
        }
    }

    /// Take a pin by number
    pub fn take(&mut self, pin_num: u8) -> Result<Peri<'static, AnyPin>, PinError> {
        if pin_num as usize >= GPIO_COUNT {
            return Err(PinError::InvalidPin);
        }
        self.pins[pin_num as usize]
            .take()
            .ok_or(PinError::AlreadyTaken)
    }

    /// Check if a pin is available
    pub fn is_available(&self, pin_num: u8) -> bool {
        self.pins
            .get(pin_num as usize)
            .map(Option::is_some)
            .unwrap_or(false)
    }
}

/// GPIO pins before they are moved into a [`PinBank`]
///
/// Fields are `Option` so bus pins can be taken out individually first.
pub struct PinBankPeripherals {
    pub pin0: Option<Peri<'static, peripherals::PIN_0>>,
    pub pin1: Option<Peri<'static, peripherals::PIN_1>>,
    pub pin2: Option<Peri<'static, peripherals::PIN_2>>,
    pub pin3: Option<Peri<'static, peripherals::PIN_3>>,
    pub pin4: Option<Peri<'static, peripherals::PIN_4>>,
    pub pin5: Option<Peri<'static, peripherals::PIN_5>>,
    pub pin6: Option<Peri<'static, peripherals::PIN_6>>,
    pub pin7: Option<Peri<'static, peripherals::PIN_7>>,
    pub pin8: Option<Peri<'static, peripherals::PIN_8>>,
    pub pin9: Option<Peri<'static, peripherals::PIN_9>>,
    pub pin10: Option<Peri<'static, peripherals::PIN_10>>,
    pub pin11: Option<Peri<'static, peripherals::PIN_11>>,
    pub pin12: Option<Peri<'static, peripherals::PIN_12>>,
    pub pin13: Option<Peri<'static, peripherals::PIN_13>>,
    pub pin14: Option<Peri<'static, peripherals::PIN_14>>,
    pub pin15: Option<Peri<'static, peripherals::PIN_15>>,
    pub pin16: Option<Peri<'static, peripherals::PIN_16>>,
    pub pin17: Option<Peri<'static, peripherals::PIN_17>>,
    pub pin18: Option<Peri<'static, peripherals::PIN_18>>,
    pub pin19: Option<Peri<'static, peripherals::PIN_19>>,
    pub pin20: Option<Peri<'static, peripherals::PIN_20>>,
    pub pin21: Option<Peri<'static, peripherals::PIN_21>>,
    pub pin22: Option<Peri<'static, peripherals::PIN_22>>,
    pub pin23: Option<Peri<'static, peripherals::PIN_23>>,
    pub pin24: Option<Peri<'static, peripherals::PIN_24>>,
    pub pin25: Option<Peri<'static, peripherals::PIN_25>>,
    pub pin26: Option<Peri<'static, peripherals::PIN_26>>,
    pub pin27: Option<Peri<'static, peripherals::PIN_27>>,
    pub pin28: Option<Peri<'static, peripherals::PIN_28>>,
    pub pin29: Option<Peri<'static, peripherals::PIN_29>>,
}

impl PinBankPeripherals {
    /// Split embassy peripherals into GPIO pins and bus peripherals
    pub fn from_peripherals(p: Peripherals) -> (Self, BusPeripherals) {
        let pins = Self {
            pin0: Some(p.PIN_0),
            pin1: Some(p.PIN_1),
            pin2: Some(p.PIN_2),
            pin3: Some(p.PIN_3),
            pin4: Some(p.PIN_4),
            pin5: Some(p.PIN_5),
            pin6: Some(p.PIN_6),
            pin7: Some(p.PIN_7),
            pin8: Some(p.PIN_8),
            pin9: Some(p.PIN_9),
            pin10: Some(p.PIN_10),
            pin11: Some(p.PIN_11),
            pin12: Some(p.PIN_12),
            pin13: Some(p.PIN_13),
            pin14: Some(p.PIN_14),
            pin15: Some(p.PIN_15),
            pin16: Some(p.PIN_16),
            pin17: Some(p.PIN_17),
            pin18: Some(p.PIN_18),
            pin19: Some(p.PIN_19),
            pin20: Some(p.PIN_20),
            pin21: Some(p.PIN_21),
            pin22: Some(p.PIN_22),
            pin23: Some(p.PIN_23),
            pin24: Some(p.PIN_24),
            pin25: Some(p.PIN_25),
            pin26: Some(p.PIN_26),
            pin27: Some(p.PIN_27),
            pin28: Some(p.PIN_28),
            pin29: Some(p.PIN_29),
        };
        let buses = BusPeripherals {
            spi0: Some(p.SPI0),
            spi1: Some(p.SPI1),
            uart0: Some(p.UART0),
            uart1: Some(p.UART1),
        };
        (pins, buses)
    }
}

/// Bus peripherals left over after the GPIO split
///
/// Taken by the board wiring; whatever is left is unused.
pub struct BusPeripherals {
    pub spi0: Option<Peri<'static, peripherals::SPI0>>,
    pub spi1: Option<Peri<'static, peripherals::SPI1>>,
    pub uart0: Option<Peri<'static, peripherals::UART0>>,
    pub uart1: Option<Peri<'static, peripherals::UART1>>,
}
