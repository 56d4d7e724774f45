//! Blocking SPI bus for driver chains
//!
//! Wraps an embassy blocking SPI master in the shared [`SpiBus`] trait.
//! Transfers are short (one byte per chain position or one 40-bit
//! datagram) and run from the monitor task and the step ISR, so there is
//! no async or DMA path here.

use embassy_rp::spi::{self, Blocking, Phase, Polarity, Spi};
use stepguard_hal::spi::{Mode, SpiConfig};
use stepguard_hal::SpiBus;

/// SPI peripheral identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SpiId {
    Spi0,
    Spi1,
}

/// Determine which SPI can drive SCK on a given GPIO pin
pub fn sck_to_spi(gpio: u8) -> Option<SpiId> {
    // SPI0 SCK: GPIO 2, 6, 18, 22
    // SPI1 SCK: GPIO 10, 14, 26
    match gpio {
        2 | 6 | 18 | 22 => Some(SpiId::Spi0),
        10 | 14 | 26 => Some(SpiId::Spi1),
        _ => None,
    }
}

/// Convert the shared bus configuration to embassy's
pub fn embassy_config(config: &SpiConfig) -> spi::Config {
    let (polarity, phase) = match config.mode {
        Mode::Mode0 => (Polarity::IdleLow, Phase::CaptureOnFirstTransition),
        Mode::Mode1 => (Polarity::IdleLow, Phase::CaptureOnSecondTransition),
        Mode::Mode2 => (Polarity::IdleHigh, Phase::CaptureOnFirstTransition),
        Mode::Mode3 => (Polarity::IdleHigh, Phase::CaptureOnSecondTransition),
    };
    let mut cfg = spi::Config::default();
    cfg.frequency = config.frequency;
    cfg.polarity = polarity;
    cfg.phase = phase;
    cfg
}

/// Blocking SPI master implementing [`SpiBus`]
pub struct Rp2040Spi<'d, T: spi::Instance> {
    spi: Spi<'d, T, Blocking>,
}

impl<'d, T: spi::Instance> Rp2040Spi<'d, T> {
    /// Wrap an already constructed blocking SPI
    pub fn new(spi: Spi<'d, T, Blocking>) -> Self {
        Self { spi }
    }
}

impl<T: spi::Instance> SpiBus for Rp2040Spi<'_, T> {
    type Error = spi::Error;

    fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), Self::Error> {
        self.spi.blocking_transfer_in_place(data)
    }
}
