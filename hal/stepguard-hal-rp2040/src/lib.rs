//! RP2040-specific HAL for the stepper supervision firmware
//!
//! This crate provides RP2040-specific implementations of the shared
//! `stepguard-hal` traits, plus RP2040-specific functionality:
//!
//! - GPIO allocation and output pin adapter
//! - Dynamic pin allocation for config-driven setup
//! - Blocking SPI and single-wire UART transports
//! - Compare timer binding on the 1 MHz system timer

#![no_std]

pub mod gpio;
pub mod pins;
pub mod spi;
pub mod timer;
pub mod uart;

// Re-export shared traits from stepguard-hal for convenience
pub use stepguard_hal::{HardwareTimer, OutputPin, SpiBus, UartRx, UartTx};
