//! Stepper driver chip adapters
//!
//! This crate implements the driver traits of stepguard-core for real
//! chips, on top of the bus traits of stepguard-hal:
//!
//! - STEP/DIR-only drivers (A4988, DRV8825, TB6600, ...)
//! - L6470 / L6474 / L6480 / powerSTEP01 on an SPI daisy chain
//! - TMC SPI parts (TMC2130, TMC2160, TMC5130, TMC5160)
//! - TMC single-wire UART parts (TMC2208, TMC2209)

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod driver;
pub mod transport;
