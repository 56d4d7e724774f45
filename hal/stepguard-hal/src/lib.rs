//! Stepguard Hardware Abstraction Layer
//!
//! This crate defines hardware abstraction traits that can be implemented
//! by chip-specific HALs (RP2040, STM32F0, etc.). Driver adapters and the
//! fault monitor are written against these traits only, so the same code
//! runs on every supported MCU and on the host under test.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  stepguard-drivers / stepguard-firmware │
//! └─────────────────────────────────────────┘
//!                     │
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  stepguard-hal (this crate - traits)    │
//! └─────────────────────────────────────────┘
//!                     │
//!         ┌───────────┴───────────┐
//!         ▼                       ▼
//! ┌───────────────┐       ┌───────────────┐
//! │ stepguard-hal-│       │ stepguard-hal-│
//! │    rp2040     │       │   stm32f0     │
//! └───────────────┘       └───────────────┘
//! ```
//!
//! # Traits
//!
//! - [`gpio::OutputPin`], [`gpio::ActiveLevel`] - Digital outputs
//! - [`uart::UartTx`], [`uart::UartRx`] - Serial communication
//! - [`spi::SpiBus`] - SPI bus operations
//! - [`timer::HardwareTimer`], [`timer::TimerRegisters`] - Compare timers

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod gpio;
pub mod spi;
pub mod timer;
pub mod uart;

// Re-export key traits at crate root for convenience
pub use gpio::{ActiveLevel, OutputPin};
pub use spi::SpiBus;
pub use timer::{CompareTimer, HardwareTimer, TimerBinding, TimerRegisters, TimerRole};
pub use uart::{UartRx, UartTx};
