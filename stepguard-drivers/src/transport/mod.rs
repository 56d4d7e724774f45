//! Bus transports shared by several driver chips
//!
//! A bus is owned by a blocking mutex and borrowed by every adapter on it.
//! Each transaction (one chain pass, one datagram) locks the bus for its
//! own duration only, so the monitor and the step ISR interleave between
//! transactions and never inside one.

pub mod daisy;
pub mod tmc_spi;
pub mod tmc_uart;

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::RawMutex;
use embassy_sync::blocking_mutex::Mutex;

pub use daisy::{ChainError, DaisyChain};
pub use tmc_spi::{TmcSpiError, TmcSpiLink};
pub use tmc_uart::{TmcUartError, TmcUartLink};

/// Bus shared between adapters
pub type SharedBus<M, B> = Mutex<M, RefCell<B>>;

/// Wrap a bus for sharing
pub const fn shared<M: RawMutex, B>(bus: B) -> SharedBus<M, B> {
    Mutex::new(RefCell::new(bus))
}

/// Run one transaction with exclusive access to the bus
#[inline]
pub fn with_bus<M: RawMutex, B, R>(bus: &SharedBus<M, B>, f: impl FnOnce(&mut B) -> R) -> R {
    bus.lock(|cell| f(&mut cell.borrow_mut()))
}

/// Register access to an addressed (TMC-style) driver chip
pub trait RegisterLink {
    /// Transport error
    type Error;

    /// Read a 32-bit register; the reply is returned synchronously
    fn read_register(&mut self, reg: u8) -> Result<u32, Self::Error>;

    /// Write a 32-bit register
    fn write_register(&mut self, reg: u8, value: u32) -> Result<(), Self::Error>;
}
