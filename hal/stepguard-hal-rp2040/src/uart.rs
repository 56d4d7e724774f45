//! Single-wire UART for addressed driver chips
//!
//! RP2040 has two UART peripherals (UART0 and UART1). Register-mapped
//! drivers share one of them with TX and RX tied together, so every write
//! is echoed back and a missing chip shows up as silence. Reads are
//! therefore bounded by a timeout instead of blocking until the buffer
//! fills.

use embassy_rp::pac;
use embassy_rp::uart::{self, Blocking, Uart};
use embassy_time::{Duration, Instant};
use stepguard_hal::{UartRx, UartTx};

/// UART peripheral identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartId {
    Uart0,
    Uart1,
}

impl UartId {
    fn regs(self) -> pac::uart::Uart {
        match self {
            UartId::Uart0 => pac::UART0,
            UartId::Uart1 => pac::UART1,
        }
    }
}

/// Determine which UART can use a given GPIO pin
///
/// RP2040 has specific pin mappings for each UART.
pub fn gpio_to_uart(gpio: u8) -> Option<UartId> {
    // UART0: GPIO 0/1, 12/13, 16/17, 28/29
    // UART1: GPIO 4/5, 8/9, 20/21, 24/25
    match gpio {
        0 | 1 | 12 | 13 | 16 | 17 | 28 | 29 => Some(UartId::Uart0),
        4 | 5 | 8 | 9 | 20 | 21 | 24 | 25 => Some(UartId::Uart1),
        _ => None,
    }
}

/// Error from UART operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum UartBusError {
    /// Framing error
    Framing,
    /// Parity error
    Parity,
    /// Break condition
    Break,
    /// Receive FIFO overrun
    Overrun,
    /// Other error
    Other,
}

impl From<uart::Error> for UartBusError {
    fn from(e: uart::Error) -> Self {
        match e {
            uart::Error::Framing => UartBusError::Framing,
            uart::Error::Parity => UartBusError::Parity,
            uart::Error::Break => UartBusError::Break,
            uart::Error::Overrun => UartBusError::Overrun,
            _ => UartBusError::Other,
        }
    }
}

/// Blocking UART with timeout-bounded reads
pub struct SingleWireUart<'d> {
    uart: Uart<'d, Blocking>,
    id: UartId,
    byte_timeout: Duration,
}

impl<'d> SingleWireUart<'d> {
    /// Wrap a blocking UART
    ///
    /// `byte_timeout` bounds the wait for each received byte.
    pub fn new(uart: Uart<'d, Blocking>, id: UartId, byte_timeout: Duration) -> Self {
        Self {
            uart,
            id,
            byte_timeout,
        }
    }

    /// Discard anything left in the receive FIFO
    pub fn drain(&mut self) {
        let regs = self.id.regs();
        while !regs.uartfr().read().rxfe() {
            let _ = regs.uartdr().read();
        }
    }
}

impl UartTx for SingleWireUart<'_> {
    type Error = UartBusError;

    fn write_blocking(&mut self, data: &[u8]) -> Result<(), Self::Error> {
        self.uart.blocking_write(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), Self::Error> {
        self.uart.blocking_flush()?;
        Ok(())
    }
}

impl UartRx for SingleWireUart<'_> {
    type Error = UartBusError;

    fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error> {
        let regs = self.id.regs();
        for (n, slot) in buf.iter_mut().enumerate() {
            let deadline = Instant::now() + self.byte_timeout;
            while regs.uartfr().read().rxfe() {
                if Instant::now() >= deadline {
                    return Ok(n);
                }
            }
            let dr = regs.uartdr().read();
            if dr.oe() {
                return Err(UartBusError::Overrun);
            }
            if dr.be() {
                return Err(UartBusError::Break);
            }
            if dr.pe() {
                return Err(UartBusError::Parity);
            }
            if dr.fe() {
                return Err(UartBusError::Framing);
            }
            *slot = dr.data();
        }
        Ok(buf.len())
    }
}
