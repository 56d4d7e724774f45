//! Daisy-chained SPI (L64xx)
//!
//! All chips on the chain share one chip-select. A pass clocks exactly one
//! byte per chain position; the chip at position `p` (1-based) gets byte
//! `p - 1` of the frame. What a chip shifts back during a pass is its answer
//! to the byte it received on the pass before.
//!
//! ```text
//!  MCU ─MOSI─▶ [pos 1] ─▶ [pos 2] ─▶ [pos 3] ─MISO─▶ MCU
//!  frame:       byte 0     byte 1     byte 2
//! ```
//!
//! Single-byte commands (direction, enable) are queued per position and
//! ride along on whatever pass goes out next. The direction and enable
//! state behind them is kept here too, so the step ISR and the adapter see
//! the same state without sharing the adapter.

use embassy_sync::blocking_mutex::raw::RawMutex;
use stepguard_hal::gpio::OutputPin;
use stepguard_hal::spi::SpiBus;

use super::{with_bus, SharedBus};

/// Longest supported chain
pub const MAX_CHAIN_LEN: usize = 8;

/// No-operation byte
pub const NOP: u8 = 0x00;

/// Daisy-chain transport errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChainError<E> {
    /// Position is 0 or past the end of the chain
    Position(u8),
    /// SPI transfer failed
    Spi(E),
}

/// Direction and enable state of one chain position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Motion {
    pub forward: bool,
    pub enabled: bool,
}

impl Motion {
    const IDLE: Motion = Motion {
        forward: true,
        enabled: false,
    };
}

impl Default for Motion {
    fn default() -> Self {
        Self::IDLE
    }
}

/// One daisy chain: bus, shared chip-select and the queued commands
pub struct DaisyChain<B, CS> {
    spi: B,
    cs: CS,
    len: usize,
    queued: [Option<u8>; MAX_CHAIN_LEN],
    motion: [Motion; MAX_CHAIN_LEN],
}

impl<B: SpiBus, CS: OutputPin> DaisyChain<B, CS> {
    /// Create a chain of `len` chips (clamped to [`MAX_CHAIN_LEN`])
    pub fn new(spi: B, mut cs: CS, len: usize) -> Self {
        cs.set_high();
        Self {
            spi,
            cs,
            len: len.min(MAX_CHAIN_LEN),
            queued: [None; MAX_CHAIN_LEN],
            motion: [Motion::IDLE; MAX_CHAIN_LEN],
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn index(&self, position: u8) -> Result<usize, ChainError<B::Error>> {
        let index = (position as usize).wrapping_sub(1);
        if index < self.len {
            Ok(index)
        } else {
            Err(ChainError::Position(position))
        }
    }

    /// Queue a single-byte command for the next pass
    ///
    /// A later command for the same position replaces an unsent one.
    pub fn queue(&mut self, position: u8, command: u8) -> Result<(), ChainError<B::Error>> {
        let index = self.index(position)?;
        self.queued[index] = Some(command);
        Ok(())
    }

    /// Direction and enable state of a position
    pub fn motion(&self, position: u8) -> Result<Motion, ChainError<B::Error>> {
        Ok(self.motion[self.index(position)?])
    }

    /// Record direction and enable state; queues nothing by itself
    pub fn set_motion(&mut self, position: u8, motion: Motion) -> Result<(), ChainError<B::Error>> {
        let index = self.index(position)?;
        self.motion[index] = motion;
        Ok(())
    }

    /// Check if any command waits for a pass
    pub fn has_queued(&self) -> bool {
        self.queued[..self.len].iter().any(Option::is_some)
    }

    /// Send queued commands now, if there are any
    pub fn flush(&mut self) -> Result<(), ChainError<B::Error>> {
        if self.has_queued() {
            self.pass(None)?;
        }
        Ok(())
    }

    /// Clock `byte` into one position and return what it shifted out
    ///
    /// If that position has a queued command it is sent on a pass of its
    /// own first, so nothing queued is overwritten.
    pub fn exchange(&mut self, position: u8, byte: u8) -> Result<u8, ChainError<B::Error>> {
        let index = self.index(position)?;
        if self.queued[index].is_some() {
            self.pass(None)?;
        }
        self.pass(Some((index, byte)))
    }

    fn pass(&mut self, target: Option<(usize, u8)>) -> Result<u8, ChainError<B::Error>> {
        let mut frame = [NOP; MAX_CHAIN_LEN];
        for (slot, queued) in frame.iter_mut().zip(self.queued.iter_mut()) {
            if let Some(command) = queued.take() {
                *slot = command;
            }
        }
        if let Some((index, byte)) = target {
            frame[index] = byte;
        }

        self.cs.set_low();
        let result = self.spi.transfer_in_place(&mut frame[..self.len]);
        self.cs.set_high();
        result.map_err(ChainError::Spi)?;

        Ok(target.map_or(NOP, |(index, _)| frame[index]))
    }

    /// Access the underlying bus
    pub fn spi_mut(&mut self) -> &mut B {
        &mut self.spi
    }
}

/// Send a multi-byte command to one position, one byte per pass
///
/// The bus is locked for one pass at a time, so the step ISR can slip its
/// own pass in between. `rx[i]` receives the byte shifted out on pass `i`,
/// i.e. the answer to `tx[i - 1]`.
pub fn command<M: RawMutex, B: SpiBus, CS: OutputPin>(
    bus: &SharedBus<M, DaisyChain<B, CS>>,
    position: u8,
    tx: &[u8],
    rx: &mut [u8],
) -> Result<(), ChainError<B::Error>> {
    for (out, inbound) in tx.iter().zip(rx.iter_mut()) {
        *inbound = with_bus(bus, |chain| chain.exchange(position, *out))?;
    }
    Ok(())
}

/// Issue a command twice and keep the second reply
///
/// The chip answers a read with the state latched when the command
/// arrived; the second round reflects anything the first one changed.
pub fn read_fresh<M: RawMutex, B: SpiBus, CS: OutputPin>(
    bus: &SharedBus<M, DaisyChain<B, CS>>,
    position: u8,
    tx: &[u8],
    rx: &mut [u8],
) -> Result<(), ChainError<B::Error>> {
    command(bus, position, tx, rx)?;
    command(bus, position, tx, rx)
}
