//! SPI register link (TMC2130 / TMC2160 / TMC5130 / TMC5160)
//!
//! Every access is a 40-bit datagram: one address byte (bit 7 set for a
//! write) and 32 data bits, MSB first. A read returns its data on the
//! *next* datagram, so reads send the request twice and keep the second
//! reply. The first byte of every reply is SPI_STATUS.

use embassy_sync::blocking_mutex::raw::RawMutex;
use stepguard_hal::gpio::OutputPin;
use stepguard_hal::spi::SpiBus;

use super::{with_bus, RegisterLink, SharedBus};

const WRITE: u8 = 0x80;

/// SPI link errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TmcSpiError<E> {
    Spi(E),
}

/// Register link to one chip with its own chip-select on a shared bus
pub struct TmcSpiLink<'a, M: RawMutex, B, CS> {
    bus: &'a SharedBus<M, B>,
    cs: CS,
    last_status: u8,
}

impl<'a, M: RawMutex, B: SpiBus, CS: OutputPin> TmcSpiLink<'a, M, B, CS> {
    pub fn new(bus: &'a SharedBus<M, B>, mut cs: CS) -> Self {
        cs.set_high();
        Self {
            bus,
            cs,
            last_status: 0,
        }
    }

    /// SPI_STATUS byte of the last datagram
    pub fn last_status(&self) -> u8 {
        self.last_status
    }

    fn datagram(&mut self, address: u8, value: u32) -> Result<u32, TmcSpiError<B::Error>> {
        let mut frame = [0u8; 5];
        frame[0] = address;
        frame[1..].copy_from_slice(&value.to_be_bytes());

        let cs = &mut self.cs;
        let result = with_bus(self.bus, |spi| {
            cs.set_low();
            let result = spi.transfer_in_place(&mut frame);
            cs.set_high();
            result
        });
        result.map_err(TmcSpiError::Spi)?;

        self.last_status = frame[0];
        Ok(u32::from_be_bytes([frame[1], frame[2], frame[3], frame[4]]))
    }
}

impl<M: RawMutex, B: SpiBus, CS: OutputPin> RegisterLink for TmcSpiLink<'_, M, B, CS> {
    type Error = TmcSpiError<B::Error>;

    fn read_register(&mut self, reg: u8) -> Result<u32, Self::Error> {
        let reg = reg & !WRITE;
        self.datagram(reg, 0)?;
        self.datagram(reg, 0)
    }

    fn write_register(&mut self, reg: u8, value: u32) -> Result<(), Self::Error> {
        self.datagram(reg | WRITE, value).map(|_| ())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::mock::MockPin;
    use crate::transport::shared;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use heapless::Vec;

    /// One TMC SPI chip; replies carry the data latched by the previous
    /// datagram
    pub(crate) struct SimTmcSpi {
        pub regs: [u32; 128],
        pending: u32,
        pub status_byte: u8,
        pub writes: Vec<(u8, u32), 32>,
        pub fail: bool,
    }

    impl SimTmcSpi {
        pub fn new() -> Self {
            Self {
                regs: [0; 128],
                pending: 0,
                status_byte: 0x08,
                writes: Vec::new(),
                fail: false,
            }
        }
    }

    impl SpiBus for SimTmcSpi {
        type Error = ();

        fn transfer_in_place(&mut self, data: &mut [u8]) -> Result<(), ()> {
            if self.fail {
                return Err(());
            }
            let address = data[0];
            let value = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
            let reply = self.pending;

            let reg = (address & 0x7F) as usize;
            if address & WRITE != 0 {
                self.regs[reg] = value;
                let _ = self.writes.push((address & 0x7F, value));
                self.pending = value;
            } else {
                self.pending = self.regs[reg];
            }

            data[0] = self.status_byte;
            data[1..5].copy_from_slice(&reply.to_be_bytes());
            Ok(())
        }
    }

    #[test]
    fn test_read_is_synchronous() {
        let bus = shared::<NoopRawMutex, _>(SimTmcSpi::new());
        let mut link = TmcSpiLink::new(&bus, MockPin::default());

        with_bus(&bus, |spi| spi.regs[0x6F] = 0x8000_0000);
        assert_eq!(link.read_register(0x6F), Ok(0x8000_0000));
        assert_eq!(link.last_status(), 0x08);
    }

    #[test]
    fn test_write_sets_address_bit() {
        let bus = shared::<NoopRawMutex, _>(SimTmcSpi::new());
        let mut link = TmcSpiLink::new(&bus, MockPin::default());

        link.write_register(0x10, 0x0007_1005).unwrap();
        with_bus(&bus, |spi| {
            assert_eq!(spi.writes.as_slice(), &[(0x10, 0x0007_1005)]);
        });
    }

    #[test]
    fn test_error_releases_chip_select() {
        let bus = shared::<NoopRawMutex, _>(SimTmcSpi::new());
        let mut link = TmcSpiLink::new(&bus, MockPin::default());

        with_bus(&bus, |spi| spi.fail = true);
        assert_eq!(link.read_register(0x6F), Err(TmcSpiError::Spi(())));
        assert!(link.cs.high);
    }
}
