//! Single-wire UART register link (TMC2208 / TMC2209)
//!
//! # Protocol
//!
//! 8N1 at up to 500 kBaud on a shared single-wire bus:
//! - Sync byte: 0x05
//! - Slave address: 0-3 (MS1/MS2 pins)
//! - Register address, bit 7 set for writes
//! - Data (4 bytes, big-endian), writes only
//! - CRC8
//!
//! TX and RX are tied together, so every byte we send comes back as an
//! echo before the chip's reply.

use embassy_sync::blocking_mutex::raw::RawMutex;
use stepguard_hal::uart::{UartRx, UartTx};

use super::{with_bus, RegisterLink, SharedBus};

/// UART sync byte
const SYNC_BYTE: u8 = 0x05;

/// Address the chip uses for its replies
const MASTER_ADDRESS: u8 = 0xFF;

/// CRC8 over a datagram
///
/// Uses polynomial 0x07 (x^8 + x^2 + x + 1), bits fed LSB first.
pub fn crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        let mut current = byte;
        for _ in 0..8 {
            if ((crc >> 7) ^ (current & 0x01)) != 0 {
                crc = (crc << 1) ^ 0x07;
            } else {
                crc <<= 1;
            }
            current >>= 1;
        }
    }
    crc
}

/// Build a write datagram
pub fn build_write_datagram(addr: u8, reg: u8, data: u32) -> [u8; 8] {
    let mut datagram = [0u8; 8];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg | 0x80;
    datagram[3..7].copy_from_slice(&data.to_be_bytes());
    datagram[7] = crc8(&datagram[..7]);
    datagram
}

/// Build a read request datagram
pub fn build_read_request(addr: u8, reg: u8) -> [u8; 4] {
    let mut datagram = [0u8; 4];
    datagram[0] = SYNC_BYTE;
    datagram[1] = addr;
    datagram[2] = reg & 0x7F;
    datagram[3] = crc8(&datagram[..3]);
    datagram
}

/// Parse a read reply
///
/// The chip replies with sync, master address (0xFF), register, 4 data
/// bytes and CRC8.
pub fn parse_read_response(reg: u8, response: &[u8; 8]) -> Result<u32, TmcUartError> {
    if response[0] != SYNC_BYTE || response[1] != MASTER_ADDRESS {
        return Err(TmcUartError::InvalidSync);
    }
    if response[7] != crc8(&response[..7]) {
        return Err(TmcUartError::CrcMismatch);
    }
    if response[2] != reg & 0x7F {
        return Err(TmcUartError::WrongRegister);
    }
    Ok(u32::from_be_bytes([response[3], response[4], response[5], response[6]]))
}

/// UART link errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TmcUartError {
    /// UART peripheral reported an error
    Bus,
    /// Reply did not start with sync and master address
    InvalidSync,
    /// CRC mismatch
    CrcMismatch,
    /// Reply was for another register
    WrongRegister,
    /// Fewer bytes than expected before the line went idle
    Timeout,
}

/// Register link to one chip on a shared single-wire UART
pub struct TmcUartLink<'a, M: RawMutex, U> {
    bus: &'a SharedBus<M, U>,
    address: u8,
}

impl<'a, M: RawMutex, U: UartTx + UartRx> TmcUartLink<'a, M, U> {
    pub fn new(bus: &'a SharedBus<M, U>, address: u8) -> Self {
        Self {
            bus,
            address: address & 0x03,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }
}

fn send<U: UartTx + UartRx>(uart: &mut U, datagram: &[u8]) -> Result<(), TmcUartError> {
    uart.write_blocking(datagram).map_err(|_| TmcUartError::Bus)?;
    uart.flush().map_err(|_| TmcUartError::Bus)?;
    // Discard the echo
    let mut echo = [0u8; 8];
    receive(uart, &mut echo[..datagram.len()])
}

fn receive<U: UartRx>(uart: &mut U, buf: &mut [u8]) -> Result<(), TmcUartError> {
    let n = uart.read_blocking(buf).map_err(|_| TmcUartError::Bus)?;
    if n < buf.len() {
        return Err(TmcUartError::Timeout);
    }
    Ok(())
}

impl<M: RawMutex, U: UartTx + UartRx> RegisterLink for TmcUartLink<'_, M, U> {
    type Error = TmcUartError;

    fn read_register(&mut self, reg: u8) -> Result<u32, TmcUartError> {
        let request = build_read_request(self.address, reg);
        with_bus(self.bus, |uart| {
            send(uart, &request)?;
            let mut reply = [0u8; 8];
            receive(uart, &mut reply)?;
            parse_read_response(reg, &reply)
        })
    }

    fn write_register(&mut self, reg: u8, value: u32) -> Result<(), TmcUartError> {
        let datagram = build_write_datagram(self.address, reg, value);
        with_bus(self.bus, |uart| send(uart, &datagram))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::shared;
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use heapless::{Deque, Vec};

    /// Single-wire bus with TMC2209s behind it
    pub(crate) struct SimUart {
        /// Register files of the chips at addresses 0-3
        pub regs: [[u32; 128]; 4],
        pub present: [bool; 4],
        line: Deque<u8, 32>,
        pub writes: Vec<(u8, u8, u32), 32>,
        /// Corrupt the CRC of every reply
        pub corrupt: bool,
    }

    impl SimUart {
        pub fn with_chips(addresses: &[u8]) -> Self {
            let mut sim = Self {
                regs: [[0; 128]; 4],
                present: [false; 4],
                line: Deque::new(),
                writes: Vec::new(),
                corrupt: false,
            };
            for &a in addresses {
                sim.present[a as usize] = true;
            }
            sim
        }
    }

    impl UartTx for SimUart {
        type Error = ();

        fn write_blocking(&mut self, data: &[u8]) -> Result<(), ()> {
            for &b in data {
                let _ = self.line.push_back(b);
            }
            let addr = data[1] as usize;
            if data[0] != SYNC_BYTE || addr > 3 || !self.present[addr] {
                return Ok(());
            }
            if data.len() == 8 && data[2] & 0x80 != 0 && data[7] == crc8(&data[..7]) {
                let reg = data[2] & 0x7F;
                let value = u32::from_be_bytes([data[3], data[4], data[5], data[6]]);
                self.regs[addr][reg as usize] = value;
                let _ = self.writes.push((addr as u8, reg, value));
            } else if data.len() == 4 && data[3] == crc8(&data[..3]) {
                let reg = data[2];
                let mut reply = [0u8; 8];
                reply[0] = SYNC_BYTE;
                reply[1] = MASTER_ADDRESS;
                reply[2] = reg;
                reply[3..7].copy_from_slice(&self.regs[addr][reg as usize].to_be_bytes());
                reply[7] = crc8(&reply[..7]) ^ if self.corrupt { 0xFF } else { 0 };
                for b in reply {
                    let _ = self.line.push_back(b);
                }
            }
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ()> {
            Ok(())
        }
    }

    impl UartRx for SimUart {
        type Error = ();

        fn read_blocking(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
            let mut n = 0;
            for slot in buf.iter_mut() {
                match self.line.pop_front() {
                    Some(b) => {
                        *slot = b;
                        n += 1;
                    }
                    None => break,
                }
            }
            Ok(n)
        }
    }

    #[test]
    fn test_crc8_reference_datagram() {
        // Read request for GCONF at address 0 from the TMC2209 datasheet
        assert_eq!(build_read_request(0, 0x00), [0x05, 0x00, 0x00, 0x48]);
    }

    #[test]
    fn test_write_datagram() {
        let datagram = build_write_datagram(2, 0x00, 0x0000_01C0);
        assert_eq!(&datagram[..7], &[0x05, 0x02, 0x80, 0x00, 0x00, 0x01, 0xC0]);
        assert_eq!(datagram[7], crc8(&datagram[..7]));
    }

    #[test]
    fn test_parse_read_response() {
        let mut response = [SYNC_BYTE, MASTER_ADDRESS, 0x6F, 0x12, 0x34, 0x56, 0x78, 0];
        response[7] = crc8(&response[..7]);
        assert_eq!(parse_read_response(0x6F, &response), Ok(0x1234_5678));
        assert_eq!(
            parse_read_response(0x6C, &response),
            Err(TmcUartError::WrongRegister)
        );

        let mut bad_sync = response;
        bad_sync[0] = 0x00;
        assert_eq!(parse_read_response(0x6F, &bad_sync), Err(TmcUartError::InvalidSync));

        let mut bad_crc = response;
        bad_crc[7] ^= 0x01;
        assert_eq!(parse_read_response(0x6F, &bad_crc), Err(TmcUartError::CrcMismatch));
    }

    #[test]
    fn test_round_trip_through_echo() {
        let bus = shared::<NoopRawMutex, _>(SimUart::with_chips(&[1]));
        let mut link = TmcUartLink::new(&bus, 1);

        link.write_register(0x10, 0x0006_0A05).unwrap();
        assert_eq!(link.read_register(0x10), Ok(0x0006_0A05));
    }

    #[test]
    fn test_absent_chip_times_out() {
        let bus = shared::<NoopRawMutex, _>(SimUart::with_chips(&[0]));
        let mut link = TmcUartLink::new(&bus, 3);
        assert_eq!(link.read_register(0x6F), Err(TmcUartError::Timeout));
    }

    #[test]
    fn test_corrupted_reply() {
        let bus = shared::<NoopRawMutex, _>(SimUart {
            corrupt: true,
            ..SimUart::with_chips(&[0])
        });
        let mut link = TmcUartLink::new(&bus, 0);
        assert_eq!(link.read_register(0x6F), Err(TmcUartError::CrcMismatch));
    }
}
