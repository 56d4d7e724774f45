//! Board description
//!
//! Everything here is generated by build.rs from `board.toml`: the channel
//! list, monitor tuning, and constructors for the buses the board wires
//! up. Boards without a bus get a constructor that returns `None`.

use embassy_rp::peripherals;
use embassy_rp::spi::{self, Blocking, Spi};
use embassy_rp::uart::{self, Uart};
use stepguard_core::config::{
    Axis, ChainSlot, ChannelConfig, ChannelSettings, DriverFamily, MonitorPolicy, PinConfig,
};
use stepguard_hal::spi::SpiConfig;
use stepguard_hal_rp2040::pins::{BusPeripherals, PinBankPeripherals};
use stepguard_hal_rp2040::spi::embassy_config;
use stepguard_hal_rp2040::uart::UartId;

include!(concat!(env!("OUT_DIR"), "/board.rs"));

fn uart_config(baudrate: u32) -> uart::Config {
    let mut config = uart::Config::default();
    config.baudrate = baudrate;
    config
}

fn spi_config(frequency: u32) -> spi::Config {
    embassy_config(&SpiConfig {
        frequency,
        ..SpiConfig::default()
    })
}
