//! Board wiring
//!
//! Builds the buses the board uses, then one driver adapter per configured
//! channel, and fills the arenas in [`crate::channels`]. DIR pins and chain
//! positions are registered with [`crate::direction`] for the step ISR.
//! Every channel is configured and energized before the ISR starts.

use defmt::{info, warn, Debug2Format, Format};
use embassy_time::Duration;
use static_cell::StaticCell;
use stepguard_core::arena::Channel;
use stepguard_core::config::{Axis, ChannelConfig, ConfigError, DriverInterface, PinConfig};
use stepguard_drivers::driver::{GpioDriver, L64xxDriver, TmcDriver};
use stepguard_drivers::transport::{shared, DaisyChain, TmcSpiLink, TmcUartLink};
use stepguard_hal::gpio::ActiveLevel;
use stepguard_hal_rp2040::gpio::Rp2040Output;
use stepguard_hal_rp2040::pins::{BusPeripherals, PinBank, PinBankPeripherals, PinError};
use stepguard_hal_rp2040::spi::Rp2040Spi;
use stepguard_hal_rp2040::uart::SingleWireUart;

use crate::board;
use crate::channels::{
    ChainBus, Pin, TmcSpiBus, UartBus, CHAIN_CHANNELS, GPIO_CHANNELS, SPI_CHANNELS, UART_CHANNELS,
};
use crate::direction::{self, DirLine};
use crate::step::StepPins;

/// Longest wait for one byte on the single-wire UART
const UART_BYTE_TIMEOUT: Duration = Duration::from_millis(1);

static UART_BUS: StaticCell<UartBus> = StaticCell::new();
static SPI_BUS: StaticCell<TmcSpiBus> = StaticCell::new();
static CHAIN_BUS: StaticCell<ChainBus> = StaticCell::new();

/// Wiring errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub enum WiringError {
    /// Pin missing or already taken
    Pin(Axis, PinError),
    /// Daisy-chain select pin missing or already taken
    ChainSelect(PinError),
    /// The channel's bus is not wired on this board
    MissingBus(Axis),
    /// Channel rejected by its arena
    Config(ConfigError),
}

impl From<ConfigError> for WiringError {
    fn from(e: ConfigError) -> Self {
        WiringError::Config(e)
    }
}

struct Buses {
    uart: Option<&'static UartBus>,
    spi: Option<&'static TmcSpiBus>,
    chain: Option<&'static ChainBus>,
}

/// Build every channel of the board
///
/// Returns the STEP pins for the step ISR.
pub fn build(mut pins: PinBankPeripherals, mut peripherals: BusPeripherals) -> Result<StepPins, WiringError> {
    // Bus pins need their concrete types, so they leave before the bank forms
    let uart = board::take_uart(&mut pins, &mut peripherals);
    let spi = board::take_tmc_spi(&mut pins, &mut peripherals);
    let chain_spi = board::take_chain_spi(&mut pins, &mut peripherals);
    let mut bank = PinBank::new(&mut pins);

    let mut buses = Buses {
        uart: uart.map(|(uart, id)| &*UART_BUS.init(shared(SingleWireUart::new(uart, id, UART_BYTE_TIMEOUT)))),
        spi: spi.map(|spi| &*SPI_BUS.init(shared(Rp2040Spi::new(spi)))),
        chain: None,
    };
    if let (Some(spi), Some(cs)) = (chain_spi, board::CHAIN_CS) {
        let cs = bank.take(cs).map_err(WiringError::ChainSelect)?;
        let cs = Rp2040Output::new(cs, true);
        let chain = DaisyChain::new(Rp2040Spi::new(spi), cs, board::CHAIN_LEN);
        buses.chain = Some(&*CHAIN_BUS.init(shared(chain)));
    }

    let mut step_pins = StepPins::new();
    for config in board::CHANNELS.iter() {
        let active_low = config.step_pin.inverted;
        let mut step = ActiveLevel::new(output(&mut bank, config.axis, config.step_pin, active_low)?, active_low);
        step.assert(false);
        // Capacity matches the channel limit checked by build.rs
        let _ = step_pins.push((config.axis, step));

        add_channel(config, &mut bank, &buses)?;
        info!("{}: {} ready", config.axis.label(), config.family.name());
    }

    configure_all();
    Ok(step_pins)
}

fn output(bank: &mut PinBank, axis: Axis, pin: PinConfig, initial_high: bool) -> Result<Pin, WiringError> {
    let pin = bank.take(pin.pin).map_err(|e| WiringError::Pin(axis, e))?;
    Ok(Rp2040Output::new(pin, initial_high))
}

/// DIR and EN outputs, with a DIR inversion folded into the channel
///
/// The DIR pin goes to the direction table; the adapter gets a handle.
fn dir_enable(bank: &mut PinBank, config: &mut ChannelConfig) -> Result<(DirLine, Pin, bool), WiringError> {
    let (Some(dir), Some(enable)) = (config.dir_pin, config.enable_pin) else {
        return Err(WiringError::Pin(config.axis, PinError::InvalidPin));
    };
    if dir.inverted {
        config.invert_direction = !config.invert_direction;
    }
    let dir = output(bank, config.axis, dir, false)?;
    let dir = direction::attach_pin(config.axis, dir, config.invert_direction);
    // Start released: high for active-low enables
    let en = output(bank, config.axis, enable, enable.inverted)?;
    Ok((dir, en, enable.inverted))
}

fn add_channel(config: &ChannelConfig, bank: &mut PinBank, buses: &Buses) -> Result<(), WiringError> {
    let mut config = config.clone();
    let axis = config.axis;
    let family = config.family;

    match family.interface() {
        DriverInterface::Gpio => {
            let (dir, en, active_low) = dir_enable(bank, &mut config)?;
            let driver = GpioDriver::new(family, dir, en, active_low);
            GPIO_CHANNELS.lock(|a| a.borrow_mut().push(Channel::new(&config, driver)))?;
        }
        DriverInterface::AddressedUart => {
            let bus = buses.uart.ok_or(WiringError::MissingBus(axis))?;
            let (dir, en, _) = dir_enable(bank, &mut config)?;
            let link = TmcUartLink::new(bus, config.address.unwrap_or(0));
            let driver = TmcDriver::new(family, link, dir, en);
            UART_CHANNELS.lock(|a| a.borrow_mut().push(Channel::new(&config, driver)))?;
        }
        DriverInterface::AddressedSpi => {
            let bus = buses.spi.ok_or(WiringError::MissingBus(axis))?;
            let cs_pin = config.cs_pin.ok_or(WiringError::Pin(axis, PinError::InvalidPin))?;
            let cs = output(bank, axis, cs_pin, true)?;
            let (dir, en, _) = dir_enable(bank, &mut config)?;
            let driver = TmcDriver::new(family, TmcSpiLink::new(bus, cs), dir, en);
            SPI_CHANNELS.lock(|a| a.borrow_mut().push(Channel::new(&config, driver)))?;
        }
        DriverInterface::DaisyChainSpi => {
            let bus = buses.chain.ok_or(WiringError::MissingBus(axis))?;
            let position = config.chain.map(|slot| slot.position).unwrap_or(0);
            direction::attach_chain(axis, bus, position, config.invert_direction);
            let driver = L64xxDriver::new(family, bus, position);
            CHAIN_CHANNELS.lock(|a| a.borrow_mut().push(Channel::new(&config, driver)))?;
        }
    }
    Ok(())
}

/// Push settings to every chip and energize the bridges
fn configure_all() {
    GPIO_CHANNELS.lock(|a| {
        let mut a = a.borrow_mut();
        a.configure_all();
        a.iter_mut().for_each(|ch| ch.enable(true));
    });
    UART_CHANNELS.lock(|a| {
        let mut a = a.borrow_mut();
        a.configure_all();
        a.iter_mut().for_each(|ch| ch.enable(true));
    });
    SPI_CHANNELS.lock(|a| {
        let mut a = a.borrow_mut();
        a.configure_all();
        a.iter_mut().for_each(|ch| ch.enable(true));
    });
    CHAIN_CHANNELS.lock(|a| {
        let mut a = a.borrow_mut();
        a.configure_all();
        a.iter_mut().for_each(|ch| ch.enable(true));
        // Enable commands ride on the next pass; send them now
        if let Some(ch) = a.iter().next() {
            if let Err(e) = ch.driver().flush() {
                warn!("Daisy chain did not take the enable commands: {}", Debug2Format(&e));
            }
        }
    });
}
