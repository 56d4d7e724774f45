//! Channel arenas and the buses behind them
//!
//! One arena per adapter class. Only thread-mode code (wiring, the monitor
//! task) touches an arena, so they sit behind a thread-mode mutex and a
//! slow UART or SPI transaction never masks the step interrupt. The ISR
//! reaches direction lines through [`crate::direction`] and uses one bus,
//! the daisy chain; that bus alone keeps a critical-section mutex, held
//! for one pass at a time. [`CHAIN_LOCK`] tells the monitor to back off
//! the chain when the ISR has just used it.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::raw::{CriticalSectionRawMutex, ThreadModeRawMutex};
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::Channel as Queue;
use stepguard_core::arena::ChannelArena;
use stepguard_core::config::MAX_CHANNELS;
use stepguard_core::maintenance::{MaintenanceCommand, MaintenanceError, MaintenanceReply};
use stepguard_core::safety::BusLock;
use stepguard_drivers::driver::{GpioDriver, L64xxDriver, TmcDriver};
use stepguard_drivers::transport::daisy::MAX_CHAIN_LEN;
use stepguard_drivers::transport::{DaisyChain, SharedBus, TmcSpiLink, TmcUartLink};
use stepguard_hal_rp2040::gpio::Rp2040Output;
use stepguard_hal_rp2040::spi::Rp2040Spi;
use stepguard_hal_rp2040::uart::SingleWireUart;

use crate::board::{ChainPeripheral, TmcSpiPeripheral};
use crate::direction::DirLine;

/// Shared with the step ISR
pub type Cs = CriticalSectionRawMutex;
/// Thread mode only
pub type Thread = ThreadModeRawMutex;
pub type Pin = Rp2040Output<'static>;

pub type UartBus = SharedBus<Thread, SingleWireUart<'static>>;
pub type TmcSpiBus = SharedBus<Thread, Rp2040Spi<'static, TmcSpiPeripheral>>;
pub type ChainBus = SharedBus<Cs, DaisyChain<Rp2040Spi<'static, ChainPeripheral>, Pin>>;

/// TMC2208/TMC2209 slave addresses 0-3
pub const MAX_UART_CHANNELS: usize = 4;

pub type GpioArena = ChannelArena<GpioDriver<DirLine, Pin>, MAX_CHANNELS>;
pub type UartArena =
    ChannelArena<TmcDriver<TmcUartLink<'static, Thread, SingleWireUart<'static>>, DirLine, Pin>, MAX_UART_CHANNELS>;
pub type TmcSpiArena = ChannelArena<
    TmcDriver<TmcSpiLink<'static, Thread, Rp2040Spi<'static, TmcSpiPeripheral>, Pin>, DirLine, Pin>,
    MAX_CHANNELS,
>;
pub type ChainArena = ChannelArena<L64xxDriver<'static, Cs, Rp2040Spi<'static, ChainPeripheral>, Pin>, MAX_CHAIN_LEN>;

pub static GPIO_CHANNELS: Mutex<Thread, RefCell<GpioArena>> = Mutex::new(RefCell::new(ChannelArena::new()));
pub static UART_CHANNELS: Mutex<Thread, RefCell<UartArena>> = Mutex::new(RefCell::new(ChannelArena::new()));
pub static SPI_CHANNELS: Mutex<Thread, RefCell<TmcSpiArena>> = Mutex::new(RefCell::new(ChannelArena::new()));
pub static CHAIN_CHANNELS: Mutex<Thread, RefCell<ChainArena>> = Mutex::new(RefCell::new(ChannelArena::new()));

/// Raised by the step ISR around its chain passes
pub static CHAIN_LOCK: BusLock = BusLock::new();
/// For buses the ISR never uses; never requested
pub static QUIET_LOCK: BusLock = BusLock::new();

/// Maintenance requests from the command layer
pub static MAINTENANCE_REQUESTS: Queue<Cs, MaintenanceCommand, 4> = Queue::new();

/// Replies to maintenance requests, in request order
pub static MAINTENANCE_REPLIES: Queue<Cs, Result<MaintenanceReply, MaintenanceError>, 4> = Queue::new();
