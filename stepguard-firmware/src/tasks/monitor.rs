//! Fault monitor task
//!
//! Wakes on a ticker, lets the monitor decide whether a sweep is due, and
//! sweeps the arenas with status, locking an arena for one channel at a
//! time. The arena locks never mask interrupts; only the chain bus does,
//! for one pass. Between ticks it serves maintenance requests.
//!
//! On a fatal fault every channel is shut down and the step interrupt is
//! masked; only a reset recovers.

use core::cell::RefCell;

use defmt::{error, info, warn, Display2Format};
use embassy_futures::select::{select, Either};
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant, Ticker};
use stepguard_core::arena::ChannelArena;
use stepguard_core::maintenance::{self, MaintenanceCommand, MaintenanceError, MaintenanceReply};
use stepguard_core::safety::{BusLock, ChannelOutcome, FatalHalt, FaultMonitor, SweepOutcome};
use stepguard_core::traits::StepperDriver;

use crate::channels::{
    Thread, CHAIN_CHANNELS, CHAIN_LOCK, GPIO_CHANNELS, MAINTENANCE_REPLIES, MAINTENANCE_REQUESTS, QUIET_LOCK,
    SPI_CHANNELS, UART_CHANNELS,
};
use crate::diag::DefmtSink;
use crate::{direction, step};

/// Ticker period; sweeps run at the policy period on top of it
const TICK_MS: u64 = 100;

type Shared<A> = Mutex<Thread, RefCell<A>>;

/// Fault monitor task
#[embassy_executor::task]
pub async fn monitor_task(mut monitor: FaultMonitor) {
    info!(
        "Fault monitor started: {}ms period, auto throttle {}",
        monitor.policy().period_ms,
        monitor.auto_throttle()
    );

    let mut sink = DefmtSink;
    let mut ticker = Ticker::every(Duration::from_millis(TICK_MS));
    let start = Instant::now();

    loop {
        match select(ticker.next(), MAINTENANCE_REQUESTS.receive()).await {
            Either::First(()) => {
                let failures = direction::take_chain_failures();
                if failures > 0 {
                    warn!("{} daisy-chain direction passes failed in the step ISR", failures);
                }
                let now_ms = start.elapsed().as_millis() as u32;
                if !monitor.due(now_ms) {
                    continue;
                }
                if let Err(halt) = sweep_all(&mut monitor, &mut sink) {
                    halt_machine(halt);
                    return;
                }
            }
            Either::Second(command) => {
                let reply = maintain(&mut monitor, command);
                match &reply {
                    Ok(r) => info!("{}", Display2Format(r)),
                    Err(e) => warn!("Maintenance command failed: {}", e),
                }
                if MAINTENANCE_REPLIES.try_send(reply).is_err() {
                    warn!("Maintenance reply dropped, nobody is reading");
                }
            }
        }
    }
}

fn sweep_all(monitor: &mut FaultMonitor, sink: &mut DefmtSink) -> Result<(), FatalHalt> {
    // GPIO channels have no status to read
    for outcome in [
        sweep_arena(monitor, &UART_CHANNELS, &QUIET_LOCK, sink)?,
        sweep_arena(monitor, &SPI_CHANNELS, &QUIET_LOCK, sink)?,
        sweep_arena(monitor, &CHAIN_CHANNELS, &CHAIN_LOCK, sink)?,
    ] {
        if let SweepOutcome::Aborted { polled } = outcome {
            defmt::debug!("Sweep yielded to the step ISR after {} channels", polled);
        }
    }
    Ok(())
}

/// Sweep one arena, holding its lock for one channel at a time
fn sweep_arena<D: StepperDriver, const N: usize>(
    monitor: &mut FaultMonitor,
    arena: &Shared<ChannelArena<D, N>>,
    lock: &BusLock,
    sink: &mut DefmtSink,
) -> Result<SweepOutcome, FatalHalt> {
    let len = arena.lock(|a| a.borrow().len());
    if len == 0 {
        return Ok(SweepOutcome::Completed { polled: 0 });
    }

    lock.begin_sweep();
    let mut polled = 0u8;
    let mut result = Ok(SweepOutcome::Completed { polled: 0 });
    for index in 0..len {
        let outcome = arena.lock(|a| match a.borrow_mut().by_index_mut(index) {
            Some(ch) => monitor.poll_channel(ch, lock, sink),
            None => Ok(ChannelOutcome::Unmonitored),
        });
        match outcome {
            Ok(ChannelOutcome::Polled(_)) => polled = polled.saturating_add(1),
            Ok(ChannelOutcome::Unmonitored) => {}
            Ok(ChannelOutcome::Aborted) => {
                result = Ok(SweepOutcome::Aborted { polled });
                break;
            }
            Err(halt) => {
                result = Err(halt);
                break;
            }
        }
        result = Ok(SweepOutcome::Completed { polled });
    }
    lock.end_sweep();
    result
}

/// Run a maintenance command on whichever arena holds its axis
fn maintain(
    monitor: &mut FaultMonitor,
    command: MaintenanceCommand,
) -> Result<MaintenanceReply, MaintenanceError> {
    let Some(axis) = command.axis() else {
        // Monitor-wide commands; any arena will do
        return GPIO_CHANNELS.lock(|a| maintenance::execute(&mut a.borrow_mut(), monitor, command));
    };

    if let Some(reply) = maintain_in(&UART_CHANNELS, monitor, command) {
        return reply;
    }
    if let Some(reply) = maintain_in(&SPI_CHANNELS, monitor, command) {
        return reply;
    }
    if let Some(reply) = maintain_in(&CHAIN_CHANNELS, monitor, command) {
        return reply;
    }
    if let Some(reply) = maintain_in(&GPIO_CHANNELS, monitor, command) {
        return reply;
    }
    Err(MaintenanceError::UnknownAxis(axis))
}

fn maintain_in<D: StepperDriver, const N: usize>(
    arena: &Shared<ChannelArena<D, N>>,
    monitor: &mut FaultMonitor,
    command: MaintenanceCommand,
) -> Option<Result<MaintenanceReply, MaintenanceError>> {
    arena.lock(|a| match maintenance::execute(&mut a.borrow_mut(), monitor, command) {
        Err(MaintenanceError::UnknownAxis(_)) => None,
        reply => Some(reply),
    })
}

fn halt_machine(halt: FatalHalt) {
    step::stop();
    GPIO_CHANNELS.lock(|a| a.borrow_mut().shutdown_all());
    UART_CHANNELS.lock(|a| a.borrow_mut().shutdown_all());
    SPI_CHANNELS.lock(|a| a.borrow_mut().shutdown_all());
    CHAIN_CHANNELS.lock(|a| a.borrow_mut().shutdown_all());
    error!(
        "{}: fatal driver fault ({}), machine halted",
        halt.axis.label(),
        Display2Format(&halt.flags)
    );
}
