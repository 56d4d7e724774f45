//! Step pulse interrupt
//!
//! The external motion planner pushes [`StepEvent`]s into a single-producer
//! queue; the step-role compare interrupt (`TIMER_IRQ_1`) pops one per
//! firing, applies a direction change if there is one, pulses STEP and
//! schedules the next compare.
//!
//! Direction changes go through [`crate::direction`]; the ISR never locks a
//! channel arena. A change on a daisy chain costs one bus pass, made under
//! the chain's [`BusLock`](stepguard_core::safety::BusLock) so a sweep in
//! progress drops whatever it read around it.

use core::cell::RefCell;

use defmt::Format;
use embassy_rp::interrupt;
use embassy_rp::interrupt::InterruptExt;
use embassy_sync::blocking_mutex::Mutex;
use heapless::spsc::{Consumer, Producer, Queue};
use heapless::Vec;
use static_cell::StaticCell;
use stepguard_core::config::{Axis, MAX_CHANNELS};
use stepguard_hal::gpio::ActiveLevel;
use stepguard_hal::timer::{HardwareTimer, TimerRole};
use stepguard_hal_rp2040::timer::{hardware_timer, Rp2040Timer};

use crate::channels::{Cs, Pin};
use crate::direction;

/// Queue slots (one is kept free by the ring buffer)
pub const STEP_QUEUE_LEN: usize = 64;

/// Compare period while the queue is empty
const IDLE_INTERVAL_US: u32 = 1_000;

/// Closest a compare may be placed to the live count
const MIN_INTERVAL_US: u32 = 2;

/// STEP high time in core cycles (about 2 us at 125 MHz)
const PULSE_CYCLES: u32 = 250;

/// One step for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Format)]
pub struct StepEvent {
    pub axis: Axis,
    pub forward: bool,
    /// Time from this step to the next one
    pub interval_us: u32,
}

pub type StepPins = Vec<(Axis, ActiveLevel<Pin>), MAX_CHANNELS>;

pub static TIMER: Rp2040Timer = hardware_timer();

static QUEUE: StaticCell<Queue<StepEvent, STEP_QUEUE_LEN>> = StaticCell::new();
static PRODUCER: Mutex<Cs, RefCell<Option<Producer<'static, StepEvent, STEP_QUEUE_LEN>>>> =
    Mutex::new(RefCell::new(None));
static CONSUMER: Mutex<Cs, RefCell<Option<Consumer<'static, StepEvent, STEP_QUEUE_LEN>>>> =
    Mutex::new(RefCell::new(None));
static STEP_PINS: Mutex<Cs, RefCell<StepPins>> = Mutex::new(RefCell::new(Vec::new()));
static DIRECTIONS: Mutex<Cs, RefCell<[Option<bool>; Axis::ALL.len()]>> =
    Mutex::new(RefCell::new([None; Axis::ALL.len()]));

/// Hand the STEP pins to the ISR and set up the event queue
pub fn init(step_pins: StepPins) {
    let (producer, consumer) = QUEUE.init(Queue::new()).split();
    PRODUCER.lock(|p| *p.borrow_mut() = Some(producer));
    CONSUMER.lock(|c| *c.borrow_mut() = Some(consumer));
    STEP_PINS.lock(|p| *p.borrow_mut() = step_pins);
}

/// Arm the step compare and unmask its interrupt
pub fn start() {
    TIMER.start(TimerRole::Step, 1_000_000 / IDLE_INTERVAL_US);
    interrupt::TIMER_IRQ_1.unpend();
    // SAFETY: the handler below only touches state behind critical sections
    unsafe { interrupt::TIMER_IRQ_1.enable() };
}

/// Stop issuing steps
pub fn stop() {
    TIMER.disable_interrupt(TimerRole::Step);
    interrupt::TIMER_IRQ_1.disable();
}

/// Queue a step for the ISR
///
/// Called by the motion planner. Gives the event back when the queue is
/// full or the ISR is not set up yet.
#[allow(dead_code)] // Entry point for the external motion planner
pub fn submit(event: StepEvent) -> Result<(), StepEvent> {
    PRODUCER.lock(|p| match p.borrow_mut().as_mut() {
        Some(producer) => producer.enqueue(event),
        None => Err(event),
    })
}

#[interrupt]
fn TIMER_IRQ_1() {
    TIMER.acknowledge(TimerRole::Step);
    let ticks_per_us = TIMER.ticks_per_us(TimerRole::Step);

    let event = CONSUMER.lock(|c| c.borrow_mut().as_mut().and_then(|c| c.dequeue()));
    let interval_us = match event {
        Some(event) => {
            apply_direction(event.axis, event.forward);
            pulse(event.axis);
            event.interval_us
        }
        None => IDLE_INTERVAL_US,
    };

    // Intervals past half the counter range are cut short
    TIMER.advance(TimerRole::Step, interval_us.saturating_mul(ticks_per_us));
    TIMER.restrain(TimerRole::Step, MIN_INTERVAL_US * ticks_per_us);
}

fn apply_direction(axis: Axis, forward: bool) {
    let changed = DIRECTIONS.lock(|d| {
        let slot = &mut d.borrow_mut()[axis.index()];
        let changed = *slot != Some(forward);
        *slot = Some(forward);
        changed
    });
    if !changed {
        return;
    }

    direction::set(axis, forward);
}

fn pulse(axis: Axis) {
    STEP_PINS.lock(|pins| {
        if let Some((_, pin)) = pins.borrow_mut().iter_mut().find(|(a, _)| *a == axis) {
            pin.assert(true);
            cortex_m::asm::delay(PULSE_CYCLES);
            pin.assert(false);
        }
    });
}
