//! Direction lines
//!
//! The step ISR changes direction without touching a channel arena. DIR
//! pins live in a per-axis table here; the adapters get a [`DirLine`]
//! handle into the same table, and every write locks it for one pin write.
//! Daisy-chained axes are routed to their chain position instead, where a
//! direction change costs one bus pass.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use portable_atomic::{AtomicU32, Ordering};
use stepguard_core::config::Axis;
use stepguard_drivers::driver::l64xx;
use stepguard_hal::gpio::OutputPin;

use crate::channels::{ChainBus, Cs, Pin, CHAIN_LOCK};

enum Route {
    Unwired,
    Pin(Pin),
    Chain { bus: &'static ChainBus, position: u8 },
}

struct Line {
    route: Route,
    /// Channel inversion, DIR pin polarity folded in
    invert: bool,
}

const UNWIRED: Line = Line {
    route: Route::Unwired,
    invert: false,
};

static LINES: Mutex<Cs, RefCell<[Line; Axis::ALL.len()]>> = Mutex::new(RefCell::new([UNWIRED; Axis::ALL.len()]));

/// Chain passes from the step ISR that failed since the last report
static CHAIN_FAILURES: AtomicU32 = AtomicU32::new(0);

/// Hand an axis's DIR pin to the table; the adapter gets the handle back
pub fn attach_pin(axis: Axis, pin: Pin, invert: bool) -> DirLine {
    LINES.lock(|lines| {
        lines.borrow_mut()[axis.index()] = Line {
            route: Route::Pin(pin),
            invert,
        }
    });
    DirLine(axis)
}

/// Route an axis's direction to its daisy-chain position
pub fn attach_chain(axis: Axis, bus: &'static ChainBus, position: u8, invert: bool) {
    LINES.lock(|lines| {
        lines.borrow_mut()[axis.index()] = Line {
            route: Route::Chain { bus, position },
            invert,
        }
    });
}

/// Set an axis direction from the step ISR
pub fn set(axis: Axis, forward: bool) {
    let chain = LINES.lock(|lines| {
        let mut lines = lines.borrow_mut();
        let line = &mut lines[axis.index()];
        let level = forward != line.invert;
        match &mut line.route {
            Route::Unwired => None,
            Route::Pin(pin) => {
                pin.set_state(level);
                None
            }
            Route::Chain { bus, position } => Some((*bus, *position, level)),
        }
    });

    if let Some((bus, position, level)) = chain {
        // A sweep in progress drops whatever it read around this pass
        CHAIN_LOCK.request();
        if l64xx::set_direction_at(bus, position, level).is_err() {
            CHAIN_FAILURES.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Take the failure count, resetting it
pub fn take_chain_failures() -> u32 {
    CHAIN_FAILURES.swap(0, Ordering::Relaxed)
}

/// DIR pin handle held by an adapter
pub struct DirLine(Axis);

impl DirLine {
    fn write(&self, high: bool) {
        LINES.lock(|lines| {
            if let Route::Pin(pin) = &mut lines.borrow_mut()[self.0.index()].route {
                pin.set_state(high);
            }
        });
    }
}

impl OutputPin for DirLine {
    fn set_high(&mut self) {
        self.write(true);
    }

    fn set_low(&mut self) {
        self.write(false);
    }

    fn is_set_high(&self) -> bool {
        LINES.lock(|lines| match &lines.borrow()[self.0.index()].route {
            Route::Pin(pin) => pin.is_set_high(),
            _ => false,
        })
    }
}
