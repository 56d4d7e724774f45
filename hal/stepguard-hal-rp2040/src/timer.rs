//! Compare timer binding on the RP2040 system timer
//!
//! The TIMER peripheral is a single 64-bit microsecond counter with four
//! 32-bit alarms matched against its low word. Alarm 0 belongs to the
//! embassy time driver; the remaining three carry the logical roles, each
//! with its own interrupt line (`TIMER_IRQ_1..3`).
//!
//! The tick source is the watchdog tick generator, fixed at 1 MHz by the
//! clock setup, so the prescaler is always 1 and `start_counter` has
//! nothing to program.

use embassy_rp::pac;
use static_assertions::const_assert;
use stepguard_hal::timer::{CompareTimer, TimerBinding, TimerChannel, TimerRegisters};

/// Role map for RP2040
pub const RP2040_TIMERS: TimerBinding = TimerBinding {
    source_hz: 1_000_000,
    counter_bits: 32,
    channels_per_timer: 4,
    roles: [
        // Step
        Some(TimerChannel::new(0, 1, 1)),
        // Temperature
        Some(TimerChannel::new(0, 2, 1)),
        // Tone
        Some(TimerChannel::new(0, 3, 1)),
    ],
};

const_assert!(RP2040_TIMERS.is_valid());

/// Raw TIMER register access
#[derive(Debug, Clone, Copy, Default)]
pub struct Rp2040TimerRegisters;

impl TimerRegisters for Rp2040TimerRegisters {
    fn start_counter(&self, _channel: TimerChannel) {}

    fn counter(&self, _timer: u8) -> u32 {
        pac::TIMER.timerawl().read()
    }

    fn compare(&self, channel: TimerChannel) -> u32 {
        pac::TIMER.alarm(channel.channel as usize).read()
    }

    fn set_compare(&self, channel: TimerChannel, value: u32) {
        // Writing the alarm register also arms it
        pac::TIMER.alarm(channel.channel as usize).write_value(value);
    }

    fn set_interrupt(&self, channel: TimerChannel, enabled: bool) {
        pac::TIMER
            .inte()
            .modify(|w| w.set_alarm(channel.channel as usize, enabled));
    }

    fn interrupt_enabled(&self, channel: TimerChannel) -> bool {
        pac::TIMER.inte().read().alarm(channel.channel as usize)
    }

    fn clear_pending(&self, channel: TimerChannel) {
        pac::TIMER
            .intr()
            .write(|w| w.set_alarm(channel.channel as usize, true));
    }
}

/// The RP2040 hardware timer
pub type Rp2040Timer = CompareTimer<Rp2040TimerRegisters>;

/// Create the RP2040 hardware timer
pub const fn hardware_timer() -> Rp2040Timer {
    CompareTimer::new(Rp2040TimerRegisters, RP2040_TIMERS)
}
