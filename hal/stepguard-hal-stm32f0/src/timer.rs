//! Compare timer binding on STM32F0 TIM3
//!
//! TIM3 is a 16-bit general purpose timer with four compare channels fed
//! from the 48 MHz APB timer clock. The three roles share the counter, so
//! they share the prescaler too: /24 gives a 2 MHz tick and a 32.7 ms wrap.

use embassy_stm32::pac;
use embassy_stm32::pac::timer::TimGp16;
use static_assertions::const_assert;
use stepguard_hal::timer::{CompareTimer, TimerBinding, TimerChannel, TimerRegisters};

/// TIM3 prescaler shared by all roles
pub const TIM3_PRESCALER: u32 = 24;

/// Role map for STM32F0
pub const STM32F0_TIMERS: TimerBinding = TimerBinding {
    source_hz: 48_000_000,
    counter_bits: 16,
    channels_per_timer: 4,
    roles: [
        // Step
        Some(TimerChannel::new(3, 0, TIM3_PRESCALER)),
        // Temperature
        Some(TimerChannel::new(3, 1, TIM3_PRESCALER)),
        // Tone
        Some(TimerChannel::new(3, 2, TIM3_PRESCALER)),
    ],
};

const_assert!(STM32F0_TIMERS.is_valid());

/// Raw TIM3 register access
#[derive(Debug, Clone, Copy, Default)]
pub struct Stm32f0TimerRegisters;

impl Stm32f0TimerRegisters {
    fn regs(&self) -> TimGp16 {
        pac::TIM3
    }
}

impl TimerRegisters for Stm32f0TimerRegisters {
    fn start_counter(&self, channel: TimerChannel) {
        let tim = self.regs();
        if tim.cr1().read().cen() {
            // Already running for another role
            return;
        }
        tim.psc().write_value((channel.prescaler - 1) as u16);
        tim.arr().write(|w| w.set_arr(u16::MAX));
        // Latch the prescaler
        tim.egr().write(|w| w.set_ug(true));
        tim.sr().write_value(Default::default());
        tim.cr1().modify(|w| w.set_cen(true));
    }

    fn counter(&self, _timer: u8) -> u32 {
        self.regs().cnt().read().cnt() as u32
    }

    fn compare(&self, channel: TimerChannel) -> u32 {
        self.regs().ccr(channel.channel as usize).read().ccr() as u32
    }

    fn set_compare(&self, channel: TimerChannel, value: u32) {
        self.regs()
            .ccr(channel.channel as usize)
            .write(|w| w.set_ccr(value as u16));
    }

    fn set_interrupt(&self, channel: TimerChannel, enabled: bool) {
        self.regs()
            .dier()
            .modify(|w| w.set_ccie(channel.channel as usize, enabled));
    }

    fn interrupt_enabled(&self, channel: TimerChannel) -> bool {
        self.regs().dier().read().ccie(channel.channel as usize)
    }

    fn clear_pending(&self, channel: TimerChannel) {
        self.regs()
            .sr()
            .modify(|w| w.set_ccif(channel.channel as usize, false));
    }
}

/// The STM32F0 hardware timer
pub type Stm32f0Timer = CompareTimer<Stm32f0TimerRegisters>;

/// Create the STM32F0 hardware timer
pub const fn hardware_timer() -> Stm32f0Timer {
    CompareTimer::new(Stm32f0TimerRegisters, STM32F0_TIMERS)
}
