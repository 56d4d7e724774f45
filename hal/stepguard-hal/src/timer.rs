//! Hardware timer abstraction
//!
//! One start/compare/interrupt contract over incompatible MCU timer
//! peripherals. Each MCU family provides:
//!
//! - a `const` [`TimerBinding`] mapping logical roles to a physical
//!   (timer, channel, prescaler) triple, checked at build time with
//!   [`TimerBinding::is_valid`];
//! - a [`TimerRegisters`] implementation with raw register access.
//!
//! [`CompareTimer`] is the single implementation of [`HardwareTimer`] on top
//! of those two pieces, so the scheduling code above it never sees which
//! peripheral is underneath.
//!
//! Everything callable from an interrupt handler takes `&self`. A missed
//! compare is a motion-fidelity defect, not an error: [`HardwareTimer::restrain`]
//! is the only defence and nothing here returns `Result`.

/// Logical timer role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimerRole {
    /// Step pulse generation (the motion ISR)
    Step,
    /// Temperature sampling
    Temperature,
    /// Beeper tone generation
    Tone,
}

impl TimerRole {
    /// All roles in binding order
    pub const ALL: [TimerRole; 3] = [TimerRole::Step, TimerRole::Temperature, TimerRole::Tone];

    /// Index into [`TimerBinding::roles`]
    pub const fn index(self) -> usize {
        match self {
            TimerRole::Step => 0,
            TimerRole::Temperature => 1,
            TimerRole::Tone => 2,
        }
    }
}

/// Physical timer resource assigned to a role
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerChannel {
    /// Timer peripheral number
    pub timer: u8,
    /// Compare channel (or alarm) within the timer
    pub channel: u8,
    /// Input clock divisor (1 = undivided)
    pub prescaler: u32,
}

impl TimerChannel {
    /// Create a new timer channel assignment
    pub const fn new(timer: u8, channel: u8, prescaler: u32) -> Self {
        Self {
            timer,
            channel,
            prescaler,
        }
    }
}

/// Immutable role → timer map for one MCU family
#[derive(Debug, Clone, Copy)]
pub struct TimerBinding {
    /// Timer input clock in Hz (before the prescaler)
    pub source_hz: u32,
    /// Counter width in bits (16 or 32)
    pub counter_bits: u8,
    /// Compare channels available per timer
    pub channels_per_timer: u8,
    /// Assignment per role, indexed by [`TimerRole::index`]
    pub roles: [Option<TimerChannel>; 3],
}

impl TimerBinding {
    /// Timer channel bound to a role
    pub const fn channel(&self, role: TimerRole) -> Option<TimerChannel> {
        self.roles[role.index()]
    }

    /// Tick rate of a role in Hz (0 when the role is unbound)
    pub const fn tick_hz(&self, role: TimerRole) -> u32 {
        match self.channel(role) {
            Some(ch) if ch.prescaler > 0 => self.source_hz / ch.prescaler,
            _ => 0,
        }
    }

    /// Ticks per microsecond of a role
    ///
    /// Scheduling code converts step intervals with this constant and stays
    /// independent of the MCU family.
    pub const fn ticks_per_us(&self, role: TimerRole) -> u32 {
        self.tick_hz(role) / 1_000_000
    }

    /// Mask covering the counter width
    pub const fn counter_mask(&self) -> u32 {
        if self.counter_bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.counter_bits) - 1
        }
    }

    /// Longest distance a compare can be placed ahead of the count
    ///
    /// Further than half the range, [`is_behind`] reads the compare as
    /// lying behind the count.
    pub const fn max_interval_ticks(&self) -> u32 {
        self.counter_mask() >> 1
    }

    /// Check the binding for role shortages and conflicts
    ///
    /// Intended for a `const_assert!` next to each family's binding:
    /// - step and temperature roles must be bound
    /// - the step role must tick at least once per microsecond
    /// - prescalers are non-zero and channels exist on the timer
    /// - no two roles share a (timer, channel) pair
    /// - roles sharing a timer share its prescaler
    pub const fn is_valid(&self) -> bool {
        if self.channel(TimerRole::Step).is_none() || self.channel(TimerRole::Temperature).is_none() {
            return false;
        }
        if self.ticks_per_us(TimerRole::Step) == 0 {
            return false;
        }
        if self.counter_bits != 16 && self.counter_bits != 32 {
            return false;
        }

        let mut i = 0;
        while i < self.roles.len() {
            if let Some(a) = self.roles[i] {
                if a.prescaler == 0 || a.channel >= self.channels_per_timer {
                    return false;
                }
                let mut j = i + 1;
                while j < self.roles.len() {
                    if let Some(b) = self.roles[j] {
                        if a.timer == b.timer {
                            if a.channel == b.channel || a.prescaler != b.prescaler {
                                return false;
                            }
                        }
                    }
                    j += 1;
                }
            }
            i += 1;
        }
        true
    }
}

/// Raw register access for one MCU family
///
/// Implementations are thin wrappers over the peripheral registers. All
/// methods take `&self` because they are called from interrupt handlers.
pub trait TimerRegisters {
    /// Apply the prescaler, let the counter free-run over its full width
    fn start_counter(&self, channel: TimerChannel);

    /// Live counter value of a timer
    fn counter(&self, timer: u8) -> u32;

    /// Current compare value
    fn compare(&self, channel: TimerChannel) -> u32;

    /// Write the compare value
    fn set_compare(&self, channel: TimerChannel, value: u32);

    /// Gate the compare interrupt
    fn set_interrupt(&self, channel: TimerChannel, enabled: bool);

    /// Check if the compare interrupt is enabled
    fn interrupt_enabled(&self, channel: TimerChannel) -> bool;

    /// Clear a pending compare interrupt
    fn clear_pending(&self, channel: TimerChannel);
}

/// The timer contract consumed by the pulse scheduler
pub trait HardwareTimer {
    /// Configure a role to interrupt at approximately `frequency_hz`
    ///
    /// Called once per role at boot. Sets the prescaler, places the first
    /// compare one period ahead and enables the compare interrupt.
    fn start(&self, role: TimerRole, frequency_hz: u32);

    /// Live tick count of the role's timer
    fn get_count(&self, role: TimerRole) -> u32;

    /// Current compare value of the role
    fn get_compare(&self, role: TimerRole) -> u32;

    /// Set the compare value of the role
    fn set_compare(&self, role: TimerRole, value: u32);

    /// Move compare `interval_ticks` past its current value
    ///
    /// The interval is clamped to half the counter range.
    fn advance(&self, role: TimerRole, interval_ticks: u32);

    /// Push compare forward to `count + interval_ticks` if it lies behind
    ///
    /// Never moves compare earlier, so a slow handler cannot cause the next
    /// interrupt to be missed. The interval is clamped to half the counter
    /// range; a longer one would wrap and read as lying behind.
    fn restrain(&self, role: TimerRole, interval_ticks: u32);

    /// Enable the role's compare interrupt without reconfiguring the timer
    fn enable_interrupt(&self, role: TimerRole);

    /// Disable the role's compare interrupt without reconfiguring the timer
    fn disable_interrupt(&self, role: TimerRole);

    /// Check if the role's compare interrupt is enabled
    fn interrupt_enabled(&self, role: TimerRole) -> bool;

    /// Clear the role's pending interrupt (ISR prologue)
    fn acknowledge(&self, role: TimerRole);

    /// Ticks per microsecond of the role
    fn ticks_per_us(&self, role: TimerRole) -> u32;
}

/// `true` if `a` lies strictly behind `b` on a counter of the given width
///
/// Values are compared by forward distance, so the answer stays correct
/// across counter wrap as long as both are within half the range.
pub const fn is_behind(a: u32, b: u32, mask: u32) -> bool {
    let distance = b.wrapping_sub(a) & mask;
    distance != 0 && distance <= (mask >> 1)
}

/// [`HardwareTimer`] over any family's registers and binding
pub struct CompareTimer<R> {
    regs: R,
    binding: TimerBinding,
}

impl<R: TimerRegisters> CompareTimer<R> {
    /// Create a compare timer from registers and a validated binding
    pub const fn new(regs: R, binding: TimerBinding) -> Self {
        Self { regs, binding }
    }

    /// The binding this timer was built with
    pub fn binding(&self) -> &TimerBinding {
        &self.binding
    }

    /// Access the raw registers
    pub fn registers(&self) -> &R {
        &self.regs
    }

    /// Compare ticks for one period at `frequency_hz`
    ///
    /// Clamped to `1..=mask/2` so a compare is always reachable.
    pub fn period_ticks(&self, role: TimerRole, frequency_hz: u32) -> u32 {
        let tick_hz = self.binding.tick_hz(role);
        let ticks = tick_hz / frequency_hz.max(1);
        ticks.clamp(1, self.binding.max_interval_ticks())
    }
}

impl<R: TimerRegisters> HardwareTimer for CompareTimer<R> {
    fn start(&self, role: TimerRole, frequency_hz: u32) {
        let Some(ch) = self.binding.channel(role) else {
            return;
        };
        self.regs.set_interrupt(ch, false);
        self.regs.start_counter(ch);
        let first = self.regs.counter(ch.timer).wrapping_add(self.period_ticks(role, frequency_hz));
        self.regs.set_compare(ch, first & self.binding.counter_mask());
        self.regs.clear_pending(ch);
        self.regs.set_interrupt(ch, true);
    }

    fn get_count(&self, role: TimerRole) -> u32 {
        match self.binding.channel(role) {
            Some(ch) => self.regs.counter(ch.timer) & self.binding.counter_mask(),
            None => 0,
        }
    }

    fn get_compare(&self, role: TimerRole) -> u32 {
        match self.binding.channel(role) {
            Some(ch) => self.regs.compare(ch) & self.binding.counter_mask(),
            None => 0,
        }
    }

    fn set_compare(&self, role: TimerRole, value: u32) {
        if let Some(ch) = self.binding.channel(role) {
            self.regs.set_compare(ch, value & self.binding.counter_mask());
        }
    }

    fn advance(&self, role: TimerRole, interval_ticks: u32) {
        let Some(ch) = self.binding.channel(role) else {
            return;
        };
        let interval = interval_ticks.min(self.binding.max_interval_ticks());
        let next = self.regs.compare(ch).wrapping_add(interval);
        self.regs.set_compare(ch, next & self.binding.counter_mask());
    }

    fn restrain(&self, role: TimerRole, interval_ticks: u32) {
        let Some(ch) = self.binding.channel(role) else {
            return;
        };
        let mask = self.binding.counter_mask();
        let interval = interval_ticks.min(self.binding.max_interval_ticks());
        let min_compare = self.regs.counter(ch.timer).wrapping_add(interval) & mask;
        if is_behind(self.regs.compare(ch) & mask, min_compare, mask) {
            self.regs.set_compare(ch, min_compare);
        }
    }

    fn enable_interrupt(&self, role: TimerRole) {
        if let Some(ch) = self.binding.channel(role) {
            self.regs.set_interrupt(ch, true);
        }
    }

    fn disable_interrupt(&self, role: TimerRole) {
        if let Some(ch) = self.binding.channel(role) {
            self.regs.set_interrupt(ch, false);
        }
    }

    fn interrupt_enabled(&self, role: TimerRole) -> bool {
        self.binding
            .channel(role)
            .map(|ch| self.regs.interrupt_enabled(ch))
            .unwrap_or(false)
    }

    fn acknowledge(&self, role: TimerRole) {
        if let Some(ch) = self.binding.channel(role) {
            self.regs.clear_pending(ch);
        }
    }

    fn ticks_per_us(&self, role: TimerRole) -> u32 {
        self.binding.ticks_per_us(role)
    }
}
