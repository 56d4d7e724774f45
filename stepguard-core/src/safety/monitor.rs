//! Fault monitor and current remediation
//!
//! Polls every channel's status at a fixed cadence, tracks warning and
//! communication-loss streaks per channel, and throttles hold current so
//! a hot driver cools down without the machine stopping.
//!
//! Per channel the monitor is in one of four states, derived from its
//! [`MonitorRecord`]:
//!
//! ```text
//!            sentinel                        non-sentinel
//!   NORMAL ───────────▶ COMM_LOST(n) ───────────────────▶ NORMAL
//!     │  ▲                                 (reconfigure)
//!  TW │  │ healthy
//!     ▼  │
//!   WARNING(n) ── n reaches limit: hold -= step, n = 0
//!     │
//!  HiZ│TSD          thermal: hold -= 2 × step on entry
//!     ▼
//!   SHUTDOWN(thermal)
//! ```

use crate::arena::{Channel, ChannelArena};
use crate::config::{Axis, MonitorPolicy};
use crate::diag::{Diagnostic, DiagnosticSink};
use crate::status::{FaultFlags, StatusSnapshot};
use crate::traits::StepperDriver;

use super::arbitration::BusLock;

/// Per-channel monitor bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MonitorRecord {
    /// Consecutive thermal-warning polls since the last reduction
    pub otw_streak: u8,
    /// Sentinel polls since the loss was (last) reported, 0 when talking
    pub comm_streak: u16,
    /// Bridges were found in hi-Z on the last poll
    pub hi_z: bool,
    /// Last hi-Z or warning was thermal
    pub over_temp: bool,
    /// Thermal warning set on the last poll
    pub warning: bool,
    /// Thermal warning seen since the operator last cleared it
    pub prewarn_latched: bool,
}

impl MonitorRecord {
    /// Current state of the channel
    pub fn state(&self) -> ChannelState {
        if self.comm_streak > 0 {
            ChannelState::CommLost(self.comm_streak)
        } else if self.hi_z {
            ChannelState::Shutdown {
                thermal: self.over_temp,
            }
        } else if self.warning {
            // Streak is 0 right after a reduction while the chip stays hot
            ChannelState::Warning(self.otw_streak)
        } else {
            ChannelState::Normal
        }
    }

    /// Forget the latched pre-warning
    pub fn clear_prewarning(&mut self) {
        self.prewarn_latched = false;
    }

    /// Back to a healthy record; the pre-warning latch survives
    fn reset(&mut self) {
        *self = MonitorRecord {
            prewarn_latched: self.prewarn_latched,
            ..MonitorRecord::default()
        };
    }
}

/// Monitor state of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelState {
    Normal,
    Warning(u8),
    Shutdown { thermal: bool },
    CommLost(u16),
}

/// Fatal, non-resumable fault
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct FatalHalt {
    /// Axis that reported the fault
    pub axis: Axis,
    /// Categories on the halt list that were set
    pub flags: FaultFlags,
}

/// Result of one sweep request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SweepOutcome {
    /// Not due yet, or paused
    Skipped,
    /// Every channel polled
    Completed { polled: u8 },
    /// The ISR claimed the bus; remaining channels wait for the next sweep
    Aborted { polled: u8 },
}

/// Result of polling one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelOutcome {
    /// Status read and evaluated
    Polled(ChannelState),
    /// Chip has no status register
    Unmonitored,
    /// Abort requested before or during the read; nothing evaluated
    Aborted,
}

/// Driver fault monitor
#[derive(Debug, Clone)]
pub struct FaultMonitor {
    policy: MonitorPolicy,
    last_sweep_ms: Option<u32>,
    paused: bool,
    halted: Option<FatalHalt>,
}

impl Default for FaultMonitor {
    fn default() -> Self {
        Self::new(MonitorPolicy::default())
    }
}

impl FaultMonitor {
    /// Create a new fault monitor
    pub const fn new(policy: MonitorPolicy) -> Self {
        Self {
            policy,
            last_sweep_ms: None,
            paused: false,
            halted: None,
        }
    }

    pub fn policy(&self) -> &MonitorPolicy {
        &self.policy
    }

    /// Turn automatic current reduction on or off
    ///
    /// Faults are still reported while off.
    pub fn set_auto_throttle(&mut self, enabled: bool) {
        self.policy.auto_throttle = enabled;
    }

    pub fn auto_throttle(&self) -> bool {
        self.policy.auto_throttle
    }

    /// Stop sweeping (bus needed for something long, e.g. a maintenance dump)
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// The latched fatal fault, if any
    pub fn halted(&self) -> Option<FatalHalt> {
        self.halted
    }

    /// Check the cadence and claim the slot if a sweep is due
    ///
    /// Never sleeps; returns `false` while paused or halted.
    pub fn due(&mut self, now_ms: u32) -> bool {
        if self.paused || self.halted.is_some() {
            return false;
        }
        let due = match self.last_sweep_ms {
            None => true,
            Some(last) => now_ms.wrapping_sub(last) >= self.policy.period_ms,
        };
        if due {
            self.last_sweep_ms = Some(now_ms);
        }
        due
    }

    /// Sweep the arena if the period has elapsed
    pub fn poll<D: StepperDriver, S: DiagnosticSink, const N: usize>(
        &mut self,
        arena: &mut ChannelArena<D, N>,
        lock: &BusLock,
        now_ms: u32,
        sink: &mut S,
    ) -> Result<SweepOutcome, FatalHalt> {
        if let Some(halt) = self.halted {
            return Err(halt);
        }
        if !self.due(now_ms) {
            return Ok(SweepOutcome::Skipped);
        }
        self.sweep(arena, lock, sink)
    }

    /// Poll every channel of the arena once, regardless of cadence
    pub fn sweep<D: StepperDriver, S: DiagnosticSink, const N: usize>(
        &mut self,
        arena: &mut ChannelArena<D, N>,
        lock: &BusLock,
        sink: &mut S,
    ) -> Result<SweepOutcome, FatalHalt> {
        lock.begin_sweep();
        let result = self.sweep_locked(arena, lock, sink);
        lock.end_sweep();
        result
    }

    fn sweep_locked<D: StepperDriver, S: DiagnosticSink, const N: usize>(
        &mut self,
        arena: &mut ChannelArena<D, N>,
        lock: &BusLock,
        sink: &mut S,
    ) -> Result<SweepOutcome, FatalHalt> {
        let mut polled = 0u8;
        for ch in arena.iter_mut() {
            match self.poll_channel(ch, lock, sink)? {
                ChannelOutcome::Aborted => return Ok(SweepOutcome::Aborted { polled }),
                ChannelOutcome::Polled(_) => polled = polled.saturating_add(1),
                ChannelOutcome::Unmonitored => {}
            }
        }
        Ok(SweepOutcome::Completed { polled })
    }

    /// Poll a single channel inside a sweep
    ///
    /// For callers that lock the arena per channel: bracket the calls with
    /// [`BusLock::begin_sweep`] / [`BusLock::end_sweep`] and stop at the
    /// first [`ChannelOutcome::Aborted`].
    pub fn poll_channel<D: StepperDriver, S: DiagnosticSink>(
        &mut self,
        ch: &mut Channel<D>,
        lock: &BusLock,
        sink: &mut S,
    ) -> Result<ChannelOutcome, FatalHalt> {
        if lock.should_yield() {
            return Ok(ChannelOutcome::Aborted);
        }
        if !ch.family().has_status() {
            return Ok(ChannelOutcome::Unmonitored);
        }

        let snapshot = ch.driver_mut().poll_status();

        // The ISR may have used the bus during the read
        if lock.should_yield() {
            return Ok(ChannelOutcome::Aborted);
        }

        self.evaluate(ch, snapshot, sink)
            .map(ChannelOutcome::Polled)
    }

    /// Run the state machine on one decoded status read
    pub fn evaluate<D: StepperDriver, S: DiagnosticSink>(
        &mut self,
        ch: &mut Channel<D>,
        snapshot: StatusSnapshot,
        sink: &mut S,
    ) -> Result<ChannelState, FatalHalt> {
        let axis = ch.axis();

        if snapshot.is_comm_lost() {
            let record = &mut ch.record;
            if record.comm_streak == 0 {
                sink.report(axis, Diagnostic::CommLost);
                record.comm_streak = 1;
            } else {
                record.comm_streak = record.comm_streak.saturating_add(1);
                if record.comm_streak > self.policy.comm_reminder_polls {
                    sink.report(
                        axis,
                        Diagnostic::CommStillLost {
                            polls: record.comm_streak,
                        },
                    );
                    record.comm_streak = 1;
                }
            }
            return Ok(record.state());
        }

        if ch.record.comm_streak > 0 {
            // The chip may have power-cycled: start from a clean record and
            // push the whole configuration again
            ch.record.reset();
            sink.report(axis, Diagnostic::CommRestored);
            ch.configure();
            return Ok(ch.record.state());
        }

        let flags = snapshot.flags;

        let fatal = flags & self.policy.halt_on;
        if !fatal.is_empty() {
            let halt = FatalHalt { axis, flags: fatal };
            self.halted = Some(halt);
            sink.report(axis, Diagnostic::Halted { flags: fatal });
            return Err(halt);
        }

        self.evaluate_thermal(ch, flags, sink);
        report_informational(axis, flags, sink);
        Ok(ch.record.state())
    }

    fn evaluate_thermal<D: StepperDriver, S: DiagnosticSink>(
        &mut self,
        ch: &mut Channel<D>,
        flags: FaultFlags,
        sink: &mut S,
    ) {
        let axis = ch.axis();
        let step = self.policy.hold_step_ma;
        let shutdown = flags.intersects(FaultFlags::HI_Z | FaultFlags::THERMAL_SHUTDOWN);
        let warning = flags.contains(FaultFlags::THERMAL_WARNING);

        if !shutdown && !warning {
            ch.record.reset();
            return;
        }

        if shutdown {
            let thermal = flags.is_over_temperature();
            if !ch.record.hi_z {
                ch.record.hi_z = true;
                ch.record.over_temp = thermal;
                sink.report(axis, Diagnostic::Shutdown { thermal });
                if thermal && self.policy.auto_throttle {
                    let hold_ma = ch.reduce_hold_current(step.saturating_mul(2));
                    sink.report(axis, Diagnostic::HoldCurrentReduced { hold_ma });
                }
            }
        } else {
            ch.record.hi_z = false;
        }

        ch.record.warning = warning;
        if warning {
            ch.record.over_temp = true;
            ch.record.prewarn_latched = true;
            ch.record.otw_streak = ch.record.otw_streak.saturating_add(1);
            if ch.record.otw_streak == 1 {
                sink.report(axis, Diagnostic::ThermalWarning { streak: 1 });
            }
            if ch.record.otw_streak >= self.policy.warning_streak {
                if self.policy.auto_throttle {
                    let hold_ma = ch.reduce_hold_current(step);
                    sink.report(axis, Diagnostic::HoldCurrentReduced { hold_ma });
                } else {
                    sink.report(
                        axis,
                        Diagnostic::ThermalWarning {
                            streak: ch.record.otw_streak,
                        },
                    );
                }
                ch.record.otw_streak = 0;
            }
        } else {
            ch.record.otw_streak = 0;
        }
    }
}

fn report_informational<S: DiagnosticSink>(axis: Axis, flags: FaultFlags, sink: &mut S) {
    if flags.contains(FaultFlags::OVERCURRENT) {
        sink.report(axis, Diagnostic::Overcurrent);
    }
    if flags.intersects(FaultFlags::STALL) {
        sink.report(
            axis,
            Diagnostic::Stall {
                flags: flags & FaultFlags::STALL,
            },
        );
    }
    if flags.contains(FaultFlags::UNDERVOLTAGE) {
        sink.report(axis, Diagnostic::Undervoltage);
    }
    let command = flags & (FaultFlags::WRONG_COMMAND | FaultFlags::COMMAND_ERROR);
    if !command.is_empty() {
        sink.report(axis, Diagnostic::CommandError { flags: command });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::tests::{sim_channel, SimDriver};
    use crate::config::DriverFamily;
    use crate::diag::NullSink;
    use crate::status::StatusLayout;
    use heapless::Vec;
    use proptest::prelude::*;

    type Log = Vec<(Axis, Diagnostic), 64>;

    fn arena_of(channels: &[(Axis, DriverFamily)]) -> ChannelArena<SimDriver, 4> {
        let mut arena = ChannelArena::new();
        for &(axis, family) in channels {
            arena.push(sim_channel(axis, family, 1000)).unwrap();
        }
        arena
    }

    fn count(log: &Log, wanted: impl Fn(&Diagnostic) -> bool) -> usize {
        log.iter().filter(|(_, d)| wanted(d)).count()
    }

    #[test]
    fn test_cadence() {
        let mut arena = arena_of(&[(Axis::X, DriverFamily::L6470)]);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        let mut log = Log::new();

        assert_eq!(
            monitor.poll(&mut arena, &lock, 0, &mut log),
            Ok(SweepOutcome::Completed { polled: 1 })
        );
        assert_eq!(monitor.poll(&mut arena, &lock, 499, &mut log), Ok(SweepOutcome::Skipped));
        assert_eq!(
            monitor.poll(&mut arena, &lock, 500, &mut log),
            Ok(SweepOutcome::Completed { polled: 1 })
        );
        // One status transaction per channel per sweep
        assert_eq!(arena.get(Axis::X).unwrap().driver().reads, 2);
    }

    #[test]
    fn test_cadence_across_clock_wrap() {
        let mut monitor = FaultMonitor::default();
        assert!(monitor.due(u32::MAX - 100));
        assert!(!monitor.due(u32::MAX));
        assert!(monitor.due(400));
    }

    #[test]
    fn test_pause_skips_sweeps() {
        let mut arena = arena_of(&[(Axis::X, DriverFamily::L6470)]);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        monitor.pause();
        assert_eq!(monitor.poll(&mut arena, &lock, 0, &mut NullSink), Ok(SweepOutcome::Skipped));
        monitor.resume();
        assert!(matches!(
            monitor.poll(&mut arena, &lock, 0, &mut NullSink),
            Ok(SweepOutcome::Completed { .. })
        ));
    }

    #[test]
    fn test_gpio_channels_are_not_polled() {
        let mut arena = arena_of(&[(Axis::X, DriverFamily::A4988), (Axis::Y, DriverFamily::Tmc2209)]);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        assert_eq!(
            monitor.sweep(&mut arena, &lock, &mut NullSink),
            Ok(SweepOutcome::Completed { polled: 1 })
        );
        assert_eq!(arena.get(Axis::X).unwrap().driver().reads, 0);
    }

    #[test]
    fn test_warning_streak_scenario() {
        // Five warning polls with a threshold of four
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 1000);
        ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        let mut log = Log::new();

        for poll in 1..=3 {
            let out = monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
            assert_eq!(out, ChannelOutcome::Polled(ChannelState::Warning(poll)));
        }
        assert_eq!(ch.settings().hold_current_ma, 1000);

        // Fourth poll reduces and resets the streak; the chip is still warm
        let out = monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Warning(0)));
        assert_eq!(ch.settings().hold_current_ma, 1000 - 31);
        assert_eq!(ch.record().otw_streak, 0);

        // Fifth poll starts a new streak
        let out = monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Warning(1)));
        assert_eq!(ch.settings().hold_current_ma, 1000 - 31);
        assert_eq!(ch.driver().hold_writes, 1);
        assert_eq!(
            count(&log, |d| matches!(d, Diagnostic::HoldCurrentReduced { hold_ma: 969 })),
            1
        );
    }

    #[test]
    fn test_comm_loss_scenario() {
        // valid -> sentinel x3 -> valid
        let mut ch = sim_channel(Axis::Y, DriverFamily::L6474, 800);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        let mut log = Log::new();

        monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        ch.driver_mut().raw = 0xFFFF;
        for n in 1..=3u16 {
            let out = monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
            assert_eq!(out, ChannelOutcome::Polled(ChannelState::CommLost(n)));
        }
        ch.driver_mut().raw = StatusLayout::L6474.idle;
        let out = monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Normal));

        assert_eq!(count(&log, |d| *d == Diagnostic::CommLost), 1);
        assert_eq!(count(&log, |d| *d == Diagnostic::CommRestored), 1);
        assert_eq!(log.len(), 2);
        assert_eq!(ch.driver().configures, 1);
        assert_eq!(ch.driver().last_config.map(|c| c.hold_current_ma), Some(800));
    }

    #[test]
    fn test_comm_loss_reminder() {
        let mut ch = sim_channel(Axis::Z, DriverFamily::Tmc2209, 500);
        ch.driver_mut().raw = 0;
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        let mut log = Log::new();

        // Entry, then silent polls until the streak passes the limit
        for _ in 0..240 {
            monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        }
        assert_eq!(log.len(), 1);
        monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[1].1, Diagnostic::CommStillLost { polls: 241 });
        assert_eq!(ch.record().comm_streak, 1);
    }

    #[test]
    fn test_reconfigure_uses_remediated_settings() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 1000);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();

        ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
        for _ in 0..4 {
            monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
        }
        ch.driver_mut().raw = 0;
        monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
        ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
        // Recovery poll re-applies config but does not count the warning
        let out = monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Normal));
        assert_eq!(ch.driver().last_config.map(|c| c.hold_current_ma), Some(969));
    }

    #[test]
    fn test_thermal_shutdown_double_step_once() {
        let mut ch = sim_channel(Axis::E0, DriverFamily::L6470, 1000);
        ch.driver_mut().report(FaultFlags::HI_Z | FaultFlags::THERMAL_SHUTDOWN);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();
        let mut log = Log::new();

        let out = monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        assert_eq!(
            out,
            ChannelOutcome::Polled(ChannelState::Shutdown { thermal: true })
        );
        assert_eq!(ch.settings().hold_current_ma, 1000 - 62);

        // Staying in shutdown does not reduce again
        monitor.poll_channel(&mut ch, &lock, &mut log).unwrap();
        assert_eq!(ch.settings().hold_current_ma, 1000 - 62);
        assert_eq!(count(&log, |d| matches!(d, Diagnostic::Shutdown { thermal: true })), 1);
    }

    #[test]
    fn test_hi_z_without_heat() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6480, 1000);
        ch.driver_mut().report(FaultFlags::HI_Z);
        let mut monitor = FaultMonitor::default();
        let out = monitor
            .poll_channel(&mut ch, &BusLock::new(), &mut NullSink)
            .unwrap();
        assert_eq!(
            out,
            ChannelOutcome::Polled(ChannelState::Shutdown { thermal: false })
        );
        assert_eq!(ch.settings().hold_current_ma, 1000);
    }

    #[test]
    fn test_healthy_read_clears_record() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 1000);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::default();

        ch.driver_mut().report(FaultFlags::HI_Z | FaultFlags::THERMAL_WARNING);
        monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
        assert_ne!(*ch.record(), MonitorRecord::default());

        ch.driver_mut().report(FaultFlags::empty());
        let out = monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Normal));
        assert_eq!(
            *ch.record(),
            MonitorRecord {
                prewarn_latched: true,
                ..MonitorRecord::default()
            }
        );
    }

    #[test]
    fn test_warning_state_survives_reduction() {
        let mut ch = sim_channel(Axis::Y, DriverFamily::L6480, 1200);
        ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
        let mut monitor = FaultMonitor::new(MonitorPolicy {
            warning_streak: 1,
            ..MonitorPolicy::default()
        });
        let lock = BusLock::new();

        // Every poll reduces; the state never reads as healthy
        for round in 1..=3u16 {
            let out = monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
            assert_eq!(out, ChannelOutcome::Polled(ChannelState::Warning(0)));
            assert_eq!(ch.settings().hold_current_ma, 1200 - 31 * round);
        }
        assert!(ch.record().prewarn_latched);

        ch.driver_mut().report(FaultFlags::empty());
        let out = monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Normal));
        assert!(ch.record().prewarn_latched);
    }

    #[test]
    fn test_auto_throttle_off_only_reports() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 1000);
        ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
        let mut monitor = FaultMonitor::default();
        monitor.set_auto_throttle(false);
        let mut log = Log::new();

        for _ in 0..8 {
            monitor
                .poll_channel(&mut ch, &BusLock::new(), &mut log)
                .unwrap();
        }
        assert_eq!(ch.settings().hold_current_ma, 1000);
        assert_eq!(
            count(&log, |d| matches!(d, Diagnostic::ThermalWarning { streak: 4 })),
            2
        );
    }

    #[test]
    fn test_informational_reports() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 1000);
        ch.driver_mut()
            .report(FaultFlags::OVERCURRENT | FaultFlags::STALL_B | FaultFlags::WRONG_COMMAND);
        let mut log = Log::new();
        let out = FaultMonitor::default()
            .poll_channel(&mut ch, &BusLock::new(), &mut log)
            .unwrap();
        assert_eq!(out, ChannelOutcome::Polled(ChannelState::Normal));
        assert_eq!(
            log.as_slice(),
            &[
                (Axis::X, Diagnostic::Overcurrent),
                (
                    Axis::X,
                    Diagnostic::Stall {
                        flags: FaultFlags::STALL_B
                    }
                ),
                (
                    Axis::X,
                    Diagnostic::CommandError {
                        flags: FaultFlags::WRONG_COMMAND
                    }
                ),
            ]
        );
    }

    #[test]
    fn test_fatal_halt_latches() {
        let mut arena = arena_of(&[(Axis::X, DriverFamily::L6470), (Axis::Y, DriverFamily::L6470)]);
        arena
            .get_mut(Axis::X)
            .unwrap()
            .driver_mut()
            .report(FaultFlags::UNDERVOLTAGE);
        let lock = BusLock::new();
        let mut monitor = FaultMonitor::new(MonitorPolicy {
            halt_on: MonitorPolicy::STOP_ON_ERROR,
            ..MonitorPolicy::default()
        });
        let mut log = Log::new();

        let halt = FatalHalt {
            axis: Axis::X,
            flags: FaultFlags::UNDERVOLTAGE,
        };
        assert_eq!(monitor.poll(&mut arena, &lock, 0, &mut log), Err(halt));
        assert_eq!(monitor.halted(), Some(halt));
        assert!(!lock.is_busy());
        // Nothing after the halting channel was read
        assert_eq!(arena.get(Axis::Y).unwrap().driver().reads, 0);
        // Latched: later polls fail without touching the bus
        assert_eq!(monitor.poll(&mut arena, &lock, 10_000, &mut log), Err(halt));
        assert_eq!(arena.get(Axis::X).unwrap().driver().reads, 1);
    }

    static SWEEP_LOCK: BusLock = BusLock::new();

    fn isr_fires() {
        SWEEP_LOCK.request();
    }

    #[test]
    fn test_abort_stops_sweep() {
        let mut arena = arena_of(&[
            (Axis::X, DriverFamily::L6470),
            (Axis::Y, DriverFamily::L6470),
            (Axis::Z, DriverFamily::L6470),
        ]);
        arena.get_mut(Axis::X).unwrap().driver_mut().report(FaultFlags::THERMAL_WARNING);
        arena.get_mut(Axis::X).unwrap().driver_mut().on_read = Some(isr_fires);
        let mut monitor = FaultMonitor::default();

        let out = monitor.sweep(&mut arena, &SWEEP_LOCK, &mut NullSink);
        assert_eq!(out, Ok(SweepOutcome::Aborted { polled: 0 }));
        // The corrupted read was discarded
        assert_eq!(arena.get(Axis::X).unwrap().record().otw_streak, 0);
        assert_eq!(arena.get(Axis::Y).unwrap().driver().reads, 0);
        assert_eq!(arena.get(Axis::Z).unwrap().driver().reads, 0);
        assert!(!SWEEP_LOCK.is_busy());
    }

    proptest! {
        #[test]
        fn remediation_is_monotonic(threshold in 1u8..8, rounds in 1u32..4, step in 1u16..64) {
            let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 2000);
            ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
            let mut monitor = FaultMonitor::new(MonitorPolicy {
                warning_streak: threshold,
                hold_step_ma: step,
                ..MonitorPolicy::default()
            });
            let lock = BusLock::new();

            for _ in 0..(threshold as u32 * rounds) {
                monitor.poll_channel(&mut ch, &lock, &mut NullSink).unwrap();
            }
            prop_assert_eq!(
                ch.settings().hold_current_ma as u32,
                2000 - step as u32 * rounds
            );
        }

        #[test]
        fn abort_before_channel_issues_no_reads(position in 0usize..3) {
            let lock = BusLock::new();
            let mut arena = arena_of(&[
                (Axis::X, DriverFamily::L6470),
                (Axis::Y, DriverFamily::L6474),
                (Axis::Z, DriverFamily::Tmc2130),
            ]);
            let mut monitor = FaultMonitor::default();

            lock.begin_sweep();
            for (i, ch) in arena.iter_mut().enumerate() {
                if i == position {
                    lock.request();
                }
                if monitor.poll_channel(ch, &lock, &mut NullSink).unwrap() == ChannelOutcome::Aborted {
                    break;
                }
            }
            lock.end_sweep();

            let reads: usize = arena.iter().map(|c| c.driver().reads).sum();
            prop_assert_eq!(reads, position);
        }
    }
}
