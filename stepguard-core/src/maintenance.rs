//! Maintenance commands
//!
//! Runtime inspection and tuning of a channel's currents and thresholds,
//! driver status reports, the latched over-temperature pre-warning, and
//! pausing the monitor. Parsing the operator's command line is somebody
//! else's job; this module takes an already-decoded [`MaintenanceCommand`].
//!
//! Every reported current or threshold is read back from the chip, not
//! from the remembered settings, so a chip that lost its configuration
//! shows up as such.

use crate::arena::{Channel, ChannelArena};
use crate::config::{Axis, DriverFamily};
use crate::safety::{ChannelState, FaultMonitor};
use crate::status::StatusSnapshot;
use crate::traits::{ParamKey, StepperDriver};

/// Decoded maintenance request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MaintenanceCommand {
    GetHoldCurrent(Axis),
    /// Set hold current in mA (clamped by the chip)
    SetHoldCurrent(Axis, u16),
    GetThresholds(Axis),
    SetStallThreshold(Axis, u16),
    /// Set overcurrent threshold in mA (clamped by the chip)
    SetOvercurrentThreshold(Axis, u16),
    /// Full status report for one channel
    DriverStatus(Axis),
    /// Report the over-temperature flags of one channel
    GetTemperatureFlags(Axis),
    /// Clear the latched pre-warning of one channel
    ClearTemperatureFlags(Axis),
    GetAutoThrottle,
    SetAutoThrottle(bool),
    PauseMonitor,
    ResumeMonitor,
}

impl MaintenanceCommand {
    /// Axis the command targets, if any
    pub fn axis(&self) -> Option<Axis> {
        match *self {
            MaintenanceCommand::GetHoldCurrent(axis)
            | MaintenanceCommand::SetHoldCurrent(axis, _)
            | MaintenanceCommand::GetThresholds(axis)
            | MaintenanceCommand::SetStallThreshold(axis, _)
            | MaintenanceCommand::SetOvercurrentThreshold(axis, _)
            | MaintenanceCommand::DriverStatus(axis)
            | MaintenanceCommand::GetTemperatureFlags(axis)
            | MaintenanceCommand::ClearTemperatureFlags(axis) => Some(axis),
            MaintenanceCommand::GetAutoThrottle
            | MaintenanceCommand::SetAutoThrottle(_)
            | MaintenanceCommand::PauseMonitor
            | MaintenanceCommand::ResumeMonitor => None,
        }
    }
}

/// Status report of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct StatusReport {
    pub axis: Axis,
    pub family: DriverFamily,
    /// Monitor state as of the last sweep
    pub state: ChannelState,
    /// Fresh read; `None` for chips without a status register
    pub status: Option<StatusSnapshot>,
    pub run_ma: u16,
    pub hold_ma: u16,
}

/// Over-temperature flags of one channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TemperatureFlags {
    pub axis: Axis,
    /// Pre-warning seen since the last clear
    pub prewarn: bool,
    /// Pre-warning present on the last poll
    pub warning: bool,
    /// Bridges in thermal shutdown on the last poll
    pub shutdown: bool,
}

/// Reply to a maintenance command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MaintenanceReply {
    /// Hold current in mA as read from the chip
    HoldCurrent { axis: Axis, hold_ma: u16 },
    Thresholds {
        axis: Axis,
        stall: u16,
        overcurrent_ma: u16,
    },
    Status(StatusReport),
    Temperature(TemperatureFlags),
    AutoThrottle(bool),
    Monitor { paused: bool },
}

impl core::fmt::Display for MaintenanceReply {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            MaintenanceReply::HoldCurrent { axis, hold_ma } => {
                write!(f, "{} hold current: {}mA", axis, hold_ma)
            }
            MaintenanceReply::Thresholds {
                axis,
                stall,
                overcurrent_ma,
            } => write!(
                f,
                "{} stall threshold: {}, overcurrent threshold: {}mA",
                axis, stall, overcurrent_ma
            ),
            MaintenanceReply::Status(report) => {
                write!(f, "{} {}: ", report.axis, report.family.name())?;
                match report.state {
                    ChannelState::Normal => f.write_str("normal")?,
                    ChannelState::Warning(n) => write!(f, "thermal warning ({})", n)?,
                    ChannelState::Shutdown { thermal: true } => f.write_str("thermal shutdown")?,
                    ChannelState::Shutdown { thermal: false } => f.write_str("hi-Z")?,
                    ChannelState::CommLost(n) => write!(f, "no communication ({})", n)?,
                }
                if let Some(status) = report.status {
                    write!(f, ", status 0x{:04X} [{}]", status.raw, status.flags)?;
                }
                write!(f, ", run {}mA, hold {}mA", report.run_ma, report.hold_ma)
            }
            MaintenanceReply::Temperature(t) => write!(
                f,
                "{} pre-warning: {}, warning: {}, shutdown: {}",
                t.axis, t.prewarn as u8, t.warning as u8, t.shutdown as u8
            ),
            MaintenanceReply::AutoThrottle(on) => {
                write!(f, "auto throttle: {}", if *on { "on" } else { "off" })
            }
            MaintenanceReply::Monitor { paused } => {
                write!(f, "fault monitor {}", if *paused { "paused" } else { "running" })
            }
        }
    }
}

/// Maintenance errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MaintenanceError {
    /// No channel for this axis in the arena
    UnknownAxis(Axis),
}

/// Run one maintenance command against an arena
///
/// Commands for an axis the arena does not hold fail with
/// [`MaintenanceError::UnknownAxis`], so a caller with several arenas can
/// try each in turn.
pub fn execute<D: StepperDriver, const N: usize>(
    arena: &mut ChannelArena<D, N>,
    monitor: &mut FaultMonitor,
    command: MaintenanceCommand,
) -> Result<MaintenanceReply, MaintenanceError> {
    match command {
        MaintenanceCommand::GetHoldCurrent(axis) => Ok(hold_reply(channel(arena, axis)?)),
        MaintenanceCommand::SetHoldCurrent(axis, ma) => {
            let ch = channel(arena, axis)?;
            ch.apply(ParamKey::HoldCurrent, ma as u32);
            Ok(hold_reply(ch))
        }
        MaintenanceCommand::GetThresholds(axis) => Ok(threshold_reply(channel(arena, axis)?)),
        MaintenanceCommand::SetStallThreshold(axis, value) => {
            let ch = channel(arena, axis)?;
            ch.apply(ParamKey::StallThreshold, value as u32);
            Ok(threshold_reply(ch))
        }
        MaintenanceCommand::SetOvercurrentThreshold(axis, ma) => {
            let ch = channel(arena, axis)?;
            ch.apply(ParamKey::OvercurrentThreshold, ma as u32);
            Ok(threshold_reply(ch))
        }
        MaintenanceCommand::DriverStatus(axis) => Ok(status_reply(channel(arena, axis)?)),
        MaintenanceCommand::GetTemperatureFlags(axis) => Ok(temperature_reply(channel(arena, axis)?)),
        MaintenanceCommand::ClearTemperatureFlags(axis) => {
            let ch = channel(arena, axis)?;
            ch.record.clear_prewarning();
            Ok(temperature_reply(ch))
        }
        MaintenanceCommand::GetAutoThrottle => Ok(MaintenanceReply::AutoThrottle(monitor.auto_throttle())),
        MaintenanceCommand::SetAutoThrottle(enabled) => {
            monitor.set_auto_throttle(enabled);
            Ok(MaintenanceReply::AutoThrottle(enabled))
        }
        MaintenanceCommand::PauseMonitor => {
            monitor.pause();
            Ok(MaintenanceReply::Monitor { paused: true })
        }
        MaintenanceCommand::ResumeMonitor => {
            monitor.resume();
            Ok(MaintenanceReply::Monitor { paused: false })
        }
    }
}

fn channel<D: StepperDriver, const N: usize>(
    arena: &mut ChannelArena<D, N>,
    axis: Axis,
) -> Result<&mut Channel<D>, MaintenanceError> {
    arena.get_mut(axis).ok_or(MaintenanceError::UnknownAxis(axis))
}

fn read_ma<D: StepperDriver>(ch: &mut Channel<D>, key: ParamKey) -> u16 {
    ch.driver_mut().get_param(key).min(u16::MAX as u32) as u16
}

fn hold_reply<D: StepperDriver>(ch: &mut Channel<D>) -> MaintenanceReply {
    MaintenanceReply::HoldCurrent {
        axis: ch.axis(),
        hold_ma: read_ma(ch, ParamKey::HoldCurrent),
    }
}

fn threshold_reply<D: StepperDriver>(ch: &mut Channel<D>) -> MaintenanceReply {
    MaintenanceReply::Thresholds {
        axis: ch.axis(),
        stall: read_ma(ch, ParamKey::StallThreshold),
        overcurrent_ma: read_ma(ch, ParamKey::OvercurrentThreshold),
    }
}

fn status_reply<D: StepperDriver>(ch: &mut Channel<D>) -> MaintenanceReply {
    let status = if ch.family().has_status() {
        Some(ch.driver_mut().poll_status())
    } else {
        None
    };
    MaintenanceReply::Status(StatusReport {
        axis: ch.axis(),
        family: ch.family(),
        state: ch.record().state(),
        status,
        run_ma: read_ma(ch, ParamKey::RunCurrent),
        hold_ma: read_ma(ch, ParamKey::HoldCurrent),
    })
}

fn temperature_reply<D: StepperDriver>(ch: &Channel<D>) -> MaintenanceReply {
    let record = ch.record();
    MaintenanceReply::Temperature(TemperatureFlags {
        axis: ch.axis(),
        prewarn: record.prewarn_latched,
        warning: record.warning,
        shutdown: record.hi_z && record.over_temp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::tests::{sim_channel, SimDriver};
    use crate::config::DriverFamily;
    use crate::diag::NullSink;
    use crate::safety::BusLock;
    use crate::status::{FaultFlags, StatusLayout};

    fn setup() -> (ChannelArena<SimDriver, 2>, FaultMonitor) {
        let mut arena = ChannelArena::new();
        arena.push(sim_channel(Axis::X, DriverFamily::L6470, 600)).unwrap();
        (arena, FaultMonitor::default())
    }

    #[test]
    fn test_set_hold_current_reports_applied_value() {
        let (mut arena, mut monitor) = setup();
        arena.get_mut(Axis::X).unwrap().driver_mut().max_hold_ma = 1500;

        let reply = execute(&mut arena, &mut monitor, MaintenanceCommand::SetHoldCurrent(Axis::X, 3000));
        assert_eq!(
            reply,
            Ok(MaintenanceReply::HoldCurrent {
                axis: Axis::X,
                hold_ma: 1500
            })
        );
        let reply = execute(&mut arena, &mut monitor, MaintenanceCommand::GetHoldCurrent(Axis::X));
        assert_eq!(
            reply,
            Ok(MaintenanceReply::HoldCurrent {
                axis: Axis::X,
                hold_ma: 1500
            })
        );
    }

    #[test]
    fn test_get_reads_the_chip_not_the_settings() {
        let (mut arena, mut monitor) = setup();
        execute(&mut arena, &mut monitor, MaintenanceCommand::SetStallThreshold(Axis::X, 700)).unwrap();

        // Chip lost its registers behind our back
        let ch = arena.get_mut(Axis::X).unwrap();
        ch.driver_mut().hold_ma = 0;
        ch.driver_mut().stall = 0;
        assert_eq!(ch.settings().hold_current_ma, 600);

        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::GetHoldCurrent(Axis::X)),
            Ok(MaintenanceReply::HoldCurrent {
                axis: Axis::X,
                hold_ma: 0
            })
        );
        assert!(matches!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::GetThresholds(Axis::X)),
            Ok(MaintenanceReply::Thresholds { stall: 0, .. })
        ));
    }

    #[test]
    fn test_thresholds() {
        let (mut arena, mut monitor) = setup();
        execute(&mut arena, &mut monitor, MaintenanceCommand::SetStallThreshold(Axis::X, 900)).unwrap();
        let reply = execute(
            &mut arena,
            &mut monitor,
            MaintenanceCommand::SetOvercurrentThreshold(Axis::X, 3000),
        );
        assert_eq!(
            reply,
            Ok(MaintenanceReply::Thresholds {
                axis: Axis::X,
                stall: 900,
                overcurrent_ma: 3000
            })
        );
    }

    #[test]
    fn test_unknown_axis() {
        let (mut arena, mut monitor) = setup();
        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::GetThresholds(Axis::E3)),
            Err(MaintenanceError::UnknownAxis(Axis::E3))
        );
        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::ClearTemperatureFlags(Axis::E3)),
            Err(MaintenanceError::UnknownAxis(Axis::E3))
        );
    }

    #[test]
    fn test_auto_throttle_toggle() {
        let (mut arena, mut monitor) = setup();
        execute(&mut arena, &mut monitor, MaintenanceCommand::SetAutoThrottle(false)).unwrap();
        assert!(!monitor.auto_throttle());
        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::GetAutoThrottle),
            Ok(MaintenanceReply::AutoThrottle(false))
        );
    }

    #[test]
    fn test_pause_and_resume() {
        let (mut arena, mut monitor) = setup();
        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::PauseMonitor),
            Ok(MaintenanceReply::Monitor { paused: true })
        );
        assert!(monitor.is_paused());
        assert!(!monitor.due(0));
        execute(&mut arena, &mut monitor, MaintenanceCommand::ResumeMonitor).unwrap();
        assert!(monitor.due(0));
    }

    #[test]
    fn test_status_report() {
        let mut arena: ChannelArena<SimDriver, 2> = ChannelArena::new();
        arena.push(sim_channel(Axis::X, DriverFamily::L6470, 600)).unwrap();
        arena.push(sim_channel(Axis::Y, DriverFamily::A4988, 0)).unwrap();
        let mut monitor = FaultMonitor::default();
        arena.get_mut(Axis::X).unwrap().configure();
        arena
            .get_mut(Axis::X)
            .unwrap()
            .driver_mut()
            .report(FaultFlags::OVERCURRENT);

        let Ok(MaintenanceReply::Status(report)) =
            execute(&mut arena, &mut monitor, MaintenanceCommand::DriverStatus(Axis::X))
        else {
            panic!("expected a status report");
        };
        assert_eq!(report.family, DriverFamily::L6470);
        assert_eq!(report.state, ChannelState::Normal);
        assert_eq!(report.hold_ma, 600);
        let status = report.status.unwrap();
        assert!(status.flags.contains(FaultFlags::OVERCURRENT));
        assert_eq!(
            status.raw,
            StatusLayout::L6470.raw_for(FaultFlags::OVERCURRENT)
        );
        assert_eq!(arena.get(Axis::X).unwrap().driver().reads, 1);

        // Step/dir chips have nothing to read
        let Ok(MaintenanceReply::Status(report)) =
            execute(&mut arena, &mut monitor, MaintenanceCommand::DriverStatus(Axis::Y))
        else {
            panic!("expected a status report");
        };
        assert_eq!(report.status, None);
        assert_eq!(arena.get(Axis::Y).unwrap().driver().reads, 0);
    }

    #[test]
    fn test_prewarning_latch_report_and_clear() {
        let (mut arena, mut monitor) = setup();
        let lock = BusLock::new();
        let ch = arena.get_mut(Axis::X).unwrap();
        ch.driver_mut().report(FaultFlags::THERMAL_WARNING);
        monitor.poll_channel(ch, &lock, &mut NullSink).unwrap();
        ch.driver_mut().report(FaultFlags::empty());
        monitor.poll_channel(ch, &lock, &mut NullSink).unwrap();

        // Warning gone, latch still set
        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::GetTemperatureFlags(Axis::X)),
            Ok(MaintenanceReply::Temperature(TemperatureFlags {
                axis: Axis::X,
                prewarn: true,
                warning: false,
                shutdown: false,
            }))
        );
        assert_eq!(
            execute(&mut arena, &mut monitor, MaintenanceCommand::ClearTemperatureFlags(Axis::X)),
            Ok(MaintenanceReply::Temperature(TemperatureFlags {
                axis: Axis::X,
                prewarn: false,
                warning: false,
                shutdown: false,
            }))
        );
    }

    #[test]
    fn test_reply_display() {
        let reply = MaintenanceReply::HoldCurrent {
            axis: Axis::Y,
            hold_ma: 400,
        };
        assert_eq!(reply.to_string(), "Y hold current: 400mA");
        let reply = MaintenanceReply::Temperature(TemperatureFlags {
            axis: Axis::Z,
            prewarn: true,
            warning: false,
            shutdown: false,
        });
        assert_eq!(reply.to_string(), "Z pre-warning: 1, warning: 0, shutdown: 0");
        assert_eq!(
            MaintenanceReply::Monitor { paused: true }.to_string(),
            "fault monitor paused"
        );
    }
}
