//! Diagnostic events
//!
//! The supervision code does not log. It reports [`Diagnostic`] events per
//! axis to a [`DiagnosticSink`]; the firmware forwards them to defmt and a
//! host tool can render them with [`core::fmt::Display`].

use crate::config::Axis;
use crate::status::FaultFlags;

/// Something the fault monitor wants an operator to know
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Diagnostic {
    /// First sentinel read after a good one
    CommLost,
    /// Reminder while the channel stays silent
    CommStillLost { polls: u16 },
    /// Good read after a loss; configuration re-applied
    CommRestored,
    /// Thermal warning seen on consecutive polls
    ThermalWarning { streak: u8 },
    /// Hold current lowered by remediation
    HoldCurrentReduced { hold_ma: u16 },
    /// Bridges went hi-Z on their own
    Shutdown { thermal: bool },
    /// Overcurrent reported
    Overcurrent,
    /// Stall or step loss reported
    Stall { flags: FaultFlags },
    /// Supply undervoltage reported
    Undervoltage,
    /// Chip rejected or could not perform a command
    CommandError { flags: FaultFlags },
    /// Fault on the halt list; the machine must stop
    Halted { flags: FaultFlags },
}

impl core::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Diagnostic::CommLost => f.write_str("driver communication lost"),
            Diagnostic::CommStillLost { polls } => {
                write!(f, "driver communication still lost ({} polls)", polls)
            }
            Diagnostic::CommRestored => f.write_str("driver communication re-established, configuration restored"),
            Diagnostic::ThermalWarning { streak } => {
                write!(f, "thermal warning ({} consecutive)", streak)
            }
            Diagnostic::HoldCurrentReduced { hold_ma } => {
                write!(f, "hold current reduced to {}mA", hold_ma)
            }
            Diagnostic::Shutdown { thermal: true } => f.write_str("thermal shutdown, bridges disabled"),
            Diagnostic::Shutdown { thermal: false } => f.write_str("bridges in hi-Z"),
            Diagnostic::Overcurrent => f.write_str("overcurrent"),
            Diagnostic::Stall { flags } => write!(f, "stall: {}", flags),
            Diagnostic::Undervoltage => f.write_str("supply undervoltage"),
            Diagnostic::CommandError { flags } => write!(f, "command error: {}", flags),
            Diagnostic::Halted { flags } => write!(f, "halting on {}", flags),
        }
    }
}

/// Receiver of diagnostic events
pub trait DiagnosticSink {
    /// Report one event for an axis
    fn report(&mut self, axis: Axis, event: Diagnostic);
}

/// Sink that drops everything
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl DiagnosticSink for NullSink {
    fn report(&mut self, _axis: Axis, _event: Diagnostic) {}
}

/// Bounded in-memory log; events past capacity are dropped
impl<const N: usize> DiagnosticSink for heapless::Vec<(Axis, Diagnostic), N> {
    fn report(&mut self, axis: Axis, event: Diagnostic) {
        let _ = self.push((axis, event));
    }
}

impl<S: DiagnosticSink + ?Sized> DiagnosticSink for &mut S {
    fn report(&mut self, axis: Axis, event: Diagnostic) {
        (**self).report(axis, event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounded_log_drops_overflow() {
        let mut log: heapless::Vec<(Axis, Diagnostic), 2> = heapless::Vec::new();
        log.report(Axis::X, Diagnostic::CommLost);
        log.report(Axis::Y, Diagnostic::Overcurrent);
        log.report(Axis::Z, Diagnostic::Undervoltage);
        assert_eq!(log.len(), 2);
        assert_eq!(log[1], (Axis::Y, Diagnostic::Overcurrent));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Diagnostic::HoldCurrentReduced { hold_ma: 369 }.to_string(),
            "hold current reduced to 369mA"
        );
        assert_eq!(
            Diagnostic::Shutdown { thermal: true }.to_string(),
            "thermal shutdown, bridges disabled"
        );
    }
}
