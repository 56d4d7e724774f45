//! Diagnostic sink that forwards monitor events to defmt

use defmt::{error, info, warn, Display2Format};
use stepguard_core::config::Axis;
use stepguard_core::diag::{Diagnostic, DiagnosticSink};

/// Logs every event at a level matching its severity
pub struct DefmtSink;

impl DiagnosticSink for DefmtSink {
    fn report(&mut self, axis: Axis, event: Diagnostic) {
        let axis = axis.label();
        let text = Display2Format(&event);
        match event {
            Diagnostic::Halted { .. } => error!("{}: {}", axis, text),
            Diagnostic::CommRestored | Diagnostic::HoldCurrentReduced { .. } => {
                info!("{}: {}", axis, text)
            }
            _ => warn!("{}: {}", axis, text),
        }
    }
}
