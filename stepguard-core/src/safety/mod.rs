//! Driver supervision
//!
//! The fault monitor polls driver status and throttles current; the bus
//! lock lets the step ISR pre-empt a sweep in progress.

pub mod arbitration;
pub mod monitor;

pub use arbitration::BusLock;
pub use monitor::{ChannelOutcome, ChannelState, FatalHalt, FaultMonitor, MonitorRecord, SweepOutcome};
