//! Embassy async tasks
//!
//! The fault monitor is the only background task; the step ISR runs on
//! its own timer interrupt.

pub mod monitor;

pub use monitor::monitor_task;
