//! Configuration types
//!
//! Board-agnostic description of the driver channels and the monitor
//! policy. The firmware's build script deserializes a board file into
//! [`BoardConfig`] (with the `serde` feature) and rejects invalid boards
//! before any code is generated.

pub mod hardware;
pub mod types;

pub use hardware::*;
pub use types::*;
