//! Hardware abstraction traits
//!
//! These traits define the interface between the supervision logic and
//! the driver adapters.

pub mod driver;

pub use driver::{ParamKey, StepperDriver};
