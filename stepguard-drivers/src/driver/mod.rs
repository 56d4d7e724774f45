//! Driver chip adapters
//!
//! One adapter per transport class; each implements
//! [`StepperDriver`](stepguard_core::traits::StepperDriver) and is stored in
//! a [`ChannelArena`](stepguard_core::arena::ChannelArena) of its own type.

pub mod gpio;
pub mod l64xx;
pub mod tmc;

pub use gpio::GpioDriver;
pub use l64xx::L64xxDriver;
pub use tmc::TmcDriver;
