//! GPIO pin abstractions
//!
//! Provides the digital output trait that can be implemented
//! by chip-specific HALs. Step, direction, enable and chip-select lines of
//! the driver chips are all driven through [`OutputPin`].

/// Digital output pin
///
/// Implementations should handle the actual hardware register manipulation
/// for the specific chip. Writes must be usable from interrupt context.
pub trait OutputPin {
    /// Set the pin high (logic 1)
    fn set_high(&mut self);

    /// Set the pin low (logic 0)
    fn set_low(&mut self);

    /// Set the pin to a specific state
    fn set_state(&mut self, high: bool) {
        if high {
            self.set_high();
        } else {
            self.set_low();
        }
    }

    /// Check if the pin is currently set high
    fn is_set_high(&self) -> bool;
}

/// Output pin with a configurable active level
///
/// Enable lines are active-low on most driver boards; wrapping the pin keeps
/// that detail out of the adapters.
pub struct ActiveLevel<P> {
    pin: P,
    active_low: bool,
}

impl<P: OutputPin> ActiveLevel<P> {
    /// Wrap a pin, `active_low` selects the asserted level
    pub fn new(pin: P, active_low: bool) -> Self {
        Self { pin, active_low }
    }

    /// Drive the pin to its asserted (`true`) or released (`false`) level
    pub fn assert(&mut self, asserted: bool) {
        self.pin.set_state(asserted != self.active_low);
    }

    /// Check if the pin is currently at its asserted level
    pub fn is_asserted(&self) -> bool {
        self.pin.is_set_high() != self.active_low
    }

    /// Release the wrapped pin
    pub fn into_inner(self) -> P {
        self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Pin(bool);

    impl OutputPin for Pin {
        fn set_high(&mut self) {
            self.0 = true;
        }
        fn set_low(&mut self) {
            self.0 = false;
        }
        fn is_set_high(&self) -> bool {
            self.0
        }
    }

    #[test]
    fn test_active_low_inverts() {
        let mut en = ActiveLevel::new(Pin(true), true);
        en.assert(true);
        assert!(en.is_asserted());
        assert!(!en.into_inner().0);
    }

    #[test]
    fn test_active_high_passthrough() {
        let mut dir = ActiveLevel::new(Pin(false), false);
        dir.assert(true);
        assert!(dir.into_inner().0);
    }
}
