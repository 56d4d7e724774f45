//! Channel arena
//!
//! Channels are built once at boot from the board configuration and live
//! until restart. One arena holds the channels of one adapter class, so
//! every call into a driver is statically dispatched; the firmware keeps
//! one arena per class it uses.

use heapless::Vec;

use crate::config::{Axis, ChainSlot, ChannelConfig, ChannelSettings, ConfigError, DriverFamily};
use crate::safety::MonitorRecord;
use crate::traits::{ParamKey, StepperDriver};

/// One driver chip and everything known about it
pub struct Channel<D> {
    axis: Axis,
    family: DriverFamily,
    chain: Option<ChainSlot>,
    address: Option<u8>,
    invert_direction: bool,
    settings: ChannelSettings,
    pub(crate) record: MonitorRecord,
    driver: D,
}

impl<D: StepperDriver> Channel<D> {
    /// Bind a configured channel to its driver
    pub fn new(config: &ChannelConfig, driver: D) -> Self {
        Self {
            axis: config.axis,
            family: config.family,
            chain: config.chain,
            address: config.address,
            invert_direction: config.invert_direction,
            settings: config.settings,
            record: MonitorRecord::default(),
            driver,
        }
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn family(&self) -> DriverFamily {
        self.family
    }

    pub fn chain(&self) -> Option<ChainSlot> {
        self.chain
    }

    pub fn address(&self) -> Option<u8> {
        self.address
    }

    /// Current settings, including remediation changes
    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    /// Monitor bookkeeping for this channel
    pub fn record(&self) -> &MonitorRecord {
        &self.record
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    /// Push the current settings to the chip
    pub fn configure(&mut self) {
        self.driver.configure(&self.settings);
    }

    /// Set the axis direction, honoring the channel's inversion
    #[inline]
    pub fn set_direction(&mut self, forward: bool) {
        self.driver.set_direction(forward != self.invert_direction);
    }

    #[inline]
    pub fn enable(&mut self, enabled: bool) {
        self.driver.enable(enabled);
    }

    pub fn shutdown(&mut self) {
        self.driver.shutdown();
    }

    /// Write a parameter and track the applied value in the settings
    pub fn apply(&mut self, key: ParamKey, value: u32) -> u32 {
        let applied = self.driver.set_param(key, value);
        let narrow = applied.min(u16::MAX as u32) as u16;
        match key {
            ParamKey::RunCurrent => self.settings.run_current_ma = narrow,
            ParamKey::HoldCurrent => self.settings.hold_current_ma = narrow,
            ParamKey::Microsteps => self.settings.microsteps = narrow,
            ParamKey::StallThreshold => self.settings.stall_threshold = narrow,
            ParamKey::OvercurrentThreshold => self.settings.overcurrent_threshold_ma = narrow,
            ParamKey::Register(_) => {}
        }
        applied
    }

    /// Lower the hold current by `step_ma`, never below zero
    pub fn reduce_hold_current(&mut self, step_ma: u16) -> u16 {
        let target = self.settings.hold_current_ma.saturating_sub(step_ma);
        self.apply(ParamKey::HoldCurrent, target as u32);
        self.settings.hold_current_ma
    }
}

/// Fixed-capacity set of channels sharing one adapter class
pub struct ChannelArena<D, const N: usize> {
    channels: Vec<Channel<D>, N>,
}

impl<D, const N: usize> Default for ChannelArena<D, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<D, const N: usize> ChannelArena<D, N> {
    /// Create an empty arena
    pub const fn new() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Channel<D>> {
        self.channels.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Channel<D>> {
        self.channels.iter_mut()
    }

    /// Channel by insertion index
    pub fn by_index_mut(&mut self, index: usize) -> Option<&mut Channel<D>> {
        self.channels.get_mut(index)
    }
}

impl<D: StepperDriver, const N: usize> ChannelArena<D, N> {
    /// Add a channel
    ///
    /// Rejects a second channel for the same axis or the same chain slot.
    pub fn push(&mut self, channel: Channel<D>) -> Result<(), ConfigError> {
        for existing in &self.channels {
            if existing.axis == channel.axis {
                return Err(ConfigError::DuplicateAxis(channel.axis));
            }
            if channel.chain.is_some() && existing.chain == channel.chain {
                return Err(ConfigError::DuplicateChainPosition(channel.axis));
            }
        }
        self.channels
            .push(channel)
            .map_err(|_| ConfigError::ArenaFull)
    }

    pub fn get(&self, axis: Axis) -> Option<&Channel<D>> {
        self.channels.iter().find(|c| c.axis == axis)
    }

    pub fn get_mut(&mut self, axis: Axis) -> Option<&mut Channel<D>> {
        self.channels.iter_mut().find(|c| c.axis == axis)
    }

    /// Push every channel's settings to its chip
    pub fn configure_all(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.configure();
        }
    }

    /// Disable every channel immediately
    pub fn shutdown_all(&mut self) {
        for ch in self.channels.iter_mut() {
            ch.shutdown();
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::PinConfig;
    use crate::status::{FaultFlags, StatusLayout};

    /// Simulated chip: returns a scripted raw word, records writes
    pub(crate) struct SimDriver {
        pub family: DriverFamily,
        pub raw: u32,
        pub reads: usize,
        pub configures: usize,
        pub last_config: Option<ChannelSettings>,
        pub hold_ma: u32,
        pub forward: Option<bool>,
        pub enabled: bool,
        /// Called after every status read (simulates an ISR landing mid-sweep)
        pub on_read: Option<fn()>,
        pub max_hold_ma: u32,
        pub hold_writes: usize,
        pub stall: u32,
        pub ocd_ma: u32,
    }

    impl SimDriver {
        pub fn new(family: DriverFamily) -> Self {
            Self {
                family,
                raw: StatusLayout::for_family(family).idle,
                reads: 0,
                configures: 0,
                last_config: None,
                hold_ma: 0,
                forward: None,
                enabled: false,
                on_read: None,
                max_hold_ma: 4000,
                hold_writes: 0,
                stall: 0,
                ocd_ma: 0,
            }
        }

        pub fn report(&mut self, flags: FaultFlags) {
            self.raw = StatusLayout::for_family(self.family).raw_for(flags);
        }
    }

    impl StepperDriver for SimDriver {
        fn family(&self) -> DriverFamily {
            self.family
        }

        fn configure(&mut self, settings: &ChannelSettings) {
            self.configures += 1;
            self.last_config = Some(*settings);
            self.hold_ma = settings.hold_current_ma as u32;
        }

        fn get_status(&mut self) -> u32 {
            self.reads += 1;
            if let Some(hook) = self.on_read {
                hook();
            }
            self.raw
        }

        fn get_param(&mut self, key: ParamKey) -> u32 {
            match key {
                ParamKey::HoldCurrent => self.hold_ma,
                ParamKey::StallThreshold => self.stall,
                ParamKey::OvercurrentThreshold => self.ocd_ma,
                _ => 0,
            }
        }

        fn set_param(&mut self, key: ParamKey, value: u32) -> u32 {
            match key {
                ParamKey::HoldCurrent => {
                    self.hold_writes += 1;
                    self.hold_ma = value.min(self.max_hold_ma);
                    self.hold_ma
                }
                ParamKey::StallThreshold => {
                    self.stall = value;
                    value
                }
                ParamKey::OvercurrentThreshold => {
                    self.ocd_ma = value;
                    value
                }
                _ => value,
            }
        }

        fn enable(&mut self, enabled: bool) {
            self.enabled = enabled;
        }

        fn set_direction(&mut self, forward: bool) {
            self.forward = Some(forward);
        }
    }

    pub(crate) fn sim_channel(axis: Axis, family: DriverFamily, hold_ma: u16) -> Channel<SimDriver> {
        let mut config = ChannelConfig::new(axis, family, PinConfig::new(0));
        config.settings.hold_current_ma = hold_ma;
        Channel::new(&config, SimDriver::new(family))
    }

    #[test]
    fn test_push_rejects_duplicates() {
        let mut arena: ChannelArena<SimDriver, 4> = ChannelArena::new();
        arena.push(sim_channel(Axis::X, DriverFamily::L6470, 400)).unwrap();
        assert_eq!(
            arena.push(sim_channel(Axis::X, DriverFamily::L6470, 400)),
            Err(ConfigError::DuplicateAxis(Axis::X))
        );

        let mut a = ChannelConfig::new(Axis::Y, DriverFamily::L6470, PinConfig::new(0));
        a.chain = Some(ChainSlot { bus: 0, position: 1 });
        let mut b = a.clone();
        b.axis = Axis::Z;
        arena.push(Channel::new(&a, SimDriver::new(DriverFamily::L6470))).unwrap();
        assert_eq!(
            arena.push(Channel::new(&b, SimDriver::new(DriverFamily::L6470))),
            Err(ConfigError::DuplicateChainPosition(Axis::Z))
        );
    }

    #[test]
    fn test_push_capacity() {
        let mut arena: ChannelArena<SimDriver, 1> = ChannelArena::new();
        arena.push(sim_channel(Axis::X, DriverFamily::A4988, 0)).unwrap();
        assert_eq!(
            arena.push(sim_channel(Axis::Y, DriverFamily::A4988, 0)),
            Err(ConfigError::ArenaFull)
        );
    }

    #[test]
    fn test_direction_inversion() {
        let mut config = ChannelConfig::new(Axis::E0, DriverFamily::Tmc2209, PinConfig::new(0));
        config.invert_direction = true;
        let mut ch = Channel::new(&config, SimDriver::new(DriverFamily::Tmc2209));

        ch.set_direction(true);
        assert_eq!(ch.driver().forward, Some(false));
        ch.set_direction(false);
        assert_eq!(ch.driver().forward, Some(true));
    }

    #[test]
    fn test_apply_tracks_clamped_value() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 400);
        ch.driver_mut().max_hold_ma = 1000;
        assert_eq!(ch.apply(ParamKey::HoldCurrent, 5000), 1000);
        assert_eq!(ch.settings().hold_current_ma, 1000);
    }

    #[test]
    fn test_reduce_hold_saturates() {
        let mut ch = sim_channel(Axis::X, DriverFamily::L6470, 20);
        assert_eq!(ch.reduce_hold_current(31), 0);
        assert_eq!(ch.reduce_hold_current(31), 0);
    }
}
