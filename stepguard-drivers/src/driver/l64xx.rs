//! L64xx family adapter (L6470, L6474, L6480, powerSTEP01)
//!
//! The chips sit on a daisy chain. Register access goes through
//! `GET_PARAM` / `SET_PARAM` one byte per chain pass; direction and enable
//! are folded into one queued single-byte command so the step ISR never
//! clocks more than one pass. Their state lives in the [`DaisyChain`], so
//! the ISR can change direction with [`set_direction_at`] without holding
//! the adapter:
//!
//! | state    | queued command        |
//! |----------|-----------------------|
//! | enabled  | `STEP_CLOCK \| dir`   |
//! | disabled | `HARD_HIZ`            |
//!
//! L6470 / L6480 are voltage-mode: currents map onto the KVAL registers as
//! a fraction of `full_scale_ma`. The L6474 is current-mode and has a single
//! TVAL register for both run and hold current.

use embassy_sync::blocking_mutex::raw::RawMutex;
use stepguard_core::config::{ChannelSettings, DriverFamily};
use stepguard_core::traits::{ParamKey, StepperDriver};
use stepguard_hal::gpio::OutputPin;
use stepguard_hal::spi::SpiBus;

use crate::transport::daisy::{self, ChainError, DaisyChain, Motion, NOP};
use crate::transport::{with_bus, SharedBus};

/// Command opcodes
pub mod cmd {
    pub const NOP: u8 = 0x00;
    pub const SET_PARAM: u8 = 0x00;
    pub const GET_PARAM: u8 = 0x20;
    /// Low bit selects the direction (1 = forward)
    pub const STEP_CLOCK: u8 = 0x58;
    pub const RESET_DEVICE: u8 = 0xC0;
    pub const SOFT_HIZ: u8 = 0xA0;
    pub const HARD_HIZ: u8 = 0xA8;
    pub const GET_STATUS: u8 = 0xD0;
}

/// Register addresses
pub mod reg {
    pub const KVAL_HOLD: u8 = 0x09;
    pub const KVAL_RUN: u8 = 0x0A;
    pub const KVAL_ACC: u8 = 0x0B;
    pub const KVAL_DEC: u8 = 0x0C;
    /// L6474 torque regulation current (shares the KVAL_HOLD address)
    pub const TVAL: u8 = 0x09;
    pub const OCD_TH: u8 = 0x13;
    pub const STALL_TH: u8 = 0x14;
    pub const STEP_MODE: u8 = 0x16;
    pub const CONFIG: u8 = 0x18;
    /// CONFIG on L6480 / powerSTEP01 (0x18 / 0x19 are GATECFG there)
    pub const CONFIG_L6480: u8 = 0x1A;
}

/// Current that KVAL = 255 corresponds to unless told otherwise
pub const DEFAULT_FULL_SCALE_MA: u16 = 2000;

/// Power-on CONFIG with internal oscillator, no PWM frequency change,
/// overcurrent shutdown on
const CONFIG_DEFAULT: u32 = 0x2E88;
const CONFIG_DEFAULT_L6480: u32 = 0x2C88;

/// Overcurrent threshold step of L6470 / L6474 in mA
const OCD_STEP_MA: u32 = 375;

/// Current step of STALL_TH, TVAL and the L6480 OCD_TH (31.25 mA)
const FINE_STEP_NUM: u32 = 125;
const FINE_STEP_DEN: u32 = 4;

/// Bytes of data behind a register address
fn param_len(family: DriverFamily, reg: u8) -> usize {
    let l6480 = matches!(family, DriverFamily::L6480 | DriverFamily::Powerstep01);
    match reg {
        0x01 | 0x03 | 0x04 => 3,
        0x02 | 0x05..=0x08 | 0x0D | 0x15 | 0x18 | 0x1A | 0x1B => 2,
        0x19 if !l6480 => 2,
        _ => 1,
    }
}

/// The queued command for a direction and enable state
pub const fn motion_command(motion: Motion) -> u8 {
    if motion.enabled {
        cmd::STEP_CLOCK | motion.forward as u8
    } else {
        cmd::HARD_HIZ
    }
}

/// Change the direction of the chip at `position` and send it at once
///
/// Holds the bus for one pass. Does nothing while the chip is disabled
/// beyond recording the new direction.
pub fn set_direction_at<M: RawMutex, B: SpiBus, CS: OutputPin>(
    bus: &SharedBus<M, DaisyChain<B, CS>>,
    position: u8,
    forward: bool,
) -> Result<(), ChainError<B::Error>> {
    with_bus(bus, |chain| {
        let mut motion = chain.motion(position)?;
        motion.forward = forward;
        chain.set_motion(position, motion)?;
        if motion.enabled {
            chain.queue(position, motion_command(motion))?;
        }
        chain.flush()
    })
}

/// `value * num / den`, rounded up
const fn div_ceil(value: u32, num: u32, den: u32) -> u32 {
    (value * num).div_ceil(den)
}

/// L64xx chip at one position of a daisy chain
pub struct L64xxDriver<'a, M: RawMutex, B, CS> {
    family: DriverFamily,
    bus: &'a SharedBus<M, DaisyChain<B, CS>>,
    position: u8,
    full_scale_ma: u16,
}

impl<'a, M: RawMutex, B: SpiBus, CS: OutputPin> L64xxDriver<'a, M, B, CS> {
    /// Create an adapter for the chip at `position` (1-based)
    pub fn new(family: DriverFamily, bus: &'a SharedBus<M, DaisyChain<B, CS>>, position: u8) -> Self {
        Self {
            family,
            bus,
            position,
            full_scale_ma: DEFAULT_FULL_SCALE_MA,
        }
    }

    /// Set the current that full KVAL drives into the motor
    pub fn with_full_scale(mut self, full_scale_ma: u16) -> Self {
        self.full_scale_ma = full_scale_ma.max(1);
        self
    }

    pub fn position(&self) -> u8 {
        self.position
    }

    fn is_current_mode(&self) -> bool {
        self.family == DriverFamily::L6474
    }

    fn is_l6480(&self) -> bool {
        matches!(self.family, DriverFamily::L6480 | DriverFamily::Powerstep01)
    }

    /// The queued command for the current direction and enable state
    pub fn motion_command(&self) -> u8 {
        let position = self.position;
        with_bus(self.bus, |chain| chain.motion(position))
            .map(motion_command)
            .unwrap_or(cmd::HARD_HIZ)
    }

    /// Update the chain's motion state and queue the matching command
    fn update_motion(&mut self, update: impl FnOnce(&mut Motion)) {
        let position = self.position;
        // A bad position was rejected when the board was validated
        let _ = with_bus(self.bus, |chain| {
            let mut motion = chain.motion(position)?;
            update(&mut motion);
            chain.set_motion(position, motion)?;
            chain.queue(position, motion_command(motion))
        });
    }

    /// Write a register
    pub fn write_register(&mut self, reg: u8, value: u32) -> Result<(), ChainError<B::Error>> {
        let len = param_len(self.family, reg);
        let mut tx = [NOP; 4];
        tx[0] = cmd::SET_PARAM | (reg & 0x1F);
        for (i, byte) in tx[1..=len].iter_mut().enumerate() {
            *byte = (value >> (8 * (len - 1 - i))) as u8;
        }
        let mut rx = [0u8; 4];
        daisy::command(self.bus, self.position, &tx[..=len], &mut rx[..=len])
    }

    /// Read a register
    pub fn read_register(&mut self, reg: u8) -> Result<u32, ChainError<B::Error>> {
        let len = param_len(self.family, reg);
        let mut tx = [NOP; 4];
        tx[0] = cmd::GET_PARAM | (reg & 0x1F);
        let mut rx = [0u8; 4];
        daisy::command(self.bus, self.position, &tx[..=len], &mut rx[..=len])?;
        Ok(rx[1..=len]
            .iter()
            .fold(0u32, |acc, &byte| (acc << 8) | byte as u32))
    }

    /// Read a register twice and keep the second answer
    ///
    /// For values the chip may still be settling when the first read lands.
    /// Never used for STATUS: reading it releases the latched flags.
    pub fn read_register_fresh(&mut self, reg: u8) -> Result<u32, ChainError<B::Error>> {
        let len = param_len(self.family, reg);
        let mut tx = [NOP; 4];
        tx[0] = cmd::GET_PARAM | (reg & 0x1F);
        let mut rx = [0u8; 4];
        daisy::read_fresh(self.bus, self.position, &tx[..=len], &mut rx[..=len])?;
        Ok(rx[1..=len]
            .iter()
            .fold(0u32, |acc, &byte| (acc << 8) | byte as u32))
    }

    /// Send queued commands now instead of on the next pass
    ///
    /// The step ISR calls this after a direction change so the command does
    /// not wait for the next monitor read.
    pub fn flush(&self) -> Result<(), ChainError<B::Error>> {
        with_bus(self.bus, |chain| chain.flush())
    }

    /// Send a single-byte command immediately
    pub fn send_command(&mut self, command: u8) -> Result<(), ChainError<B::Error>> {
        let position = self.position;
        with_bus(self.bus, |chain| chain.exchange(position, command)).map(|_| ())
    }

    fn current_register(&self, key: ParamKey) -> u8 {
        match key {
            _ if self.is_current_mode() => reg::TVAL,
            ParamKey::RunCurrent => reg::KVAL_RUN,
            _ => reg::KVAL_HOLD,
        }
    }

    fn current_to_register(&self, ma: u32) -> (u32, u32) {
        if self.is_current_mode() {
            // TVAL: (n + 1) * 31.25 mA, 7 bits
            let n = (ma * FINE_STEP_DEN / FINE_STEP_NUM).clamp(1, 128) - 1;
            (n, div_ceil(n + 1, FINE_STEP_NUM, FINE_STEP_DEN))
        } else {
            let fs = self.full_scale_ma as u32;
            let kval = (ma.min(fs) * 255 / fs).min(255);
            (kval, div_ceil(kval, fs, 255))
        }
    }

    fn register_to_current(&self, value: u32) -> u32 {
        if self.is_current_mode() {
            div_ceil((value & 0x7F) + 1, FINE_STEP_NUM, FINE_STEP_DEN)
        } else {
            div_ceil(value & 0xFF, self.full_scale_ma as u32, 255)
        }
    }

    fn overcurrent_to_register(&self, ma: u32) -> (u32, u32) {
        if self.is_l6480() {
            // 5 bits, 31.25 mA steps
            let n = div_ceil(ma, FINE_STEP_DEN, FINE_STEP_NUM).clamp(1, 32) - 1;
            (n, div_ceil(n + 1, FINE_STEP_NUM, FINE_STEP_DEN))
        } else {
            // 4 bits, 375 mA steps
            let n = ma.div_ceil(OCD_STEP_MA).clamp(1, 16) - 1;
            (n, (n + 1) * OCD_STEP_MA)
        }
    }

    fn stall_to_register(&self, ma: u32) -> (u32, u32) {
        let max = if self.is_l6480() { 32 } else { 128 };
        let n = div_ceil(ma, FINE_STEP_DEN, FINE_STEP_NUM).clamp(1, max) - 1;
        (n, div_ceil(n + 1, FINE_STEP_NUM, FINE_STEP_DEN))
    }

    fn microsteps_to_register(&self, microsteps: u32) -> (u32, u32) {
        let max_sel = if self.is_current_mode() { 4 } else { 7 };
        let sel = (31 - microsteps.max(1).leading_zeros()).min(max_sel);
        (sel, 1 << sel)
    }

    fn write_current(&mut self, key: ParamKey, ma: u32) -> u32 {
        let (value, applied) = self.current_to_register(ma);
        let reg = self.current_register(key);
        let _ = self.write_register(reg, value);
        if key == ParamKey::RunCurrent && !self.is_current_mode() {
            let _ = self.write_register(reg::KVAL_ACC, value);
            let _ = self.write_register(reg::KVAL_DEC, value);
        }
        applied
    }
}

impl<M: RawMutex, B: SpiBus, CS: OutputPin> StepperDriver for L64xxDriver<'_, M, B, CS> {
    fn family(&self) -> DriverFamily {
        self.family
    }

    fn configure(&mut self, settings: &ChannelSettings) {
        let (config_reg, config) = if self.is_l6480() {
            (reg::CONFIG_L6480, CONFIG_DEFAULT_L6480)
        } else {
            (reg::CONFIG, CONFIG_DEFAULT)
        };
        let _ = self.write_register(config_reg, config);

        let (step_mode, _) = self.microsteps_to_register(settings.microsteps as u32);
        let _ = self.write_register(reg::STEP_MODE, step_mode);

        if self.is_current_mode() {
            self.write_current(ParamKey::RunCurrent, settings.run_current_ma as u32);
        } else {
            self.write_current(ParamKey::RunCurrent, settings.run_current_ma as u32);
            self.write_current(ParamKey::HoldCurrent, settings.hold_current_ma as u32);
            let (stall, _) = self.stall_to_register(settings.stall_threshold as u32);
            let _ = self.write_register(reg::STALL_TH, stall);
        }
        let (ocd, _) = self.overcurrent_to_register(settings.overcurrent_threshold_ma as u32);
        let _ = self.write_register(reg::OCD_TH, ocd);

        // Clear latched flags, then restore direction / enable state
        let _ = self.get_status();
        self.update_motion(|_| {});
    }

    /// Single GET_STATUS: the reply carries the latched flags, which the
    /// chip releases as it answers
    fn get_status(&mut self) -> u32 {
        let tx = [cmd::GET_STATUS, NOP, NOP];
        let mut rx = [0u8; 3];
        match daisy::command(self.bus, self.position, &tx, &mut rx) {
            Ok(()) => ((rx[1] as u32) << 8) | rx[2] as u32,
            Err(_) => 0,
        }
    }

    fn get_param(&mut self, key: ParamKey) -> u32 {
        let reg = match key {
            ParamKey::RunCurrent | ParamKey::HoldCurrent => self.current_register(key),
            ParamKey::Microsteps => reg::STEP_MODE,
            // The L6474 has no stall detection
            ParamKey::StallThreshold if self.is_current_mode() => return 0,
            ParamKey::StallThreshold => reg::STALL_TH,
            ParamKey::OvercurrentThreshold => reg::OCD_TH,
            ParamKey::Register(r) => r,
        };
        let read = match key {
            ParamKey::RunCurrent | ParamKey::HoldCurrent => self.read_register_fresh(reg),
            _ => self.read_register(reg),
        };
        let value = match read {
            Ok(value) => value,
            Err(_) => return 0,
        };
        match key {
            ParamKey::RunCurrent | ParamKey::HoldCurrent => self.register_to_current(value),
            ParamKey::Microsteps => 1 << (value & 0x07),
            ParamKey::StallThreshold => div_ceil((value & 0x7F) + 1, FINE_STEP_NUM, FINE_STEP_DEN),
            ParamKey::OvercurrentThreshold if self.is_l6480() => {
                div_ceil((value & 0x1F) + 1, FINE_STEP_NUM, FINE_STEP_DEN)
            }
            ParamKey::OvercurrentThreshold => ((value & 0x0F) + 1) * OCD_STEP_MA,
            ParamKey::Register(_) => value,
        }
    }

    fn set_param(&mut self, key: ParamKey, value: u32) -> u32 {
        if let ParamKey::Register(r) = key {
            let _ = self.write_register(r, value);
            return value;
        }
        let value = value.min(u16::MAX as u32);
        match key {
            ParamKey::RunCurrent | ParamKey::HoldCurrent => self.write_current(key, value),
            ParamKey::Microsteps => {
                let (sel, applied) = self.microsteps_to_register(value);
                let _ = self.write_register(reg::STEP_MODE, sel);
                applied
            }
            ParamKey::StallThreshold if self.is_current_mode() => 0,
            ParamKey::StallThreshold => {
                let (n, applied) = self.stall_to_register(value);
                let _ = self.write_register(reg::STALL_TH, n);
                applied
            }
            ParamKey::OvercurrentThreshold => {
                let (n, applied) = self.overcurrent_to_register(value);
                let _ = self.write_register(reg::OCD_TH, n);
                applied
            }
            ParamKey::Register(_) => value,
        }
    }

    fn enable(&mut self, enabled: bool) {
        self.update_motion(|m| m.enabled = enabled);
    }

    fn set_direction(&mut self, forward: bool) {
        self.update_motion(|m| m.forward = forward);
    }

    fn shutdown(&mut self) {
        let position = self.position;
        let _ = with_bus(self.bus, |chain| {
            chain.set_motion(
                position,
                Motion {
                    enabled: false,
                    ..chain.motion(position)?
                },
            )
        });
        let _ = self.send_command(cmd::HARD_HIZ);
    }
}
