//! Trinamic adapter (TMC2130, TMC2160, TMC5130, TMC5160, TMC2208, TMC2209)
//!
//! Register access goes through a [`RegisterLink`] (SPI or single-wire
//! UART); STEP, DIR and EN stay on pins. Several registers are write-only,
//! so the adapter keeps a shadow of everything it writes and reads
//! parameters back from the shadow.
//!
//! # Features Used
//!
//! - SpreadCycle / StealthChop chopper with interpolation to 256 microsteps
//! - StallGuard threshold (SGT in COOLCONF on SPI parts, SGTHRS on UART parts)
//! - DRV_STATUS for the fault monitor

use stepguard_core::config::{ChannelSettings, DriverFamily, DriverInterface};
use stepguard_core::traits::{ParamKey, StepperDriver};
use stepguard_hal::gpio::{ActiveLevel, OutputPin};

use crate::transport::RegisterLink;

/// Register addresses
pub mod reg {
    /// General configuration
    pub const GCONF: u8 = 0x00;
    /// Global status flags
    pub const GSTAT: u8 = 0x01;
    /// Hold/run current settings
    pub const IHOLD_IRUN: u8 = 0x10;
    /// Power down delay
    pub const TPOWERDOWN: u8 = 0x11;
    /// Lower velocity for CoolStep/StallGuard
    pub const TCOOLTHRS: u8 = 0x14;
    /// StallGuard threshold (UART parts)
    pub const SGTHRS: u8 = 0x40;
    /// Chopper configuration
    pub const CHOPCONF: u8 = 0x6C;
    /// CoolStep and StallGuard configuration (SPI parts)
    pub const COOLCONF: u8 = 0x6D;
    /// Driver status
    pub const DRV_STATUS: u8 = 0x6F;
    /// StealthChop PWM configuration
    pub const PWMCONF: u8 = 0x70;
}

/// Sense resistor of most carrier boards in milliohm
pub const DEFAULT_RSENSE_MOHM: u16 = 110;

/// Full-scale sense voltage with VSENSE = 0, in mV
const VFS_MV: u64 = 325;

/// IHOLDDELAY field of IHOLD_IRUN
const IHOLD_DELAY: u32 = 6;

/// Convert microsteps to the MRES field
pub fn mres(microsteps: u16) -> u8 {
    match microsteps {
        256..=u16::MAX => 0,
        128..=255 => 1,
        64..=127 => 2,
        32..=63 => 3,
        16..=31 => 4,
        8..=15 => 5,
        4..=7 => 6,
        2..=3 => 7,
        _ => 8,
    }
}

/// Convert a current in mA to a CS value (0-31)
///
/// `I_rms = (CS + 1) / 32 * V_fs / R_sense / sqrt(2)`, rounded down so the
/// chip never runs hotter than asked.
pub fn current_to_cs(current_ma: u32, rsense_mohm: u16) -> u8 {
    let scaled = current_ma as u64 * 32 * 1414 * rsense_mohm as u64;
    let cs_plus_one = scaled / (VFS_MV * 1_000_000);
    cs_plus_one.clamp(1, 32) as u8 - 1
}

/// Current in mA produced by a CS value, rounded up
///
/// Rounding up keeps `current_to_cs(cs_to_current(cs)) == cs`.
pub fn cs_to_current(cs: u8, rsense_mohm: u16) -> u32 {
    let num = (cs.min(31) as u64 + 1) * VFS_MV * 1_000_000;
    let den = 32 * 1414 * rsense_mohm.max(1) as u64;
    num.div_ceil(den) as u32
}

/// Values last written to the chip
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Shadow {
    pub gconf: u32,
    pub ihold_irun: u32,
    pub chopconf: u32,
    pub coolconf: u32,
    pub sgthrs: u32,
}

/// Trinamic driver behind a register link, with DIR and EN on pins
pub struct TmcDriver<L, DIR, EN> {
    family: DriverFamily,
    link: L,
    dir: DIR,
    enable: ActiveLevel<EN>,
    rsense_mohm: u16,
    stealthchop: bool,
    shadow: Shadow,
}

impl<L: RegisterLink, DIR: OutputPin, EN: OutputPin> TmcDriver<L, DIR, EN> {
    /// Create a driver; EN is active-low on every Trinamic carrier
    pub fn new(family: DriverFamily, link: L, dir: DIR, enable: EN) -> Self {
        let mut enable = ActiveLevel::new(enable, true);
        enable.assert(false);
        Self {
            family,
            link,
            dir,
            enable,
            rsense_mohm: DEFAULT_RSENSE_MOHM,
            stealthchop: false,
            shadow: Shadow::default(),
        }
    }

    pub fn with_rsense(mut self, rsense_mohm: u16) -> Self {
        self.rsense_mohm = rsense_mohm.max(1);
        self
    }

    /// Quiet voltage-chopper mode (StallGuard needs SpreadCycle on SPI parts)
    pub fn with_stealthchop(mut self, enabled: bool) -> Self {
        self.stealthchop = enabled;
        self
    }

    pub fn shadow(&self) -> &Shadow {
        &self.shadow
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    fn is_uart(&self) -> bool {
        self.family.interface() == DriverInterface::AddressedUart
    }

    fn write(&mut self, reg: u8, value: u32) {
        // Transport errors surface as a lost channel on the next status poll
        let _ = self.link.write_register(reg, value);
    }

    fn build_gconf(&self) -> u32 {
        let mut gconf = 0u32;
        if self.is_uart() {
            // Bit 2: en_spreadcycle
            if !self.stealthchop {
                gconf |= 1 << 2;
            }
            // Bit 6: pdn_disable, 7: mstep_reg_select, 8: multistep_filt
            gconf |= (1 << 6) | (1 << 7) | (1 << 8);
        } else if self.stealthchop {
            // Bit 2: en_pwm_mode
            gconf |= 1 << 2;
        }
        gconf
    }

    fn build_chopconf(&self, microsteps: u16) -> u32 {
        // TOFF = 5, HSTRT = 4, HEND = 0, TBL = 2
        let mut chopconf = 5 | (4 << 4) | (2 << 15);
        chopconf |= (mres(microsteps) as u32) << 24;
        // intpol
        chopconf |= 1 << 28;
        chopconf
    }

    fn build_pwmconf(&self) -> u32 {
        // PWM_OFS = 36, PWM_GRAD = 14, PWM_FREQ = 1, autoscale, autograd,
        // PWM_REG = 4, PWM_LIM = 12
        36 | (14 << 8) | (1 << 16) | (1 << 18) | (1 << 19) | (4 << 24) | (12 << 28)
    }

    fn write_currents(&mut self, run_ma: u32, hold_ma: u32) {
        let irun = current_to_cs(run_ma, self.rsense_mohm) as u32;
        let ihold = current_to_cs(hold_ma, self.rsense_mohm) as u32;
        let value = (IHOLD_DELAY << 16) | (irun << 8) | ihold;
        self.shadow.ihold_irun = value;
        self.write(reg::IHOLD_IRUN, value);
    }

    fn run_cs(&self) -> u8 {
        ((self.shadow.ihold_irun >> 8) & 0x1F) as u8
    }

    fn hold_cs(&self) -> u8 {
        (self.shadow.ihold_irun & 0x1F) as u8
    }

    fn write_stall_threshold(&mut self, value: u32) -> u32 {
        if self.is_uart() {
            let sgthrs = value.min(255);
            self.shadow.sgthrs = sgthrs;
            self.write(reg::SGTHRS, sgthrs);
            sgthrs
        } else {
            // SGT is a signed 7-bit field; only the non-negative half is exposed
            let sgt = value.min(63);
            let coolconf = (self.shadow.coolconf & !(0x7F << 16)) | (sgt << 16);
            self.shadow.coolconf = coolconf;
            self.write(reg::COOLCONF, coolconf);
            sgt
        }
    }

    fn write_microsteps(&mut self, microsteps: u16) -> u32 {
        let mres = mres(microsteps) as u32;
        let chopconf = (self.shadow.chopconf & !(0x0F << 24)) | (mres << 24);
        self.shadow.chopconf = chopconf;
        self.write(reg::CHOPCONF, chopconf);
        256 >> mres
    }
}

impl<L: RegisterLink, DIR: OutputPin, EN: OutputPin> StepperDriver for TmcDriver<L, DIR, EN> {
    fn family(&self) -> DriverFamily {
        self.family
    }

    fn configure(&mut self, settings: &ChannelSettings) {
        // Clear reset / error flags (write 1 to clear)
        self.write(reg::GSTAT, 0x07);

        let gconf = self.build_gconf();
        self.shadow.gconf = gconf;
        self.write(reg::GCONF, gconf);

        let chopconf = self.build_chopconf(settings.microsteps);
        self.shadow.chopconf = chopconf;
        self.write(reg::CHOPCONF, chopconf);

        self.write_currents(settings.run_current_ma as u32, settings.hold_current_ma as u32);
        self.write(reg::TPOWERDOWN, 20);
        if self.stealthchop {
            let pwmconf = self.build_pwmconf();
            self.write(reg::PWMCONF, pwmconf);
        }
        self.write_stall_threshold(settings.stall_threshold as u32);
    }

    fn get_status(&mut self) -> u32 {
        self.link.read_register(reg::DRV_STATUS).unwrap_or(0)
    }

    fn get_param(&mut self, key: ParamKey) -> u32 {
        match key {
            ParamKey::RunCurrent => cs_to_current(self.run_cs(), self.rsense_mohm),
            ParamKey::HoldCurrent => cs_to_current(self.hold_cs(), self.rsense_mohm),
            ParamKey::Microsteps => 256 >> ((self.shadow.chopconf >> 24) & 0x0F),
            ParamKey::StallThreshold if self.is_uart() => self.shadow.sgthrs,
            ParamKey::StallThreshold => (self.shadow.coolconf >> 16) & 0x7F,
            // Short detection thresholds are fixed in silicon
            ParamKey::OvercurrentThreshold => 0,
            ParamKey::Register(r) => self.link.read_register(r).unwrap_or(0),
        }
    }

    fn set_param(&mut self, key: ParamKey, value: u32) -> u32 {
        match key {
            ParamKey::RunCurrent => {
                let hold = cs_to_current(self.hold_cs(), self.rsense_mohm);
                self.write_currents(value, hold);
                cs_to_current(self.run_cs(), self.rsense_mohm)
            }
            ParamKey::HoldCurrent => {
                let run = cs_to_current(self.run_cs(), self.rsense_mohm);
                self.write_currents(run, value);
                cs_to_current(self.hold_cs(), self.rsense_mohm)
            }
            ParamKey::Microsteps => self.write_microsteps(value.min(256) as u16),
            ParamKey::StallThreshold => self.write_stall_threshold(value),
            ParamKey::OvercurrentThreshold => 0,
            ParamKey::Register(r) => {
                self.write(r, value);
                value
            }
        }
    }

    #[inline]
    fn enable(&mut self, enabled: bool) {
        self.enable.assert(enabled);
    }

    #[inline]
    fn set_direction(&mut self, forward: bool) {
        self.dir.set_state(forward);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockPin;
    use crate::transport::tmc_spi::tests::SimTmcSpi;
    use crate::transport::tmc_uart::tests::SimUart;
    use crate::transport::{shared, with_bus, TmcSpiLink, TmcUartLink};
    use embassy_sync::blocking_mutex::raw::NoopRawMutex;
    use stepguard_core::status::{FaultFlags, StatusLayout};

    #[test]
    fn test_mres_conversion() {
        assert_eq!(mres(256), 0);
        assert_eq!(mres(16), 4);
        assert_eq!(mres(1), 8);
        assert_eq!(mres(0), 8);
        assert_eq!(mres(24), 4);
    }

    #[test]
    fn test_current_conversion() {
        // 800mA with 110mOhm gives CS = 11
        assert_eq!(current_to_cs(800, 110), 11);
        assert!(current_to_cs(400, 110) < 11);
        assert_eq!(current_to_cs(0, 110), 0);
        assert_eq!(current_to_cs(100_000, 110), 31);
    }

    #[test]
    fn test_current_round_trip() {
        for cs in 0..32u8 {
            assert_eq!(current_to_cs(cs_to_current(cs, 110), 110), cs);
        }
    }

    #[test]
    fn test_uart_configure_and_status() {
        let bus = shared::<NoopRawMutex, _>(SimUart::with_chips(&[2]));
        let mut d = TmcDriver::new(
            DriverFamily::Tmc2209,
            TmcUartLink::new(&bus, 2),
            MockPin::default(),
            MockPin::default(),
        );
        d.configure(&ChannelSettings::default());

        with_bus(&bus, |uart| {
            assert_eq!(uart.regs[2][reg::GCONF as usize] & 0x1C0, 0x1C0);
            assert_eq!((uart.regs[2][reg::CHOPCONF as usize] >> 24) & 0x0F, 4);
            assert_eq!(uart.regs[2][reg::SGTHRS as usize], 255);
            uart.regs[2][reg::DRV_STATUS as usize] = StatusLayout::TMC_UART.raw_for(FaultFlags::THERMAL_WARNING);
        });
        assert_eq!(d.poll_status().flags, FaultFlags::THERMAL_WARNING);
    }

    #[test]
    fn test_uart_silence_is_comm_loss() {
        let bus = shared::<NoopRawMutex, _>(SimUart::with_chips(&[]));
        let mut d = TmcDriver::new(
            DriverFamily::Tmc2208,
            TmcUartLink::new(&bus, 0),
            MockPin::default(),
            MockPin::default(),
        );
        assert!(d.poll_status().is_comm_lost());
    }

    #[test]
    fn test_hold_current_keeps_run_current() {
        let bus = shared::<NoopRawMutex, _>(SimTmcSpi::new());
        let mut d = TmcDriver::new(
            DriverFamily::Tmc2130,
            TmcSpiLink::new(&bus, MockPin::default()),
            MockPin::default(),
            MockPin::default(),
        );
        d.configure(&ChannelSettings {
            run_current_ma: 800,
            hold_current_ma: 600,
            ..ChannelSettings::default()
        });
        let run_before = d.get_param(ParamKey::RunCurrent);

        let applied = d.set_param(ParamKey::HoldCurrent, 569);
        assert!(applied <= 569);
        assert_eq!(d.get_param(ParamKey::HoldCurrent), applied);
        assert_eq!(d.get_param(ParamKey::RunCurrent), run_before);
        // Re-applying the applied value is stable
        assert_eq!(d.set_param(ParamKey::HoldCurrent, applied), applied);

        let written = with_bus(&bus, |spi| spi.regs[reg::IHOLD_IRUN as usize]);
        assert_eq!(written, d.shadow().ihold_irun);
    }

    #[test]
    fn test_spi_stall_threshold_in_coolconf() {
        let bus = shared::<NoopRawMutex, _>(SimTmcSpi::new());
        let mut d = TmcDriver::new(
            DriverFamily::Tmc5160,
            TmcSpiLink::new(&bus, MockPin::default()),
            MockPin::default(),
            MockPin::default(),
        );
        assert_eq!(d.set_param(ParamKey::StallThreshold, 500), 63);
        assert_eq!(d.get_param(ParamKey::StallThreshold), 63);
        assert_eq!(with_bus(&bus, |spi| spi.regs[reg::COOLCONF as usize]), 63 << 16);
    }

    #[test]
    fn test_pins() {
        let bus = shared::<NoopRawMutex, _>(SimTmcSpi::new());
        let mut d = TmcDriver::new(
            DriverFamily::Tmc2160,
            TmcSpiLink::new(&bus, MockPin::default()),
            MockPin::default(),
            MockPin::default(),
        );
        // EN is active-low and starts released
        assert!(!d.enable.is_asserted());
        d.enable(true);
        assert!(d.enable.is_asserted());
        d.set_direction(true);
        assert!(d.dir.high);
        d.shutdown();
        assert!(!d.enable.is_asserted());
    }
}
