//! Build script for stepguard-firmware
//!
//! - Sets up linker search paths for memory.x
//! - Parses and validates board.toml, then generates the board module

use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use stepguard_core::config::{BoardConfig, ChannelConfig, DriverInterface, PinConfig};

const GPIO_COUNT: u8 = 30;

fn main() {
    setup_linker();
    generate_board();
}

/// Set up linker search paths for memory.x
fn setup_linker() {
    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());

    let memory_x = include_bytes!("memory.x");
    let mut f = File::create(out_dir.join("memory.x")).unwrap();
    f.write_all(memory_x).unwrap();

    println!("cargo:rustc-link-search={}", out_dir.display());

    println!("cargo:rerun-if-changed=memory.x");
    println!("cargo:rerun-if-changed=build.rs");
}

/// Bus wiring; lives next to the channel list in board.toml
#[derive(Debug, Default, Deserialize)]
struct Buses {
    uart: Option<UartPins>,
    spi: Option<SpiPins>,
    chain: Option<ChainPins>,
}

#[derive(Debug, Deserialize)]
struct UartPins {
    tx: u8,
    rx: u8,
    #[serde(default = "default_baud")]
    baud: u32,
}

#[derive(Debug, Deserialize)]
struct SpiPins {
    sck: u8,
    mosi: u8,
    miso: u8,
    #[serde(default = "default_spi_hz")]
    frequency: u32,
}

#[derive(Debug, Deserialize)]
struct ChainPins {
    sck: u8,
    mosi: u8,
    miso: u8,
    cs: u8,
    #[serde(default = "default_spi_hz")]
    frequency: u32,
}

fn default_baud() -> u32 {
    115_200
}

fn default_spi_hz() -> u32 {
    1_000_000
}

/// RP2040 pin functions: (peripheral index, tx/mosi pins, rx/miso pins, sck pins)
const UART_PINS: [(u8, &[u8], &[u8]); 2] = [
    (0, &[0, 12, 16, 28], &[1, 13, 17, 29]),
    (1, &[4, 8, 20, 24], &[5, 9, 21, 25]),
];

const SPI_PINS: [(u8, &[u8], &[u8], &[u8]); 2] = [
    (0, &[3, 7, 19, 23], &[0, 4, 16, 20], &[2, 6, 18, 22]),
    (1, &[11, 15, 27], &[8, 12, 24, 28], &[10, 14, 26]),
];

fn uart_peripheral(pins: &UartPins) -> Option<u8> {
    UART_PINS
        .iter()
        .find(|(_, tx, rx)| tx.contains(&pins.tx) && rx.contains(&pins.rx))
        .map(|(id, _, _)| *id)
}

fn spi_peripheral(sck: u8, mosi: u8, miso: u8) -> Option<u8> {
    SPI_PINS
        .iter()
        .find(|(_, tx, rx, clk)| clk.contains(&sck) && tx.contains(&mosi) && rx.contains(&miso))
        .map(|(id, _, _, _)| *id)
}

/// Parse, validate and generate `$OUT_DIR/board.rs`
fn generate_board() {
    println!("cargo:rerun-if-changed=board.toml");

    let path = Path::new("board.toml");
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => fail("Failed to read board.toml", &[e.to_string()]),
    };

    let board: BoardConfig = match toml::from_str(&content) {
        Ok(board) => board,
        Err(e) => fail("Invalid board.toml", &e.to_string().lines().map(String::from).collect::<Vec<_>>()),
    };
    let buses: Buses = match toml::from_str(&content) {
        Ok(buses) => buses,
        Err(e) => fail("Invalid bus section in board.toml", &[e.to_string()]),
    };

    let mut errors = Vec::new();
    if let Err(e) = board.validate() {
        errors.push(e.to_string());
    }
    let (uart_id, spi_id, chain_id) = validate_buses(&board, &buses, &mut errors);
    validate_pins(&board, &buses, &mut errors);
    if !errors.is_empty() {
        fail("Invalid board configuration in board.toml", &errors);
    }

    let code = render(&board, &buses, uart_id, spi_id, chain_id);
    let out = PathBuf::from(env::var("OUT_DIR").unwrap()).join("board.rs");
    fs::write(out, code).unwrap();
}

fn validate_buses(board: &BoardConfig, buses: &Buses, errors: &mut Vec<String>) -> (u8, u8, u8) {
    let count = |interface| board.channels_of(interface).count();

    let uart_id = match &buses.uart {
        Some(pins) => uart_peripheral(pins).unwrap_or_else(|| {
            errors.push(format!("[uart] tx={} rx={} are not a UART pin pair", pins.tx, pins.rx));
            0
        }),
        None => {
            if count(DriverInterface::AddressedUart) > 0 {
                errors.push("UART driver channels need a [uart] section".into());
            }
            1
        }
    };

    let spi_id = match &buses.spi {
        Some(p) => spi_peripheral(p.sck, p.mosi, p.miso).unwrap_or_else(|| {
            errors.push("[spi] sck/mosi/miso do not belong to one SPI peripheral".into());
            1
        }),
        None => {
            if count(DriverInterface::AddressedSpi) > 0 {
                errors.push("SPI driver channels need a [spi] section".into());
            }
            1
        }
    };

    let chain_id = match &buses.chain {
        Some(p) => spi_peripheral(p.sck, p.mosi, p.miso).unwrap_or_else(|| {
            errors.push("[chain] sck/mosi/miso do not belong to one SPI peripheral".into());
            0
        }),
        None => {
            if count(DriverInterface::DaisyChainSpi) > 0 {
                errors.push("Daisy-chain driver channels need a [chain] section".into());
            }
            0
        }
    };

    if buses.spi.is_some() && buses.chain.is_some() && spi_id == chain_id {
        errors.push(format!("[spi] and [chain] both use SPI{}", spi_id));
    }

    for ch in board.channels_of(DriverInterface::DaisyChainSpi) {
        if let Some(slot) = ch.chain {
            if slot.bus != 0 {
                errors.push(format!("{}: only chain bus 0 is wired", ch.axis));
            }
        }
    }

    (uart_id, spi_id, chain_id)
}

fn validate_pins(board: &BoardConfig, buses: &Buses, errors: &mut Vec<String>) {
    let mut owners: BTreeMap<u8, String> = BTreeMap::new();
    let mut claim = |pin: u8, owner: String| {
        if pin >= GPIO_COUNT {
            errors.push(format!("{}: gpio{} does not exist", owner, pin));
        } else if let Some(previous) = owners.insert(pin, owner.clone()) {
            errors.push(format!("gpio{} used by both {} and {}", pin, previous, owner));
        }
    };

    if let Some(p) = &buses.uart {
        claim(p.tx, "uart tx".into());
        claim(p.rx, "uart rx".into());
    }
    if let Some(p) = &buses.spi {
        claim(p.sck, "spi sck".into());
        claim(p.mosi, "spi mosi".into());
        claim(p.miso, "spi miso".into());
    }
    if let Some(p) = &buses.chain {
        claim(p.sck, "chain sck".into());
        claim(p.mosi, "chain mosi".into());
        claim(p.miso, "chain miso".into());
        claim(p.cs, "chain cs".into());
    }

    for ch in &board.channels {
        let pins = [
            ("step", Some(ch.step_pin)),
            ("dir", ch.dir_pin),
            ("enable", ch.enable_pin),
            ("cs", ch.cs_pin),
        ];
        for (role, pin) in pins {
            if let Some(pin) = pin {
                claim(pin.pin, format!("{} {}", ch.axis, role));
            }
        }
    }
}

fn pin_literal(pin: &PinConfig) -> String {
    format!("PinConfig {{ pin: {}, inverted: {} }}", pin.pin, pin.inverted)
}

fn option_literal<T>(value: &Option<T>, render: impl Fn(&T) -> String) -> String {
    match value {
        Some(v) => format!("Some({})", render(v)),
        None => "None".into(),
    }
}

fn channel_literal(ch: &ChannelConfig) -> String {
    let s = &ch.settings;
    format!(
        "ChannelConfig {{ axis: Axis::{:?}, family: DriverFamily::{:?}, chain: {}, address: {:?}, \
         invert_direction: {}, step_pin: {}, dir_pin: {}, enable_pin: {}, cs_pin: {}, \
         settings: ChannelSettings {{ run_current_ma: {}, hold_current_ma: {}, microsteps: {}, \
         stall_threshold: {}, overcurrent_threshold_ma: {} }} }}",
        ch.axis,
        ch.family,
        option_literal(&ch.chain, |slot| format!(
            "ChainSlot {{ bus: {}, position: {} }}",
            slot.bus, slot.position
        )),
        ch.address,
        ch.invert_direction,
        pin_literal(&ch.step_pin),
        option_literal(&ch.dir_pin, pin_literal),
        option_literal(&ch.enable_pin, pin_literal),
        option_literal(&ch.cs_pin, pin_literal),
        s.run_current_ma,
        s.hold_current_ma,
        s.microsteps,
        s.stall_threshold,
        s.overcurrent_threshold_ma,
    )
}

fn render(board: &BoardConfig, buses: &Buses, uart_id: u8, spi_id: u8, chain_id: u8) -> String {
    let mut code = String::new();
    let m = &board.monitor;

    writeln!(code, "// Generated from board.toml by build.rs").unwrap();
    writeln!(code, "pub const BOARD_NAME: &str = {:?};", board.name.as_str()).unwrap();
    writeln!(
        code,
        "pub fn monitor_policy() -> MonitorPolicy {{ MonitorPolicy {{ period_ms: {}, warning_streak: {}, \
         comm_reminder_polls: {}, hold_step_ma: {}, auto_throttle: {}, ..MonitorPolicy::default() }} }}",
        m.period_ms, m.warning_streak, m.comm_reminder_polls, m.hold_step_ma, m.auto_throttle
    )
    .unwrap();

    writeln!(code, "pub const CHANNELS: [ChannelConfig; {}] = [", board.channels.len()).unwrap();
    for ch in &board.channels {
        writeln!(code, "    {},", channel_literal(ch)).unwrap();
    }
    writeln!(code, "];").unwrap();

    writeln!(code, "pub type TmcSpiPeripheral = peripherals::SPI{};", spi_id).unwrap();
    writeln!(code, "pub type ChainPeripheral = peripherals::SPI{};", chain_id).unwrap();
    writeln!(code, "pub const CHAIN_LEN: usize = {};", board.chain_length(0)).unwrap();
    writeln!(code, "pub const CHAIN_CS: Option<u8> = {:?};", buses.chain.as_ref().map(|c| c.cs)).unwrap();

    // Bus constructors need the concrete pin types, so they are generated
    writeln!(
        code,
        "pub fn take_uart(pins: &mut PinBankPeripherals, buses: &mut BusPeripherals) -> Option<(Uart<'static, Blocking>, UartId)> {{"
    )
    .unwrap();
    match &buses.uart {
        Some(p) => writeln!(
            code,
            "    Some((Uart::new_blocking(buses.uart{id}.take()?, pins.pin{}.take()?, pins.pin{}.take()?, uart_config({})), UartId::Uart{id}))",
            p.tx,
            p.rx,
            p.baud,
            id = uart_id
        )
        .unwrap(),
        None => writeln!(code, "    let _ = (pins, buses);\n    None").unwrap(),
    }
    writeln!(code, "}}").unwrap();

    let spi_fn = |code: &mut String, name: &str, alias: &str, id: u8, pins: Option<(u8, u8, u8, u32)>| {
        writeln!(
            code,
            "pub fn {}(pins: &mut PinBankPeripherals, buses: &mut BusPeripherals) -> Option<Spi<'static, {}, Blocking>> {{",
            name, alias
        )
        .unwrap();
        match pins {
            Some((sck, mosi, miso, hz)) => writeln!(
                code,
                "    Some(Spi::new_blocking(buses.spi{}.take()?, pins.pin{}.take()?, pins.pin{}.take()?, pins.pin{}.take()?, spi_config({})))",
                id, sck, mosi, miso, hz
            )
            .unwrap(),
            None => writeln!(code, "    let _ = (pins, buses);\n    None").unwrap(),
        }
        writeln!(code, "}}").unwrap();
    };
    spi_fn(
        &mut code,
        "take_tmc_spi",
        "TmcSpiPeripheral",
        spi_id,
        buses.spi.as_ref().map(|p| (p.sck, p.mosi, p.miso, p.frequency)),
    );
    spi_fn(
        &mut code,
        "take_chain_spi",
        "ChainPeripheral",
        chain_id,
        buses.chain.as_ref().map(|p| (p.sck, p.mosi, p.miso, p.frequency)),
    );

    code
}

/// Abort the build with a boxed error listing
fn fail(title: &str, lines: &[String]) -> ! {
    let body = lines
        .iter()
        .map(|line| format!("║  • {:<62} ║", line))
        .collect::<Vec<_>>()
        .join("\n");
    panic!(
        "\n\
        ╔══════════════════════════════════════════════════════════════════╗\n\
        ║  ERROR: {:<56} ║\n\
        ╠══════════════════════════════════════════════════════════════════╣\n\
        {}\n\
        ╚══════════════════════════════════════════════════════════════════╝\n",
        title, body
    );
}
