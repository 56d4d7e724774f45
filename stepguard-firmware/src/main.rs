//! Stepguard - stepper driver supervision firmware
//!
//! Runs on RP2040 boards. Brings up the driver channels described in
//! `board.toml`, starts the step pulse interrupt, and hands the channels
//! to the fault monitor task.

#![no_std]
#![no_main]

use defmt::*;
use embassy_executor::Spawner;
use stepguard_core::safety::FaultMonitor;
use stepguard_hal_rp2040::pins::PinBankPeripherals;
use {defmt_rtt as _, panic_probe as _};

mod board;
mod channels;
mod diag;
mod direction;
mod step;
mod tasks;
mod wiring;

/// Main entry point
#[embassy_executor::main]
async fn main(spawner: Spawner) {
    info!("Stepguard starting on {}", board::BOARD_NAME);

    let p = embassy_rp::init(Default::default());
    let (pins, buses) = PinBankPeripherals::from_peripherals(p);

    let step_pins = match wiring::build(pins, buses) {
        Ok(step_pins) => step_pins,
        Err(e) => {
            error!("Board wiring failed: {}", e);
            return;
        }
    };
    info!("{} channels configured", step_pins.len());

    step::init(step_pins);
    step::start();

    let monitor = FaultMonitor::new(board::monitor_policy());
    spawner.spawn(tasks::monitor_task(monitor)).unwrap();

    info!("Fault monitor spawned, firmware running");
}
