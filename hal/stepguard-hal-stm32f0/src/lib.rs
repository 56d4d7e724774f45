//! STM32F0-specific HAL for the stepper supervision firmware
//!
//! This crate provides STM32F0-specific implementations and utilities
//! for use with `stepguard-hal` traits. It supports:
//!
//! - STM32F042F6 / STM32F042K6
//!
//! # Features
//!
//! - `stm32f042f6`, `stm32f042k6` - Select the chip variant
//! - `defmt` - Enable debug formatting support
//!
//! # Usage
//!
//! The compare timer binding maps the step, temperature and tone roles
//! onto TIM3. Pin parsing and error converters cover the rest; boards use
//! embassy-stm32 directly for peripheral construction.

#![no_std]

pub mod gpio;
pub mod timer;

pub use timer::{hardware_timer, Stm32f0Timer, STM32F0_TIMERS};
