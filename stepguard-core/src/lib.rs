//! Board-agnostic core of the stepper driver supervisor
//!
//! This crate contains everything that does not depend on a specific MCU
//! or driver transport:
//!
//! - Channel and board configuration types
//! - The driver capability trait and the per-class channel arena
//! - Status word normalization into canonical fault categories
//! - The fault monitor with automatic current remediation
//! - Bus arbitration between the monitor and the step ISR
//! - Maintenance commands and diagnostic events

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

pub mod arena;
pub mod config;
pub mod diag;
pub mod maintenance;
pub mod safety;
pub mod status;
pub mod traits;
