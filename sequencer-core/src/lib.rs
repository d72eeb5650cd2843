#![no_std]

// Shared logic for the power sequencing controller.
//
// This crate stays portable across the MCU firmware and the host emulator by
// avoiding the Rust standard library. Hardware is reached only through the
// traits in `hal`, and everything interrupt handlers touch lives in
// `shared::SharedState`.

pub mod adc;
pub mod config;
pub mod controller;
pub mod hal;
pub mod registers;
pub mod sequencer;
pub mod shared;
pub mod signals;
pub mod sleep;
pub mod telemetry;
pub mod timers;
