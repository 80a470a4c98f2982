//! # Serial Telemetry Library
//!
//! Read four-channel sensor telemetry from a serial device and relay operator
//! control values back to it.
//!
//! This library provides the protocol engine: decoding `H<h>T<t>B<b>L<l>`
//! lines into samples, keeping per-channel history with a live display
//! window, encoding `<v1>,<v2>` control writes, and exporting history to CSV.

pub mod config;
pub mod error;
pub mod protocol;
pub mod buffer;
pub mod serial;
pub mod export;
pub mod console;
