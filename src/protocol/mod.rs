//! # Telemetry Protocol Module
//!
//! Line protocol spoken by the sensor device.
//!
//! This module handles:
//! - Inbound frame decoding (`H<h>T<t>B<b>L<l>`)
//! - Outbound control value encoding (`<v1>,<v2>`)
//! - Channel, frame, sample and control command types

pub mod types;
pub mod decoder;
pub mod encoder;
