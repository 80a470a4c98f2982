//! # Telemetry Protocol Constants and Types
//!
//! Core definitions shared by the frame decoder, the control encoder and the
//! channel buffers.

use std::fmt;

use chrono::{DateTime, Utc};

/// Number of telemetry channels carried by one frame
pub const NUM_CHANNELS: usize = 4;

/// Lower bound of a control value
pub const CONTROL_VALUE_MIN: f64 = 0.0;

/// Upper bound of a control value
pub const CONTROL_VALUE_MAX: f64 = 100.0;

/// One of the four measured quantities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    Humidity,
    Temperature,
    Angle,
    Intensity,
}

impl Channel {
    /// All channels in wire order
    pub const ALL: [Channel; NUM_CHANNELS] = [
        Channel::Humidity,
        Channel::Temperature,
        Channel::Angle,
        Channel::Intensity,
    ];

    /// Single-letter tag that prefixes this channel's field on the wire
    #[must_use]
    pub fn tag(self) -> char {
        match self {
            Channel::Humidity => 'H',
            Channel::Temperature => 'T',
            Channel::Angle => 'B',
            Channel::Intensity => 'L',
        }
    }

    /// Position of this channel in wire order (0-3)
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Channel::Humidity => 0,
            Channel::Temperature => 1,
            Channel::Angle => 2,
            Channel::Intensity => 3,
        }
    }

    /// Column label used in exports and status output
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Channel::Humidity => "Humidity",
            Channel::Temperature => "Temperature",
            Channel::Angle => "Angle",
            Channel::Intensity => "Intensity",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::Humidity => "humidity",
            Channel::Temperature => "temperature",
            Channel::Angle => "angle",
            Channel::Intensity => "intensity",
        };
        f.write_str(name)
    }
}

/// Decoded frame values, not yet timestamped
///
/// The decoder never reads a clock; the session turns a `Frame` into a
/// [`Sample`] with [`Frame::at`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub humidity: f64,
    pub temperature: f64,
    pub angle: f64,
    pub intensity: f64,
}

impl Frame {
    /// Builds a frame from values in wire order
    #[must_use]
    pub fn from_values(values: [f64; NUM_CHANNELS]) -> Self {
        let [humidity, temperature, angle, intensity] = values;
        Self {
            humidity,
            temperature,
            angle,
            intensity,
        }
    }

    /// Values in wire order
    #[must_use]
    pub fn values(&self) -> [f64; NUM_CHANNELS] {
        [self.humidity, self.temperature, self.angle, self.intensity]
    }

    /// Stamps the frame, producing an immutable sample
    #[must_use]
    pub fn at(self, timestamp: DateTime<Utc>) -> Sample {
        Sample {
            timestamp,
            humidity: self.humidity,
            temperature: self.temperature,
            angle: self.angle,
            intensity: self.intensity,
        }
    }
}

/// One timestamped reading across all four channels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub humidity: f64,
    pub temperature: f64,
    pub angle: f64,
    pub intensity: f64,
}

impl Sample {
    /// Reading for a single channel
    #[must_use]
    pub fn value(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Humidity => self.humidity,
            Channel::Temperature => self.temperature,
            Channel::Angle => self.angle,
            Channel::Intensity => self.intensity,
        }
    }
}

/// Two operator-set values relayed to the device
///
/// Both values are kept within 0-100. A missing or non-numeric value is
/// treated as 0, the same as a slider left at zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlCommand {
    value1: f64,
    value2: f64,
}

impl ControlCommand {
    /// Creates a command, clamping both values to 0-100
    ///
    /// # Examples
    ///
    /// ```
    /// use serial_telemetry::protocol::types::ControlCommand;
    ///
    /// let cmd = ControlCommand::new(150.0, 42.5);
    /// assert_eq!(cmd.value1(), 100.0);
    /// assert_eq!(cmd.value2(), 42.5);
    /// ```
    #[must_use]
    pub fn new(value1: f64, value2: f64) -> Self {
        Self {
            value1: clamp_control_value(value1),
            value2: clamp_control_value(value2),
        }
    }

    /// Creates a command from possibly-unset operator inputs
    #[must_use]
    pub fn from_inputs(value1: Option<f64>, value2: Option<f64>) -> Self {
        Self::new(value1.unwrap_or(0.0), value2.unwrap_or(0.0))
    }

    #[must_use]
    pub fn value1(&self) -> f64 {
        self.value1
    }

    #[must_use]
    pub fn value2(&self) -> f64 {
        self.value2
    }
}

fn clamp_control_value(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    // Normalizes -0.0 so it encodes as "0"
    value.clamp(CONTROL_VALUE_MIN, CONTROL_VALUE_MAX) + 0.0
}
