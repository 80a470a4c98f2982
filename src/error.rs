//! # Error Types
//!
//! Custom error types for Serial Telemetry using `thiserror`.
//!
//! Each layer has its own error enum so callers can tell recoverable noise
//! ([`ParseError`]) apart from link failures ([`TransportError`]) and operator
//! mistakes ([`ConnectionError`]). [`TelemetryError`] wraps them all.

use std::io;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::protocol::types::Channel;

/// Frame decoding errors. Always recoverable: the line is dropped.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A tag is missing, or the tags are not in `H`, `T`, `B`, `L` order
    #[error("malformed frame: expected tag '{tag}' at or after byte {offset}")]
    MalformedFrame { tag: char, offset: usize },

    /// A field is empty, non-numeric or not finite
    #[error("invalid {channel} field: {value:?}")]
    InvalidField { channel: Channel, value: String },
}

/// Channel buffer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Timestamp older than the newest stored one
    #[error("out-of-order timestamp {timestamp} (latest is {latest})")]
    OutOfOrder {
        timestamp: DateTime<Utc>,
        latest: DateTime<Utc>,
    },
}

/// Connection lifecycle errors, surfaced to the operator and never retried
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The named port could not be opened
    #[error("serial port {port} unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    /// A connection is already open
    #[error("already connected to {port}")]
    AlreadyConnected { port: String },

    /// Listing the platform's serial ports failed
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),
}

/// Errors on the open link
#[derive(Debug, Error)]
pub enum TransportError {
    /// No port is open
    #[error("not connected")]
    NotConnected,

    /// Reading from the port failed; the session is now disconnected
    #[error("serial read failed: {0}")]
    Read(#[source] io::Error),

    /// The device closed the stream; the session is now disconnected
    #[error("serial port closed by device")]
    Closed,

    /// Writing to the port failed
    #[error("serial write failed: {0}")]
    Write(#[source] io::Error),
}

/// CSV export errors
#[derive(Debug, Error)]
pub enum ExportError {
    /// Destination could not be created or written
    #[error("export I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV encoding failed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Finalizing the temporary file failed
    #[error("failed to finalize export file: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Main error type for Serial Telemetry
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Export(#[from] ExportError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for Serial Telemetry
pub type Result<T> = std::result::Result<T, TelemetryError>;
