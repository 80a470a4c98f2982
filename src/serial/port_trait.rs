//! Trait abstraction for opening serial ports to enable testing

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::ConnectionError;

/// Telemetry device baud rate (9600 baud)
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Longest a single poll waits for a line
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Line settings applied when a port is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortSettings {
    pub baud_rate: u32,
    pub read_timeout: Duration,
}

impl Default for PortSettings {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Byte stream to and from the device
pub trait SerialPortIO: AsyncRead + AsyncWrite + Unpin {}

impl<T: AsyncRead + AsyncWrite + Unpin> SerialPortIO for T {}

/// Opens ports by platform name
pub trait PortOpener {
    type Port: SerialPortIO;

    /// Open `path` with the given settings
    fn open(&self, path: &str, settings: &PortSettings) -> io::Result<Self::Port>;
}

/// Opens real serial ports through `tokio-serial`
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSerialOpener;

impl PortOpener for TokioSerialOpener {
    type Port = tokio_serial::SerialStream;

    fn open(&self, path: &str, settings: &PortSettings) -> io::Result<Self::Port> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(path, settings.baud_rate)
            .timeout(settings.read_timeout)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()?;

        Ok(port)
    }
}

/// List the serial ports present on this machine
///
/// # Errors
///
/// Returns [`ConnectionError::Enumerate`] if the platform query fails
pub fn available_ports() -> Result<Vec<String>, ConnectionError> {
    let ports = tokio_serial::available_ports().map_err(|e| ConnectionError::Enumerate(e.to_string()))?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
