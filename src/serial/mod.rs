//! # Serial Communication Module
//!
//! Owns the connection to the telemetry device.
//!
//! This module handles:
//! - Opening the serial port at 9600 baud
//! - Reading newline-terminated telemetry lines with a bounded timeout
//! - Decoding lines into samples and appending them to the channel buffers
//! - Writing control values back to the device
//! - Dropping the connection when the device goes away
//!
//! A [`Session`] is the only owner of its port. Every operation takes
//! `&mut self`, so reads, writes and closes can never overlap on the same
//! handle. Run it from a single task.

pub mod framer;
pub mod port_trait;

use std::io;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, warn};

use crate::buffer::ChannelBuffer;
use crate::error::{ConnectionError, TransportError};
use crate::protocol::decoder::decode_frame;
use crate::protocol::encoder::encode_control;
use crate::protocol::types::{ControlCommand, Sample};
use framer::LineFramer;
use port_trait::{PortOpener, PortSettings, TokioSerialOpener};

pub use port_trait::available_ports;

/// Bytes requested from the port per read call
const READ_CHUNK_SIZE: usize = 64;

/// Connection state of a [`Session`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
}

/// Line counters for the current connection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Non-empty lines received
    pub lines_received: u64,
    /// Lines that became samples
    pub samples_decoded: u64,
    /// Lines discarded as malformed
    pub frames_rejected: u64,
    /// Lines dropped by the framer for exceeding the length limit
    pub lines_overlong: u64,
}

/// Timestamp for a new sample: `now`, held at `previous` if the clock stepped back
fn stamp(now: DateTime<Utc>, previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match previous {
        Some(previous) => now.max(previous),
        None => now,
    }
}

struct Connection<P> {
    port: P,
    port_name: String,
}

/// Telemetry session over one serial port
///
/// Generic over the [`PortOpener`] so tests can script the device.
pub struct Session<O: PortOpener = TokioSerialOpener> {
    opener: O,
    settings: PortSettings,
    connection: Option<Connection<O::Port>>,
    framer: LineFramer,
    buffer: ChannelBuffer,
    stats: SessionStats,
    last_control: ControlCommand,
}

impl<O: PortOpener> std::fmt::Debug for Session<O> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("port_name", &self.port_name())
            .field("settings", &self.settings)
            .field("samples", &self.buffer.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Session<TokioSerialOpener> {
    /// Creates a disconnected session backed by real serial ports
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use serial_telemetry::serial::Session;
    /// use serial_telemetry::serial::port_trait::PortSettings;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let mut session = Session::new(PortSettings::default(), Duration::from_secs(100));
    ///     session.connect("/dev/ttyACM0")?;
    ///
    ///     if let Some(sample) = session.poll_once().await? {
    ///         println!("humidity: {}", sample.humidity);
    ///     }
    ///     Ok(())
    /// }
    /// ```
    #[must_use]
    pub fn new(settings: PortSettings, display_window: Duration) -> Self {
        Self::with_opener(TokioSerialOpener, settings, display_window)
    }
}

impl<O: PortOpener> Session<O> {
    /// Creates a disconnected session using a custom port opener
    #[must_use]
    pub fn with_opener(opener: O, settings: PortSettings, display_window: Duration) -> Self {
        Self {
            opener,
            settings,
            connection: None,
            framer: LineFramer::new(),
            buffer: ChannelBuffer::new(display_window),
            stats: SessionStats::default(),
            last_control: ControlCommand::default(),
        }
    }

    /// Open the named port
    ///
    /// A successful connect starts a fresh history: buffers and counters are
    /// cleared. On failure the session is left untouched.
    ///
    /// # Errors
    ///
    /// - `AlreadyConnected` if a port is already open
    /// - `PortUnavailable` if the port cannot be opened
    pub fn connect(&mut self, port_name: &str) -> Result<(), ConnectionError> {
        if let Some(connection) = &self.connection {
            return Err(ConnectionError::AlreadyConnected {
                port: connection.port_name.clone(),
            });
        }

        debug!("Trying to open serial port: {}", port_name);
        let port = self
            .opener
            .open(port_name, &self.settings)
            .map_err(|e| ConnectionError::PortUnavailable {
                port: port_name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Connected to {} at {} baud", port_name, self.settings.baud_rate);
        self.framer.clear();
        self.buffer.reset();
        self.stats = SessionStats::default();
        self.connection = Some(Connection {
            port,
            port_name: port_name.to_string(),
        });
        Ok(())
    }

    /// Close the port if open. Calling it again is a no-op.
    ///
    /// Buffered samples are kept so they can still be exported.
    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            info!("Disconnected from {}", connection.port_name);
        }
        self.framer.clear();
    }

    /// Wait up to the read timeout for one telemetry line
    ///
    /// # Returns
    ///
    /// * `Ok(Some(sample))` - A line decoded and was appended to the buffers
    /// * `Ok(None)` - Timeout, blank line, or a malformed line (logged and dropped)
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no port is open
    /// - `Read` or `Closed` if the link failed; the session is disconnected
    pub async fn poll_once(&mut self) -> Result<Option<Sample>, TransportError> {
        let deadline = Instant::now() + self.settings.read_timeout;
        match self.next_line(deadline).await? {
            Some(line) => Ok(self.handle_line(&line)),
            None => Ok(None),
        }
    }

    /// Wait up to the read timeout for the first line, then take every
    /// line that is already available without waiting again
    ///
    /// Samples are returned in arrival order and are already in the buffers.
    /// Returns an empty `Vec` if nothing arrived before the timeout.
    ///
    /// # Errors
    ///
    /// Same as [`poll_once`](Self::poll_once). Samples decoded before the
    /// failure stay in the buffers.
    pub async fn poll_batch(&mut self) -> Result<Vec<Sample>, TransportError> {
        let mut samples = Vec::new();
        let mut deadline = Instant::now() + self.settings.read_timeout;

        while let Some(line) = self.next_line(deadline).await? {
            samples.extend(self.handle_line(&line));
            deadline = Instant::now();
        }

        Ok(samples)
    }

    /// Next raw line, reading the port until `deadline`
    ///
    /// A deadline already in the past still takes bytes the port has ready.
    async fn next_line(&mut self, deadline: Instant) -> Result<Option<String>, TransportError> {
        if self.connection.is_none() {
            return Err(TransportError::NotConnected);
        }

        loop {
            let line = self.framer.next_line();
            self.stats.lines_overlong += self.framer.take_overflows();
            if line.is_some() {
                return Ok(line);
            }

            let connection = self.connection.as_mut().ok_or(TransportError::NotConnected)?;
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = timeout_at(deadline, connection.port.read(&mut chunk)).await;
            match read {
                Err(_) => return Ok(None),
                Ok(Ok(0)) => {
                    self.drop_connection("device closed the port");
                    return Err(TransportError::Closed);
                }
                Ok(Ok(n)) => self.framer.extend(&chunk[..n]),
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
                Ok(Err(e)) => {
                    self.drop_connection(&e.to_string());
                    return Err(TransportError::Read(e));
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) -> Option<Sample> {
        if line.is_empty() {
            return None;
        }
        self.stats.lines_received += 1;

        let frame = match decode_frame(line) {
            Ok(frame) => frame,
            Err(e) => {
                self.stats.frames_rejected += 1;
                warn!("Discarding telemetry line {:?}: {}", line, e);
                return None;
            }
        };

        let sample = frame.at(stamp(Utc::now(), self.buffer.latest().map(|s| s.timestamp)));
        if let Err(e) = self.buffer.push(&sample) {
            warn!("Dropping sample: {}", e);
            return None;
        }

        self.stats.samples_decoded += 1;
        debug!(
            "Sample H={} T={} B={} L={}",
            sample.humidity, sample.temperature, sample.angle, sample.intensity
        );
        Some(sample)
    }

    fn drop_connection(&mut self, reason: &str) {
        if let Some(connection) = self.connection.take() {
            error!("Lost connection to {}: {}", connection.port_name, reason);
        }
        self.framer.clear();
    }

    /// Send both control values to the device
    ///
    /// A failed write is reported but leaves the session connected; a dead
    /// link shows up on the next [`poll_once`](Self::poll_once).
    ///
    /// # Errors
    ///
    /// - `NotConnected` if no port is open
    /// - `Write` if writing or flushing failed
    pub async fn send_control(&mut self, cmd: ControlCommand) -> Result<(), TransportError> {
        let connection = self.connection.as_mut().ok_or(TransportError::NotConnected)?;
        let bytes = encode_control(&cmd);

        connection.port.write_all(&bytes).await.map_err(TransportError::Write)?;
        connection.port.flush().await.map_err(TransportError::Write)?;

        debug!("Sent control values ({} bytes)", bytes.len());
        self.last_control = cmd;
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.connection.is_some() {
            SessionState::Connected
        } else {
            SessionState::Disconnected
        }
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Name of the open port
    #[must_use]
    pub fn port_name(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.port_name.as_str())
    }

    /// Most recent sample
    #[must_use]
    pub fn latest(&self) -> Option<Sample> {
        self.buffer.latest()
    }

    /// Read access to the channel buffers; take a snapshot to keep data
    #[must_use]
    pub fn buffer(&self) -> &ChannelBuffer {
        &self.buffer
    }

    #[must_use]
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Last control command written successfully
    #[must_use]
    pub fn last_control(&self) -> ControlCommand {
        self.last_control
    }
}

#[cfg(test)]
mod tests {
    use super::port_trait::mocks::MockOpener;
    use super::*;
    use crate::buffer::DEFAULT_DISPLAY_WINDOW;
    use crate::protocol::types::Channel;
    use tokio_test::io::Builder;

    fn session_with(ports: Vec<tokio_test::io::Mock>) -> Session<MockOpener> {
        Session::with_opener(MockOpener::new(ports), PortSettings::default(), DEFAULT_DISPLAY_WINDOW)
    }

    fn connected(port: tokio_test::io::Mock) -> Session<MockOpener> {
        let mut session = session_with(vec![port]);
        session.connect("/dev/mock0").unwrap();
        session
    }

    #[tokio::test]
    async fn test_poll_decodes_line() {
        let mut session = connected(Builder::new().read(b"H45.2T23.1B90L512\n").build());

        let sample = session.poll_once().await.unwrap().expect("sample");
        assert_eq!(sample.humidity, 45.2);
        assert_eq!(sample.temperature, 23.1);
        assert_eq!(sample.angle, 90.0);
        assert_eq!(sample.intensity, 512.0);

        assert_eq!(session.buffer().len(), 1);
        assert_eq!(session.latest(), Some(sample));
        assert_eq!(session.stats().samples_decoded, 1);
    }

    #[tokio::test]
    async fn test_poll_assembles_split_line() {
        let mut session = connected(Builder::new().read(b"H45.2T2").read(b"3.1B90L512\r\n").build());

        let sample = session.poll_once().await.unwrap().expect("sample");
        assert_eq!(sample.temperature, 23.1);
    }

    #[tokio::test]
    async fn test_malformed_line_keeps_session_alive() {
        let mut session = connected(Builder::new().read(b"H45T23L512\nHxxTyyBzzLww\nH1T2B3L4\n").build());

        assert_eq!(session.poll_once().await.unwrap(), None);
        assert_eq!(session.poll_once().await.unwrap(), None);
        assert!(session.is_connected());
        assert!(session.buffer().is_empty());

        let sample = session.poll_once().await.unwrap().expect("sample");
        assert_eq!(sample.value(Channel::Intensity), 4.0);

        let stats = session.stats();
        assert_eq!(stats.lines_received, 3);
        assert_eq!(stats.frames_rejected, 2);
        assert_eq!(stats.samples_decoded, 1);
    }

    #[tokio::test]
    async fn test_blank_line_is_not_a_sample() {
        let mut session = connected(Builder::new().read(b"\r\n").build());
        assert_eq!(session.poll_once().await.unwrap(), None);
        assert_eq!(session.stats().lines_received, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_times_out_without_data() {
        let mut session = connected(
            Builder::new()
                .wait(Duration::from_secs(5))
                .read(b"H1T2B3L4\n")
                .build(),
        );

        let mut empty_polls = 0;
        let sample = loop {
            match session.poll_once().await.unwrap() {
                Some(sample) => break sample,
                None => empty_polls += 1,
            }
            assert!(session.is_connected());
        };

        assert!(empty_polls >= 4, "expected timeouts before data, got {}", empty_polls);
        assert_eq!(sample.humidity, 1.0);
    }

    #[tokio::test]
    async fn test_samples_keep_arrival_order() {
        let mut session = connected(Builder::new().read(b"H1T0B0L0\nH2T0B0L0\n").read(b"H3T0B0L0\n").build());

        for _ in 0..3 {
            session.poll_once().await.unwrap().expect("sample");
        }

        let snapshot = session.buffer().snapshot();
        assert_eq!(snapshot.series(Channel::Humidity).values(), &[1.0, 2.0, 3.0]);
        assert!(snapshot.timestamps().windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_takes_every_ready_line() {
        let mut session = connected(
            Builder::new()
                .read(b"H1T0B0L0\nH2T0B0L0\nH3T0B0L0\n")
                .wait(Duration::from_secs(5))
                .build(),
        );

        let samples = session.poll_batch().await.unwrap();
        assert_eq!(samples.len(), 3);
        assert_eq!(session.buffer().len(), 3);
        assert_eq!(
            session.buffer().series(Channel::Humidity).values(),
            &[1.0, 2.0, 3.0]
        );
        assert!(session.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_skips_noise_between_lines() {
        let mut session = connected(
            Builder::new()
                .read(b"H1T0B0L0\ngarbage\n\r\n")
                .read(b"H2T0B0L0\n")
                .wait(Duration::from_secs(5))
                .build(),
        );

        let samples = session.poll_batch().await.unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(session.stats().frames_rejected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_times_out_empty() {
        let mut session = connected(Builder::new().wait(Duration::from_secs(5)).build());
        assert!(session.poll_batch().await.unwrap().is_empty());
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_overlong_line_is_counted() {
        let mut line = vec![b'x'; framer::MAX_LINE_LENGTH + 10];
        line.extend_from_slice(b"\nH1T2B3L4\n");
        let mut session = connected(Builder::new().read(&line).build());

        let sample = session.poll_once().await.unwrap().expect("sample");
        assert_eq!(sample.humidity, 1.0);
        assert_eq!(session.stats().lines_overlong, 1);
        assert_eq!(session.stats().frames_rejected, 0);
    }

    #[test]
    fn test_stamp_holds_when_clock_steps_back() {
        use chrono::TimeZone;

        let previous = Utc.timestamp_opt(1_700_000_100, 0).single().unwrap();
        let earlier = Utc.timestamp_opt(1_700_000_000, 0).single().unwrap();
        let later = Utc.timestamp_opt(1_700_000_200, 0).single().unwrap();

        assert_eq!(stamp(earlier, Some(previous)), previous);
        assert_eq!(stamp(later, Some(previous)), later);
        assert_eq!(stamp(earlier, None), earlier);
    }

    #[tokio::test]
    async fn test_end_of_stream_disconnects() {
        let mut session = connected(Builder::new().build());

        let result = session.poll_once().await;
        assert!(matches!(result, Err(TransportError::Closed)));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_read_error_disconnects_and_keeps_data() {
        let mut session = connected(
            Builder::new()
                .read(b"H1T2B3L4\n")
                .read_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
                .build(),
        );

        session.poll_once().await.unwrap().expect("sample");
        let result = session.poll_once().await;
        assert!(matches!(result, Err(TransportError::Read(_))));
        assert!(!session.is_connected());
        assert_eq!(session.buffer().len(), 1);
    }

    #[tokio::test]
    async fn test_poll_while_disconnected() {
        let mut session = session_with(vec![]);
        assert!(matches!(session.poll_once().await, Err(TransportError::NotConnected)));
    }

    #[test]
    fn test_connect_unavailable_port() {
        let mut session = session_with(vec![]);

        match session.connect("/dev/missing") {
            Err(ConnectionError::PortUnavailable { port, .. }) => assert_eq!(port, "/dev/missing"),
            other => panic!("Expected PortUnavailable, got: {:?}", other),
        }
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_connect_twice_fails() {
        let mut session = session_with(vec![Builder::new().build(), Builder::new().build()]);
        session.connect("/dev/mock0").unwrap();

        match session.connect("/dev/mock1") {
            Err(ConnectionError::AlreadyConnected { port }) => assert_eq!(port, "/dev/mock0"),
            other => panic!("Expected AlreadyConnected, got: {:?}", other),
        }
        assert_eq!(session.port_name(), Some("/dev/mock0"));

        // The second port is still available once the first is closed
        session.disconnect();
        session.connect("/dev/mock1").unwrap();
    }

    #[test]
    fn test_disconnect_is_idempotent() {
        let mut session = connected(Builder::new().build());
        session.disconnect();
        session.disconnect();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(session.port_name(), None);
    }

    #[tokio::test]
    async fn test_reconnect_starts_fresh_history() {
        let mut session = session_with(vec![
            Builder::new().read(b"H1T2B3L4\n").build(),
            Builder::new().build(),
        ]);
        session.connect("/dev/mock0").unwrap();
        session.poll_once().await.unwrap().expect("sample");
        session.disconnect();
        assert_eq!(session.buffer().len(), 1);

        session.connect("/dev/mock0").unwrap();
        assert!(session.buffer().is_empty());
        assert_eq!(session.stats(), SessionStats::default());
    }

    #[tokio::test]
    async fn test_send_control_writes_encoded_values() {
        let mut session = connected(Builder::new().write(b"37.5,100").build());

        session.send_control(ControlCommand::new(37.5, 100.0)).await.unwrap();
        assert_eq!(session.last_control(), ControlCommand::new(37.5, 100.0));
    }

    #[tokio::test]
    async fn test_send_unset_control_values() {
        let mut session = connected(Builder::new().write(b"0,0").build());
        session.send_control(ControlCommand::from_inputs(None, None)).await.unwrap();
    }

    #[tokio::test]
    async fn test_send_while_disconnected() {
        let mut session = session_with(vec![]);
        let result = session.send_control(ControlCommand::default()).await;
        assert!(matches!(result, Err(TransportError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_failure_keeps_session() {
        let mut session = connected(
            Builder::new()
                .write_error(io::Error::new(io::ErrorKind::BrokenPipe, "unplugged"))
                .build(),
        );

        let result = session.send_control(ControlCommand::new(10.0, 20.0)).await;
        assert!(matches!(result, Err(TransportError::Write(_))));
        assert!(session.is_connected());
        assert_eq!(session.last_control(), ControlCommand::default());
    }
}
