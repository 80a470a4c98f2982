//! # Operator Console
//!
//! Line commands read from stdin that drive a [`Session`]:
//!
//! | Command | Action |
//! |---------|--------|
//! | `ports` | List serial ports |
//! | `connect [port]` | Open a port (defaults to the configured one) |
//! | `disconnect` | Close the port |
//! | `set <v1> <v2>` | Set both control values (0-100) |
//! | `send` | Send the control values to the device |
//! | `save [dir]` | Export all samples to CSV |
//! | `status` | Show latest readings and display-window ranges |
//! | `help` | List commands |
//! | `quit` | Exit |

use std::path::PathBuf;

use thiserror::Error;

use crate::buffer::BufferSnapshot;
use crate::config::ExportConfig;
use crate::error::Result;
use crate::export::{export_to_dir, format_timestamp};
use crate::protocol::types::{Channel, ControlCommand, CONTROL_VALUE_MAX, CONTROL_VALUE_MIN};
use crate::serial::port_trait::PortOpener;
use crate::serial::{available_ports, Session};

/// Help text printed by `help`
pub const HELP_TEXT: &str = "\
ports                 list serial ports
connect [port]        open a serial port
disconnect            close the serial port
set <v1> <v2>         set control values (0-100)
send                  send control values to the device
save [dir]            export samples to CSV
status                show latest readings
help                  show this list
quit                  exit";

/// Console command errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsoleError {
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("missing argument: {0}")]
    MissingArg(&'static str),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("{0} out of range (0-100)")]
    OutOfRange(String),

    #[error("no port given and none configured")]
    NoPort,
}

/// Parsed operator command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ports,
    Connect(Option<String>),
    Disconnect,
    Set(ControlCommand),
    Send,
    Save(Option<PathBuf>),
    Status,
    Help,
    Quit,
}

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(line: &str) -> std::result::Result<Option<Command>, ConsoleError> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(None);
    };

    let command = match name.to_ascii_lowercase().as_str() {
        "ports" => Command::Ports,
        "connect" => Command::Connect(parts.next().map(str::to_string)),
        "disconnect" => Command::Disconnect,
        "set" => {
            let value1 = parse_control_value(parts.next().ok_or(ConsoleError::MissingArg("v1"))?)?;
            let value2 = parse_control_value(parts.next().ok_or(ConsoleError::MissingArg("v2"))?)?;
            Command::Set(ControlCommand::new(value1, value2))
        }
        "send" => Command::Send,
        "save" => Command::Save(parts.next().map(PathBuf::from)),
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ConsoleError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

fn parse_control_value(text: &str) -> std::result::Result<f64, ConsoleError> {
    let value: f64 = text
        .parse()
        .map_err(|_| ConsoleError::InvalidValue(text.to_string()))?;
    if !(CONTROL_VALUE_MIN..=CONTROL_VALUE_MAX).contains(&value) {
        return Err(ConsoleError::OutOfRange(text.to_string()));
    }
    Ok(value)
}

/// What the caller should do after a command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Print this text
    Text(String),
    /// Leave the main loop
    Quit,
}

/// Operator-side state: the pending control values and defaults
#[derive(Debug, Clone)]
pub struct Operator {
    control: ControlCommand,
    default_port: String,
    export: ExportConfig,
}

impl Operator {
    #[must_use]
    pub fn new(control: ControlCommand, default_port: String, export: ExportConfig) -> Self {
        Self {
            control,
            default_port,
            export,
        }
    }

    /// Control values that the next `send` will write
    #[must_use]
    pub fn control(&self) -> ControlCommand {
        self.control
    }

    /// Run one command against the session
    ///
    /// # Errors
    ///
    /// Connection, transport and export failures are returned for the caller
    /// to report; none of them end the program.
    pub async fn execute<O: PortOpener>(&mut self, session: &mut Session<O>, command: Command) -> Result<Reply> {
        let text = match command {
            Command::Ports => {
                let ports = available_ports()?;
                if ports.is_empty() {
                    "no serial ports found".to_string()
                } else {
                    ports.join("\n")
                }
            }
            Command::Connect(port) => {
                let port = port.unwrap_or_else(|| self.default_port.clone());
                if port.is_empty() {
                    return Ok(Reply::Text(ConsoleError::NoPort.to_string()));
                }
                session.connect(&port)?;
                format!("connected to {}", port)
            }
            Command::Disconnect => {
                session.disconnect();
                "disconnected".to_string()
            }
            Command::Set(control) => {
                self.control = control;
                format!("control values set to {}, {}", control.value1(), control.value2())
            }
            Command::Send => {
                session.send_control(self.control).await?;
                format!("sent {}, {}", self.control.value1(), self.control.value2())
            }
            Command::Save(dir) => {
                let dir = dir.unwrap_or_else(|| self.export.directory.clone());
                let snapshot = session.buffer().snapshot();
                let path = export_to_dir(&dir, &self.export.file_prefix, &snapshot, &session.last_control())?;
                format!("saved {} samples to {}", snapshot.len(), path.display())
            }
            Command::Status => format_status(session),
            Command::Help => HELP_TEXT.to_string(),
            Command::Quit => return Ok(Reply::Quit),
        };

        Ok(Reply::Text(text))
    }
}

/// Latest readings plus min/max over the display window
pub fn format_status<O: PortOpener>(session: &Session<O>) -> String {
    let mut lines = Vec::new();
    lines.push(match session.port_name() {
        Some(port) => format!("connected: {}", port),
        None => "disconnected".to_string(),
    });

    let stats = session.stats();
    lines.push(format!(
        "lines: {}  samples: {}  rejected: {}  overlong: {}",
        stats.lines_received, stats.samples_decoded, stats.frames_rejected, stats.lines_overlong
    ));

    match session.latest() {
        Some(sample) => {
            lines.push(format!("latest at {}", format_timestamp(&sample.timestamp)));
            lines.extend(format_window(&session.buffer().display_snapshot()));
        }
        None => lines.push("no samples yet".to_string()),
    }

    lines.join("\n")
}

fn format_window(window: &BufferSnapshot) -> Vec<String> {
    Channel::ALL
        .iter()
        .filter_map(|&channel| {
            let stats = window.series(channel).stats()?;
            Some(format!(
                "{:<12} {:>10}  (min {}, max {}, {} in window)",
                channel.label(),
                stats.latest,
                stats.min,
                stats.max,
                stats.count
            ))
        })
        .collect()
}
