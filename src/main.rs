//! # Serial Telemetry
//!
//! Read humidity, temperature, angle and intensity from a serial device and
//! send control values back to it.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, `config/default.toml`, or defaults)
//!    - Set up logging with tracing subscriber
//!    - Open the configured serial port, if any
//!
//! 2. **Main Loop**
//!    - Poll the device every 100 ms; each poll waits at most the read timeout
//!      for the first line, then takes every line already queued
//!    - Execute operator commands typed on stdin (`help` lists them)
//!    - Handle Ctrl+C for graceful shutdown
//!
//! Expected output:
//! ```text
//! INFO serial_telemetry: Serial Telemetry v0.1.0 starting...
//! INFO serial_telemetry::serial: Connected to /dev/ttyACM0 at 9600 baud
//! INFO serial_telemetry: Received 100 samples (latest H=45.2 T=23.1 B=90 L=512)
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use serial_telemetry::config::{Config, LoggingConfig};
use serial_telemetry::console::{parse_command, Operator, Reply};
use serial_telemetry::serial::Session;

/// Configuration file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Number of samples between status log messages
const LOG_INTERVAL_SAMPLES: u64 = 100;

/// Log file name inside the configured log directory
const LOG_FILE_NAME: &str = "serial-telemetry.log";

fn load_config() -> Result<Config> {
    match std::env::args().nth(1) {
        Some(path) => Config::load(&path).with_context(|| format!("Failed to load configuration from {}", path)),
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
            Config::load(DEFAULT_CONFIG_PATH).with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_PATH))
        }
        None => Ok(Config::default()),
    }
}

/// Initialize logging; keep the guard alive so buffered lines get flushed
fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let to_file = !config.directory.is_empty();
    let (writer, guard) = if to_file {
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&config.directory, LOG_FILE_NAME))
    } else {
        tracing_appender::non_blocking(std::io::stderr())
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level)))
        .with_writer(writer)
        .with_ansi(!to_file)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    let _log_guard = init_logging(&config.logging);

    info!("Serial Telemetry v{} starting...", env!("CARGO_PKG_VERSION"));

    let mut session = Session::new(config.serial.port_settings(), config.buffer.display_window());
    let mut operator = Operator::new(
        config.control.command(),
        config.serial.port.clone(),
        config.export.clone(),
    );

    if !config.serial.port.is_empty() {
        if let Err(e) = session.connect(&config.serial.port) {
            warn!("{}", e);
        }
    }

    let mut console = BufReader::new(tokio::io::stdin()).lines();
    let mut console_open = true;

    let mut poll_interval = interval(config.serial.poll_interval());
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!("Polling every {} ms", config.serial.poll_interval_ms);
    println!("Type 'help' for commands");

    let mut sample_count: u64 = 0;

    // Main loop: one task owns the session, so polls, sends and closes never overlap
    loop {
        tokio::select! {
            _ = poll_interval.tick() => {
                if !session.is_connected() {
                    continue;
                }

                // Drain every queued line per tick
                match session.poll_batch().await {
                    Ok(samples) => {
                        let Some(sample) = samples.last() else {
                            continue;
                        };
                        let before = sample_count;
                        sample_count += samples.len() as u64;
                        if sample_count / LOG_INTERVAL_SAMPLES > before / LOG_INTERVAL_SAMPLES {
                            info!("Received {} samples (latest H={} T={} B={} L={})",
                                sample_count, sample.humidity, sample.temperature, sample.angle, sample.intensity);
                        }
                    }
                    Err(e) => error!("{}; use 'connect' to reconnect", e),
                }
            }

            line = console.next_line(), if console_open => {
                match line {
                    Ok(Some(line)) => match parse_command(&line) {
                        Ok(Some(command)) => match operator.execute(&mut session, command).await {
                            Ok(Reply::Text(text)) => println!("{}", text),
                            Ok(Reply::Quit) => break,
                            Err(e) => println!("error: {}", e),
                        },
                        Ok(None) => {}
                        Err(e) => println!("error: {}", e),
                    },
                    Ok(None) => {
                        debug!("Console input closed");
                        console_open = false;
                    }
                    Err(e) => {
                        warn!("Failed to read console input: {}", e);
                        console_open = false;
                    }
                }
            }

            // Handle Ctrl+C for graceful shutdown
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    session.disconnect();
    info!("Total samples received: {}", sample_count);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_interval_constant() {
        assert_eq!(LOG_INTERVAL_SAMPLES, 100);

        // At the default 100 ms poll interval, 100 samples is about 10 seconds
        let config = Config::default();
        let seconds = LOG_INTERVAL_SAMPLES * config.serial.poll_interval_ms / 1000;
        assert_eq!(seconds, 10);
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join(DEFAULT_CONFIG_PATH);
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }
}
