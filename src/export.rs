//! # CSV Export
//!
//! Writes a buffer snapshot to CSV, one row per sample, with the control
//! values captured once at export time repeated on every row.
//!
//! Files are written to a temporary file in the destination directory and
//! renamed into place only after everything has been flushed, so a failed
//! export never leaves a partial `.csv` behind.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use tracing::info;

use crate::buffer::BufferSnapshot;
use crate::error::ExportError;
use crate::protocol::types::ControlCommand;

/// CSV header row
pub const CSV_HEADER: [&str; 7] = [
    "Timestamp",
    "Humidity",
    "Temperature",
    "Angle",
    "Intensity",
    "Scale 1",
    "Scale 2",
];

/// Timestamp column format (local time)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Timestamp format used in export file names
pub const FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// Suffixes tried when exports land in the same second
const MAX_NAME_ATTEMPTS: u32 = 100;

/// One exported row
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRow {
    pub timestamp: String,
    pub humidity: f64,
    pub temperature: f64,
    pub angle: f64,
    pub intensity: f64,
    pub scale1: f64,
    pub scale2: f64,
}

impl ExportRow {
    fn to_record(&self) -> [String; 7] {
        [
            self.timestamp.clone(),
            self.humidity.to_string(),
            self.temperature.to_string(),
            self.angle.to_string(),
            self.intensity.to_string(),
            self.scale1.to_string(),
            self.scale2.to_string(),
        ]
    }
}

/// Render a sample timestamp the way it appears in the CSV
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.with_timezone(&Local).format(TIMESTAMP_FORMAT).to_string()
}

/// Build the rows for a snapshot
pub fn export_rows(snapshot: &BufferSnapshot, control: &ControlCommand) -> Vec<ExportRow> {
    snapshot
        .timestamps()
        .iter()
        .enumerate()
        .filter_map(|(i, ts)| {
            let [humidity, temperature, angle, intensity] = snapshot.values_at(i)?;
            Some(ExportRow {
                timestamp: format_timestamp(ts),
                humidity,
                temperature,
                angle,
                intensity,
                scale1: control.value1(),
                scale2: control.value2(),
            })
        })
        .collect()
}

/// Write header and rows to any writer
///
/// An empty snapshot produces just the header.
///
/// # Errors
///
/// Returns error if writing to `writer` fails
pub fn write_csv<W: Write>(writer: W, snapshot: &BufferSnapshot, control: &ControlCommand) -> Result<(), ExportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(CSV_HEADER)?;
    for row in export_rows(snapshot, control) {
        csv_writer.write_record(row.to_record())?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Export to `<dir>/<prefix>_<YYYYmmdd-HHMMSS>.csv`
///
/// An existing file is never replaced; a second export in the same second
/// gets a `-1`, `-2`, ... suffix.
///
/// # Returns
///
/// * `Result<PathBuf, ExportError>` - Path of the finished file
///
/// # Errors
///
/// Returns error if the directory cannot be created, the file cannot be
/// written, or the finished file cannot be moved into place
///
/// # Examples
///
/// ```no_run
/// use std::path::Path;
/// use serial_telemetry::buffer::ChannelBuffer;
/// use serial_telemetry::export::export_to_dir;
/// use serial_telemetry::protocol::types::ControlCommand;
///
/// let buffer = ChannelBuffer::default();
/// let path = export_to_dir(Path::new("."), "sensor_data", &buffer.snapshot(), &ControlCommand::default())?;
/// println!("Data saved to {}", path.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn export_to_dir(
    dir: &Path,
    prefix: &str,
    snapshot: &BufferSnapshot,
    control: &ControlCommand,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir)?;

    let mut temp = tempfile::Builder::new()
        .prefix(".export-")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    write_csv(temp.as_file_mut(), snapshot, control)?;
    temp.as_file().sync_all()?;

    let stamp = Local::now().format(FILE_TIMESTAMP_FORMAT).to_string();
    let mut attempt = 0;
    loop {
        let path = dir.join(export_file_name(prefix, &stamp, attempt));
        match temp.persist_noclobber(&path) {
            Ok(_) => {
                info!("Data saved to {} ({} samples)", path.display(), snapshot.len());
                return Ok(path);
            }
            Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                temp = e.file;
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// `<prefix>_<stamp>.csv`, then `<prefix>_<stamp>-1.csv` and so on
fn export_file_name(prefix: &str, stamp: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{}_{}.csv", prefix, stamp)
    } else {
        format!("{}_{}-{}.csv", prefix, stamp, attempt)
    }
}
