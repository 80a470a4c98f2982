//! # Telemetry Frame Decoder
//!
//! Decodes one text line of the form `H<humidity>T<temperature>B<angle>L<intensity>`.
//!
//! The decoder is a small state machine over the fixed tag sequence. It
//! finds the first `H`, then searches for each following tag after the
//! previous one. Bytes before the `H` are line noise and are ignored. A field
//! is the text strictly between its tag and the next tag (or the end of the
//! line for `L`). Field text is not scanned for digits; it is handed to the
//! float parser as-is.

use super::types::{Channel, Frame, NUM_CHANNELS};
use crate::error::ParseError;

/// Decode a telemetry line
///
/// # Arguments
///
/// * `line` - One line without its terminator
///
/// # Returns
///
/// * `Result<Frame, ParseError>` - The four values, or why the line was rejected
///
/// # Errors
///
/// Returns error if:
/// - A tag is missing or the tags are out of order
/// - A field is empty, not a number, or not finite
///
/// # Examples
///
/// ```
/// use serial_telemetry::protocol::decoder::decode_frame;
///
/// let frame = decode_frame("H45.2T23.1B90L512").unwrap();
/// assert_eq!(frame.humidity, 45.2);
/// assert_eq!(frame.intensity, 512.0);
/// ```
pub fn decode_frame(line: &str) -> Result<Frame, ParseError> {
    let bounds = locate_tags(line)?;

    let mut values = [0.0; NUM_CHANNELS];
    for (i, channel) in Channel::ALL.iter().copied().enumerate() {
        let start = bounds[i] + 1;
        let end = bounds.get(i + 1).copied().unwrap_or(line.len());
        values[i] = parse_field(channel, &line[start..end])?;
    }

    Ok(Frame::from_values(values))
}

/// Byte offsets of the four tags, in wire order
fn locate_tags(line: &str) -> Result<[usize; NUM_CHANNELS], ParseError> {
    let mut positions = [0usize; NUM_CHANNELS];

    let mut cursor = 0;
    for (i, channel) in Channel::ALL.iter().enumerate() {
        let tag = channel.tag();
        match line[cursor..].find(tag) {
            Some(rel) => {
                positions[i] = cursor + rel;
                // Tags are ASCII, so the next search starts on a char boundary
                cursor = positions[i] + 1;
            }
            None => {
                return Err(ParseError::MalformedFrame { tag, offset: cursor });
            }
        }
    }

    Ok(positions)
}

fn parse_field(channel: Channel, text: &str) -> Result<f64, ParseError> {
    let invalid = || ParseError::InvalidField {
        channel,
        value: text.to_string(),
    };

    let value: f64 = text.parse().map_err(|_| invalid())?;
    if !value.is_finite() {
        return Err(invalid());
    }
    Ok(value)
}
