//! # Control Value Encoder
//!
//! Encodes the two operator control values into the outbound wire format
//! `<value1>,<value2>`. No terminator is appended and the device sends no
//! acknowledgement.

use super::types::ControlCommand;

/// Field separator between the two control values
pub const CONTROL_SEPARATOR: char = ',';

/// Encode a control command into wire bytes
///
/// Values use the shortest decimal text that reads back to the same number,
/// so whole numbers carry no fractional part.
///
/// # Examples
///
/// ```
/// use serial_telemetry::protocol::encoder::encode_control;
/// use serial_telemetry::protocol::types::ControlCommand;
///
/// assert_eq!(encode_control(&ControlCommand::default()), b"0,0");
/// assert_eq!(encode_control(&ControlCommand::new(37.5, 100.0)), b"37.5,100");
/// ```
pub fn encode_control(cmd: &ControlCommand) -> Vec<u8> {
    format!("{}{}{}", cmd.value1(), CONTROL_SEPARATOR, cmd.value2()).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_unset_values() {
        let cmd = ControlCommand::from_inputs(None, None);
        assert_eq!(encode_control(&cmd), b"0,0".to_vec());
    }

    #[test]
    fn test_encode_zero_matches_unset() {
        let zero = ControlCommand::new(0.0, 0.0);
        let unset = ControlCommand::from_inputs(None, Some(0.0));
        assert_eq!(encode_control(&zero), encode_control(&unset));
    }

    #[test]
    fn test_encode_fractional_values() {
        let cmd = ControlCommand::new(12.25, 99.5);
        assert_eq!(encode_control(&cmd), b"12.25,99.5".to_vec());
    }

    #[test]
    fn test_encode_clamped_values() {
        let cmd = ControlCommand::new(-3.0, 1000.0);
        assert_eq!(encode_control(&cmd), b"0,100".to_vec());
    }

    #[test]
    fn test_encode_has_no_terminator() {
        let bytes = encode_control(&ControlCommand::new(1.0, 2.0));
        assert_eq!(bytes.last(), Some(&b'2'));
        assert_eq!(bytes.iter().filter(|&&b| b == b',').count(), 1);
    }
}
