//! Hex-float encoding/decoding
//!
//! The controller transmits every measured value as the big-endian bit pattern
//! of an IEEE-754 single-precision float, rendered as exactly 8 hex digits.
//! The firmware abbreviates a zero value to the single character `0`.

use super::ProtocolError;

/// Decode an 8-hex-digit big-endian float value.
///
/// The literal token `"0"` is accepted as shorthand for `"00000000"`
/// (positive zero). Anything else that is not exactly 8 hex digits is a
/// [`ProtocolError::Decode`].
pub fn decode_hex_float(token: &str) -> Result<f32, ProtocolError> {
    let token = if token == "0" { "00000000" } else { token };

    if token.len() != 8 || !token.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ProtocolError::Decode(token.to_string()));
    }

    let bits =
        u32::from_str_radix(token, 16).map_err(|_| ProtocolError::Decode(token.to_string()))?;
    Ok(f32::from_bits(bits))
}

/// Encode a float the way the controller transmits it: 8 hex digits of the
/// big-endian bit pattern. Used by the demo device and by tests.
pub fn encode_hex_float(value: f32) -> String {
    format!("{:08x}", value.to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for &v in &[
            0.0f32,
            -0.0,
            1.0,
            -1.0,
            25.4,
            -273.16,
            f32::MIN_POSITIVE,
            1.0e-42, // subnormal
            f32::MAX,
            f32::INFINITY,
            f32::NEG_INFINITY,
        ] {
            let decoded = decode_hex_float(&encode_hex_float(v)).unwrap();
            assert_eq!(decoded.to_bits(), v.to_bits(), "round trip failed for {v}");
        }
    }

    #[test]
    fn test_nan_round_trip_preserves_payload() {
        let nan = f32::from_bits(0x7fc0_1234);
        let decoded = decode_hex_float(&encode_hex_float(nan)).unwrap();
        assert!(decoded.is_nan());
        assert_eq!(decoded.to_bits(), nan.to_bits());
    }

    #[test]
    fn test_zero_shorthand() {
        let v = decode_hex_float("0").unwrap();
        assert_eq!(v, 0.0);
        assert!(v.is_sign_positive());
    }

    #[test]
    fn test_known_patterns() {
        // 0x41c80000 is 25.0
        assert_eq!(decode_hex_float("41c80000").unwrap(), 25.0);
        // Uppercase digits are valid hex too
        assert_eq!(decode_hex_float("41C80000").unwrap(), 25.0);
        // 0xc2480000 is -50.0
        assert_eq!(decode_hex_float("c2480000").unwrap(), -50.0);
    }

    #[test]
    fn test_malformed_tokens() {
        for bad in ["", "41c8", "41c80000ff", "READY", "0x41c800", "41c8000g"] {
            assert!(
                matches!(decode_hex_float(bad), Err(ProtocolError::Decode(_))),
                "expected decode error for {bad:?}"
            );
        }
    }
}
