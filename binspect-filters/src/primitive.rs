//! Primitive value decoders applied in place by the data tree

use std::fmt::Display;

use crate::CodecError;

/// Longest accepted varint encoding, in bytes
pub const VARINT_MAX: usize = 10;

/// Byte order of a fixed-width integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    /// Most significant byte first
    #[default]
    Big,
    /// Least significant byte first
    Little,
}

impl Display for Endian {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Endian::Big => "big",
            Endian::Little => "little",
        })
    }
}

/// Character set of a `string` filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    /// Bytes pass through unvalidated, interpreted as ISO-8859-1
    #[default]
    Raw,
    /// Bytes must form valid UTF-8
    Utf8,
}

impl Display for Charset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Charset::Raw => "raw",
            Charset::Utf8 => "utf-8",
        })
    }
}

/// Decodes a fixed-width integer occupying exactly `bytes.len()` bytes
///
/// Inputs wider than 16 bytes cannot be represented and are rejected; an
/// empty input decodes to zero.
pub fn decode_integer(bytes: &[u8], endian: Endian, signed: bool) -> Result<i128, CodecError> {
    if bytes.len() > 16 {
        return Err(CodecError::new(
            "integer",
            format!("{} bytes is wider than the largest integer", bytes.len()),
        ));
    }
    let mut value: u128 = 0;
    match endian {
        Endian::Big => {
            for &b in bytes {
                value = value << 8 | b as u128;
            }
        }
        Endian::Little => {
            for &b in bytes.iter().rev() {
                value = value << 8 | b as u128;
            }
        }
    }
    if signed && !bytes.is_empty() {
        let bits = bytes.len() as u32 * 8;
        let sign = 1u128 << (bits - 1);
        if bits < 128 && value & sign != 0 {
            return Ok(value as i128 - (1i128 << bits));
        }
    }
    if value > i128::MAX as u128 {
        return Err(CodecError::new("integer", "value exceeds integer range"));
    }
    Ok(value as i128)
}

/// Decodes one varint from the front of `bytes`
///
/// Seven value bits per byte, least significant group first, high bit as the
/// continuation flag. Returns the value and the number of bytes consumed.
/// Fails on a truncated input or when no terminator appears within
/// [`VARINT_MAX`] bytes.
pub fn decode_varint(bytes: &[u8]) -> Result<(u64, usize), CodecError> {
    let mut value: u128 = 0;
    for (i, &b) in bytes.iter().enumerate() {
        if i >= VARINT_MAX {
            return Err(CodecError::new(
                "varint",
                format!("no terminator within {VARINT_MAX} bytes"),
            ));
        }
        value |= ((b & 0x7f) as u128) << (7 * i);
        if b & 0x80 == 0 {
            return u64::try_from(value)
                .map(|value| (value, i + 1))
                .map_err(|_| CodecError::new("varint", "value exceeds 64 bits"));
        }
    }
    Err(CodecError::new("varint", "input ends mid-varint"))
}

/// Decodes bytes as a string under the given charset
pub fn decode_string(bytes: &[u8], charset: Charset) -> Result<String, CodecError> {
    match charset {
        Charset::Raw => Ok(bytes.iter().map(|&b| b as char).collect()),
        Charset::Utf8 => String::from_utf8(bytes.to_vec())
            .map_err(|e| CodecError::new("string", format!("invalid utf-8: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_endianness() {
        let bytes = [0x1b, 0xcc, 0x27, 0xc2];
        assert_eq!(
            decode_integer(&bytes, Endian::Little, false).unwrap(),
            0xC227CC1B
        );
        assert_eq!(
            decode_integer(&bytes, Endian::Big, false).unwrap(),
            0x1BCC27C2
        );
    }

    #[test]
    fn integer_sign_extension() {
        assert_eq!(decode_integer(&[0xff], Endian::Big, true).unwrap(), -1);
        assert_eq!(decode_integer(&[0xff], Endian::Big, false).unwrap(), 255);
        assert_eq!(
            decode_integer(&[0x80, 0x00], Endian::Big, true).unwrap(),
            -32768
        );
        assert_eq!(decode_integer(&[], Endian::Big, false).unwrap(), 0);
    }

    #[test]
    fn integer_width_limit() {
        assert!(decode_integer(&[0u8; 17], Endian::Big, false).is_err());
        let wide = decode_integer(&[0xffu8; 8], Endian::Little, false).unwrap();
        assert_eq!(wide, u64::MAX as i128);
    }

    #[test]
    fn varint_small_and_multibyte() {
        assert_eq!(decode_varint(&[0x00]).unwrap(), (0, 1));
        assert_eq!(decode_varint(&[0x7f]).unwrap(), (127, 1));
        assert_eq!(decode_varint(&[0x80, 0x01]).unwrap(), (128, 2));
        assert_eq!(decode_varint(&[0xac, 0x02]).unwrap(), (300, 2));
        // Trailing bytes are left for the caller
        assert_eq!(decode_varint(&[0x05, 0xff]).unwrap(), (5, 1));
    }

    #[test]
    fn varint_truncated_and_overlong() {
        assert!(decode_varint(&[]).is_err());
        assert!(decode_varint(&[0x80]).is_err());
        assert!(decode_varint(&[0x80; 11]).is_err());
    }

    #[test]
    fn string_charsets() {
        assert_eq!(decode_string(b"size", Charset::Raw).unwrap(), "size");
        assert_eq!(decode_string(&[0x00, 0x00], Charset::Raw).unwrap(), "\0\0");
        assert_eq!(decode_string(&[0xe9], Charset::Raw).unwrap(), "é");
        assert!(decode_string(&[0xe9], Charset::Utf8).is_err());
    }
}
