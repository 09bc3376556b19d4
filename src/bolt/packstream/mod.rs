//! PackStream value encoding.
//!
//! PackStream is the binary format Bolt uses for message bodies. Every value
//! starts with a marker byte; small strings, lists, maps and structures fold
//! their size into the marker's low nibble.
//!
//! Only the generic shapes are modelled here (null, boolean, integer, float,
//! bytes, string, list, map, structure). Graph, temporal and spatial values
//! arrive as plain [`PackStreamStructure`]s and are left for higher layers.

pub mod decoder;
pub mod encoder;
pub(crate) mod marker;
pub mod types;

pub use decoder::{decode, PackStreamDecoder};
pub use encoder::{encode, PackStreamEncoder};
pub use types::{PackStreamStructure, PackStreamValue};

use thiserror::Error;

/// PackStream errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackStreamError {
    /// Input ended in the middle of a value
    #[error("Unexpected end of PackStream data")]
    UnexpectedEof,
    /// Marker byte outside the known ranges
    #[error("Unknown PackStream marker: 0x{0:02X}")]
    UnknownMarker(u8),
    /// String payload was not UTF-8
    #[error("Invalid UTF-8 in string: {0}")]
    InvalidUtf8(String),
    /// Map key was not a string
    #[error("Map keys must be strings")]
    InvalidMapKey,
    /// Container or payload exceeds the largest size marker
    #[error("{0} too large: {1}")]
    ValueTooLarge(&'static str, usize),
    /// Structure with an unexpected tag or field layout
    #[error("Invalid structure: {0}")]
    InvalidStructure(String),
    /// Bytes left over after the top-level value
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_integer_boundaries_survive() {
        for v in [0i64, -1, -16, -17, 127, 128, -128, -129, 32767, -32769, i32::MAX as i64 + 1, i64::MIN] {
            let bytes = encode(&PackStreamValue::Integer(v)).unwrap();
            assert_eq!(decode(&bytes).unwrap(), PackStreamValue::Integer(v), "value {}", v);
        }
    }

    #[test]
    fn test_nested_structure() {
        let mut meta = HashMap::new();
        meta.insert("fields".to_string(), PackStreamValue::List(vec!["x".into()]));
        let value = PackStreamValue::Structure(PackStreamStructure::new(
            0x70,
            vec![PackStreamValue::Map(meta)],
        ));

        let bytes = encode(&value).unwrap();
        assert_eq!(bytes[0], 0xB1);
        assert_eq!(bytes[1], 0x70);
        assert_eq!(decode(&bytes).unwrap(), value);
    }

    #[test]
    fn test_long_string_uses_sized_marker() {
        let text = "y".repeat(300);
        let bytes = encode(&PackStreamValue::String(text.clone())).unwrap();
        assert_eq!(bytes[0], marker::STRING_16);
        assert_eq!(decode(&bytes).unwrap(), PackStreamValue::String(text));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let err = decode(&[0xC0, 0xC0]).unwrap_err();
        assert_eq!(err, PackStreamError::TrailingBytes(1));
    }
}
