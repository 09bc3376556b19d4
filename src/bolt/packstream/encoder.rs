//! PackStream encoder.

use bytes::{BufMut, BytesMut};

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Writes PackStream values into a growable buffer.
#[derive(Debug, Default)]
pub struct PackStreamEncoder {
    buffer: BytesMut,
}

impl PackStreamEncoder {
    /// Create an encoder with a small initial buffer.
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    /// Create an encoder with the given initial capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// Consume the encoder and return the bytes written so far.
    pub fn into_bytes(self) -> BytesMut {
        self.buffer
    }

    /// Encode one value.
    pub fn encode(&mut self, value: &PackStreamValue) -> Result<(), PackStreamError> {
        match value {
            PackStreamValue::Null => self.buffer.put_u8(NULL),
            PackStreamValue::Boolean(b) => self.buffer.put_u8(if *b { TRUE } else { FALSE }),
            PackStreamValue::Integer(i) => self.encode_int(*i),
            PackStreamValue::Float(f) => {
                self.buffer.put_u8(FLOAT_64);
                self.buffer.put_f64(*f);
            }
            PackStreamValue::Bytes(b) => {
                self.write_size(b.len(), None, [BYTES_8, BYTES_16, BYTES_32], "bytes")?;
                self.buffer.put_slice(b);
            }
            PackStreamValue::String(s) => {
                self.write_size(s.len(), Some(TINY_STRING), [STRING_8, STRING_16, STRING_32], "string")?;
                self.buffer.put_slice(s.as_bytes());
            }
            PackStreamValue::List(items) => {
                self.write_size(items.len(), Some(TINY_LIST), [LIST_8, LIST_16, LIST_32], "list")?;
                for item in items {
                    self.encode(item)?;
                }
            }
            PackStreamValue::Map(entries) => {
                self.write_size(entries.len(), Some(TINY_MAP), [MAP_8, MAP_16, MAP_32], "map")?;
                for (key, item) in entries {
                    self.write_size(key.len(), Some(TINY_STRING), [STRING_8, STRING_16, STRING_32], "string")?;
                    self.buffer.put_slice(key.as_bytes());
                    self.encode(item)?;
                }
            }
            PackStreamValue::Structure(s) => self.encode_structure(s)?,
        }
        Ok(())
    }

    /// Encode a structure header followed by its fields.
    pub fn encode_structure(&mut self, s: &PackStreamStructure) -> Result<(), PackStreamError> {
        let len = s.fields.len();
        if len <= TINY_MAX {
            self.buffer.put_u8(TINY_STRUCT | len as u8);
        } else if len <= u8::MAX as usize {
            self.buffer.put_u8(STRUCT_8);
            self.buffer.put_u8(len as u8);
        } else if len <= u16::MAX as usize {
            self.buffer.put_u8(STRUCT_16);
            self.buffer.put_u16(len as u16);
        } else {
            return Err(PackStreamError::ValueTooLarge("structure", len));
        }
        self.buffer.put_u8(s.tag);
        for field in &s.fields {
            self.encode(field)?;
        }
        Ok(())
    }

    fn encode_int(&mut self, value: i64) {
        if fits_tiny_int(value) {
            self.buffer.put_i8(value as i8);
        } else if let Ok(v) = i8::try_from(value) {
            self.buffer.put_u8(INT_8);
            self.buffer.put_i8(v);
        } else if let Ok(v) = i16::try_from(value) {
            self.buffer.put_u8(INT_16);
            self.buffer.put_i16(v);
        } else if let Ok(v) = i32::try_from(value) {
            self.buffer.put_u8(INT_32);
            self.buffer.put_i32(v);
        } else {
            self.buffer.put_u8(INT_64);
            self.buffer.put_i64(value);
        }
    }

    /// Writes the marker (and size bytes) for a sized value. `tiny` is the
    /// high nibble for types that have a size-in-marker form.
    fn write_size(
        &mut self,
        len: usize,
        tiny: Option<u8>,
        [m8, m16, m32]: [u8; 3],
        what: &'static str,
    ) -> Result<(), PackStreamError> {
        match tiny {
            Some(high) if len <= TINY_MAX => self.buffer.put_u8(high | len as u8),
            _ if len <= u8::MAX as usize => {
                self.buffer.put_u8(m8);
                self.buffer.put_u8(len as u8);
            }
            _ if len <= u16::MAX as usize => {
                self.buffer.put_u8(m16);
                self.buffer.put_u16(len as u16);
            }
            _ if len <= u32::MAX as usize => {
                self.buffer.put_u8(m32);
                self.buffer.put_u32(len as u32);
            }
            _ => return Err(PackStreamError::ValueTooLarge(what, len)),
        }
        Ok(())
    }
}

/// Encode a single value to bytes.
pub fn encode(value: &PackStreamValue) -> Result<BytesMut, PackStreamError> {
    let mut encoder = PackStreamEncoder::new();
    encoder.encode(value)?;
    Ok(encoder.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_markers() {
        assert_eq!(&encode(&PackStreamValue::Null).unwrap()[..], &[0xC0]);
        assert_eq!(&encode(&PackStreamValue::Boolean(true)).unwrap()[..], &[0xC3]);
        assert_eq!(&encode(&PackStreamValue::Integer(-1)).unwrap()[..], &[0xFF]);
        assert_eq!(&encode(&PackStreamValue::Integer(-17)).unwrap()[..], &[0xC8, 0xEF]);
        assert_eq!(&encode(&PackStreamValue::Integer(1000)).unwrap()[..], &[0xC9, 0x03, 0xE8]);
    }

    #[test]
    fn test_tiny_string() {
        assert_eq!(&encode(&"abc".into()).unwrap()[..], &[0x83, b'a', b'b', b'c']);
    }

    #[test]
    fn test_bytes_never_use_tiny_form() {
        let bytes = encode(&PackStreamValue::Bytes(vec![1, 2])).unwrap();
        assert_eq!(&bytes[..], &[BYTES_8, 2, 1, 2]);
    }

    #[test]
    fn test_empty_structure() {
        let s = PackStreamStructure::new(0x0F, vec![]);
        assert_eq!(&encode(&PackStreamValue::Structure(s)).unwrap()[..], &[0xB0, 0x0F]);
    }
}
