//! PackStream decoder.

use bytes::Buf;
use std::collections::HashMap;

use super::marker::*;
use super::types::{PackStreamStructure, PackStreamValue};
use super::PackStreamError;

/// Reads PackStream values from a byte slice.
#[derive(Debug)]
pub struct PackStreamDecoder<'a> {
    data: &'a [u8],
}

impl<'a> PackStreamDecoder<'a> {
    /// Create a decoder over `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    /// Decode the next value.
    pub fn decode(&mut self) -> Result<PackStreamValue, PackStreamError> {
        let marker = self.take(1)?.get_u8();

        if is_tiny_int(marker) {
            return Ok(PackStreamValue::Integer(marker as i8 as i64));
        }

        let (high, tiny_len) = split_tiny(marker);
        match high {
            TINY_STRING => return self.string(tiny_len),
            TINY_LIST => return self.list(tiny_len),
            TINY_MAP => return self.map(tiny_len),
            TINY_STRUCT => return self.structure(tiny_len),
            _ => {}
        }

        match marker {
            NULL => Ok(PackStreamValue::Null),
            TRUE => Ok(PackStreamValue::Boolean(true)),
            FALSE => Ok(PackStreamValue::Boolean(false)),
            FLOAT_64 => Ok(PackStreamValue::Float(self.take(8)?.get_f64())),

            INT_8 => Ok(PackStreamValue::Integer(self.take(1)?.get_i8() as i64)),
            INT_16 => Ok(PackStreamValue::Integer(self.take(2)?.get_i16() as i64)),
            INT_32 => Ok(PackStreamValue::Integer(self.take(4)?.get_i32() as i64)),
            INT_64 => Ok(PackStreamValue::Integer(self.take(8)?.get_i64())),

            BYTES_8 | BYTES_16 | BYTES_32 => {
                let len = self.size(marker - BYTES_8)?;
                Ok(PackStreamValue::Bytes(self.take(len)?.to_vec()))
            }
            STRING_8 | STRING_16 | STRING_32 => {
                let len = self.size(marker - STRING_8)?;
                self.string(len)
            }
            LIST_8 | LIST_16 | LIST_32 => {
                let len = self.size(marker - LIST_8)?;
                self.list(len)
            }
            MAP_8 | MAP_16 | MAP_32 => {
                let len = self.size(marker - MAP_8)?;
                self.map(len)
            }
            STRUCT_8 | STRUCT_16 => {
                let len = self.size(marker - STRUCT_8)?;
                self.structure(len)
            }

            _ => Err(PackStreamError::UnknownMarker(marker)),
        }
    }

    /// Reads a 1, 2 or 4 byte size depending on the marker's offset within
    /// its family.
    fn size(&mut self, width_class: u8) -> Result<usize, PackStreamError> {
        Ok(match width_class {
            0 => self.take(1)?.get_u8() as usize,
            1 => self.take(2)?.get_u16() as usize,
            _ => self.take(4)?.get_u32() as usize,
        })
    }

    /// Split `n` bytes off the front, failing if fewer remain.
    fn take(&mut self, n: usize) -> Result<&'a [u8], PackStreamError> {
        if self.data.len() < n {
            return Err(PackStreamError::UnexpectedEof);
        }
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        Ok(head)
    }

    fn string(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let raw = self.take(len)?;
        std::str::from_utf8(raw)
            .map(|s| PackStreamValue::String(s.to_string()))
            .map_err(|e| PackStreamError::InvalidUtf8(e.to_string()))
    }

    fn list(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut items = Vec::with_capacity(len.min(1024));
        for _ in 0..len {
            items.push(self.decode()?);
        }
        Ok(PackStreamValue::List(items))
    }

    fn map(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let mut entries = HashMap::with_capacity(len.min(1024));
        for _ in 0..len {
            let key = match self.decode()? {
                PackStreamValue::String(s) => s,
                _ => return Err(PackStreamError::InvalidMapKey),
            };
            let value = self.decode()?;
            entries.insert(key, value);
        }
        Ok(PackStreamValue::Map(entries))
    }

    fn structure(&mut self, len: usize) -> Result<PackStreamValue, PackStreamError> {
        let tag = self.take(1)?.get_u8();
        let mut fields = Vec::with_capacity(len);
        for _ in 0..len {
            fields.push(self.decode()?);
        }
        Ok(PackStreamValue::Structure(PackStreamStructure::new(tag, fields)))
    }
}

/// Decode exactly one value from `data`.
pub fn decode(data: &[u8]) -> Result<PackStreamValue, PackStreamError> {
    let mut decoder = PackStreamDecoder::new(data);
    let value = decoder.decode()?;
    match decoder.remaining() {
        0 => Ok(value),
        n => Err(PackStreamError::TrailingBytes(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_tiny_int() {
        assert_eq!(decode(&[0x2A]).unwrap(), PackStreamValue::Integer(42));
        assert_eq!(decode(&[0xF0]).unwrap(), PackStreamValue::Integer(-16));
    }

    #[test]
    fn test_decode_sized_list() {
        let value = decode(&[LIST_8, 2, 0x01, 0x02]).unwrap();
        assert_eq!(
            value,
            PackStreamValue::List(vec![PackStreamValue::Integer(1), PackStreamValue::Integer(2)])
        );
    }

    #[test]
    fn test_decode_truncated() {
        assert_eq!(decode(&[INT_32, 0x00]).unwrap_err(), PackStreamError::UnexpectedEof);
        assert_eq!(decode(&[0x83, b'a']).unwrap_err(), PackStreamError::UnexpectedEof);
    }

    #[test]
    fn test_decode_non_string_key() {
        assert_eq!(decode(&[0xA1, 0x01, 0x01]).unwrap_err(), PackStreamError::InvalidMapKey);
    }

    #[test]
    fn test_decode_unknown_marker() {
        assert_eq!(decode(&[0xC4]).unwrap_err(), PackStreamError::UnknownMarker(0xC4));
    }
}
