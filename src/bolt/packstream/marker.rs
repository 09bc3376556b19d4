//! PackStream marker bytes.

pub const NULL: u8 = 0xC0;
pub const FLOAT_64: u8 = 0xC1;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;

pub const INT_8: u8 = 0xC8;
pub const INT_16: u8 = 0xC9;
pub const INT_32: u8 = 0xCA;
pub const INT_64: u8 = 0xCB;

pub const BYTES_8: u8 = 0xCC;
pub const BYTES_16: u8 = 0xCD;
pub const BYTES_32: u8 = 0xCE;

pub const STRING_8: u8 = 0xD0;
pub const STRING_16: u8 = 0xD1;
pub const STRING_32: u8 = 0xD2;

pub const LIST_8: u8 = 0xD4;
pub const LIST_16: u8 = 0xD5;
pub const LIST_32: u8 = 0xD6;

pub const MAP_8: u8 = 0xD8;
pub const MAP_16: u8 = 0xD9;
pub const MAP_32: u8 = 0xDA;

pub const STRUCT_8: u8 = 0xDC;
pub const STRUCT_16: u8 = 0xDD;

/// High nibbles of the size-in-marker forms.
pub const TINY_STRING: u8 = 0x80;
pub const TINY_LIST: u8 = 0x90;
pub const TINY_MAP: u8 = 0xA0;
pub const TINY_STRUCT: u8 = 0xB0;

/// Largest size that fits in a tiny marker.
pub const TINY_MAX: usize = 0x0F;

/// Tiny ints cover -16..=127 and are the marker byte itself.
#[inline]
pub fn is_tiny_int(marker: u8) -> bool {
    marker <= 0x7F || marker >= 0xF0
}

#[inline]
pub fn fits_tiny_int(value: i64) -> bool {
    (-16..=127).contains(&value)
}

/// Splits a tiny container marker into (high nibble, size).
#[inline]
pub fn split_tiny(marker: u8) -> (u8, usize) {
    (marker & 0xF0, (marker & 0x0F) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tiny_int_range() {
        assert!(is_tiny_int(0x00));
        assert!(is_tiny_int(0x7F));
        assert!(is_tiny_int(0xF0));
        assert!(!is_tiny_int(0x80));
        assert!(!is_tiny_int(NULL));
        assert!(fits_tiny_int(-16));
        assert!(!fits_tiny_int(-17));
        assert!(!fits_tiny_int(128));
    }

    #[test]
    fn test_split_tiny() {
        assert_eq!(split_tiny(0x85), (TINY_STRING, 5));
        assert_eq!(split_tiny(0x9F), (TINY_LIST, 15));
        assert_eq!(split_tiny(0xA0), (TINY_MAP, 0));
        assert_eq!(split_tiny(0xB3), (TINY_STRUCT, 3));
    }
}
