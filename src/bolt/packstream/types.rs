//! PackStream value types.

use std::collections::HashMap;

/// A PackStream value.
#[derive(Debug, Clone, PartialEq)]
pub enum PackStreamValue {
    /// Null value
    Null,
    /// Boolean value
    Boolean(bool),
    /// 64-bit signed integer
    Integer(i64),
    /// 64-bit floating point
    Float(f64),
    /// Byte array
    Bytes(Vec<u8>),
    /// UTF-8 string
    String(String),
    /// List of values
    List(Vec<PackStreamValue>),
    /// Map of string keys to values
    Map(HashMap<String, PackStreamValue>),
    /// Structure (tag + fields)
    Structure(PackStreamStructure),
}

/// A tagged structure. Bolt messages are structures whose tag is the message
/// signature.
#[derive(Debug, Clone, PartialEq)]
pub struct PackStreamStructure {
    /// Structure tag
    pub tag: u8,
    /// Structure fields
    pub fields: Vec<PackStreamValue>,
}

impl PackStreamStructure {
    /// Create a new structure with given tag and fields.
    pub fn new(tag: u8, fields: Vec<PackStreamValue>) -> Self {
        Self { tag, fields }
    }

    /// Field at `index`, or null when the structure is shorter.
    pub fn field(&self, index: usize) -> &PackStreamValue {
        const NULL: PackStreamValue = PackStreamValue::Null;
        self.fields.get(index).unwrap_or(&NULL)
    }
}

impl PackStreamValue {
    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, PackStreamValue::Null)
    }

    /// Try to get as boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PackStreamValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PackStreamValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get as float. Integers widen.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            PackStreamValue::Float(f) => Some(*f),
            PackStreamValue::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get as string reference.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PackStreamValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as list reference.
    pub fn as_list(&self) -> Option<&[PackStreamValue]> {
        match self {
            PackStreamValue::List(l) => Some(l),
            _ => None,
        }
    }

    /// Try to get as map reference.
    pub fn as_map(&self) -> Option<&HashMap<String, PackStreamValue>> {
        match self {
            PackStreamValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Take the map out of this value, or an empty map for anything else.
    pub fn into_map(self) -> HashMap<String, PackStreamValue> {
        match self {
            PackStreamValue::Map(m) => m,
            _ => HashMap::new(),
        }
    }

    /// Take the list out of this value, or an empty list for anything else.
    pub fn into_list(self) -> Vec<PackStreamValue> {
        match self {
            PackStreamValue::List(l) => l,
            _ => Vec::new(),
        }
    }

    /// Try to get as structure reference.
    pub fn as_structure(&self) -> Option<&PackStreamStructure> {
        match self {
            PackStreamValue::Structure(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for PackStreamValue {
    fn from(v: bool) -> Self {
        PackStreamValue::Boolean(v)
    }
}

impl From<i64> for PackStreamValue {
    fn from(v: i64) -> Self {
        PackStreamValue::Integer(v)
    }
}

impl From<f64> for PackStreamValue {
    fn from(v: f64) -> Self {
        PackStreamValue::Float(v)
    }
}

impl From<&str> for PackStreamValue {
    fn from(v: &str) -> Self {
        PackStreamValue::String(v.to_string())
    }
}

impl From<String> for PackStreamValue {
    fn from(v: String) -> Self {
        PackStreamValue::String(v)
    }
}

impl<T: Into<PackStreamValue>> From<Vec<T>> for PackStreamValue {
    fn from(v: Vec<T>) -> Self {
        PackStreamValue::List(v.into_iter().map(Into::into).collect())
    }
}

impl From<HashMap<String, PackStreamValue>> for PackStreamValue {
    fn from(v: HashMap<String, PackStreamValue>) -> Self {
        PackStreamValue::Map(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accessors() {
        assert!(PackStreamValue::Null.is_null());
        assert_eq!(PackStreamValue::Integer(3).as_float(), Some(3.0));
        assert_eq!(PackStreamValue::from("abc").as_str(), Some("abc"));
        assert_eq!(PackStreamValue::Boolean(true).as_int(), None);
    }

    #[test]
    fn test_structure_field_out_of_range_is_null() {
        let s = PackStreamStructure::new(0x70, vec![PackStreamValue::Integer(1)]);
        assert_eq!(s.field(0), &PackStreamValue::Integer(1));
        assert!(s.field(5).is_null());
    }

    #[test]
    fn test_into_map_of_non_map_is_empty() {
        assert!(PackStreamValue::Integer(1).into_map().is_empty());
    }
}
