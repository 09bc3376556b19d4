//! Bolt protocol response messages.
//!
//! Response messages are sent from the server to the client.

use std::collections::HashMap;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// All Bolt response messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltResponse {
    /// SUCCESS - Request completed
    Success(SuccessMessage),
    /// RECORD - One result row
    Record(Vec<PackStreamValue>),
    /// FAILURE - Request failed
    Failure(FailureMessage),
    /// IGNORED - Request skipped because the connection is in failure state
    Ignored,
}

impl BoltResponse {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltResponse::Success(_) => tag::SUCCESS,
            BoltResponse::Record(_) => tag::RECORD,
            BoltResponse::Failure(_) => tag::FAILURE,
            BoltResponse::Ignored => tag::IGNORED,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltResponse::Success(_) => "SUCCESS",
            BoltResponse::Record(_) => "RECORD",
            BoltResponse::Failure(_) => "FAILURE",
            BoltResponse::Ignored => "IGNORED",
        }
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltResponse::Success(msg) => vec![PackStreamValue::Map(msg.metadata.clone())],
            BoltResponse::Record(values) => vec![PackStreamValue::List(values.clone())],
            BoltResponse::Failure(msg) => vec![PackStreamValue::Map(msg.to_map())],
            BoltResponse::Ignored => vec![],
        };
        PackStreamStructure::new(self.tag(), fields)
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        match s.tag {
            tag::SUCCESS => Ok(BoltResponse::Success(SuccessMessage::with_metadata(
                s.field(0).clone().into_map(),
            ))),
            tag::RECORD => Ok(BoltResponse::Record(s.field(0).clone().into_list())),
            tag::FAILURE => Ok(BoltResponse::Failure(FailureMessage::from_map(s.field(0)))),
            tag::IGNORED => Ok(BoltResponse::Ignored),
            _ => Err(PackStreamError::InvalidStructure(format!(
                "Unknown response message tag: 0x{:02X}",
                s.tag
            ))),
        }
    }
}

/// SUCCESS message metadata.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuccessMessage {
    /// Response metadata
    pub metadata: HashMap<String, PackStreamValue>,
}

impl SuccessMessage {
    /// Create a SUCCESS message with empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a SUCCESS message with metadata.
    pub fn with_metadata(metadata: HashMap<String, PackStreamValue>) -> Self {
        Self { metadata }
    }

    /// Builder-style metadata entry.
    pub fn with(mut self, key: &str, value: impl Into<PackStreamValue>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Get metadata entry.
    pub fn get(&self, key: &str) -> Option<&PackStreamValue> {
        self.metadata.get(key)
    }

    /// Server agent string (HELLO).
    pub fn server(&self) -> Option<&str> {
        self.get("server").and_then(|v| v.as_str())
    }

    /// Connection id (HELLO).
    pub fn connection_id(&self) -> Option<&str> {
        self.get("connection_id").and_then(|v| v.as_str())
    }

    /// Column names (RUN).
    pub fn fields(&self) -> Vec<String> {
        self.get("fields")
            .and_then(|v| v.as_list())
            .map(|list| list.iter().filter_map(|f| f.as_str().map(String::from)).collect())
            .unwrap_or_default()
    }

    /// Milliseconds until the first record was available (RUN).
    pub fn t_first(&self) -> Option<i64> {
        self.get("t_first").and_then(|v| v.as_int())
    }

    /// Milliseconds until the last record was consumed (PULL/DISCARD).
    pub fn t_last(&self) -> Option<i64> {
        self.get("t_last").and_then(|v| v.as_int())
    }

    /// More records are pending (PULL/DISCARD).
    pub fn has_more(&self) -> bool {
        self.get("has_more").and_then(|v| v.as_bool()).unwrap_or(false)
    }

    /// Statement type: `r`, `rw`, `w` or `s`.
    pub fn query_type(&self) -> Option<&str> {
        self.get("type").and_then(|v| v.as_str())
    }

    /// Update statistics.
    pub fn stats(&self) -> Option<&HashMap<String, PackStreamValue>> {
        self.get("stats").and_then(|v| v.as_map())
    }

    /// Bookmark (final PULL/DISCARD of auto-commit, COMMIT).
    pub fn bookmark(&self) -> Option<&str> {
        self.get("bookmark").and_then(|v| v.as_str())
    }

    /// Database the statement ran against.
    pub fn db(&self) -> Option<&str> {
        self.get("db").and_then(|v| v.as_str())
    }
}

/// FAILURE message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureMessage {
    /// Server error code, e.g. `Neo.ClientError.Statement.SyntaxError`
    pub code: String,
    /// Human readable message
    pub message: String,
}

impl FailureMessage {
    /// Create a failure.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        map.insert("code".into(), PackStreamValue::String(self.code.clone()));
        map.insert("message".into(), PackStreamValue::String(self.message.clone()));
        map
    }

    fn from_map(value: &PackStreamValue) -> Self {
        let text = |key: &str| {
            value
                .as_map()
                .and_then(|m| m.get(key))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            code: text("code"),
            message: text("message"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_accessors() {
        let msg = SuccessMessage::new()
            .with("fields", vec!["a", "b"])
            .with("has_more", true)
            .with("type", "rw")
            .with("bookmark", "bm:7");

        assert_eq!(msg.fields(), vec!["a".to_string(), "b".to_string()]);
        assert!(msg.has_more());
        assert_eq!(msg.query_type(), Some("rw"));
        assert_eq!(msg.bookmark(), Some("bm:7"));
        assert_eq!(msg.t_first(), None);
    }

    #[test]
    fn test_failure_structure() {
        let failure = BoltResponse::Failure(FailureMessage::new(
            "Neo.ClientError.Statement.SyntaxError",
            "Invalid input",
        ));
        let s = failure.to_structure();
        assert_eq!(s.tag, tag::FAILURE);
        assert_eq!(BoltResponse::from_structure(&s).unwrap(), failure);
    }

    #[test]
    fn test_record_structure() {
        let record = BoltResponse::Record(vec![PackStreamValue::Integer(1), PackStreamValue::Null]);
        let s = record.to_structure();
        assert_eq!(BoltResponse::from_structure(&s).unwrap(), record);
    }

    #[test]
    fn test_unknown_tag() {
        let s = PackStreamStructure::new(0x10, vec![]);
        assert!(BoltResponse::from_structure(&s).is_err());
    }
}
