//! Bolt protocol request messages.
//!
//! Request messages are sent from the client to the server.

use std::collections::HashMap;
use std::time::Duration;

use super::tag;
use crate::bolt::packstream::{PackStreamError, PackStreamStructure, PackStreamValue};

/// `n` value asking the server for every remaining record.
pub const ALL_RECORDS: i64 = -1;

/// All Bolt request messages.
#[derive(Debug, Clone, PartialEq)]
pub enum BoltRequest {
    /// HELLO - Initialize connection
    Hello(HelloMessage),
    /// GOODBYE - Close connection gracefully
    Goodbye,
    /// RESET - Clear failure state and abandon any open work
    Reset,
    /// RUN - Execute a statement
    Run(RunMessage),
    /// BEGIN - Open an explicit transaction
    Begin(RequestExtra),
    /// COMMIT - Commit the open transaction
    Commit,
    /// ROLLBACK - Roll back the open transaction
    Rollback,
    /// DISCARD - Drop pending records
    Discard(StreamControl),
    /// PULL - Fetch pending records
    Pull(StreamControl),
}

impl BoltRequest {
    /// Get the message tag.
    pub fn tag(&self) -> u8 {
        match self {
            BoltRequest::Hello(_) => tag::HELLO,
            BoltRequest::Goodbye => tag::GOODBYE,
            BoltRequest::Reset => tag::RESET,
            BoltRequest::Run(_) => tag::RUN,
            BoltRequest::Begin(_) => tag::BEGIN,
            BoltRequest::Commit => tag::COMMIT,
            BoltRequest::Rollback => tag::ROLLBACK,
            BoltRequest::Discard(_) => tag::DISCARD,
            BoltRequest::Pull(_) => tag::PULL,
        }
    }

    /// Get message name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            BoltRequest::Hello(_) => "HELLO",
            BoltRequest::Goodbye => "GOODBYE",
            BoltRequest::Reset => "RESET",
            BoltRequest::Run(_) => "RUN",
            BoltRequest::Begin(_) => "BEGIN",
            BoltRequest::Commit => "COMMIT",
            BoltRequest::Rollback => "ROLLBACK",
            BoltRequest::Discard(_) => "DISCARD",
            BoltRequest::Pull(_) => "PULL",
        }
    }

    /// PULL of up to `n` records (`-1` for all).
    pub fn pull(n: i64) -> Self {
        BoltRequest::Pull(StreamControl::new(n))
    }

    /// DISCARD of every remaining record.
    pub fn discard_all() -> Self {
        BoltRequest::Discard(StreamControl::new(ALL_RECORDS))
    }

    /// Convert to PackStream structure.
    pub fn to_structure(&self) -> PackStreamStructure {
        let fields = match self {
            BoltRequest::Hello(msg) => vec![PackStreamValue::Map(msg.to_map())],
            BoltRequest::Run(msg) => vec![
                PackStreamValue::String(msg.query.clone()),
                PackStreamValue::Map(msg.parameters.clone()),
                PackStreamValue::Map(msg.extra.to_map()),
            ],
            BoltRequest::Begin(extra) => vec![PackStreamValue::Map(extra.to_map())],
            BoltRequest::Discard(ctl) | BoltRequest::Pull(ctl) => {
                vec![PackStreamValue::Map(ctl.to_map())]
            }
            BoltRequest::Goodbye | BoltRequest::Reset | BoltRequest::Commit | BoltRequest::Rollback => {
                vec![]
            }
        };
        PackStreamStructure::new(self.tag(), fields)
    }

    /// Parse from PackStream structure.
    pub fn from_structure(s: &PackStreamStructure) -> Result<Self, PackStreamError> {
        let map_at = |i: usize| s.field(i).clone().into_map();
        Ok(match s.tag {
            tag::HELLO => BoltRequest::Hello(HelloMessage::from_map(map_at(0))),
            tag::GOODBYE => BoltRequest::Goodbye,
            tag::RESET => BoltRequest::Reset,
            tag::RUN => {
                let query = s
                    .field(0)
                    .as_str()
                    .ok_or_else(|| PackStreamError::InvalidStructure("RUN without query".into()))?
                    .to_string();
                BoltRequest::Run(RunMessage {
                    query,
                    parameters: map_at(1),
                    extra: RequestExtra::from_map(&map_at(2)),
                })
            }
            tag::BEGIN => BoltRequest::Begin(RequestExtra::from_map(&map_at(0))),
            tag::COMMIT => BoltRequest::Commit,
            tag::ROLLBACK => BoltRequest::Rollback,
            tag::DISCARD => BoltRequest::Discard(StreamControl::from_map(&map_at(0))),
            tag::PULL => BoltRequest::Pull(StreamControl::from_map(&map_at(0))),
            other => {
                return Err(PackStreamError::InvalidStructure(format!(
                    "Unknown request message tag: 0x{:02X}",
                    other
                )))
            }
        })
    }
}

/// HELLO message body.
#[derive(Debug, Clone, PartialEq)]
pub struct HelloMessage {
    /// Client identification, e.g. `boltwire/0.3.0`
    pub user_agent: String,
    /// Authentication entries, passed through untouched
    pub auth: HashMap<String, PackStreamValue>,
}

impl HelloMessage {
    /// Create a HELLO with no auth entries.
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            auth: HashMap::new(),
        }
    }

    /// Attach auth entries (scheme, principal, credentials, ...).
    pub fn with_auth(mut self, auth: HashMap<String, PackStreamValue>) -> Self {
        self.auth = auth;
        self
    }

    fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = self.auth.clone();
        map.insert("user_agent".into(), PackStreamValue::String(self.user_agent.clone()));
        map
    }

    fn from_map(mut map: HashMap<String, PackStreamValue>) -> Self {
        let user_agent = match map.remove("user_agent") {
            Some(PackStreamValue::String(s)) => s,
            _ => String::new(),
        };
        Self { user_agent, auth: map }
    }
}

/// RUN message body.
#[derive(Debug, Clone, PartialEq)]
pub struct RunMessage {
    /// Statement text
    pub query: String,
    /// Statement parameters
    pub parameters: HashMap<String, PackStreamValue>,
    /// Auto-commit metadata (ignored by the server inside a transaction)
    pub extra: RequestExtra,
}

impl RunMessage {
    /// Create a RUN with no parameters.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            parameters: HashMap::new(),
            extra: RequestExtra::default(),
        }
    }

    /// Set parameters.
    pub fn with_parameters(mut self, params: HashMap<String, PackStreamValue>) -> Self {
        self.parameters = params;
        self
    }

    /// Set extra metadata.
    pub fn with_extra(mut self, extra: RequestExtra) -> Self {
        self.extra = extra;
        self
    }
}

/// Metadata shared by BEGIN and auto-commit RUN.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestExtra {
    /// Bookmarks the server must have applied first
    pub bookmarks: Vec<String>,
    /// Transaction timeout
    pub tx_timeout: Option<Duration>,
    /// Transaction metadata, attached to server logs
    pub tx_metadata: HashMap<String, PackStreamValue>,
    /// Target database
    pub database: Option<String>,
    /// Read-only access hint
    pub read_only: bool,
}

impl RequestExtra {
    /// Set bookmarks.
    pub fn with_bookmarks(mut self, bookmarks: Vec<String>) -> Self {
        self.bookmarks = bookmarks;
        self
    }

    /// Set transaction timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.tx_timeout = Some(timeout);
        self
    }

    /// Set transaction metadata.
    pub fn with_metadata(mut self, metadata: HashMap<String, PackStreamValue>) -> Self {
        self.tx_metadata = metadata;
        self
    }

    /// Set target database.
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = Some(db.into());
        self
    }

    /// Mark the request read-only.
    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Wire form; empty entries are omitted.
    pub fn to_map(&self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        if !self.bookmarks.is_empty() {
            map.insert("bookmarks".into(), self.bookmarks.clone().into());
        }
        if let Some(timeout) = self.tx_timeout {
            map.insert("tx_timeout".into(), PackStreamValue::Integer(timeout.as_millis() as i64));
        }
        if !self.tx_metadata.is_empty() {
            map.insert("tx_metadata".into(), PackStreamValue::Map(self.tx_metadata.clone()));
        }
        if let Some(db) = &self.database {
            map.insert("db".into(), PackStreamValue::String(db.clone()));
        }
        if self.read_only {
            map.insert("mode".into(), PackStreamValue::String("r".into()));
        }
        map
    }

    /// Parse the wire form.
    pub fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        Self {
            bookmarks: map
                .get("bookmarks")
                .and_then(|v| v.as_list())
                .map(|l| l.iter().filter_map(|b| b.as_str().map(String::from)).collect())
                .unwrap_or_default(),
            tx_timeout: map
                .get("tx_timeout")
                .and_then(|v| v.as_int())
                .map(|ms| Duration::from_millis(ms.max(0) as u64)),
            tx_metadata: map.get("tx_metadata").and_then(|v| v.as_map()).cloned().unwrap_or_default(),
            database: map.get("db").and_then(|v| v.as_str()).map(String::from),
            read_only: map.get("mode").and_then(|v| v.as_str()) == Some("r"),
        }
    }
}

/// PULL / DISCARD body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamControl {
    /// Number of records, `-1` for all
    pub n: i64,
    /// Statement id inside a transaction, `-1` for the last one
    pub qid: i64,
}

impl StreamControl {
    /// Control for the most recent statement.
    pub fn new(n: i64) -> Self {
        Self { n, qid: -1 }
    }

    fn to_map(self) -> HashMap<String, PackStreamValue> {
        let mut map = HashMap::new();
        map.insert("n".into(), PackStreamValue::Integer(self.n));
        if self.qid != -1 {
            map.insert("qid".into(), PackStreamValue::Integer(self.qid));
        }
        map
    }

    fn from_map(map: &HashMap<String, PackStreamValue>) -> Self {
        Self {
            n: map.get("n").and_then(|v| v.as_int()).unwrap_or(ALL_RECORDS),
            qid: map.get("qid").and_then(|v| v.as_int()).unwrap_or(-1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_carries_user_agent_and_auth() {
        let mut auth = HashMap::new();
        auth.insert("scheme".to_string(), PackStreamValue::from("basic"));
        let req = BoltRequest::Hello(HelloMessage::new("boltwire/test").with_auth(auth));

        let s = req.to_structure();
        assert_eq!(s.tag, tag::HELLO);
        let map = s.fields[0].as_map().unwrap();
        assert_eq!(map.get("user_agent").and_then(|v| v.as_str()), Some("boltwire/test"));
        assert_eq!(map.get("scheme").and_then(|v| v.as_str()), Some("basic"));
        assert_eq!(BoltRequest::from_structure(&s).unwrap(), req);
    }

    #[test]
    fn test_run_has_three_fields() {
        let req = BoltRequest::Run(
            RunMessage::new("RETURN 1").with_extra(RequestExtra::default().with_database("neo")),
        );
        let s = req.to_structure();
        assert_eq!(s.fields.len(), 3);
        assert_eq!(s.fields[0].as_str(), Some("RETURN 1"));
        assert_eq!(
            s.fields[2].as_map().and_then(|m| m.get("db")).and_then(|v| v.as_str()),
            Some("neo")
        );
    }

    #[test]
    fn test_pull_n() {
        let s = BoltRequest::pull(100).to_structure();
        assert_eq!(s.tag, tag::PULL);
        let map = s.fields[0].as_map().unwrap();
        assert_eq!(map.get("n").and_then(|v| v.as_int()), Some(100));
        assert!(!map.contains_key("qid"));
    }

    #[test]
    fn test_extra_omits_defaults() {
        assert!(RequestExtra::default().to_map().is_empty());

        let extra = RequestExtra::default()
            .with_bookmarks(vec!["bm:1".into()])
            .with_timeout(Duration::from_secs(2))
            .with_read_only(true);
        let map = extra.to_map();
        assert_eq!(map.get("tx_timeout").and_then(|v| v.as_int()), Some(2000));
        assert_eq!(map.get("mode").and_then(|v| v.as_str()), Some("r"));
        assert_eq!(RequestExtra::from_map(&map), extra);
    }

    #[test]
    fn test_signature_only_messages() {
        for req in [BoltRequest::Reset, BoltRequest::Commit, BoltRequest::Rollback, BoltRequest::Goodbye] {
            let s = req.to_structure();
            assert!(s.fields.is_empty());
            assert_eq!(BoltRequest::from_structure(&s).unwrap(), req);
        }
    }
}
