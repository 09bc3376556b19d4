//! Bolt version negotiation.
//!
//! The client opens with the magic preamble and four version proposals, each
//! four bytes `[0, range, minor, major]`. The server answers with the agreed
//! version in the same layout, or all zeroes when it supports none.

use std::fmt;

/// Preamble that identifies a Bolt connection.
pub const BOLT_MAGIC: [u8; 4] = [0x60, 0x60, 0xB0, 0x17];

/// Size of the server's reply.
pub const HANDSHAKE_RESPONSE_SIZE: usize = 4;

/// Bolt protocol versions spoken by this driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoltVersion {
    /// Bolt 4.0
    V4_0,
    /// Bolt 4.1
    V4_1,
    /// Bolt 4.2
    V4_2,
    /// Bolt 4.3
    V4_3,
    /// Bolt 4.4
    V4_4,
    /// Bolt 5.0
    V5_0,
}

impl BoltVersion {
    /// Versions proposed during the handshake, newest first.
    pub const PROPOSALS: [BoltVersion; 4] = [
        BoltVersion::V5_0,
        BoltVersion::V4_4,
        BoltVersion::V4_3,
        BoltVersion::V4_0,
    ];

    /// Major version.
    pub fn major(self) -> u8 {
        match self {
            BoltVersion::V5_0 => 5,
            _ => 4,
        }
    }

    /// Minor version.
    pub fn minor(self) -> u8 {
        match self {
            BoltVersion::V4_0 | BoltVersion::V5_0 => 0,
            BoltVersion::V4_1 => 1,
            BoltVersion::V4_2 => 2,
            BoltVersion::V4_3 => 3,
            BoltVersion::V4_4 => 4,
        }
    }

    /// Wire form `[0, 0, minor, major]`.
    pub fn to_bytes(self) -> [u8; 4] {
        [0, 0, self.minor(), self.major()]
    }

    /// Parse the server's reply. The range byte is ignored.
    pub fn from_bytes(bytes: [u8; 4]) -> Option<Self> {
        match (bytes[3], bytes[2]) {
            (4, 0) => Some(BoltVersion::V4_0),
            (4, 1) => Some(BoltVersion::V4_1),
            (4, 2) => Some(BoltVersion::V4_2),
            (4, 3) => Some(BoltVersion::V4_3),
            (4, 4) => Some(BoltVersion::V4_4),
            (5, 0) => Some(BoltVersion::V5_0),
            _ => None,
        }
    }
}

impl fmt::Display for BoltVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major(), self.minor())
    }
}

/// The 20-byte client preamble.
pub fn handshake_request() -> [u8; 20] {
    let mut request = [0u8; 20];
    request[..4].copy_from_slice(&BOLT_MAGIC);
    for (i, version) in BoltVersion::PROPOSALS.iter().enumerate() {
        let offset = 4 + i * 4;
        request[offset..offset + 4].copy_from_slice(&version.to_bytes());
    }
    request
}
