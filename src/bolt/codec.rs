//! Message encoding seam.
//!
//! A [`MessageCodec`] turns a whole request into the flat byte sequence the
//! framer chunks, and a reassembled message body back into a response. The
//! connection never looks inside the bytes.

use std::fmt::Debug;

use bytes::Bytes;

use super::error::{BoltError, BoltResult};
use super::message::{BoltRequest, BoltResponse};
use super::packstream::{decode, encode, PackStreamValue};

/// Encodes requests and decodes responses.
pub trait MessageCodec: Send + Sync + Debug {
    /// Flatten a request into message body bytes.
    fn encode(&self, request: &BoltRequest) -> BoltResult<Bytes>;

    /// Parse one reassembled message body.
    fn decode(&self, body: &[u8]) -> BoltResult<BoltResponse>;
}

/// [`MessageCodec`] using PackStream structures.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackStreamCodec;

impl MessageCodec for PackStreamCodec {
    fn encode(&self, request: &BoltRequest) -> BoltResult<Bytes> {
        let value = PackStreamValue::Structure(request.to_structure());
        Ok(encode(&value)?.freeze())
    }

    fn decode(&self, body: &[u8]) -> BoltResult<BoltResponse> {
        match decode(body)? {
            PackStreamValue::Structure(s) => Ok(BoltResponse::from_structure(&s)?),
            other => Err(BoltError::Protocol(format!(
                "expected a message structure, got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::message::{tag, SuccessMessage};

    #[test]
    fn test_encode_reset() {
        let bytes = PackStreamCodec.encode(&BoltRequest::Reset).unwrap();
        assert_eq!(&bytes[..], &[0xB0, tag::RESET]);
    }

    #[test]
    fn test_decode_success() {
        let response = BoltResponse::Success(SuccessMessage::new().with("has_more", false));
        let body = encode(&PackStreamValue::Structure(response.to_structure())).unwrap();
        assert_eq!(PackStreamCodec.decode(&body).unwrap(), response);
    }

    #[test]
    fn test_decode_non_structure() {
        let body = encode(&PackStreamValue::Integer(1)).unwrap();
        assert!(matches!(PackStreamCodec.decode(&body), Err(BoltError::Protocol(_))));
    }
}
