//! Message codec.
//!
//! Every payload crossing the bus is a single UTF-8 JSON document. Backends
//! that support message metadata carry [`CONTENT_TYPE`] alongside the bytes.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// Content type written by the encoder.
pub const CONTENT_TYPE: &str = "application/json";

/// Attribute key for the content type on backends with message attributes.
pub const CONTENT_TYPE_ATTR: &str = "content-type";

/// Errors produced while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Failed to encode payload: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Failed to decode payload as {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Encode a payload to JSON bytes.
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(payload).map_err(CodecError::Encode)
}

/// Decode JSON bytes into `T`.
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, CodecError> {
    serde_json::from_slice(data).map_err(|source| CodecError::Decode {
        type_name: std::any::type_name::<T>(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    #[test]
    fn test_encode_produces_utf8_json() {
        let bytes = encode(&Sample {
            name: "crème brûlée".to_string(),
            count: 2,
        })
        .unwrap();

        let text = std::str::from_utf8(&bytes).unwrap();
        assert_eq!(text, r#"{"name":"crème brûlée","count":2}"#);
    }

    #[test]
    fn test_decode_reports_target_type() {
        let err = decode::<Sample>(b"{\"name\": 3}").unwrap_err();
        match err {
            CodecError::Decode { type_name, .. } => assert!(type_name.ends_with("Sample")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_decode_rejects_non_json() {
        assert!(decode::<Sample>(b"\xff\xfe").is_err());
    }
}
