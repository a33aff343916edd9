//! Error types for the protocol crate.

use thiserror::Error;

/// Failure to move a record to or from its JSON form.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The record could not be encoded.
    #[error("failed to encode record: {0}")]
    Encode(String),

    /// The input is not valid JSON for the expected record.
    #[error("failed to decode record at line {line}, column {column}: {message}")]
    Decode {
        message: String,
        line: usize,
        column: usize,
    },
}

pub type Result<T> = std::result::Result<T, ProtocolError>;

impl From<serde_json::Error> for ProtocolError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_io() || err.line() == 0 {
            return ProtocolError::Encode(err.to_string());
        }
        ProtocolError::Decode {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_carries_position() {
        let err = serde_json::from_str::<serde_json::Value>("{\n  \"kind\": }").unwrap_err();
        let protocol_err: ProtocolError = err.into();

        match protocol_err {
            ProtocolError::Decode { line, column, .. } => {
                assert_eq!(line, 2);
                assert!(column > 0);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[test]
    fn test_encode_error_display() {
        let err = ProtocolError::Encode("key must be a string".to_string());
        assert_eq!(err.to_string(), "failed to encode record: key must be a string");
    }

    #[test]
    fn test_encode_error_from_non_string_map_key() {
        use std::collections::HashMap;

        let mut map = HashMap::new();
        map.insert(vec![1u8], "value");
        let err = serde_json::to_string(&map).unwrap_err();

        assert!(matches!(ProtocolError::from(err), ProtocolError::Encode(_)));
    }
}
