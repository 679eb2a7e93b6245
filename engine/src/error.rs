//! Error types for the data-source engine.

use crate::{CorrelationToken, ListId, ListVersion};
use thiserror::Error;

/// All possible errors from the data-source engine.
///
/// None of these are fatal to the document. They describe why a payload or a
/// consumer request was dropped.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Payload errors
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("unknown data source type: {0}")]
    UnknownSourceType(String),

    #[error("list '{list_id}' is a {actual} list, not a {expected} list")]
    ListKindMismatch {
        list_id: ListId,
        expected: String,
        actual: String,
    },

    // Protocol errors
    #[error("list not registered: {0}")]
    UnregisteredList(ListId),

    #[error("stale version for list '{list_id}': expected {expected}, got {actual}")]
    StaleVersion {
        list_id: ListId,
        expected: ListVersion,
        actual: ListVersion,
    },

    #[error("unknown correlation token: {0}")]
    UnknownCorrelation(CorrelationToken),

    #[error("inconsistent range for list '{list_id}': {message}")]
    InconsistentRange { list_id: ListId, message: String },

    #[error("inconsistent page token for list '{list_id}': expected {expected}, got {actual}")]
    InconsistentPageToken {
        list_id: ListId,
        expected: String,
        actual: String,
    },

    // Session errors
    #[error("session has finished")]
    SessionFinished,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::MalformedPayload(err.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::UnregisteredList("vQdpOESlok".into());
        assert_eq!(err.to_string(), "list not registered: vQdpOESlok");

        let err = Error::StaleVersion {
            list_id: "items".into(),
            expected: 3,
            actual: 2,
        };
        assert_eq!(
            err.to_string(),
            "stale version for list 'items': expected 3, got 2"
        );

        let err = Error::ListKindMismatch {
            list_id: "items".into(),
            expected: "dynamicTokenList".into(),
            actual: "dynamicIndexList".into(),
        };
        assert_eq!(
            err.to_string(),
            "list 'items' is a dynamicIndexList list, not a dynamicTokenList list"
        );
    }

    #[test]
    fn json_errors_are_malformed_payloads() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, Error::MalformedPayload(_)));
    }
}
