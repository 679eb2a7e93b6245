//! Wire payloads exchanged with data-source producers.
//!
//! All payloads are JSON with camelCase field names. Incoming payloads are
//! fully parsed before anything is mutated, so a malformed payload never
//! leaves a list half-updated.

use crate::{
    error::Result, operation::PatchBatch, CorrelationToken, Error, ListId, ListIndex, ListVersion,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The two kinds of dynamic list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataSourceType {
    /// Addressed by absolute integer index.
    #[serde(rename = "dynamicIndexList")]
    Index,
    /// Addressed by opaque page tokens.
    #[serde(rename = "dynamicTokenList")]
    Token,
}

impl DataSourceType {
    /// Wire name of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceType::Index => "dynamicIndexList",
            DataSourceType::Token => "dynamicTokenList",
        }
    }

    /// Parse a wire name.
    pub fn parse(name: &str) -> Result<Self> {
        match name {
            "dynamicIndexList" => Ok(DataSourceType::Index),
            "dynamicTokenList" => Ok(DataSourceType::Token),
            other => Err(Error::UnknownSourceType(other.to_string())),
        }
    }
}

impl fmt::Display for DataSourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Full payload for an index list (initial load).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexListPayload {
    pub list_id: ListId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_version: Option<ListVersion>,
    pub start_index: ListIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_inclusive_index: Option<ListIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_exclusive_index: Option<ListIndex>,
    pub items: Vec<serde_json::Value>,
}

/// Full payload for a token list (initial load).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenListPayload {
    pub list_id: ListId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_version: Option<ListVersion>,
    pub page_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub forward_page_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backward_page_token: Option<String>,
    pub items: Vec<serde_json::Value>,
}

/// A full list payload tagged with its data source type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DataSourcePayload {
    #[serde(rename = "dynamicIndexList")]
    Index(IndexListPayload),
    #[serde(rename = "dynamicTokenList")]
    Token(TokenListPayload),
}

impl DataSourcePayload {
    /// Parse a full payload for a known type. A `type` field in the body,
    /// if present, must agree.
    pub fn parse(source_type: DataSourceType, value: serde_json::Value) -> Result<Self> {
        if let Some(tag) = value.get("type").and_then(|t| t.as_str()) {
            if DataSourceType::parse(tag)? != source_type {
                return Err(Error::MalformedPayload(format!(
                    "payload type '{}' does not match '{}'",
                    tag, source_type
                )));
            }
        }
        Ok(match source_type {
            DataSourceType::Index => DataSourcePayload::Index(serde_json::from_value(value)?),
            DataSourceType::Token => DataSourcePayload::Token(serde_json::from_value(value)?),
        })
    }

    pub fn source_type(&self) -> DataSourceType {
        match self {
            DataSourcePayload::Index(_) => DataSourceType::Index,
            DataSourcePayload::Token(_) => DataSourceType::Token,
        }
    }

    pub fn list_id(&self) -> &ListId {
        match self {
            DataSourcePayload::Index(p) => &p.list_id,
            DataSourcePayload::Token(p) => &p.list_id,
        }
    }

    pub fn list_version(&self) -> Option<ListVersion> {
        match self {
            DataSourcePayload::Index(p) => p.list_version,
            DataSourcePayload::Token(p) => p.list_version,
        }
    }
}

/// Response to an index fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexFetchResponse {
    pub list_id: ListId,
    pub correlation_token: CorrelationToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_version: Option<ListVersion>,
    pub start_index: ListIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_inclusive_index: Option<ListIndex>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maximum_exclusive_index: Option<ListIndex>,
    pub items: Vec<serde_json::Value>,
}

/// Response to a token fetch request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenFetchResponse {
    pub list_id: ListId,
    pub correlation_token: CorrelationToken,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub list_version: Option<ListVersion>,
    /// Echo of the requested page token
    pub page_token: String,
    /// Token of the page beyond this one in the same direction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub items: Vec<serde_json::Value>,
}

/// Request emitted to the fetch collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FetchRequestPayload {
    #[serde(rename_all = "camelCase")]
    Index {
        correlation_token: CorrelationToken,
        list_id: ListId,
        start_index: ListIndex,
        count: u64,
    },
    #[serde(rename_all = "camelCase")]
    Token {
        correlation_token: CorrelationToken,
        list_id: ListId,
        page_token: String,
    },
}

impl FetchRequestPayload {
    pub fn correlation_token(&self) -> &CorrelationToken {
        match self {
            FetchRequestPayload::Index {
                correlation_token, ..
            }
            | FetchRequestPayload::Token {
                correlation_token, ..
            } => correlation_token,
        }
    }

    pub fn list_id(&self) -> &ListId {
        match self {
            FetchRequestPayload::Index { list_id, .. }
            | FetchRequestPayload::Token { list_id, .. } => list_id,
        }
    }

    pub fn source_type(&self) -> DataSourceType {
        match self {
            FetchRequestPayload::Index { .. } => DataSourceType::Index,
            FetchRequestPayload::Token { .. } => DataSourceType::Token,
        }
    }
}

/// A payload passed to `update_data_source`, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum IncomingPayload {
    Patch(PatchBatch),
    IndexResponse(IndexFetchResponse),
    TokenResponse(TokenFetchResponse),
}

impl IncomingPayload {
    /// Classify and parse a payload.
    ///
    /// A payload carrying `operations` is a patch; one carrying a
    /// `correlationToken` is a fetch response for the given list type.
    pub fn parse(source_type: DataSourceType, value: serde_json::Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| Error::MalformedPayload("payload is not a JSON object".into()))?;

        if object.contains_key("operations") {
            return Ok(IncomingPayload::Patch(serde_json::from_value(value)?));
        }
        if object.contains_key("correlationToken") {
            return Ok(match source_type {
                DataSourceType::Index => {
                    IncomingPayload::IndexResponse(serde_json::from_value(value)?)
                }
                DataSourceType::Token => {
                    IncomingPayload::TokenResponse(serde_json::from_value(value)?)
                }
            });
        }
        Err(Error::MalformedPayload(
            "payload has neither operations nor correlationToken".into(),
        ))
    }

    /// Parse from a JSON string.
    pub fn from_json(source_type: DataSourceType, json: &str) -> Result<Self> {
        Self::parse(source_type, serde_json::from_str(json)?)
    }

    pub fn list_id(&self) -> &ListId {
        match self {
            IncomingPayload::Patch(batch) => &batch.list_id,
            IncomingPayload::IndexResponse(response) => &response.list_id,
            IncomingPayload::TokenResponse(response) => &response.list_id,
        }
    }

    pub fn list_version(&self) -> Option<ListVersion> {
        match self {
            IncomingPayload::Patch(batch) => Some(batch.list_version),
            IncomingPayload::IndexResponse(response) => response.list_version,
            IncomingPayload::TokenResponse(response) => response.list_version,
        }
    }

    /// Type of list this payload is for.
    pub fn source_type(&self) -> Option<DataSourceType> {
        match self {
            IncomingPayload::Patch(_) => None,
            IncomingPayload::IndexResponse(_) => Some(DataSourceType::Index),
            IncomingPayload::TokenResponse(_) => Some(DataSourceType::Token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn source_type_names() {
        assert_eq!(
            DataSourceType::parse("dynamicIndexList").unwrap(),
            DataSourceType::Index
        );
        assert_eq!(DataSourceType::Token.to_string(), "dynamicTokenList");
        assert!(matches!(
            DataSourceType::parse("staticList"),
            Err(Error::UnknownSourceType(_))
        ));
    }

    #[test]
    fn parse_index_list_payload() {
        let value = json!({
            "type": "dynamicIndexList",
            "listId": "vQdpOESlok",
            "startIndex": 10,
            "minimumInclusiveIndex": 0,
            "maximumExclusiveIndex": 20,
            "items": [{"color": "blue", "text": "10"}]
        });

        let payload = DataSourcePayload::parse(DataSourceType::Index, value).unwrap();
        match payload {
            DataSourcePayload::Index(p) => {
                assert_eq!(p.list_id, "vQdpOESlok");
                assert_eq!(p.start_index, 10);
                assert_eq!(p.minimum_inclusive_index, Some(0));
                assert_eq!(p.maximum_exclusive_index, Some(20));
                assert_eq!(p.list_version, None);
                assert_eq!(p.items.len(), 1);
            }
            _ => panic!("expected index payload"),
        }
    }

    #[test]
    fn parse_token_list_payload_with_null_token() {
        let value = json!({
            "listId": "tokens",
            "pageToken": "pageToken",
            "backwardPageToken": null,
            "forwardPageToken": "nextPageToken",
            "items": []
        });

        let payload = DataSourcePayload::parse(DataSourceType::Token, value).unwrap();
        match payload {
            DataSourcePayload::Token(p) => {
                assert_eq!(p.backward_page_token, None);
                assert_eq!(p.forward_page_token.as_deref(), Some("nextPageToken"));
            }
            _ => panic!("expected token payload"),
        }
    }

    #[test]
    fn payload_type_must_agree() {
        let value = json!({
            "type": "dynamicTokenList",
            "listId": "x",
            "startIndex": 0,
            "items": []
        });
        assert!(matches!(
            DataSourcePayload::parse(DataSourceType::Index, value),
            Err(Error::MalformedPayload(_))
        ));
    }

    #[test]
    fn full_payload_serializes_with_type_tag() {
        let payload = DataSourcePayload::Index(IndexListPayload {
            list_id: "l".into(),
            list_version: None,
            start_index: 0,
            minimum_inclusive_index: Some(0),
            maximum_exclusive_index: None,
            items: vec![json!(1)],
        });
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            json,
            json!({
                "type": "dynamicIndexList",
                "listId": "l",
                "startIndex": 0,
                "minimumInclusiveIndex": 0,
                "items": [1]
            })
        );
    }

    #[test]
    fn classify_patch() {
        let json = r#"{"listId": "l", "listVersion": 1, "operations": []}"#;
        let incoming = IncomingPayload::from_json(DataSourceType::Index, json).unwrap();
        assert!(matches!(incoming, IncomingPayload::Patch(_)));
        assert_eq!(incoming.list_version(), Some(1));
        assert_eq!(incoming.source_type(), None);
    }

    #[test]
    fn classify_responses() {
        let json = r#"{"listId": "l", "correlationToken": "101", "startIndex": 5, "items": []}"#;
        let incoming = IncomingPayload::from_json(DataSourceType::Index, json).unwrap();
        assert!(matches!(incoming, IncomingPayload::IndexResponse(_)));

        let json = r#"{"listId": "t", "correlationToken": "102", "pageToken": "p",
                       "nextPageToken": "n", "items": [1, 2]}"#;
        let incoming = IncomingPayload::from_json(DataSourceType::Token, json).unwrap();
        match incoming {
            IncomingPayload::TokenResponse(r) => {
                assert_eq!(r.next_page_token.as_deref(), Some("n"));
                assert_eq!(r.items.len(), 2);
            }
            _ => panic!("expected token response"),
        }
    }

    #[test]
    fn classify_rejects_malformed() {
        assert!(IncomingPayload::from_json(DataSourceType::Index, "[]").is_err());
        assert!(IncomingPayload::from_json(DataSourceType::Index, "not json").is_err());
        assert!(IncomingPayload::from_json(DataSourceType::Index, r#"{"listId": "l"}"#).is_err());
        // Response without startIndex
        assert!(IncomingPayload::from_json(
            DataSourceType::Index,
            r#"{"listId": "l", "correlationToken": "101", "items": []}"#
        )
        .is_err());
    }

    #[test]
    fn fetch_request_untagged_roundtrip() {
        let json = r#"{"correlationToken": "101", "listId": "l", "startIndex": 0, "count": 10}"#;
        let request: FetchRequestPayload = serde_json::from_str(json).unwrap();
        assert_eq!(request.source_type(), DataSourceType::Index);
        assert_eq!(request.correlation_token(), "101");

        let json = r#"{"correlationToken": "102", "listId": "t", "pageToken": "p"}"#;
        let request: FetchRequestPayload = serde_json::from_str(json).unwrap();
        assert_eq!(request.source_type(), DataSourceType::Token);
        assert_eq!(request.list_id(), "t");
    }
}
