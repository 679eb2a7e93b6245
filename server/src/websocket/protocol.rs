//! WebSocket message protocol definitions.
//!
//! Envelopes are JSON with a snake_case `type` tag. Payloads inside them
//! keep the camelCase wire shape clients pass straight to
//! `update_data_source` together with `source_type`.

use datasource_engine::{
    DataSourcePayload, DataSourceType, FetchRequestPayload, ListId, ListIndex, ListVersion,
    PatchBatch,
};
use serde::{Deserialize, Serialize};

use crate::repository::{FetchResponse, InitialQuery};

/// Messages sent from client to server.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Request the initial payload for a list.
    Load {
        list_id: ListId,
        #[serde(default)]
        start_index: Option<ListIndex>,
        #[serde(default)]
        count: Option<usize>,
        #[serde(default)]
        page: Option<usize>,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Start receiving patch batches for a list.
    Subscribe {
        list_id: ListId,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Stop receiving patch batches for a list.
    Unsubscribe {
        list_id: ListId,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// A fetch request emitted by the client's session.
    Fetch {
        request: FetchRequestPayload,
        #[serde(default)]
        request_id: Option<String>,
    },

    /// Keep-alive ping.
    Ping,
}

impl ClientMessage {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            ClientMessage::Load { request_id, .. }
            | ClientMessage::Subscribe { request_id, .. }
            | ClientMessage::Unsubscribe { request_id, .. }
            | ClientMessage::Fetch { request_id, .. } => request_id.as_deref(),
            ClientMessage::Ping => None,
        }
    }

    /// Where a `load` should start; None for other messages.
    pub fn initial_query(&self) -> Option<InitialQuery> {
        match *self {
            ClientMessage::Load {
                start_index,
                count,
                page,
                ..
            } => Some(InitialQuery {
                start_index,
                count,
                page,
            }),
            _ => None,
        }
    }
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Initial payload for a list.
    Loaded {
        source_type: DataSourceType,
        payload: DataSourcePayload,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Subscription confirmed at the list's current version.
    Subscribed {
        list_id: ListId,
        list_version: ListVersion,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    Unsubscribed {
        list_id: ListId,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// Answer to a fetch request.
    FetchResponse {
        source_type: DataSourceType,
        payload: FetchResponse,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },

    /// A versioned patch batch, pushed to every subscriber of the list.
    Update {
        source_type: DataSourceType,
        payload: PatchBatch,
    },

    /// Response to ping.
    Pong,

    /// Error message.
    Error {
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

impl ServerMessage {
    /// Create an error message.
    pub fn error(message: impl Into<String>, request_id: Option<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            request_id,
        }
    }

    /// Create an update push for a batch.
    pub fn update(source_type: DataSourceType, payload: PatchBatch) -> Self {
        ServerMessage::Update {
            source_type,
            payload,
        }
    }
}
