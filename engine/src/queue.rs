//! Cross-thread delivery of fetch responses and patches.
//!
//! Producers may complete fetches on any thread. They hand payloads to a
//! [`ResponseSender`]; the thread owning the session drains them in arrival
//! order with `DataSourceSession::process_queued`.

use crate::{error::Result, Error};
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

/// A payload waiting to be applied by the owning thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedUpdate {
    /// Data source type name, as passed to `update_data_source`
    pub source_type: String,
    pub payload: serde_json::Value,
}

/// Cloneable handle for submitting payloads from other threads.
#[derive(Debug, Clone)]
pub struct ResponseSender {
    tx: Sender<QueuedUpdate>,
}

impl ResponseSender {
    /// Queue a payload. Fails once the session has finished.
    pub fn send(&self, source_type: impl Into<String>, payload: serde_json::Value) -> Result<()> {
        self.tx
            .send(QueuedUpdate {
                source_type: source_type.into(),
                payload,
            })
            .map_err(|_| Error::SessionFinished)
    }

    /// Queue a payload given as a JSON string.
    pub fn send_json(&self, source_type: impl Into<String>, json: &str) -> Result<()> {
        self.send(source_type, serde_json::from_str(json)?)
    }
}

/// Create a connected sender and inbox.
pub(crate) fn inbox() -> (ResponseSender, Receiver<QueuedUpdate>) {
    let (tx, rx) = crossbeam_channel::unbounded();
    (ResponseSender { tx }, rx)
}
