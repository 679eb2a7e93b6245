//! # Data Source Engine
//!
//! Keeps lazily fetched, possibly unbounded lists consistent between a
//! declarative document and the producers that feed it.
//!
//! A list is either index-addressed (absolute integer positions, optionally
//! bounded) or token-addressed (opaque page tokens in both directions). The
//! engine accepts versioned patch batches, matches out-of-order fetch
//! responses to the requests that caused them, and plans new fetches when
//! the consumer reaches for data near or beyond what is loaded.
//!
//! ## Design Principles
//!
//! - **No IO**: fetches are handed to the host; responses come back as payloads
//! - **Deterministic**: the same payloads in the same order give the same lists
//! - **Local rejection**: a bad payload is dropped and reported, never fatal
//!
//! ## Core Concepts
//!
//! ### Versions
//!
//! Every patch carries a `listVersion` that must be exactly one past the last
//! accepted version. Anything else is dropped without buffering. See
//! [`VersionTracker`].
//!
//! ### Correlation
//!
//! Every outbound fetch gets a fresh token. A response is applied only if its
//! token is outstanding; resolving consumes it. See [`CorrelationManager`].
//!
//! ### Diffs
//!
//! Each accepted payload yields a [`ListDiff`] for the rendering layer:
//! removals, then insertions, then in-place updates.
//!
//! ## Quick Start
//!
//! ```rust
//! use datasource_engine::{DataSourceSession, FetchRequestPayload};
//! use serde_json::json;
//!
//! let mut session = DataSourceSession::default();
//!
//! // 1. Register a list from its initial payload
//! session
//!     .register_data_source(
//!         "dynamicIndexList",
//!         json!({
//!             "listId": "vQdpOESlok",
//!             "listVersion": 0,
//!             "startIndex": 10,
//!             "items": [10, 11, 12, 13, 14],
//!         }),
//!     )
//!     .unwrap();
//!
//! // 2. The consumer reaches before the window; a fetch is planned
//! session.ensure_index("vQdpOESlok", 9).unwrap();
//! let requests = session.take_fetch_requests();
//! assert_eq!(
//!     requests[0],
//!     FetchRequestPayload::Index {
//!         correlation_token: "101".into(),
//!         list_id: "vQdpOESlok".into(),
//!         start_index: 0,
//!         count: 10,
//!     }
//! );
//!
//! // 3. The producer answers with the matching token
//! let accepted = session.update_data_source(
//!     "dynamicIndexList",
//!     json!({
//!         "listId": "vQdpOESlok",
//!         "correlationToken": "101",
//!         "startIndex": 5,
//!         "items": [5, 6, 7, 8, 9],
//!     }),
//! );
//! assert!(accepted);
//! assert_eq!(session.items("vQdpOESlok").unwrap().len(), 10);
//!
//! // 4. The rendering layer picks up the change set
//! let changes = session.take_changes();
//! assert_eq!(changes[0].diff.changes().len(), 5);
//! ```
//!
//! ## FFI
//!
//! The [`ffi`] module exposes the session through C-compatible functions for
//! host runtimes. All data is exchanged as JSON strings.

pub mod config;
pub mod correlation;
pub mod error;
pub mod ffi;
pub mod list;
pub mod operation;
pub mod patch;
pub mod payload;
pub mod queue;
pub mod session;
pub mod trigger;
pub mod version;
pub mod window;

// Re-export main types at crate root
pub use config::{DataSourceConfig, DEFAULT_FETCH_CHUNK_SIZE};
pub use correlation::{CorrelationManager, FetchParams, FetchRequest, INITIAL_TOKEN_COUNTER};
pub use error::Error;
pub use list::{DynamicList, ListArena, ListHandle};
pub use operation::{PatchBatch, PatchOperation};
pub use patch::{Change, ChangeKind, ListDiff, OperationWarning, PatchOutcome};
pub use payload::{
    DataSourcePayload, DataSourceType, FetchRequestPayload, IncomingPayload, IndexFetchResponse,
    IndexListPayload, TokenFetchResponse, TokenListPayload,
};
pub use queue::{QueuedUpdate, ResponseSender};
pub use session::{
    DataSourceError, DataSourceSession, ErrorReason, FetchHandler, ListChange, UpdateOutcome,
};
pub use trigger::{FetchState, FetchTrigger, IndexFetchPlan};
pub use version::VersionTracker;
pub use window::{Direction, IndexWindow, TokenWindow, Window};

/// Type aliases for clarity
pub type ListId = String;
pub type ListVersion = u64;
pub type CorrelationToken = String;
pub type ListIndex = i64;
