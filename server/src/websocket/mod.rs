//! WebSocket transport for list payloads and live patch batches.
//!
//! Clients load and fetch pages over the socket, and subscribe to lists to
//! have every new patch batch pushed to them as it is produced.

mod manager;
mod protocol;
mod window;

pub use manager::{ConnectionManager, MessageSender};
pub use protocol::*;
pub use window::SubscriberWindow;
