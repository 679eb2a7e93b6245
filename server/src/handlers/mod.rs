//! Request handlers shared by the HTTP routes and the WebSocket transport.

mod lists;
mod websocket;

pub use lists::*;
pub use websocket::*;
