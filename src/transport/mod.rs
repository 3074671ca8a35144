//! The `transport` module is responsible for network communication with
//! WebSocket clients.
//!
//! It runs the TCP listener, answers health checks, performs the WebSocket
//! upgrade and drives one client session per connection. Sessions only push
//! hub payloads out; nothing a client sends is interpreted.

pub mod message;
pub mod session;
pub mod websocket;

pub use session::{CloseReason, Session};
pub use websocket::{build_router, start_websocket_server};
