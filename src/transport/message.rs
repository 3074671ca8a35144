use axum::extract::ws::{Message, Utf8Bytes};

use crate::client::Payload;

/// Wrap a hub payload in a WebSocket frame without touching its bytes.
///
/// UTF-8 payloads go out as text frames, anything else as binary.
pub fn to_frame(payload: Payload) -> Message {
    match Utf8Bytes::try_from(payload.clone()) {
        Ok(text) => Message::Text(text),
        Err(_) => Message::Binary(payload),
    }
}
