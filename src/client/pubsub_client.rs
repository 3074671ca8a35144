//! Client representation
//!
//! `Client` models one connected WebSocket peer as the hub sees it: an
//! identity and the sending half of a bounded outbox. The identity may be left
//! empty, in which case the hub assigns one on registration.

use std::fmt;

use uuid::Uuid;

use super::outbox::{self, Outbox, OutboxReceiver};

/// Opaque client identity, unique for the lifetime of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        Self(format!("client-{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ClientId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ClientId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug)]
pub struct Client {
    pub id: Option<ClientId>,
    pub outbox: Outbox,
}

impl Client {
    /// Create an unnamed client with a fresh outbox of `capacity` slots.
    /// The receiver goes to the session's writer task.
    pub fn new(capacity: usize) -> (Self, OutboxReceiver) {
        let (outbox, receiver) = outbox::channel(capacity);
        (Self { id: None, outbox }, receiver)
    }

    pub fn with_id(id: impl Into<ClientId>, capacity: usize) -> (Self, OutboxReceiver) {
        let (mut client, receiver) = Self::new(capacity);
        client.id = Some(id.into());
        (client, receiver)
    }
}
