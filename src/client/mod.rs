//! The `client` module defines how a connected client is represented in the hub.
//!
//! A `Client` pairs an identity with the sending half of its bounded outbox.
//! The hub owns the `Client` for as long as it is registered; the session that
//! created it keeps only the `OutboxReceiver`, which observes the outbox being
//! closed when the hub drops the client.

pub mod outbox;
pub mod pubsub_client;

pub use outbox::{Outbox, OutboxReceiver, Payload, TryDeliverError};
pub use pubsub_client::{Client, ClientId};
