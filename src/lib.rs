//! # wsfanout
//!
//! `wsfanout` is the real-time broadcast service of the company registry. It
//! consumes change notifications from a durable RabbitMQ queue and fans every
//! message body out to all connected WebSocket clients. A client that cannot
//! keep up is disconnected instead of slowing anyone else down.
//!
//! ## Core Modules
//!
//! - `client`: a connected client as the hub sees it, and its bounded outbox.
//! - `hub`: the actor that owns the client registry and performs the fan-out.
//! - `queue`: broker connection with startup backoff, and the bridge into the hub.
//! - `transport`: the listener, health endpoint, WebSocket upgrade and client sessions.
//! - `config`: layered settings from defaults, `config/default.*` and the environment.
//! - `utils`: error type and logging setup.

pub mod client;
pub mod config;
pub mod hub;
pub mod queue;
pub mod transport;
pub mod utils;
