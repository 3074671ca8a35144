//! The `error` module defines the error type shared across `wsfanout`.
//!
//! Only failures that leave a component unable to continue are represented
//! here. Per-client conditions (slow consumers, peer disconnects) are handled
//! where they occur and never travel through this type.

use std::time::Duration;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FanoutError>;

#[derive(Debug, Error)]
pub enum FanoutError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),

    /// The startup connect sequence ran out of time.
    #[error("could not reach broker after {attempts} attempts in {waited:?}: {source}")]
    BrokerConnect {
        attempts: u32,
        waited: Duration,
        #[source]
        source: Box<FanoutError>,
    },

    /// The hub loop has exited and no longer accepts requests.
    #[error("hub is stopped")]
    HubStopped,

    /// Client-side WebSocket failure (the `listen` command).
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),
}
