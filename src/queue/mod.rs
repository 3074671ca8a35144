//! The `queue` module brings broadcast payloads in from the message broker.
//!
//! - `source`: the narrow contract a broker client has to satisfy
//! - `amqp`: the RabbitMQ implementation on top of `lapin`
//! - `retry`: bounded exponential backoff with jitter for the startup connect
//! - `bridge`: the loop that forwards every delivery into the hub

pub mod amqp;
pub mod bridge;
pub mod retry;
pub mod source;

pub use amqp::AmqpSource;
pub use bridge::{BridgeExit, forward};
pub use retry::{RetryPolicy, connect_with_retry};
pub use source::{DeliveryStream, MessageSource};
