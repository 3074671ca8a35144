use std::future::Future;

use futures::Stream;

use crate::client::Payload;
use crate::utils::Result;

/// A live subscription to the broadcast queue.
///
/// Yields message bodies exactly as the broker delivered them. Deliveries are
/// already acknowledged by the time they are yielded.
pub trait DeliveryStream: Stream<Item = Result<Payload>> + Send + Unpin {
    /// Release the underlying broker resources.
    fn close(self) -> impl Future<Output = ()> + Send;
}

/// Something that can open a `DeliveryStream`: the real broker, or a test double.
pub trait MessageSource {
    type Deliveries: DeliveryStream;

    /// Make one connection attempt, set up the queue and start consuming.
    fn connect(&self) -> impl Future<Output = Result<Self::Deliveries>> + Send;

    /// Where this source points, for logs.
    fn describe(&self) -> String;
}
