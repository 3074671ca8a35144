//! Queue consumer bridge
//!
//! Forwards every delivery body, untouched, into `HubHandle::broadcast`. The
//! bridge never reconnects: once the broker stream ends, intake stops until
//! the process is restarted.

use std::future::Future;

use futures::StreamExt;
use tracing::{info, warn};

use super::source::DeliveryStream;
use crate::hub::HubHandle;

/// Why `forward` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeExit {
    /// The broker closed the delivery stream or it failed.
    StreamClosed,
    /// The hub stopped accepting broadcasts.
    HubStopped,
    Shutdown,
}

/// Pump `deliveries` into `hub` until the stream ends, the hub stops, or
/// `shutdown` completes. Returns the exit reason and the number of payloads
/// handed to the hub. The stream is closed before returning.
pub async fn forward<D, F>(mut deliveries: D, hub: HubHandle, shutdown: F) -> (BridgeExit, u64)
where
    D: DeliveryStream,
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    let mut forwarded = 0u64;

    let exit = loop {
        let next = tokio::select! {
            _ = &mut shutdown => break BridgeExit::Shutdown,
            next = deliveries.next() => next,
        };

        match next {
            Some(Ok(payload)) => {
                if hub.broadcast(payload).await.is_err() {
                    break BridgeExit::HubStopped;
                }
                forwarded += 1;
            }
            Some(Err(e)) => {
                warn!(error = %e, "broker delivery stream failed");
                break BridgeExit::StreamClosed;
            }
            None => break BridgeExit::StreamClosed,
        }
    };

    match exit {
        BridgeExit::StreamClosed => {
            warn!(forwarded, "deliveries stream closed, broadcast intake halted")
        }
        BridgeExit::HubStopped => info!(forwarded, "hub stopped, bridge exiting"),
        BridgeExit::Shutdown => info!(forwarded, "bridge shut down"),
    }

    deliveries.close().await;
    (exit, forwarded)
}
