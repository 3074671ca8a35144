//! Client session
//!
//! A session bridges one upgraded WebSocket connection to the hub. After the
//! client is registered, two tasks run side by side:
//!
//! - the writer drains the outbox into the socket, one frame at a time, each
//!   write bounded by the write timeout, and sends a ping every ping interval;
//! - the reader ignores whatever the peer sends and only watches liveness: the
//!   read deadline is pushed forward on every pong and any read error, close
//!   frame or expired deadline ends it.
//!
//! When the reader ends it unregisters the client, which makes the hub close
//! the outbox and lets the writer finish. When the writer ends first (socket
//! error, eviction, hub shutdown) the reader is told to stop as well, so
//! neither task can outlive the other for long.

use std::fmt;
use std::net::SocketAddr;

use axum::extract::ws::{Message, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep_until, timeout};
use tracing::{debug, info};

use super::message::to_frame;
use crate::client::{Client, ClientId, OutboxReceiver};
use crate::config::SessionSettings;
use crate::hub::{HubHandle, Registration};
use crate::utils::Result;

/// Why one side of a session stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The peer sent a close frame or the connection ended cleanly.
    PeerClosed,
    /// No pong arrived before the read deadline.
    ReadTimeout,
    /// A frame could not be written before the write deadline.
    WriteTimeout,
    SocketError(String),
    /// The hub closed the outbox (unregistered, evicted or shut down).
    OutboxClosed,
    /// The writer finished first and took the reader down with it.
    WriterExited,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::ReadTimeout => f.write_str("read timeout"),
            CloseReason::WriteTimeout => f.write_str("write timeout"),
            CloseReason::SocketError(e) => write!(f, "socket error: {e}"),
            CloseReason::OutboxClosed => f.write_str("outbox closed"),
            CloseReason::WriterExited => f.write_str("writer exited"),
        }
    }
}

/// A registered, running session.
pub struct Session {
    pub id: ClientId,
    writer: JoinHandle<CloseReason>,
    reader: JoinHandle<CloseReason>,
}

impl Session {
    /// Register a fresh client for `ws` and start its reader and writer.
    ///
    /// Fails only when the hub has stopped; the socket is dropped in that case.
    pub async fn open(
        ws: WebSocket,
        hub: HubHandle,
        settings: &SessionSettings,
        peer: SocketAddr,
    ) -> Result<Self> {
        let (client, outbox) = Client::new(settings.outbox_capacity);
        let registration = hub.register(client).await?;
        let id = registration.id.clone();

        let (sink, stream) = ws.split();
        let (writer_done, writer_done_rx) = oneshot::channel();

        let writer = tokio::spawn(write_loop(
            sink,
            outbox,
            settings.clone(),
            id.clone(),
            writer_done,
        ));
        let reader = tokio::spawn(read_loop(
            stream,
            hub,
            registration,
            settings.clone(),
            writer_done_rx,
        ));

        info!(client_id = %id, %peer, "session active");
        Ok(Self { id, writer, reader })
    }

    /// Wait for both tasks to finish. Returns the writer's and the reader's reason.
    pub async fn closed(self) -> (CloseReason, CloseReason) {
        let writer = self
            .writer
            .await
            .unwrap_or_else(|e| CloseReason::SocketError(e.to_string()));
        let reader = self
            .reader
            .await
            .unwrap_or_else(|e| CloseReason::SocketError(e.to_string()));
        info!(client_id = %self.id, %writer, %reader, "session closed");
        (writer, reader)
    }
}

async fn send_with_deadline(
    sink: &mut SplitSink<WebSocket, Message>,
    frame: Message,
    settings: &SessionSettings,
) -> std::result::Result<(), CloseReason> {
    match timeout(settings.write_timeout(), sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CloseReason::SocketError(e.to_string())),
        Err(_) => Err(CloseReason::WriteTimeout),
    }
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbox: OutboxReceiver,
    settings: SessionSettings,
    id: ClientId,
    _done: oneshot::Sender<()>,
) -> CloseReason {
    let every = settings.ping_interval();
    let mut ping = interval_at(Instant::now() + every, every);

    let reason = loop {
        let frame = tokio::select! {
            next = outbox.recv() => match next {
                Some(payload) => to_frame(payload),
                None => break CloseReason::OutboxClosed,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };
        if let Err(reason) = send_with_deadline(&mut sink, frame, &settings).await {
            break reason;
        }
    };

    // Sends a close frame unless the connection is already gone.
    let _ = timeout(settings.write_timeout(), sink.close()).await;
    debug!(client_id = %id, %reason, "writer finished");
    reason
}

async fn read_loop(
    mut stream: SplitStream<WebSocket>,
    hub: HubHandle,
    registration: Registration,
    settings: SessionSettings,
    mut writer_done: oneshot::Receiver<()>,
) -> CloseReason {
    let mut deadline = Instant::now() + settings.read_timeout();

    let reason = loop {
        tokio::select! {
            _ = &mut writer_done => break CloseReason::WriterExited,
            _ = sleep_until(deadline) => break CloseReason::ReadTimeout,
            frame = stream.next() => match frame {
                Some(Ok(Message::Pong(_))) => {
                    deadline = Instant::now() + settings.read_timeout();
                }
                Some(Ok(Message::Close(_))) | None => break CloseReason::PeerClosed,
                Some(Ok(_)) => {}
                Some(Err(e)) => break CloseReason::SocketError(e.to_string()),
            },
        }
    };

    info!(client_id = %registration.id, %reason, "session disconnecting");
    hub.unregister(registration).await;
    reason
}
