//! Hub engine
//!
//! This module contains the actor that owns the client registry:
//! - registering clients and assigning identities
//! - removing clients (idempotently) and closing their outboxes
//! - fanning payloads out to every client, or to one client by id
//! - closing every outbox on shutdown
//!
//! Concurrency and usage notes:
//! - The registry lives inside the loop task and is never shared. Requests
//!   arrive over one bounded channel and are applied in the order they were
//!   submitted.
//! - Delivery into an outbox never waits. A client whose outbox is full is a
//!   slow consumer and is dropped from the registry on the spot, which closes
//!   its outbox. The fan-out then carries on with the remaining clients.
//! - The stop signal travels on its own channel and is polled first, so a
//!   backlog of broadcasts cannot delay shutdown.
//! - `client_count` is published through an atomic for read-only observers.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::client::{Client, ClientId, Payload, TryDeliverError};
use crate::utils::{FanoutError, Result};

/// Lifecycle of the hub loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubState {
    Running,
    Stopping,
    Stopped,
}

/// Proof of one registration. Unregistering with a stale `Registration`
/// never removes a later client that happens to reuse the same id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub id: ClientId,
    generation: u64,
}

enum Command {
    Register {
        client: Client,
        reply: oneshot::Sender<Registration>,
    },
    Unregister(Registration),
    Broadcast(Payload),
    SendToOne {
        id: ClientId,
        payload: Payload,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<ClientId>>,
    },
}

/// Cloneable front door to the hub loop.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Command>,
    count: Arc<AtomicUsize>,
    state: watch::Receiver<HubState>,
}

/// Owner of the hub loop. Dropping it without calling `stop` also ends the
/// loop, but only `stop` waits for the outboxes to be closed.
pub struct Hub {
    handle: HubHandle,
    stop_tx: oneshot::Sender<()>,
    state_tx: Arc<watch::Sender<HubState>>,
    task: JoinHandle<()>,
}

impl Hub {
    /// Spawn the hub loop on the current runtime. `inbox_capacity` bounds the
    /// number of requests waiting for the loop.
    pub fn start(inbox_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(inbox_capacity);
        let (stop_tx, stop_rx) = oneshot::channel();
        let (state_tx, state_rx) = watch::channel(HubState::Running);
        let state_tx = Arc::new(state_tx);
        let count = Arc::new(AtomicUsize::new(0));

        let registry = Registry::new(count.clone());
        let task = tokio::spawn(run(registry, rx, stop_rx, state_tx.clone()));

        Self {
            handle: HubHandle {
                tx,
                count,
                state: state_rx,
            },
            stop_tx,
            state_tx,
            task,
        }
    }

    pub fn handle(&self) -> HubHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> HubState {
        *self.state_tx.borrow()
    }

    /// Stop the loop and wait until it has closed every remaining outbox.
    pub async fn stop(self) {
        self.state_tx.send_replace(HubState::Stopping);
        let _ = self.stop_tx.send(());
        if let Err(e) = self.task.await {
            error!("hub loop ended abnormally: {e}");
            self.state_tx.send_replace(HubState::Stopped);
        }
    }
}

impl HubHandle {
    /// Register a client. An identity is assigned when the client has none,
    /// or when the one it carries is already taken.
    pub async fn register(&self, client: Client) -> Result<Registration> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Register { client, reply })
            .await
            .map_err(|_| FanoutError::HubStopped)?;
        rx.await.map_err(|_| FanoutError::HubStopped)
    }

    /// Remove a client and close its outbox. Unknown or already removed
    /// registrations are ignored, as is a stopped hub.
    pub async fn unregister(&self, registration: Registration) {
        if self.tx.send(Command::Unregister(registration)).await.is_err() {
            debug!("unregister after hub stop ignored");
        }
    }

    pub async fn broadcast(&self, payload: Payload) -> Result<()> {
        self.tx
            .send(Command::Broadcast(payload))
            .await
            .map_err(|_| FanoutError::HubStopped)
    }

    pub async fn send_to_one(&self, id: ClientId, payload: Payload) -> Result<()> {
        self.tx
            .send(Command::SendToOne { id, payload })
            .await
            .map_err(|_| FanoutError::HubStopped)
    }

    /// Identities currently registered, as seen by the loop once every
    /// earlier request has been applied.
    pub async fn clients(&self) -> Result<Vec<ClientId>> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Command::Snapshot { reply })
            .await
            .map_err(|_| FanoutError::HubStopped)?;
        rx.await.map_err(|_| FanoutError::HubStopped)
    }

    /// Last published registry size. May lag the loop by one request.
    pub fn client_count(&self) -> usize {
        self.count.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> HubState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == HubState::Running
    }
}

struct Entry {
    client: Client,
    generation: u64,
}

struct Registry {
    clients: HashMap<ClientId, Entry>,
    next_generation: u64,
    count: Arc<AtomicUsize>,
}

impl Registry {
    fn new(count: Arc<AtomicUsize>) -> Self {
        Self {
            clients: HashMap::new(),
            next_generation: 0,
            count,
        }
    }

    fn apply(&mut self, command: Command) {
        match command {
            Command::Register { client, reply } => {
                let registration = self.register(client);
                // The session may have given up waiting; its client stays
                // registered until the reader unregisters or it gets evicted.
                let _ = reply.send(registration);
            }
            Command::Unregister(registration) => self.unregister(&registration),
            Command::Broadcast(payload) => self.broadcast(payload),
            Command::SendToOne { id, payload } => self.send_to_one(&id, payload),
            Command::Snapshot { reply } => {
                let mut ids: Vec<ClientId> = self.clients.keys().cloned().collect();
                ids.sort();
                let _ = reply.send(ids);
            }
        }
    }

    fn register(&mut self, mut client: Client) -> Registration {
        let id = match client.id.take() {
            Some(id) if !self.clients.contains_key(&id) => id,
            Some(taken) => {
                warn!(client_id = %taken, "client id already registered, assigning a fresh one");
                self.fresh_id()
            }
            None => self.fresh_id(),
        };
        client.id = Some(id.clone());

        self.next_generation += 1;
        let generation = self.next_generation;
        self.clients.insert(id.clone(), Entry { client, generation });
        self.publish_count();
        info!(client_id = %id, total = self.clients.len(), "client registered");

        Registration { id, generation }
    }

    fn fresh_id(&self) -> ClientId {
        loop {
            let id = ClientId::generate();
            if !self.clients.contains_key(&id) {
                return id;
            }
        }
    }

    fn unregister(&mut self, registration: &Registration) {
        let current = self
            .clients
            .get(&registration.id)
            .is_some_and(|entry| entry.generation == registration.generation);
        if current {
            self.remove(&registration.id);
            info!(client_id = %registration.id, total = self.clients.len(), "client unregistered");
        } else {
            debug!(client_id = %registration.id, "unregister for unknown client ignored");
        }
    }

    /// Drop the entry, which closes its outbox.
    fn remove(&mut self, id: &ClientId) {
        if self.clients.remove(id).is_some() {
            self.publish_count();
        }
    }

    fn broadcast(&mut self, payload: Payload) {
        let mut evicted = Vec::new();
        for (id, entry) in &self.clients {
            match entry.client.outbox.try_deliver(payload.clone()) {
                Ok(()) => {}
                Err(TryDeliverError::Full) => {
                    warn!(client_id = %id, "outbox full, evicting slow consumer");
                    evicted.push(id.clone());
                }
                Err(TryDeliverError::Closed) => {
                    debug!(client_id = %id, "outbox receiver gone, dropping client");
                    evicted.push(id.clone());
                }
            }
        }

        for id in &evicted {
            self.remove(id);
        }
        debug!(
            bytes = payload.len(),
            delivered = self.clients.len(),
            evicted = evicted.len(),
            "broadcast"
        );
    }

    fn send_to_one(&mut self, id: &ClientId, payload: Payload) {
        let Some(entry) = self.clients.get(id) else {
            warn!(client_id = %id, "send_to_one miss");
            return;
        };
        match entry.client.outbox.try_deliver(payload) {
            Ok(()) => {}
            Err(TryDeliverError::Full) => {
                warn!(client_id = %id, "outbox full, evicting slow consumer");
                self.remove(id);
            }
            Err(TryDeliverError::Closed) => {
                self.remove(id);
            }
        }
    }

    fn close_all(&mut self) {
        let closed = self.clients.len();
        self.clients.clear();
        self.publish_count();
        info!(closed, "closed remaining client outboxes");
    }

    fn publish_count(&self) {
        self.count.store(self.clients.len(), Ordering::Relaxed);
    }
}

async fn run(
    mut registry: Registry,
    mut rx: mpsc::Receiver<Command>,
    mut stop_rx: oneshot::Receiver<()>,
    state: Arc<watch::Sender<HubState>>,
) {
    info!("hub loop started");

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            command = rx.recv() => match command {
                Some(command) => registry.apply(command),
                None => break,
            },
        }
    }

    state.send_replace(HubState::Stopping);
    // Refuse new requests; anything already queued is dropped with the
    // receiver, which closes the outboxes of clients still waiting to register.
    rx.close();
    registry.close_all();
    drop(rx);

    state.send_replace(HubState::Stopped);
    info!("hub loop stopped");
}
