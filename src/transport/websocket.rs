//! WebSocket transport
//!
//! This file implements the listener that feeds client sessions:
//! - Accept TCP connections and serve HTTP/1.1 on each of them
//! - Answer `GET <health_path>` with a static JSON liveness payload
//! - Upgrade requests on `<ws_path>` to WebSocket and open a `Session`;
//!   any other path gets a 404 and never reaches the hub
//!
//! Every connection must finish its HTTP exchange within `handshake_timeout`.
//! Upgraded sockets leave that deadline behind as soon as the upgrade
//! completes; plain HTTP connections are closed when it expires.
//!
//! Shutdown is the first phase of the service's two-phase stop: once the
//! `shutdown` future resolves the listener is dropped, and connections already
//! in flight get `shutdown_timeout` to finish before they are aborted.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::HttpBody;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::Response as HttpResponse;
use axum::response::Response;
use axum::routing::get;
use axum::{Json, Router};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tower::Service;
use tower_http::trace::{OnResponse, TraceLayer};
use tracing::{Span, debug, info, info_span, warn};

use super::session::Session;
use crate::config::{SessionSettings, Settings};
use crate::hub::HubHandle;
use crate::utils::Result;

#[derive(Clone)]
struct AppState {
    hub: HubHandle,
    session: Arc<SessionSettings>,
}

/// Routes served on the listener. Only the plain HTTP routes are access-logged;
/// upgraded connections are logged by their session.
pub fn build_router(hub: HubHandle, settings: &Settings) -> Router {
    let state = AppState {
        hub,
        session: Arc::new(settings.session.clone()),
    };

    Router::new()
        .route(&settings.server.health_path, get(health))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(AccessLog),
        )
        .route(&settings.server.ws_path, get(upgrade))
        .with_state(state)
}

pub async fn start_websocket_server<F>(
    listener: TcpListener,
    hub: HubHandle,
    settings: Settings,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let addr = listener.local_addr()?;
    let handshake_timeout = settings.server.handshake_timeout();
    let router = build_router(hub, &settings);
    info!(
        "WebSocket server listening on ws://{addr}{}",
        settings.server.ws_path
    );

    let mut connections = JoinSet::new();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    connections.spawn(serve_connection(stream, peer, router.clone(), handshake_timeout));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    info!(in_flight = connections.len(), "listener closed, draining connections");

    let drain = async { while connections.join_next().await.is_some() {} };
    let drained = timeout(settings.server.shutdown_timeout(), drain).await.is_ok();
    if !drained {
        warn!(
            aborted = connections.len(),
            "shutdown timeout elapsed, aborting pending connections"
        );
        connections.shutdown().await;
    }

    Ok(())
}

/// Serve HTTP on one connection until it is upgraded, closed by the peer, or
/// `handshake_timeout` runs out.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    router: Router,
    handshake_timeout: Duration,
) {
    let service = service_fn(move |mut request: Request<Incoming>| {
        request.extensions_mut().insert(ConnectInfo(peer));
        router.clone().call(request)
    });
    let connection = http1::Builder::new()
        .serve_connection(TokioIo::new(stream), service)
        .with_upgrades();

    match timeout(handshake_timeout, connection).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(%peer, error = %e, "connection error"),
        Err(_) => debug!(%peer, "handshake timeout, closing connection"),
    }
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn upgrade(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    ws.on_failed_upgrade(move |e| warn!(%peer, error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| run_session(socket, state, peer))
}

async fn run_session(socket: WebSocket, state: AppState, peer: SocketAddr) {
    match Session::open(socket, state.hub, &state.session, peer).await {
        Ok(session) => {
            session.closed().await;
        }
        Err(e) => warn!(%peer, error = %e, "session rejected"),
    }
}

fn request_span(request: &Request) -> Span {
    info_span!(
        "http",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// One access log line per plain HTTP response.
#[derive(Debug, Clone, Copy)]
struct AccessLog;

impl<B: HttpBody> OnResponse<B> for AccessLog {
    fn on_response(self, response: &HttpResponse<B>, latency: Duration, _span: &Span) {
        info!(
            status = response.status().as_u16(),
            bytes = response.body().size_hint().exact(),
            duration_ms = latency.as_millis() as u64,
            "http request"
        );
    }
}
