//! CLI for wsfanout
//!
//! Subcommands:
//! - `server`: run the broadcast service (the default)
//! - `listen`: connect to a running service and print every broadcast (useful for smoke tests)

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use futures_util::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{error, info, warn};

use wsfanout::config::{Settings, load_config};
use wsfanout::hub::Hub;
use wsfanout::queue::{AmqpSource, RetryPolicy, connect_with_retry, forward};
use wsfanout::transport::start_websocket_server;
use wsfanout::utils::{Result, logging};

#[derive(Parser)]
#[command(name = "wsfanout", about = "Broadcast queue messages to WebSocket clients")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the broadcast server
    Server,
    /// Connect to a server and print every message it broadcasts
    Listen {
        /// WebSocket URL to connect to
        #[arg(long, default_value = "ws://127.0.0.1:8090/ws")]
        url: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match load_config() {
        Ok(settings) => settings,
        Err(e) => {
            logging::init("info", "pretty");
            error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&settings.log.level, &settings.log.format);

    let outcome = match cli.command.unwrap_or(Command::Server) {
        Command::Server => run_server(settings).await,
        Command::Listen { url } => run_listener(&url).await,
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(settings: Settings) -> Result<()> {
    let hub = Hub::start(settings.hub.inbox_capacity);

    let source = AmqpSource::new(settings.broker.clone());
    let policy = RetryPolicy::new(settings.broker.connect_max_wait());
    let deliveries = match connect_with_retry(&source, &policy).await {
        Ok(deliveries) => deliveries,
        Err(e) => {
            hub.stop().await;
            return Err(e);
        }
    };

    let listener = match TcpListener::bind(settings.server.addr()).await {
        Ok(listener) => listener,
        Err(e) => {
            hub.stop().await;
            return Err(e.into());
        }
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let bridge = tokio::spawn(forward(deliveries, hub.handle(), stopped(stop_rx.clone())));
    let server = tokio::spawn(start_websocket_server(
        listener,
        hub.handle(),
        settings.clone(),
        stopped(stop_rx),
    ));

    shutdown_signal().await;
    info!("Shutdown signal received. Stopping listener.");
    stop_tx.send_replace(true);

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("WebSocket server failed: {e}"),
        Err(e) => error!("WebSocket server task ended abnormally: {e}"),
    }
    if let Err(e) = bridge.await {
        warn!("Bridge task ended abnormally: {e}");
    }

    hub.stop().await;
    info!("stopped");
    Ok(())
}

async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Could not listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Could not listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

async fn run_listener(url: &str) -> Result<()> {
    let (mut ws_stream, _response) = connect_async(url).await?;
    info!("Connected to {url}");

    while let Some(frame) = ws_stream.next().await {
        let stamp = chrono::Local::now().format("%H:%M:%S%.3f");
        match frame? {
            WsMessage::Text(text) => println!("[{stamp}] {text}"),
            WsMessage::Binary(data) => println!("[{stamp}] <{} bytes>", data.len()),
            WsMessage::Close(frame) => {
                info!("Server closed the connection: {frame:?}");
                break;
            }
            _ => {}
        }
    }

    Ok(())
}
