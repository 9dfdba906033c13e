//! LCS gateway entry point.
//!
//! Wires the agent manager to its two boundary surfaces: the REST shell
//! on `PORT` and the WebSocket push server on `LCS_WS_PORT`. When
//! `LCS_HOST` is set, a default agent is registered before the listeners
//! come up.

mod config;
mod envelope;
mod messages;
mod push;
mod rest;

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use lcs_agent_manager::AgentManager;

use crate::config::{DEFAULT_AGENT_ID, GatewayConfig};
use crate::push::PushServer;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting LCS gateway");

    let config = GatewayConfig::from_env();
    let manager = Arc::new(AgentManager::new());
    let cancel = CancellationToken::new();

    // Fresh manager: the event stream is still available here.
    let events = manager.take_events();

    if let Some(endpoint) = &config.default_agent {
        match manager
            .add_agent(DEFAULT_AGENT_ID, endpoint.host.clone(), endpoint.port, None)
            .await
        {
            Ok(()) => tracing::info!(
                host = %endpoint.host,
                port = endpoint.port,
                "default agent registered"
            ),
            Err(e) => tracing::warn!("failed to register default agent: {e}"),
        }
    }

    let push_server = PushServer::new(Arc::clone(&manager), cancel.clone());
    if let Some(events) = events {
        tokio::spawn(push::forward_events(
            events,
            push_server.broadcast_sender(),
            cancel.clone(),
        ));
    }

    let ws_listener = TcpListener::bind(("0.0.0.0", config.ws_port)).await?;
    tokio::spawn(push_server.run(ws_listener));

    // Ctrl-C tears down agents and both listeners.
    {
        let cancel = cancel.clone();
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutdown signal received");
                manager.disconnect_all().await;
                cancel.cancel();
            }
        });
    }

    let http_listener = TcpListener::bind(("0.0.0.0", config.http_port)).await?;
    tracing::info!("REST listening on {}", http_listener.local_addr()?);

    let shutdown = cancel.clone();
    axum::serve(http_listener, rest::router(manager))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}
