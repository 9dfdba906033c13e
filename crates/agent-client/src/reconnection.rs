//! Automatic reconnection with exponential backoff.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::client::Shared;
use crate::types::ConnectionState;

/// Redials the agent until a connection sticks or the loop is cancelled
/// by `disconnect()` / an explicit `connect()`.
///
/// Each attempt announces `Reconnecting { attempt }`, sleeps the backoff
/// delay, moves to `Connecting` and dials. Success installs the fresh
/// connection (which re-arms this loop for the *next* loss) and exits.
pub(crate) async fn reconnect_loop(shared: Arc<Shared>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        attempt = attempt.saturating_add(1);
        let delay = shared.config.reconnect.delay_for_attempt(attempt);

        shared
            .set_state(ConnectionState::Reconnecting { attempt })
            .await;
        info!(
            host = %shared.config.host,
            port = shared.config.port,
            attempt,
            delay_secs = format_args!("{:.1}", delay.as_secs_f64()),
            "reconnecting"
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("reconnect cancelled");
                return;
            }
            _ = tokio::time::sleep(delay) => {}
        }
        if cancel.is_cancelled() {
            return;
        }

        shared.set_state(ConnectionState::Connecting).await;
        match shared.dial().await {
            Ok(stream) => {
                if cancel.is_cancelled() {
                    // disconnect() raced the dial; drop the socket.
                    return;
                }
                shared.install_connection(stream).await;
                info!(host = %shared.config.host, "reconnected");
                break;
            }
            Err(e) => {
                warn!(attempt, "reconnect attempt failed: {e}");
            }
        }

        if cancel.is_cancelled() {
            return;
        }
    }

    // Loop finished on its own; a cancelled exit leaves the token in
    // place so disconnect() stays the owner of that state.
    if !cancel.is_cancelled() {
        shared.clear_reconnect();
    }
}
