//! Error types for the agent client.

use lcs_protocol::ProtocolError;

/// Errors surfaced to callers of the client's request API.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The client is not in the `Connected` state. Callers retry at their
    /// own discretion; the reconnect loop runs independently.
    #[error("agent not connected")]
    NotConnected,

    /// No response arrived within the per-request deadline.
    #[error("request timed out")]
    Timeout,

    /// The connection dropped while this request was pending.
    #[error("connection lost")]
    ConnectionLost,

    /// The request was abandoned by `disconnect()` or shutdown.
    #[error("request cancelled")]
    Cancelled,

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
