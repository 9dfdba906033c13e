//! TCP client for one LCS agent.
//!
//! The LCS protocol is strict request/response with no correlation ids,
//! so the client serializes everything through a single-flight dispatch
//! lane: one request on the wire at a time, responses matched by
//! position. Connection loss is absorbed by a reconnect loop with
//! exponential backoff; callers see `NotConnected` during the window and
//! retry at their own pace.

pub mod client;
pub mod error;
pub(crate) mod pumps;
pub(crate) mod reconnection;
pub mod types;

pub use client::AgentClient;
pub use error::ClientError;
pub use types::{AgentConfig, AgentEvent, ConnectionState, ReconnectConfig};
