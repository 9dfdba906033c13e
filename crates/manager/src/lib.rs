//! Agent manager: the gateway's control plane.
//!
//! Keeps the insertion-ordered registry of named agents, tracks the
//! default agent, proxies every client operation to the resolved target
//! and announces registry changes, connection transitions and successful
//! mutating operations on an event channel consumed by the push layer.

pub mod error;
pub mod manager;
pub mod types;

pub use error::ManagerError;
pub use manager::AgentManager;
pub use types::{
    AgentSummary, ConnectionStatus, ControlOperation, ManagerEvent, StateChange,
};
