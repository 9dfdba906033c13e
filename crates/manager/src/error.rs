//! Error types for the agent manager.

use lcs_agent_client::ClientError;
use lcs_effects::EffectError;

/// Errors from registry operations and control proxies.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("agent {0:?} is already registered")]
    DuplicateId(String),

    /// Unknown agent id, or no default agent to fall back to.
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error(transparent)]
    Effect(#[from] EffectError),
}

impl ManagerError {
    /// `true` when the failure is bad caller input rather than a
    /// registry or transport problem. Boundary layers map these to 400.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            ManagerError::Client(ClientError::Protocol(_))
                | ManagerError::Effect(EffectError::InvalidArgument(_))
                | ManagerError::Effect(EffectError::Client(ClientError::Protocol(_)))
        )
    }
}
