//! Lighting effects built from sequenced dim commands.
//!
//! Effects are plain async functions over an [`AgentClient`]; because the
//! client serializes requests, an effect's commands interleave cleanly
//! with any concurrent one-shot calls. The `spawn_*` variants run an
//! effect as a cancellable background task for boundary layers that
//! answer "started" immediately.

mod fade;
mod wave;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use lcs_agent_client::{AgentClient, ClientError};

pub use fade::{FADE_STEPS, FadeParams, run_fade};
pub use wave::{DEFAULT_WAVE_INTERVAL, WaveParams, run_wave};

/// Errors from effect execution.
#[derive(Debug, thiserror::Error)]
pub enum EffectError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The effect was cancelled at a step boundary.
    #[error("effect cancelled")]
    Cancelled,

    /// The agent answered a step with a failure ack.
    #[error("command rejected by agent")]
    Rejected,

    #[error(transparent)]
    Client(#[from] ClientError),
}

/// A running background effect.
pub struct EffectHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<(), EffectError>>,
}

impl EffectHandle {
    /// Requests cancellation; the effect stops at its next step boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the effect to finish.
    pub async fn join(self) -> Result<(), EffectError> {
        match self.task.await {
            Ok(result) => result,
            Err(_) => Err(EffectError::Cancelled),
        }
    }
}

/// Runs a fade as a background task.
pub fn spawn_fade(client: Arc<AgentClient>, params: FadeParams) -> EffectHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move { run_fade(&client, &params, &token).await });
    EffectHandle { cancel, task }
}

/// Runs a wave as a background task.
pub fn spawn_wave(client: Arc<AgentClient>, params: WaveParams) -> EffectHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move { run_wave(&client, &params, &token).await });
    EffectHandle { cancel, task }
}
