//! Linear brightness fade.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use lcs_agent_client::AgentClient;
use lcs_protocol::command;

use crate::EffectError;

/// Number of interpolation intervals; a fade issues `FADE_STEPS + 1`
/// dim commands (samples at i = 0..=20).
pub const FADE_STEPS: u32 = 20;

/// Parameters for a brightness fade on one lamp.
#[derive(Debug, Clone)]
pub struct FadeParams {
    pub master: u8,
    pub cu: u8,
    pub lamp_no: u8,
    pub start: u8,
    pub end: u8,
    pub duration: Duration,
}

impl FadeParams {
    /// Validates all parameters the way the per-step command builder
    /// will, plus the duration, so boundary layers can reject bad input
    /// before spawning anything.
    pub fn validate(&self) -> Result<(), EffectError> {
        if self.duration.is_zero() {
            return Err(EffectError::InvalidArgument(
                "duration must be positive".into(),
            ));
        }
        command::control_lamp(self.master, self.cu, self.lamp_no, self.start)
            .map_err(|e| EffectError::InvalidArgument(e.to_string()))?;
        command::control_lamp(self.master, self.cu, self.lamp_no, self.end)
            .map_err(|e| EffectError::InvalidArgument(e.to_string()))?;
        Ok(())
    }

    /// Brightness at sample `i` of the ramp.
    fn value_at(&self, i: u32) -> u8 {
        let delta = f64::from(self.end) - f64::from(self.start);
        (f64::from(self.start) + delta * f64::from(i) / f64::from(FADE_STEPS)).round() as u8
    }
}

/// Fades one lamp linearly from `start` to `end` over `duration`.
///
/// Each of the 21 samples is sent as a single-lamp dim and acknowledged
/// before the step delay (`duration / 20`) begins; the last sample has no
/// trailing delay. Any step failure aborts the ramp.
pub async fn run_fade(
    client: &AgentClient,
    params: &FadeParams,
    cancel: &CancellationToken,
) -> Result<(), EffectError> {
    params.validate()?;
    let step_delay = params.duration / FADE_STEPS;

    debug!(
        lamp = params.lamp_no,
        start = params.start,
        end = params.end,
        duration_ms = params.duration.as_millis() as u64,
        "fade started"
    );

    for i in 0..=FADE_STEPS {
        if cancel.is_cancelled() {
            return Err(EffectError::Cancelled);
        }

        let value = params.value_at(i);
        let resp = client
            .control_lamp(params.master, params.cu, params.lamp_no, value)
            .await?;
        if !resp.is_ack_ok() {
            return Err(EffectError::Rejected);
        }

        if i < FADE_STEPS {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EffectError::Cancelled),
                _ = tokio::time::sleep(step_delay) => {}
            }
        }
    }

    debug!(lamp = params.lamp_no, "fade completed");
    Ok(())
}
