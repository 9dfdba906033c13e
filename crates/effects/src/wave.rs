//! Sequential per-lamp wave.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use lcs_agent_client::AgentClient;
use lcs_protocol::command;

use crate::EffectError;

/// Default delay between consecutive lamp commands.
pub const DEFAULT_WAVE_INTERVAL: Duration = Duration::from_millis(500);

/// Parameters for a wave across a list of lamps.
#[derive(Debug, Clone)]
pub struct WaveParams {
    pub master: u8,
    pub cu: u8,
    pub lamps: Vec<u8>,
    pub brightness: u8,
    /// Delay between commands; the final lamp has no trailing delay.
    pub interval: Duration,
}

impl WaveParams {
    /// Wave with the default 500 ms interval.
    pub fn new(master: u8, cu: u8, lamps: Vec<u8>, brightness: u8) -> Self {
        Self {
            master,
            cu,
            lamps,
            brightness,
            interval: DEFAULT_WAVE_INTERVAL,
        }
    }

    /// Validates addresses, the lamp list and the brightness.
    pub fn validate(&self) -> Result<(), EffectError> {
        command::block_control(self.master, self.cu, &self.lamps, self.brightness)
            .map(|_| ())
            .map_err(|e| EffectError::InvalidArgument(e.to_string()))
    }
}

/// Dims each lamp in order, waiting `interval` between commands.
///
/// Each dim is acknowledged before its delay starts; a failed step aborts
/// the rest of the sequence.
pub async fn run_wave(
    client: &AgentClient,
    params: &WaveParams,
    cancel: &CancellationToken,
) -> Result<(), EffectError> {
    params.validate()?;

    debug!(
        lamps = params.lamps.len(),
        brightness = params.brightness,
        interval_ms = params.interval.as_millis() as u64,
        "wave started"
    );

    for (idx, &lamp) in params.lamps.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(EffectError::Cancelled);
        }

        let resp = client
            .control_lamp(params.master, params.cu, lamp, params.brightness)
            .await?;
        if !resp.is_ack_ok() {
            return Err(EffectError::Rejected);
        }

        if idx + 1 < params.lamps.len() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EffectError::Cancelled),
                _ = tokio::time::sleep(params.interval) => {}
            }
        }
    }

    debug!("wave completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::spawn_wave;
    use crate::testutil::{connected_client, spawn_recording_agent};

    #[tokio::test]
    async fn wave_visits_lamps_in_order() {
        let agent = spawn_recording_agent().await;
        let client = connected_client(agent.addr).await;

        let mut params = WaveParams::new(1, 2, vec![3, 1, 7], 55);
        params.interval = Duration::from_millis(10);
        run_wave(&client, &params, &CancellationToken::new())
            .await
            .unwrap();

        let dims = agent.dims.lock().unwrap().clone();
        assert_eq!(dims, vec![(3, 55), (1, 55), (7, 55)]);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn cancelled_wave_stops_early() {
        let agent = spawn_recording_agent().await;
        let client = Arc::new(connected_client(agent.addr).await);

        let lamps: Vec<u8> = (1..=20).collect();
        let mut params = WaveParams::new(1, 1, lamps, 40);
        params.interval = Duration::from_secs(30);

        let handle = spawn_wave(client.clone(), params);
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();

        assert!(matches!(handle.join().await, Err(EffectError::Cancelled)));
        let sent = agent.dims.lock().unwrap().len();
        assert!(sent < 20, "cancel must stop the wave early, sent {sent}");
        client.disconnect().await;
    }

    #[test]
    fn default_interval_is_500ms() {
        let params = WaveParams::new(1, 1, vec![1], 10);
        assert_eq!(params.interval, DEFAULT_WAVE_INTERVAL);
    }

    #[test]
    fn validate_rejects_empty_lamp_list() {
        assert!(WaveParams::new(1, 1, Vec::new(), 10).validate().is_err());
        assert!(WaveParams::new(1, 1, vec![1], 101).validate().is_err());
    }
}
