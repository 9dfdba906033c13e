//! Public types for the agent client.

use std::fmt;
use std::time::Duration;

/// Connection state of an agent client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No socket and no reconnect loop running.
    Disconnected,
    /// TCP dial in progress.
    Connecting,
    /// Connected; requests are accepted.
    Connected,
    /// Connection lost; the reconnect loop is backing off.
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    /// The state name as it appears in status snapshots and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting { .. } => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events emitted by a client on its event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    /// The connection state changed. `Connected` and `Disconnected`
    /// transitions arrive through here as well.
    StateChanged(ConnectionState),
}

/// Connection parameters for one agent.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub host: String,
    pub port: u16,
    /// Per-request response deadline.
    pub request_timeout: Duration,
    pub reconnect: ReconnectConfig,
}

impl AgentConfig {
    /// Config with default timeouts for the given endpoint.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            request_timeout: Duration::from_secs(5),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Automatic-reconnection backoff configuration.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Delay before the first reconnection attempt.
    pub initial_delay: Duration,
    /// Backoff cap.
    pub max_delay: Duration,
    /// Multiplier per subsequent attempt.
    pub backoff_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(30),
            backoff_factor: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Delay for a given attempt number (1-based), with ±25% jitter to
    /// avoid reconnect storms when several agents drop at once.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(63) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        let jitter = capped * 0.25;
        let offset = (std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos() as f64
            / u32::MAX as f64)
            * 2.0
            - 1.0; // [-1.0, 1.0)
        let with_jitter = (capped + jitter * offset).max(0.05);
        Duration::from_secs_f64(with_jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(ConnectionState::Connected.as_str(), "connected");
        assert_eq!(
            ConnectionState::Reconnecting { attempt: 3 }.as_str(),
            "reconnecting"
        );
    }

    #[test]
    fn agent_config_defaults() {
        let config = AgentConfig::new("10.0.0.5", 7700);
        assert_eq!(config.host, "10.0.0.5");
        assert_eq!(config.port, 7700);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
    }

    #[test]
    fn reconnect_delay_backoff() {
        let config = ReconnectConfig::default();
        // Base delays: 5s, 10s, 20s, 30s (capped), 30s... within ±25% jitter.
        let expected_base = [5.0, 10.0, 20.0, 30.0, 30.0];
        for (i, &base) in expected_base.iter().enumerate() {
            let delay = config.delay_for_attempt((i + 1) as u32);
            let secs = delay.as_secs_f64();
            let lo = base * 0.74;
            let hi = base * 1.26;
            assert!(
                secs >= lo && secs <= hi,
                "attempt {}: {secs:.3}s not in [{lo:.3}, {hi:.3}]",
                i + 1
            );
        }
    }

    #[test]
    fn reconnect_delay_never_zero() {
        let config = ReconnectConfig {
            initial_delay: Duration::from_millis(0),
            max_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
        };
        assert!(config.delay_for_attempt(1) >= Duration::from_millis(50));
    }
}
