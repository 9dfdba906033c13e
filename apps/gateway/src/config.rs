//! Gateway configuration from environment variables.
//!
//! - `PORT`: REST listener port (default 3000).
//! - `LCS_WS_PORT`: WebSocket push listener port (default `PORT` + 1).
//! - `LCS_HOST` / `LCS_PORT`: when `LCS_HOST` is set, an agent named
//!   `default` is registered at startup against this endpoint
//!   (`LCS_PORT` defaults to 7700).

use tracing::warn;

/// Agent id used for the auto-registered default agent.
pub const DEFAULT_AGENT_ID: &str = "default";

const DEFAULT_HTTP_PORT: u16 = 3000;
const DEFAULT_AGENT_PORT: u16 = 7700;

/// Resolved gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// REST listener port.
    pub http_port: u16,
    /// WebSocket push listener port.
    pub ws_port: u16,
    /// Endpoint of the auto-registered default agent, if configured.
    pub default_agent: Option<AgentEndpoint>,
}

/// Host/port pair of a backend agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentEndpoint {
    pub host: String,
    pub port: u16,
}

impl GatewayConfig {
    /// Reads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads configuration through an arbitrary variable lookup.
    /// Unparsable values fall back to defaults with a warning.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let http_port = parse_port(&get, "PORT").unwrap_or(DEFAULT_HTTP_PORT);
        let ws_port = parse_port(&get, "LCS_WS_PORT").unwrap_or_else(|| http_port.wrapping_add(1));

        let default_agent = get("LCS_HOST")
            .filter(|host| !host.is_empty())
            .map(|host| AgentEndpoint {
                host,
                port: parse_port(&get, "LCS_PORT").unwrap_or(DEFAULT_AGENT_PORT),
            });

        Self {
            http_port,
            ws_port,
            default_agent,
        }
    }
}

fn parse_port(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<u16> {
    let raw = get(key)?;
    match raw.parse::<u16>() {
        Ok(port) => Some(port),
        Err(_) => {
            warn!(%key, value = %raw, "ignoring unparsable port");
            None
        }
    }
}
