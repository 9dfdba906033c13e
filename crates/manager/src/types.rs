//! Public types for the agent manager.

use serde::Serialize;

use lcs_agent_client::ConnectionState;

/// One agent in a status snapshot.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSummary {
    pub agent_id: String,
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Connection state name: `disconnected`, `connecting`, `connected`
    /// or `reconnecting`.
    pub state: String,
}

/// Snapshot of the registry and every agent's connection state.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionStatus {
    pub total_agents: usize,
    pub connected_agents: usize,
    pub default_agent_id: Option<String>,
    pub agents: Vec<AgentSummary>,
}

/// Parameters of a successful mutating operation, for push broadcasts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "operation", rename_all = "camelCase")]
pub enum ControlOperation {
    #[serde(rename_all = "camelCase")]
    LampControl { lamp_no: u8, brightness: u8 },
    #[serde(rename_all = "camelCase")]
    BlockControl { lamps: Vec<u8>, brightness: u8 },
    #[serde(rename_all = "camelCase")]
    BlockColorTemperature { lamps: Vec<u8>, color_temp: u8 },
    #[serde(rename_all = "camelCase")]
    SceneExecute { scene_no: u8, fade_time: u8 },
    #[serde(rename_all = "camelCase")]
    AllLamps { brightness: u8 },
    #[serde(rename_all = "camelCase")]
    FadeStarted {
        lamp_no: u8,
        start_brightness: u8,
        end_brightness: u8,
        duration_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    WaveStarted {
        lamps: Vec<u8>,
        brightness: u8,
        interval_ms: u64,
    },
}

/// A state change announced after a successful mutating operation.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateChange {
    pub agent_id: String,
    pub master: u8,
    pub cu: u8,
    #[serde(flatten)]
    pub operation: ControlOperation,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
}

/// Events emitted by the manager for the push layer.
#[derive(Debug, Clone)]
pub enum ManagerEvent {
    /// A mutating control operation was acknowledged.
    StateChanged(StateChange),
    /// The registry changed (add/remove/default/reconnect).
    AgentsUpdated(ConnectionStatus),
    /// An agent's connection state transitioned.
    AgentConnection {
        agent_id: String,
        state: ConnectionState,
    },
    /// A background effect ran to completion.
    EffectCompleted {
        agent_id: String,
        effect: &'static str,
        master: u8,
        cu: u8,
    },
    /// A background effect aborted.
    EffectFailed {
        agent_id: String,
        effect: &'static str,
        master: u8,
        cu: u8,
        error: String,
    },
}
