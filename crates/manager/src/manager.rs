//! The agent registry and control-plane fan-out.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use lcs_agent_client::{AgentClient, AgentConfig, AgentEvent};
use lcs_effects::{FadeParams, WaveParams, spawn_fade, spawn_wave};
use lcs_protocol::response::TypedResponse;
use lcs_protocol::types::DeviceType;

use crate::error::ManagerError;
use crate::types::{
    AgentSummary, ConnectionStatus, ControlOperation, ManagerEvent, StateChange,
};

const EVENT_QUEUE_DEPTH: usize = 128;

/// Insertion-ordered registry of agents with a default selection.
///
/// The manager is a plain value: construct one per process (or per test)
/// and share it behind an `Arc`. All control traffic from the boundary
/// layers flows through its proxy methods, which resolve the target agent
/// (explicit id, else the default) and forward to its client.
pub struct AgentManager {
    registry: RwLock<Registry>,
    events_tx: mpsc::Sender<ManagerEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<ManagerEvent>>>,
}

#[derive(Default)]
struct Registry {
    /// Insertion order doubles as the default-promotion order.
    agents: Vec<AgentEntry>,
    default_id: Option<String>,
}

struct AgentEntry {
    id: String,
    name: String,
    client: Arc<AgentClient>,
}

impl Registry {
    fn find(&self, id: &str) -> Option<&AgentEntry> {
        self.agents.iter().find(|a| a.id == id)
    }
}

impl Default for AgentManager {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentManager {
    pub fn new() -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        Self {
            registry: RwLock::new(Registry::default()),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<ManagerEvent>> {
        match self.events_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
    }

    // -----------------------------------------------------------------
    // Registry lifecycle
    // -----------------------------------------------------------------

    /// Registers an agent and starts connecting to it in the background.
    /// The first registered agent becomes the default.
    pub async fn add_agent(
        &self,
        id: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        name: Option<String>,
    ) -> Result<(), ManagerError> {
        let id = id.into();
        let host = host.into();

        let client = {
            let mut registry = self.registry.write().await;
            if registry.find(&id).is_some() {
                return Err(ManagerError::DuplicateId(id));
            }

            let client = Arc::new(AgentClient::new(AgentConfig::new(host.clone(), port)));
            self.forward_client_events(&id, &client);

            registry.agents.push(AgentEntry {
                id: id.clone(),
                name: name.unwrap_or_else(|| id.clone()),
                client: Arc::clone(&client),
            });
            if registry.default_id.is_none() {
                registry.default_id = Some(id.clone());
            }
            client
        };

        info!(agent = %id, %host, port, "agent registered");

        // Dial in the background; failures hand over to the client's
        // reconnect loop.
        tokio::spawn(async move {
            let _ = client.connect().await;
        });

        self.emit_agents_updated().await;
        Ok(())
    }

    /// Disconnects and removes an agent. Removing the default promotes
    /// the oldest surviving agent.
    pub async fn remove_agent(&self, id: &str) -> Result<(), ManagerError> {
        let client = {
            let mut registry = self.registry.write().await;
            let index = registry
                .agents
                .iter()
                .position(|a| a.id == id)
                .ok_or_else(|| ManagerError::UnknownAgent(id.into()))?;
            let entry = registry.agents.remove(index);

            if registry.default_id.as_deref() == Some(id) {
                registry.default_id = registry.agents.first().map(|a| a.id.clone());
                debug!(
                    promoted = registry.default_id.as_deref().unwrap_or("<none>"),
                    "default agent removed"
                );
            }
            entry.client
        };

        client.disconnect().await;
        info!(agent = %id, "agent removed");
        self.emit_agents_updated().await;
        Ok(())
    }

    /// Makes an agent the default. Returns `false` for unknown ids.
    pub async fn set_default_agent(&self, id: &str) -> bool {
        let changed = {
            let mut registry = self.registry.write().await;
            if registry.find(id).is_none() {
                return false;
            }
            registry.default_id = Some(id.to_string());
            true
        };
        if changed {
            self.emit_agents_updated().await;
        }
        changed
    }

    /// Current default agent id, if any.
    pub async fn default_agent_id(&self) -> Option<String> {
        self.registry.read().await.default_id.clone()
    }

    /// Forces a fresh connection attempt for an agent.
    pub async fn reconnect_agent(&self, id: &str) -> Result<(), ManagerError> {
        let client = {
            let registry = self.registry.read().await;
            let entry = registry
                .find(id)
                .ok_or_else(|| ManagerError::UnknownAgent(id.into()))?;
            Arc::clone(&entry.client)
        };
        let result = client.reconnect().await;
        self.emit_agents_updated().await;
        result.map_err(ManagerError::from)
    }

    /// Disconnects every agent and empties the registry.
    pub async fn disconnect_all(&self) {
        let drained = {
            let mut registry = self.registry.write().await;
            registry.default_id = None;
            std::mem::take(&mut registry.agents)
        };
        for entry in &drained {
            entry.client.disconnect().await;
        }
        if !drained.is_empty() {
            info!(count = drained.len(), "all agents disconnected");
            self.emit_agents_updated().await;
        }
    }

    /// Snapshot of the registry and per-agent connection states.
    pub async fn connection_status(&self) -> ConnectionStatus {
        let registry = self.registry.read().await;
        let mut agents = Vec::with_capacity(registry.agents.len());
        let mut connected = 0;
        for entry in &registry.agents {
            let state = entry.client.state().await;
            if state == lcs_agent_client::ConnectionState::Connected {
                connected += 1;
            }
            let (host, port) = entry.client.endpoint();
            agents.push(AgentSummary {
                agent_id: entry.id.clone(),
                name: entry.name.clone(),
                host: host.to_string(),
                port,
                state: state.as_str().to_string(),
            });
        }
        ConnectionStatus {
            total_agents: registry.agents.len(),
            connected_agents: connected,
            default_agent_id: registry.default_id.clone(),
            agents,
        }
    }

    // -----------------------------------------------------------------
    // Control proxies
    // -----------------------------------------------------------------

    /// Queries per-lamp brightness on the target agent.
    pub async fn get_lamp_brightness(
        &self,
        agent_id: Option<&str>,
        device_type: DeviceType,
        master: u8,
        cu: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (_, client) = self.resolve(agent_id).await?;
        Ok(client.get_lamp_brightness(device_type, master, cu).await?)
    }

    /// Queries per-lamp color temperature on the target agent.
    pub async fn get_color_temperature(
        &self,
        agent_id: Option<&str>,
        master: u8,
        cu: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (_, client) = self.resolve(agent_id).await?;
        Ok(client.get_color_temperature(master, cu).await?)
    }

    /// Broadcast device-name query on the target agent.
    pub async fn get_device_name(
        &self,
        agent_id: Option<&str>,
    ) -> Result<TypedResponse, ManagerError> {
        let (_, client) = self.resolve(agent_id).await?;
        Ok(client.get_device_name().await?)
    }

    /// Dims a single lamp.
    pub async fn control_lamp(
        &self,
        agent_id: Option<&str>,
        master: u8,
        cu: u8,
        lamp_no: u8,
        brightness: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (id, client) = self.resolve(agent_id).await?;
        let resp = client.control_lamp(master, cu, lamp_no, brightness).await?;
        self.emit_state_change(
            &id,
            master,
            cu,
            ControlOperation::LampControl { lamp_no, brightness },
            &resp,
        );
        Ok(resp)
    }

    /// Sets one brightness across a list of lamps.
    pub async fn block_control(
        &self,
        agent_id: Option<&str>,
        master: u8,
        cu: u8,
        lamps: &[u8],
        brightness: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (id, client) = self.resolve(agent_id).await?;
        let resp = client.block_control(master, cu, lamps, brightness).await?;
        self.emit_state_change(
            &id,
            master,
            cu,
            ControlOperation::BlockControl {
                lamps: lamps.to_vec(),
                brightness,
            },
            &resp,
        );
        Ok(resp)
    }

    /// Sets one color temperature across a list of lamps.
    pub async fn block_color_temperature(
        &self,
        agent_id: Option<&str>,
        master: u8,
        cu: u8,
        lamps: &[u8],
        color_temp: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (id, client) = self.resolve(agent_id).await?;
        let resp = client
            .block_color_temperature(master, cu, lamps, color_temp)
            .await?;
        self.emit_state_change(
            &id,
            master,
            cu,
            ControlOperation::BlockColorTemperature {
                lamps: lamps.to_vec(),
                color_temp,
            },
            &resp,
        );
        Ok(resp)
    }

    /// Recalls a scene preset.
    pub async fn execute_scene(
        &self,
        agent_id: Option<&str>,
        master: u8,
        cu: u8,
        scene_no: u8,
        fade_time: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (id, client) = self.resolve(agent_id).await?;
        let resp = client.execute_scene(master, cu, scene_no, fade_time).await?;
        self.emit_state_change(
            &id,
            master,
            cu,
            ControlOperation::SceneExecute { scene_no, fade_time },
            &resp,
        );
        Ok(resp)
    }

    /// Sets every lamp on a CU to one brightness.
    pub async fn control_all_lamps(
        &self,
        agent_id: Option<&str>,
        master: u8,
        cu: u8,
        brightness: u8,
    ) -> Result<TypedResponse, ManagerError> {
        let (id, client) = self.resolve(agent_id).await?;
        let resp = client.control_all_lamps(master, cu, brightness).await?;
        self.emit_state_change(
            &id,
            master,
            cu,
            ControlOperation::AllLamps { brightness },
            &resp,
        );
        Ok(resp)
    }

    // -----------------------------------------------------------------
    // Effects
    // -----------------------------------------------------------------

    /// Validates and starts a background fade. Returns as soon as the
    /// effect is spawned; completion arrives as a manager event.
    pub async fn start_fade(
        &self,
        agent_id: Option<&str>,
        params: FadeParams,
    ) -> Result<(), ManagerError> {
        params.validate()?;
        let (id, client) = self.resolve(agent_id).await?;

        self.try_emit(ManagerEvent::StateChanged(StateChange {
            agent_id: id.clone(),
            master: params.master,
            cu: params.cu,
            operation: ControlOperation::FadeStarted {
                lamp_no: params.lamp_no,
                start_brightness: params.start,
                end_brightness: params.end,
                duration_ms: params.duration.as_millis() as u64,
            },
            timestamp: now_millis(),
        }));

        let (master, cu) = (params.master, params.cu);
        let handle = spawn_fade(client, params);
        self.watch_effect("fade", id, master, cu, handle);
        Ok(())
    }

    /// Validates and starts a background wave.
    pub async fn start_wave(
        &self,
        agent_id: Option<&str>,
        params: WaveParams,
    ) -> Result<(), ManagerError> {
        params.validate()?;
        let (id, client) = self.resolve(agent_id).await?;

        self.try_emit(ManagerEvent::StateChanged(StateChange {
            agent_id: id.clone(),
            master: params.master,
            cu: params.cu,
            operation: ControlOperation::WaveStarted {
                lamps: params.lamps.clone(),
                brightness: params.brightness,
                interval_ms: params.interval.as_millis() as u64,
            },
            timestamp: now_millis(),
        }));

        let (master, cu) = (params.master, params.cu);
        let handle = spawn_wave(client, params);
        self.watch_effect("wave", id, master, cu, handle);
        Ok(())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    /// Resolves a target agent: explicit id, else the default.
    async fn resolve(
        &self,
        agent_id: Option<&str>,
    ) -> Result<(String, Arc<AgentClient>), ManagerError> {
        let registry = self.registry.read().await;
        let id = match agent_id {
            Some(id) => id,
            None => registry.default_id.as_deref().ok_or_else(|| {
                ManagerError::UnknownAgent("no default agent registered".into())
            })?,
        };
        let entry = registry
            .find(id)
            .ok_or_else(|| ManagerError::UnknownAgent(id.into()))?;
        Ok((entry.id.clone(), Arc::clone(&entry.client)))
    }

    /// Forwards a client's connection events into the manager stream.
    fn forward_client_events(&self, id: &str, client: &Arc<AgentClient>) {
        let Some(mut events) = client.take_events() else {
            return;
        };
        let agent_id = id.to_string();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            while let Some(AgentEvent::StateChanged(state)) = events.recv().await {
                let event = ManagerEvent::AgentConnection {
                    agent_id: agent_id.clone(),
                    state,
                };
                if events_tx.try_send(event).is_err() {
                    // Receiver gone or saturated; either way keep draining
                    // so the client never blocks on us.
                    debug!(agent = %agent_id, "dropped connection event");
                }
            }
        });
    }

    fn watch_effect(
        &self,
        effect: &'static str,
        agent_id: String,
        master: u8,
        cu: u8,
        handle: lcs_effects::EffectHandle,
    ) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let event = match handle.join().await {
                Ok(()) => {
                    info!(agent = %agent_id, effect, "effect completed");
                    ManagerEvent::EffectCompleted {
                        agent_id,
                        effect,
                        master,
                        cu,
                    }
                }
                Err(e) => {
                    warn!(agent = %agent_id, effect, "effect failed: {e}");
                    ManagerEvent::EffectFailed {
                        agent_id,
                        effect,
                        master,
                        cu,
                        error: e.to_string(),
                    }
                }
            };
            let _ = events_tx.try_send(event);
        });
    }

    /// Emits a state change for an acknowledged mutating operation.
    fn emit_state_change(
        &self,
        agent_id: &str,
        master: u8,
        cu: u8,
        operation: ControlOperation,
        resp: &TypedResponse,
    ) {
        if !resp.is_ack_ok() {
            debug!(agent = %agent_id, "suppressing state change: agent did not ack");
            return;
        }
        self.try_emit(ManagerEvent::StateChanged(StateChange {
            agent_id: agent_id.to_string(),
            master,
            cu,
            operation,
            timestamp: now_millis(),
        }));
    }

    async fn emit_agents_updated(&self) {
        let status = self.connection_status().await;
        self.try_emit(ManagerEvent::AgentsUpdated(status));
    }

    fn try_emit(&self, event: ManagerEvent) {
        if self.events_tx.try_send(event).is_err() {
            debug!("manager event dropped (no consumer or queue full)");
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
