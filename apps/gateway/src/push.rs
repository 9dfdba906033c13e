//! WebSocket push surface.
//!
//! Bidirectional: clients send control envelopes and receive exactly one
//! `<type>_response` each, while every connected client also receives
//! unsolicited broadcasts: `state_changed` after each acknowledged
//! mutating operation, `agents_updated` on registry changes,
//! `agent_connection` on lifecycle transitions and
//! `effect_completed` / `effect_failed` from background effects.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lcs_agent_manager::{AgentManager, ManagerError, ManagerEvent};
use lcs_effects::{FadeParams, WaveParams};
use lcs_protocol::types::DeviceType;

use crate::envelope::Envelope;
use crate::messages::{
    AckPayload, PushAllLampsRequest, PushBlockColorTempRequest, PushBlockControlRequest,
    PushControlLampRequest, PushDeviceInfoRequest, PushFadeRequest, PushQueryRequest,
    PushSceneRequest, PushWaveRequest, StartedPayload, device_info_payload, levels_payload,
};

const BROADCAST_DEPTH: usize = 256;

/// WebSocket push server over a shared manager.
pub struct PushServer {
    manager: Arc<AgentManager>,
    broadcast_tx: broadcast::Sender<String>,
    cancel: CancellationToken,
}

impl PushServer {
    pub fn new(manager: Arc<AgentManager>, cancel: CancellationToken) -> Arc<Self> {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_DEPTH);
        Arc::new(Self {
            manager,
            broadcast_tx,
            cancel,
        })
    }

    /// Sender used by the event pump; messages fan out to every client.
    pub fn broadcast_sender(&self) -> broadcast::Sender<String> {
        self.broadcast_tx.clone()
    }

    /// Accepts WebSocket connections until cancellation.
    pub async fn run(self: Arc<Self>, listener: TcpListener) -> std::io::Result<()> {
        let local_addr = listener.local_addr()?;
        info!("push server listening on {local_addr}");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("push server shutting down");
                    break Ok(());
                }

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let server = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = server.handle_connection(stream).await {
                                    debug!(%peer_addr, "push connection ended: {e}");
                                }
                            });
                        }
                        Err(e) => warn!("accept error: {e}"),
                    }
                }
            }
        }
    }

    /// Serves one client: dispatches its requests and relays broadcasts.
    async fn handle_connection(&self, stream: TcpStream) -> Result<(), tungstenite::Error> {
        let ws = tokio_tungstenite::accept_async(stream).await?;
        let (mut write, mut read) = ws.split();
        let mut broadcast_rx = self.broadcast_tx.subscribe();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    break;
                }

                event = broadcast_rx.recv() => {
                    match event {
                        Ok(json) => {
                            write.send(tungstenite::Message::Text(json.into())).await?;
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(skipped, "push client lagging, events skipped");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }

                incoming = read.next() => {
                    match incoming {
                        Some(Ok(tungstenite::Message::Text(text))) => {
                            let reply = self.handle_request(&text).await;
                            match serde_json::to_string(&reply) {
                                Ok(json) => {
                                    write.send(tungstenite::Message::Text(json.into())).await?;
                                }
                                Err(e) => warn!("failed to serialize reply: {e}"),
                            }
                        }
                        Some(Ok(tungstenite::Message::Ping(data))) => {
                            write.send(tungstenite::Message::Pong(data)).await?;
                        }
                        Some(Ok(tungstenite::Message::Close(_))) | None => break,
                        Some(Ok(_)) => {} // Binary / Pong: ignore
                        Some(Err(e)) => {
                            debug!("push read error: {e}");
                            break;
                        }
                    }
                }
            }
        }

        Ok(())
    }

    /// Parses and dispatches one request, always producing a reply.
    async fn handle_request(&self, text: &str) -> Envelope {
        let request: Envelope = match serde_json::from_str(text) {
            Ok(r) => r,
            Err(e) => {
                return Envelope {
                    event: "error".into(),
                    payload: None,
                    error: Some(crate::envelope::PushError {
                        code: 400,
                        message: format!("malformed envelope: {e}"),
                    }),
                };
            }
        };

        match self.dispatch(&request).await {
            Ok(reply) => reply,
            Err((code, message)) => request.reply_error(code, message),
        }
    }

    async fn dispatch(&self, req: &Envelope) -> Result<Envelope, (i32, String)> {
        let manager = &self.manager;
        match req.event.as_str() {
            "get_status" => {
                let status = manager.connection_status().await;
                req.reply(Some(&status)).map_err(internal)
            }

            "get_lamp_brightness" => {
                let p: PushQueryRequest = payload(req)?;
                let resp = manager
                    .get_lamp_brightness(
                        p.target.agent_id.as_deref(),
                        p.device_type.unwrap_or(DeviceType::Lcs),
                        p.target.master,
                        p.target.cu,
                    )
                    .await
                    .map_err(manager_failure)?;
                let body = levels_payload(&resp).ok_or_else(unexpected_response)?;
                req.reply(Some(&body)).map_err(internal)
            }

            "get_color_temperature" => {
                let p: PushQueryRequest = payload(req)?;
                let resp = manager
                    .get_color_temperature(p.target.agent_id.as_deref(), p.target.master, p.target.cu)
                    .await
                    .map_err(manager_failure)?;
                let body = levels_payload(&resp).ok_or_else(unexpected_response)?;
                req.reply(Some(&body)).map_err(internal)
            }

            "get_device_info" => {
                let p: PushDeviceInfoRequest = optional_payload(req)?;
                let resp = manager
                    .get_device_name(p.agent_id.as_deref())
                    .await
                    .map_err(manager_failure)?;
                let body = device_info_payload(&resp).ok_or_else(unexpected_response)?;
                req.reply(Some(&body)).map_err(internal)
            }

            "control_lamp" => {
                let p: PushControlLampRequest = payload(req)?;
                manager
                    .control_lamp(
                        p.target.agent_id.as_deref(),
                        p.target.master,
                        p.target.cu,
                        p.lamp_no,
                        p.brightness,
                    )
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&AckPayload::ok())).map_err(internal)
            }

            "block_control" => {
                let p: PushBlockControlRequest = payload(req)?;
                manager
                    .block_control(
                        p.target.agent_id.as_deref(),
                        p.target.master,
                        p.target.cu,
                        &p.lamp_list,
                        p.brightness,
                    )
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&AckPayload::ok())).map_err(internal)
            }

            "block_color_temperature" => {
                let p: PushBlockColorTempRequest = payload(req)?;
                manager
                    .block_color_temperature(
                        p.target.agent_id.as_deref(),
                        p.target.master,
                        p.target.cu,
                        &p.lamp_list,
                        p.color_temp,
                    )
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&AckPayload::ok())).map_err(internal)
            }

            "execute_scene" => {
                let p: PushSceneRequest = payload(req)?;
                manager
                    .execute_scene(
                        p.target.agent_id.as_deref(),
                        p.target.master,
                        p.target.cu,
                        p.scene_no,
                        p.fade_time,
                    )
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&AckPayload::ok())).map_err(internal)
            }

            "control_all_lamps" => {
                let p: PushAllLampsRequest = payload(req)?;
                manager
                    .control_all_lamps(
                        p.target.agent_id.as_deref(),
                        p.target.master,
                        p.target.cu,
                        p.brightness,
                    )
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&AckPayload::ok())).map_err(internal)
            }

            "start_fade" => {
                let p: PushFadeRequest = payload(req)?;
                if !p.duration.is_finite() || p.duration <= 0.0 {
                    return Err((400, "duration must be a positive number".into()));
                }
                let params = FadeParams {
                    master: p.target.master,
                    cu: p.target.cu,
                    lamp_no: p.lamp_no,
                    start: p.start_brightness,
                    end: p.end_brightness,
                    duration: Duration::from_secs_f64(p.duration),
                };
                manager
                    .start_fade(p.target.agent_id.as_deref(), params)
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&StartedPayload::started())).map_err(internal)
            }

            "start_wave" => {
                let p: PushWaveRequest = payload(req)?;
                let params = WaveParams {
                    master: p.target.master,
                    cu: p.target.cu,
                    lamps: p.lamp_list,
                    brightness: p.brightness,
                    interval: Duration::from_millis(p.interval),
                };
                manager
                    .start_wave(p.target.agent_id.as_deref(), params)
                    .await
                    .map_err(manager_failure)?;
                req.reply(Some(&StartedPayload::started())).map_err(internal)
            }

            other => Err((404, format!("unknown event type {other:?}"))),
        }
    }
}

/// Pumps manager events into the broadcast stream.
pub async fn forward_events(
    mut events: mpsc::Receiver<ManagerEvent>,
    broadcast_tx: broadcast::Sender<String>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => {
                match event {
                    Some(event) => {
                        if let Some(json) = broadcast_message(&event) {
                            // No receivers is fine: nobody is subscribed.
                            let _ = broadcast_tx.send(json);
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

/// Serializes a manager event into its broadcast envelope.
pub fn broadcast_message(event: &ManagerEvent) -> Option<String> {
    let envelope = match event {
        ManagerEvent::StateChanged(change) => Envelope::new("state_changed", Some(change)),
        ManagerEvent::AgentsUpdated(status) => Envelope::new("agents_updated", Some(status)),
        ManagerEvent::AgentConnection { agent_id, state } => Envelope::new(
            "agent_connection",
            Some(&serde_json::json!({
                "agentId": agent_id,
                "state": state.as_str(),
            })),
        ),
        ManagerEvent::EffectCompleted {
            agent_id,
            effect,
            master,
            cu,
        } => Envelope::new(
            "effect_completed",
            Some(&serde_json::json!({
                "agentId": agent_id,
                "effect": effect,
                "master": master,
                "cu": cu,
            })),
        ),
        ManagerEvent::EffectFailed {
            agent_id,
            effect,
            master,
            cu,
            error,
        } => Envelope::new(
            "effect_failed",
            Some(&serde_json::json!({
                "agentId": agent_id,
                "effect": effect,
                "master": master,
                "cu": cu,
                "error": error,
            })),
        ),
    };

    match envelope.and_then(|e| serde_json::to_string(&e)) {
        Ok(json) => Some(json),
        Err(e) => {
            warn!("failed to serialize broadcast: {e}");
            None
        }
    }
}

fn payload<T: DeserializeOwned>(req: &Envelope) -> Result<T, (i32, String)> {
    req.parse_payload::<T>()
        .map_err(|e| (400, format!("invalid payload: {e}")))?
        .ok_or_else(|| (400, "missing payload".into()))
}

/// Like [`payload`] but tolerates an absent payload for requests whose
/// fields are all optional.
fn optional_payload<T: DeserializeOwned + Default>(req: &Envelope) -> Result<T, (i32, String)> {
    Ok(req
        .parse_payload::<T>()
        .map_err(|e| (400, format!("invalid payload: {e}")))?
        .unwrap_or_default())
}

fn manager_failure(err: ManagerError) -> (i32, String) {
    let code = if err.is_invalid_argument() {
        400
    } else {
        match &err {
            ManagerError::DuplicateId(_) => 409,
            ManagerError::UnknownAgent(_) => 404,
            _ => 500,
        }
    };
    (code, err.to_string())
}

fn internal(err: serde_json::Error) -> (i32, String) {
    (500, err.to_string())
}

fn unexpected_response() -> (i32, String) {
    (500, "unexpected response from agent".into())
}
