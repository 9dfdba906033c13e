//! The per-agent TCP client.
//!
//! One [`AgentClient`] owns one socket to one backend agent. All requests
//! funnel through the connection's dispatch lane (see
//! [`pumps::dispatch`](crate::pumps::dispatch)); connection loss hands
//! control to the reconnect loop, which installs a fresh connection when
//! the agent comes back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::net::TcpStream;
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lcs_protocol::command;
use lcs_protocol::frame::Frame;
use lcs_protocol::response::TypedResponse;
use lcs_protocol::types::DeviceType;

use crate::error::ClientError;
use crate::pumps::dispatch::{Pending, dispatch_loop};
use crate::pumps::read::read_pump;
use crate::reconnection::reconnect_loop;
use crate::types::{AgentConfig, AgentEvent, ConnectionState};

/// Sends block until the lane drains below this depth; with one request
/// on the wire at a time this is ample headroom.
const REQUEST_QUEUE_DEPTH: usize = 32;
const FRAME_QUEUE_DEPTH: usize = 32;
const EVENT_QUEUE_DEPTH: usize = 64;

/// Client for a single LCS agent.
pub struct AgentClient {
    shared: Arc<Shared>,
}

/// State shared between the client handle, the pumps and the reconnect
/// loop.
pub(crate) struct Shared {
    pub(crate) config: AgentConfig,
    state: RwLock<ConnectionState>,
    events_tx: mpsc::Sender<AgentEvent>,
    events_rx: StdMutex<Option<mpsc::Receiver<AgentEvent>>>,
    conn: StdMutex<Option<Conn>>,
    conn_gen: AtomicU64,
    reconnect_cancel: StdMutex<Option<CancellationToken>>,
}

/// Handle to one live connection's lane.
struct Conn {
    generation: u64,
    request_tx: mpsc::Sender<Pending>,
    cancel: CancellationToken,
}

impl AgentClient {
    /// Creates a client for the given endpoint. No connection is made
    /// until [`connect`](Self::connect).
    pub fn new(config: AgentConfig) -> Self {
        Self {
            shared: Shared::new(config),
        }
    }

    /// The endpoint this client dials.
    pub fn endpoint(&self) -> (&str, u16) {
        (&self.shared.config.host, self.shared.config.port)
    }

    /// Current connection state.
    pub async fn state(&self) -> ConnectionState {
        self.shared.state().await
    }

    /// Takes the event receiver. Can only be called once.
    pub fn take_events(&self) -> Option<mpsc::Receiver<AgentEvent>> {
        match self.shared.events_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        }
    }

    /// Dials the agent. On success the client is `Connected`; on failure
    /// the reconnect loop takes over and the dial error is returned.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self.shared.state().await == ConnectionState::Connected {
            return Ok(());
        }
        self.shared.cancel_reconnect();
        self.shared.set_state(ConnectionState::Connecting).await;

        match self.shared.dial().await {
            Ok(stream) => {
                self.shared.install_connection(stream).await;
                Ok(())
            }
            Err(e) => {
                warn!(
                    host = %self.shared.config.host,
                    port = self.shared.config.port,
                    "connect failed: {e}"
                );
                self.shared.spawn_reconnect();
                Err(ClientError::Io(e))
            }
        }
    }

    /// Drops the connection and stops reconnecting. Pending requests fail
    /// with [`ClientError::Cancelled`]. Idempotent.
    pub async fn disconnect(&self) {
        self.shared.cancel_reconnect();
        let conn = match self.shared.conn.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(conn) = conn {
            conn.cancel.cancel();
            debug!("connection dropped by disconnect");
        }
        self.shared.set_state(ConnectionState::Disconnected).await;
    }

    /// Forces a fresh connection attempt, dropping any current socket.
    pub async fn reconnect(&self) -> Result<(), ClientError> {
        self.disconnect().await;
        self.connect().await
    }

    /// Sends one frame and awaits its interpreted response.
    ///
    /// This is the single send primitive: every command wrapper ends up
    /// here. Fails immediately with [`ClientError::NotConnected`] when no
    /// connection is up (including during reconnect windows).
    pub async fn send(&self, frame: Frame) -> Result<TypedResponse, ClientError> {
        let request_tx = self
            .shared
            .request_sender()
            .ok_or(ClientError::NotConnected)?;

        let (resolve, response) = oneshot::channel();
        request_tx
            .send(Pending { frame, resolve })
            .await
            .map_err(|_| ClientError::NotConnected)?;

        // A dropped resolver means the lane died before answering.
        response.await.map_err(|_| ClientError::ConnectionLost)?
    }

    /// Queries per-lamp brightness levels.
    pub async fn get_lamp_brightness(
        &self,
        device_type: DeviceType,
        master: u8,
        cu: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::get_lamp_brightness(device_type, master, cu)?)
            .await
    }

    /// Queries per-lamp color-temperature levels.
    pub async fn get_color_temperature(
        &self,
        master: u8,
        cu: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::get_color_temperature(master, cu)?).await
    }

    /// Dims a single lamp.
    pub async fn control_lamp(
        &self,
        master: u8,
        cu: u8,
        lamp_no: u8,
        brightness: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::control_lamp(master, cu, lamp_no, brightness)?)
            .await
    }

    /// Sets one brightness across a list of lamps.
    pub async fn block_control(
        &self,
        master: u8,
        cu: u8,
        lamps: &[u8],
        brightness: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::block_control(master, cu, lamps, brightness)?)
            .await
    }

    /// Sets one color temperature across a list of lamps.
    pub async fn block_color_temperature(
        &self,
        master: u8,
        cu: u8,
        lamps: &[u8],
        color_temp: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::block_color_temperature(master, cu, lamps, color_temp)?)
            .await
    }

    /// Recalls a scene preset.
    pub async fn execute_scene(
        &self,
        master: u8,
        cu: u8,
        scene_no: u8,
        fade_time: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::execute_scene(master, cu, scene_no, fade_time)?)
            .await
    }

    /// Sets every lamp on a CU to one brightness.
    pub async fn control_all_lamps(
        &self,
        master: u8,
        cu: u8,
        brightness: u8,
    ) -> Result<TypedResponse, ClientError> {
        self.send(command::control_all_lamps(master, cu, brightness)?)
            .await
    }

    /// Broadcast device-name query.
    pub async fn get_device_name(&self) -> Result<TypedResponse, ClientError> {
        self.send(command::get_device_name()).await
    }
}

impl Drop for AgentClient {
    fn drop(&mut self) {
        self.shared.cancel_reconnect();
        if let Ok(mut guard) = self.shared.conn.lock()
            && let Some(conn) = guard.take()
        {
            conn.cancel.cancel();
        }
    }
}

impl Shared {
    pub(crate) fn new(config: AgentConfig) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        Arc::new(Self {
            config,
            state: RwLock::new(ConnectionState::Disconnected),
            events_tx,
            events_rx: StdMutex::new(Some(events_rx)),
            conn: StdMutex::new(None),
            conn_gen: AtomicU64::new(0),
            reconnect_cancel: StdMutex::new(None),
        })
    }

    pub(crate) async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Updates the state and emits a change event. No-op when unchanged.
    pub(crate) async fn set_state(&self, new_state: ConnectionState) {
        {
            let mut state = self.state.write().await;
            if *state == new_state {
                return;
            }
            *state = new_state;
        }
        match self.events_tx.try_send(AgentEvent::StateChanged(new_state)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("event channel full, dropping state change")
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {}
        }
    }

    pub(crate) async fn dial(&self) -> std::io::Result<TcpStream> {
        TcpStream::connect((self.config.host.as_str(), self.config.port)).await
    }

    /// Wires a fresh socket: spawns the read pump and the dispatch lane,
    /// publishes the connection and moves to `Connected`.
    pub(crate) async fn install_connection(self: &Arc<Self>, stream: TcpStream) {
        let generation = self.conn_gen.fetch_add(1, Ordering::Relaxed) + 1;
        let (read_half, write_half) = stream.into_split();

        let cancel = CancellationToken::new();
        let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE_DEPTH);
        let (frames_tx, frames_rx) = mpsc::channel(FRAME_QUEUE_DEPTH);

        tokio::spawn(read_pump(read_half, frames_tx, cancel.clone()));
        tokio::spawn(dispatch_loop(
            Arc::clone(self),
            generation,
            write_half,
            request_rx,
            frames_rx,
            cancel.clone(),
        ));

        if let Ok(mut guard) = self.conn.lock() {
            *guard = Some(Conn {
                generation,
                request_tx,
                cancel,
            });
        }

        self.set_state(ConnectionState::Connected).await;
        info!(
            host = %self.config.host,
            port = self.config.port,
            "agent connected"
        );
    }

    /// Called by the dispatch loop when its connection ends. `lost` is
    /// false for disconnect()/shutdown, true for transport death.
    pub(crate) async fn on_conn_closed(self: &Arc<Self>, generation: u64, lost: bool) {
        let ours = match self.conn.lock() {
            Ok(mut guard) => {
                let ours = guard
                    .as_ref()
                    .is_some_and(|c| c.generation == generation);
                if ours {
                    *guard = None;
                }
                ours
            }
            Err(_) => false,
        };
        if !ours {
            return;
        }

        if lost {
            warn!(
                host = %self.config.host,
                port = self.config.port,
                "connection lost"
            );
            self.spawn_reconnect();
        } else {
            self.set_state(ConnectionState::Disconnected).await;
        }
    }

    /// Starts the reconnect loop unless one is already running.
    pub(crate) fn spawn_reconnect(self: &Arc<Self>) {
        if let Ok(mut guard) = self.reconnect_cancel.lock() {
            if guard.as_ref().is_some_and(|t| !t.is_cancelled()) {
                return;
            }
            let token = CancellationToken::new();
            *guard = Some(token.clone());
            tokio::spawn(reconnect_loop(Arc::clone(self), token));
        }
    }

    /// Cancels any active reconnect loop.
    pub(crate) fn cancel_reconnect(&self) {
        if let Ok(mut guard) = self.reconnect_cancel.lock()
            && let Some(token) = guard.take()
        {
            token.cancel();
        }
    }

    /// Clears the stored reconnect token after a loop exits on its own.
    pub(crate) fn clear_reconnect(&self) {
        if let Ok(mut guard) = self.reconnect_cancel.lock() {
            *guard = None;
        }
    }

    /// The live lane's request sender, if a connection is up.
    pub(crate) fn request_sender(&self) -> Option<mpsc::Sender<Pending>> {
        match self.conn.lock() {
            Ok(guard) => guard
                .as_ref()
                .filter(|c| !c.cancel.is_cancelled())
                .map(|c| c.request_tx.clone()),
            Err(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use lcs_protocol::ResponseKind;
    use lcs_protocol::frame::{DecodeResult, try_decode};

    /// Mock agent: accepts one connection and answers every decoded frame
    /// with a control ack.
    async fn spawn_ack_agent() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 256];
            loop {
                let n = match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                buf.extend_from_slice(&chunk[..n]);
                let mut offset = 0;
                while let DecodeResult::Frame(frame, consumed) = try_decode(&buf[offset..]) {
                    offset += consumed;
                    let reply = Frame {
                        dest: frame.src,
                        src: frame.dest,
                        op1: 0x10,
                        op2: 0x00,
                        data: vec![0x00],
                    };
                    if stream.write_all(&reply.encode()).await.is_err() {
                        return;
                    }
                }
                buf.drain(..offset);
            }
        });
        addr
    }

    #[tokio::test]
    async fn send_without_connection_fails_fast() {
        let client = AgentClient::new(AgentConfig::new("127.0.0.1", 1));
        let result = client.control_lamp(1, 1, 5, 80).await;
        assert!(matches!(result, Err(ClientError::NotConnected)));
    }

    #[tokio::test]
    async fn invalid_argument_fails_before_send() {
        let client = AgentClient::new(AgentConfig::new("127.0.0.1", 1));
        // Out-of-range brightness must fail validation, not NotConnected.
        let result = client.control_lamp(1, 1, 5, 120).await;
        assert!(matches!(result, Err(ClientError::Protocol(_))));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let client = AgentClient::new(AgentConfig::new("127.0.0.1", 1));
        client.disconnect().await;
        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_and_control_roundtrip() {
        let addr = spawn_ack_agent().await;
        let client = AgentClient::new(AgentConfig::new(addr.ip().to_string(), addr.port()));

        client.connect().await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Connected);

        let resp = client.control_lamp(1, 1, 5, 80).await.unwrap();
        assert!(matches!(resp.kind, ResponseKind::LampControlAck { ok: true }));

        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn connect_twice_is_noop() {
        let addr = spawn_ack_agent().await;
        let client = AgentClient::new(AgentConfig::new(addr.ip().to_string(), addr.port()));
        client.connect().await.unwrap();
        client.connect().await.unwrap();
        assert_eq!(client.state().await, ConnectionState::Connected);
        client.disconnect().await;
    }

    #[tokio::test]
    async fn silent_agent_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the socket open without ever replying.
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });

        let mut config = AgentConfig::new(addr.ip().to_string(), addr.port());
        config.request_timeout = Duration::from_millis(50);
        let client = AgentClient::new(config);

        client.connect().await.unwrap();
        let result = client.get_device_name().await;
        assert!(matches!(result, Err(ClientError::Timeout)));
        client.disconnect().await;
    }

    #[tokio::test]
    async fn failed_dial_schedules_reconnect() {
        // Nothing listens on this port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = AgentClient::new(AgentConfig::new(addr.ip().to_string(), addr.port()));
        assert!(client.connect().await.is_err());

        // The reconnect loop announces itself before its first backoff.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(matches!(
            client.state().await,
            ConnectionState::Reconnecting { .. }
        ));

        client.disconnect().await;
        assert_eq!(client.state().await, ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn events_report_lifecycle() {
        let addr = spawn_ack_agent().await;
        let client = AgentClient::new(AgentConfig::new(addr.ip().to_string(), addr.port()));
        let mut events = client.take_events().expect("events available once");
        assert!(client.take_events().is_none());

        client.connect().await.unwrap();
        client.disconnect().await;

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            let AgentEvent::StateChanged(state) = event;
            seen.push(state);
        }
        assert!(seen.contains(&ConnectionState::Connected));
        assert_eq!(seen.last(), Some(&ConnectionState::Disconnected));
    }
}
