//! REST shell over the agent manager.
//!
//! Thin by design: every handler resolves parameters, calls one manager
//! proxy and shapes the payload. Validation failures map to 400, unknown
//! agents to 404, duplicate registrations to 409 and transport failures
//! to 500 with `{"success": false, "error": ...}`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};

use lcs_agent_manager::{AgentManager, ConnectionStatus, ManagerError};
use lcs_effects::{FadeParams, WaveParams};
use lcs_protocol::response::TypedResponse;
use lcs_protocol::types::DeviceType;

use crate::messages::{
    AckPayload, AddAgentBody, AgentQuery, BlockColorTempBody, BlockControlBody, BrightnessBody,
    DeviceInfoPayload, ErrorBody, FadeBody, LevelsPayload, SceneBody, StartedPayload, WaveBody,
    device_info_payload, levels_payload,
};

/// Builds the REST router over a shared manager.
pub fn router(manager: Arc<AgentManager>) -> Router {
    Router::new()
        .route("/lcs/status", get(get_status))
        .route("/lcs/device-info", get(get_device_info))
        .route("/lcs/lamps/{master}/{cu}/brightness", get(get_brightness))
        .route(
            "/lcs/lamps/{master}/{cu}/color-temperature",
            get(get_color_temperature).post(post_block_color_temperature),
        )
        .route("/lcs/lamps/{master}/{cu}/{lamp_no}/control", post(post_control))
        .route("/lcs/lamps/{master}/{cu}/block-control", post(post_block_control))
        .route("/lcs/lamps/{master}/{cu}/all", post(post_all_lamps))
        .route("/lcs/lamps/{master}/{cu}/{lamp_no}/fade", post(post_fade))
        .route("/lcs/lamps/{master}/{cu}/wave", post(post_wave))
        .route("/lcs/scenes/{master}/{cu}/{scene_no}/execute", post(post_scene))
        .route("/lcs/agents", get(get_agents).post(post_agent))
        .route("/lcs/agents/{agent_id}", delete(delete_agent))
        .route("/lcs/agents/{agent_id}/default", post(post_default_agent))
        .route("/lcs/agents/{agent_id}/reconnect", post(post_reconnect_agent))
        .with_state(manager)
}

/// REST error: status code plus `{"success": false, "error": msg}`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<ManagerError> for ApiError {
    fn from(err: ManagerError) -> Self {
        let status = if err.is_invalid_argument() {
            StatusCode::BAD_REQUEST
        } else {
            match &err {
                ManagerError::DuplicateId(_) => StatusCode::CONFLICT,
                ManagerError::UnknownAgent(_) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody::new(self.message))).into_response()
    }
}

/// A mutating call must come back as a successful ack.
fn ensure_ack(resp: &TypedResponse) -> Result<(), ApiError> {
    if resp.is_ack_ok() {
        Ok(())
    } else {
        Err(ApiError::internal("agent rejected the command"))
    }
}

fn fade_duration(secs: f64) -> Result<Duration, ApiError> {
    if !secs.is_finite() || secs <= 0.0 {
        return Err(ApiError::bad_request("duration must be a positive number"));
    }
    Ok(Duration::from_secs_f64(secs))
}

// ---------------------------------------------------------------------------
// Status & queries
// ---------------------------------------------------------------------------

async fn get_status(State(manager): State<Arc<AgentManager>>) -> Json<ConnectionStatus> {
    Json(manager.connection_status().await)
}

async fn get_agents(State(manager): State<Arc<AgentManager>>) -> Json<ConnectionStatus> {
    Json(manager.connection_status().await)
}

async fn get_brightness(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu)): Path<(u8, u8)>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<LevelsPayload>, ApiError> {
    let device_type = query.device_type.unwrap_or(DeviceType::Lcs);
    let resp = manager
        .get_lamp_brightness(query.agent_id.as_deref(), device_type, master, cu)
        .await?;
    levels_payload(&resp)
        .map(Json)
        .ok_or_else(|| ApiError::internal("unexpected response from agent"))
}

async fn get_color_temperature(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu)): Path<(u8, u8)>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<LevelsPayload>, ApiError> {
    let resp = manager
        .get_color_temperature(query.agent_id.as_deref(), master, cu)
        .await?;
    levels_payload(&resp)
        .map(Json)
        .ok_or_else(|| ApiError::internal("unexpected response from agent"))
}

async fn get_device_info(
    State(manager): State<Arc<AgentManager>>,
    Query(query): Query<AgentQuery>,
) -> Result<Json<DeviceInfoPayload>, ApiError> {
    let resp = manager.get_device_name(query.agent_id.as_deref()).await?;
    device_info_payload(&resp)
        .map(Json)
        .ok_or_else(|| ApiError::internal("unexpected response from agent"))
}

// ---------------------------------------------------------------------------
// Control
// ---------------------------------------------------------------------------

async fn post_control(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu, lamp_no)): Path<(u8, u8, u8)>,
    Query(query): Query<AgentQuery>,
    Json(body): Json<BrightnessBody>,
) -> Result<Json<AckPayload>, ApiError> {
    let resp = manager
        .control_lamp(query.agent_id.as_deref(), master, cu, lamp_no, body.brightness)
        .await?;
    ensure_ack(&resp)?;
    Ok(Json(AckPayload::ok()))
}

async fn post_block_control(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu)): Path<(u8, u8)>,
    Query(query): Query<AgentQuery>,
    Json(body): Json<BlockControlBody>,
) -> Result<Json<AckPayload>, ApiError> {
    let resp = manager
        .block_control(
            query.agent_id.as_deref(),
            master,
            cu,
            &body.lamp_list,
            body.brightness,
        )
        .await?;
    ensure_ack(&resp)?;
    Ok(Json(AckPayload::ok()))
}

async fn post_block_color_temperature(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu)): Path<(u8, u8)>,
    Query(query): Query<AgentQuery>,
    Json(body): Json<BlockColorTempBody>,
) -> Result<Json<AckPayload>, ApiError> {
    let resp = manager
        .block_color_temperature(
            query.agent_id.as_deref(),
            master,
            cu,
            &body.lamp_list,
            body.color_temp,
        )
        .await?;
    ensure_ack(&resp)?;
    Ok(Json(AckPayload::ok()))
}

async fn post_all_lamps(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu)): Path<(u8, u8)>,
    Query(query): Query<AgentQuery>,
    Json(body): Json<BrightnessBody>,
) -> Result<Json<AckPayload>, ApiError> {
    let resp = manager
        .control_all_lamps(query.agent_id.as_deref(), master, cu, body.brightness)
        .await?;
    ensure_ack(&resp)?;
    Ok(Json(AckPayload::ok()))
}

async fn post_scene(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu, scene_no)): Path<(u8, u8, u8)>,
    Query(query): Query<AgentQuery>,
    body: Option<Json<SceneBody>>,
) -> Result<Json<AckPayload>, ApiError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let resp = manager
        .execute_scene(query.agent_id.as_deref(), master, cu, scene_no, body.fade_time)
        .await?;
    ensure_ack(&resp)?;
    Ok(Json(AckPayload::ok()))
}

// ---------------------------------------------------------------------------
// Effects: answer "started" immediately, run in the background
// ---------------------------------------------------------------------------

async fn post_fade(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu, lamp_no)): Path<(u8, u8, u8)>,
    Query(query): Query<AgentQuery>,
    Json(body): Json<FadeBody>,
) -> Result<Json<StartedPayload>, ApiError> {
    let params = FadeParams {
        master,
        cu,
        lamp_no,
        start: body.start_brightness,
        end: body.end_brightness,
        duration: fade_duration(body.duration)?,
    };
    manager.start_fade(query.agent_id.as_deref(), params).await?;
    Ok(Json(StartedPayload::started()))
}

async fn post_wave(
    State(manager): State<Arc<AgentManager>>,
    Path((master, cu)): Path<(u8, u8)>,
    Query(query): Query<AgentQuery>,
    Json(body): Json<WaveBody>,
) -> Result<Json<StartedPayload>, ApiError> {
    let params = WaveParams {
        master,
        cu,
        lamps: body.lamp_list,
        brightness: body.brightness,
        interval: Duration::from_millis(body.interval),
    };
    manager.start_wave(query.agent_id.as_deref(), params).await?;
    Ok(Json(StartedPayload::started()))
}

// ---------------------------------------------------------------------------
// Agent administration
// ---------------------------------------------------------------------------

async fn post_agent(
    State(manager): State<Arc<AgentManager>>,
    Json(body): Json<AddAgentBody>,
) -> Result<Json<AckPayload>, ApiError> {
    manager
        .add_agent(body.agent_id, body.host, body.port, body.name)
        .await?;
    Ok(Json(AckPayload::ok()))
}

async fn delete_agent(
    State(manager): State<Arc<AgentManager>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AckPayload>, ApiError> {
    manager.remove_agent(&agent_id).await?;
    Ok(Json(AckPayload::ok()))
}

async fn post_default_agent(
    State(manager): State<Arc<AgentManager>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AckPayload>, ApiError> {
    if manager.set_default_agent(&agent_id).await {
        Ok(Json(AckPayload::ok()))
    } else {
        Err(ApiError::from(ManagerError::UnknownAgent(agent_id)))
    }
}

async fn post_reconnect_agent(
    State(manager): State<Arc<AgentManager>>,
    Path(agent_id): Path<String>,
) -> Result<Json<AckPayload>, ApiError> {
    manager.reconnect_agent(&agent_id).await?;
    Ok(Json(AckPayload::ok()))
}
