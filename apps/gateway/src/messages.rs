//! Request bodies and response payloads for both boundary surfaces.
//!
//! REST carries master/CU/lamp in the path, so its bodies are thin; push
//! requests carry the full target inline. Both reply with the payload
//! types at the bottom.

use serde::{Deserialize, Serialize};

use lcs_protocol::response::{ResponseKind, TypedResponse};
use lcs_protocol::types::{DeviceType, SourceDevice};

pub(crate) fn default_fade_duration_secs() -> f64 {
    1.0
}

pub(crate) fn default_wave_interval_ms() -> u64 {
    500
}

// ---------------------------------------------------------------------------
// REST bodies and query parameters
// ---------------------------------------------------------------------------

/// Common query parameters on control routes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentQuery {
    /// Target agent; the default agent when absent.
    pub agent_id: Option<String>,
    /// Device class for brightness queries (default LCS).
    pub device_type: Option<DeviceType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrightnessBody {
    pub brightness: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockControlBody {
    pub lamp_list: Vec<u8>,
    pub brightness: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockColorTempBody {
    pub lamp_list: Vec<u8>,
    pub color_temp: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneBody {
    #[serde(default)]
    pub fade_time: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FadeBody {
    pub start_brightness: u8,
    pub end_brightness: u8,
    /// Fade duration in seconds.
    #[serde(default = "default_fade_duration_secs")]
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaveBody {
    pub lamp_list: Vec<u8>,
    pub brightness: u8,
    /// Delay between lamps in milliseconds.
    #[serde(default = "default_wave_interval_ms")]
    pub interval: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddAgentBody {
    pub agent_id: String,
    pub host: String,
    pub port: u16,
    pub name: Option<String>,
}

// ---------------------------------------------------------------------------
// Push request payloads (target inline)
// ---------------------------------------------------------------------------

/// Addressing shared by all push control requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushTarget {
    pub agent_id: Option<String>,
    pub master: u8,
    pub cu: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushQueryRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub device_type: Option<DeviceType>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushControlLampRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub lamp_no: u8,
    pub brightness: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBlockControlRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub lamp_list: Vec<u8>,
    pub brightness: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushBlockColorTempRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub lamp_list: Vec<u8>,
    pub color_temp: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSceneRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub scene_no: u8,
    #[serde(default)]
    pub fade_time: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAllLampsRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub brightness: u8,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushFadeRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub lamp_no: u8,
    pub start_brightness: u8,
    pub end_brightness: u8,
    #[serde(default = "default_fade_duration_secs")]
    pub duration: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushWaveRequest {
    #[serde(flatten)]
    pub target: PushTarget,
    pub lamp_list: Vec<u8>,
    pub brightness: u8,
    #[serde(default = "default_wave_interval_ms")]
    pub interval: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushDeviceInfoRequest {
    pub agent_id: Option<String>,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Success acknowledgement for mutating operations.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckPayload {
    pub success: bool,
}

impl AckPayload {
    pub fn ok() -> Self {
        Self { success: true }
    }
}

/// Payload for brightness / color-temperature queries.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelsPayload {
    pub success: bool,
    pub opcode: String,
    pub source_device: SourceDevice,
    pub values: Vec<u8>,
}

/// Payload for the device-info query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfoPayload {
    pub success: bool,
    pub opcode: String,
    pub source_device: SourceDevice,
    pub name: String,
}

/// Acknowledgement for background effects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedPayload {
    pub success: bool,
    pub status: &'static str,
}

impl StartedPayload {
    pub fn started() -> Self {
        Self {
            success: true,
            status: "started",
        }
    }
}

/// Error body shared by both surfaces.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: error.into(),
        }
    }
}

/// Lifts a level-table response to its payload; `None` when the agent
/// answered with something else.
pub fn levels_payload(resp: &TypedResponse) -> Option<LevelsPayload> {
    let values = match &resp.kind {
        ResponseKind::LampBrightness { values } | ResponseKind::ColorTemperature { values } => {
            values.clone()
        }
        _ => return None,
    };
    Some(LevelsPayload {
        success: true,
        opcode: resp.opcode_hex(),
        source_device: resp.source,
        values,
    })
}

/// Lifts a device-name response to its payload.
pub fn device_info_payload(resp: &TypedResponse) -> Option<DeviceInfoPayload> {
    match &resp.kind {
        ResponseKind::DeviceName { name } => Some(DeviceInfoPayload {
            success: true,
            opcode: resp.opcode_hex(),
            source_device: resp.source,
            name: name.clone(),
        }),
        _ => None,
    }
}
