//! Interpretation of response frames into typed values.

use std::time::Instant;

use crate::frame::Frame;
use crate::types::SourceDevice;

/// Per-lamp brightness table (response to 0x96 0x00).
pub const OPCODE_LAMP_BRIGHTNESS: u16 = 0x1600;

/// Per-lamp color-temperature table (response to 0x96 0x06).
pub const OPCODE_COLOR_TEMP: u16 = 0x1606;

/// Acknowledgement of a control command (0x92/0x90/0x91 family).
pub const OPCODE_CONTROL_ACK: u16 = 0x1000;

/// Device-name answer to the 0xA2 0x05 broadcast.
pub const OPCODE_DEVICE_NAME: u16 = 0x2205;

/// What a response frame means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
    /// One brightness value per lamp slot, 0..=100.
    LampBrightness { values: Vec<u8> },
    /// One color-temperature value per lamp slot, 0..=100.
    ColorTemperature { values: Vec<u8> },
    /// Command acknowledgement; `ok` when the status byte is 0x00.
    LampControlAck { ok: bool },
    /// Device display name.
    DeviceName { name: String },
    /// Opcode the gateway does not know; raw payload retained.
    Unknown { data: Vec<u8> },
}

/// A response frame lifted to its typed meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedResponse {
    /// Who answered, from the frame's SrcAddr block.
    pub source: SourceDevice,
    /// Combined `(OP1 << 8) | OP2`.
    pub opcode: u16,
    pub kind: ResponseKind,
    /// Monotonic receive timestamp.
    pub received_at: Instant,
}

impl TypedResponse {
    /// The opcode formatted the way operators read it in bus traces.
    pub fn opcode_hex(&self) -> String {
        format!("0x{:04X}", self.opcode)
    }

    /// `true` for a successful control acknowledgement.
    pub fn is_ack_ok(&self) -> bool {
        matches!(self.kind, ResponseKind::LampControlAck { ok: true })
    }
}

/// Maps a decoded frame to its typed response.
///
/// Never fails: anything unrecognized becomes [`ResponseKind::Unknown`]
/// with the payload preserved, so new agent firmware cannot break the
/// request pipeline.
pub fn interpret(frame: &Frame) -> TypedResponse {
    let opcode = frame.opcode();
    let kind = match opcode {
        OPCODE_LAMP_BRIGHTNESS => ResponseKind::LampBrightness {
            values: frame.data.clone(),
        },
        OPCODE_COLOR_TEMP => ResponseKind::ColorTemperature {
            values: frame.data.clone(),
        },
        OPCODE_CONTROL_ACK => ResponseKind::LampControlAck {
            ok: frame.data.first() == Some(&0x00),
        },
        OPCODE_DEVICE_NAME => ResponseKind::DeviceName {
            name: String::from_utf8_lossy(&frame.data)
                .trim_matches('\0')
                .to_string(),
        },
        _ => ResponseKind::Unknown {
            data: frame.data.clone(),
        },
    };

    TypedResponse {
        source: SourceDevice {
            device_type: frame.src[0],
            master: frame.src[1],
            cu: frame.src[2],
        },
        opcode,
        kind,
        received_at: Instant::now(),
    }
}
