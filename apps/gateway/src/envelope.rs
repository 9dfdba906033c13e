//! JSON envelope for the WebSocket push surface.
//!
//! Every message is `{"type": ..., "payload"?: ..., "error"?: ...}`.
//! Request/response correlation is by name: a `control_lamp` request is
//! answered by exactly one `control_lamp_response`. Unsolicited
//! broadcasts (`state_changed`, `agents_updated`, ...) use their own
//! fixed type names.

use serde::{Deserialize, Serialize};

/// Error details in a push message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushError {
    pub code: i32,
    pub message: String,
}

/// Envelope for all push-surface communication.
///
/// `payload` uses `RawValue` so dispatch can route on `type` without
/// deserializing the body twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Box<serde_json::value::RawValue>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PushError>,
}

impl Envelope {
    /// Creates a message with the given type and payload.
    pub fn new<T: Serialize>(
        event: impl Into<String>,
        payload: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match payload {
            Some(p) => {
                let json = serde_json::to_string(p)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            event: event.into(),
            payload: raw,
            error: None,
        })
    }

    /// Deserializes the payload into the given type.
    pub fn parse_payload<T: for<'de> Deserialize<'de>>(
        &self,
    ) -> Result<Option<T>, serde_json::Error> {
        match &self.payload {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }

    /// The response type name for a request type.
    pub fn response_type(request: &str) -> String {
        format!("{request}_response")
    }

    /// Creates the success response for this request.
    pub fn reply<T: Serialize>(&self, payload: Option<&T>) -> Result<Self, serde_json::Error> {
        Envelope::new(Self::response_type(&self.event), payload)
    }

    /// Creates the error response for this request.
    pub fn reply_error(&self, code: i32, message: impl Into<String>) -> Self {
        Self {
            event: Self::response_type(&self.event),
            payload: None,
            error: Some(PushError {
                code,
                message: message.into(),
            }),
        }
    }
}
