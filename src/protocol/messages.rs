//! Envelope types exchanged with the control server
//!
//! Every message is one UTF-8 text frame holding a JSON object. Outbound
//! envelopes are built from typed constructors; inbound envelopes are read
//! leniently, the way the server writes them: unknown keys are ignored and
//! missing keys fall back to defaults.

use crate::error::StationError;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// `command` value used when an inbound envelope has none
pub const UNKNOWN_COMMAND: &str = "unknown";
/// `direction` value used when an inbound envelope has none
pub const NO_DIRECTION: &str = "none";
/// `status` carried by acknowledgements
pub const STATUS_SUCCESS: &str = "success";
/// `status` carried by registrations
pub const STATUS_READY: &str = "ready";

/// Discriminator carried in the `type` key
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeType {
    Register,
    CameraFrame,
}

/// Envelope sent by the station
///
/// # Examples
/// ```
/// use station_link::protocol::OutboundEnvelope;
///
/// let register = OutboundEnvelope::register("RPI1", "RPi RPI1 online with camera");
/// let json = register.to_json().unwrap();
/// assert!(json.contains(r#""type":"register""#));
/// assert!(json.contains(r#""rpi_id":"RPI1""#));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutboundEnvelope {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<EnvelopeType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub rpi_id: String,
    /// Base64 text of a JPEG image
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame: Option<String>,
}

impl OutboundEnvelope {
    /// Registration announcing the station right after the handshake
    pub fn register(station_id: &str, message: &str) -> Self {
        Self {
            kind: Some(EnvelopeType::Register),
            status: Some(STATUS_READY.to_string()),
            message: Some(message.to_string()),
            rpi_id: station_id.to_string(),
            frame: None,
        }
    }

    /// Camera frame carrying an already JPEG-compressed image
    pub fn camera_frame(station_id: &str, jpeg: &[u8]) -> Self {
        Self {
            kind: Some(EnvelopeType::CameraFrame),
            status: None,
            message: None,
            rpi_id: station_id.to_string(),
            frame: Some(encode_frame(jpeg)),
        }
    }

    /// Acknowledgement for a relayed command
    pub fn command_ack(station_id: &str, command: &Command) -> Self {
        Self {
            kind: None,
            status: Some(STATUS_SUCCESS.to_string()),
            message: Some(format!(
                "Command '{}' executed with direction '{}'",
                command.name, command.direction
            )),
            rpi_id: station_id.to_string(),
            frame: None,
        }
    }

    pub fn to_json(&self) -> Result<String, StationError> {
        serde_json::to_string(self).map_err(StationError::Encode)
    }
}

/// Base64 (standard alphabet, padded) encoding of frame bytes
pub fn encode_frame(jpeg: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(jpeg)
}

/// Envelope received from the server
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEnvelope {
    fields: Map<String, Value>,
}

impl InboundEnvelope {
    /// Parse one inbound text frame
    ///
    /// Anything other than a JSON object is a decode error.
    pub fn decode(text: &str) -> Result<Self, StationError> {
        match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(fields)) => Ok(Self { fields }),
            Ok(other) => Err(StationError::decode(
                format!("expected a JSON object, got {}", json_type_name(&other)),
                text,
            )),
            Err(e) => Err(StationError::decode(e.to_string(), text)),
        }
    }

    /// Value of the `type` key, if it is a string
    pub fn kind(&self) -> Option<&str> {
        self.fields.get("type").and_then(Value::as_str)
    }

    /// Command name and direction with their defaults applied
    pub fn command(&self) -> Command {
        Command {
            name: self.text_field("command", UNKNOWN_COMMAND),
            direction: self.text_field("direction", NO_DIRECTION),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    fn text_field(&self, key: &str, default: &str) -> String {
        match self.fields.get(key) {
            None | Some(Value::Null) => default.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Remote command as extracted from an inbound envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub name: String,
    pub direction: String,
}
