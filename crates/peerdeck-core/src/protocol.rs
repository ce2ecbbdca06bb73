use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

/// Client -> server: first message after the transport opens.
pub const MSG_AUTH: &str = "auth";
/// Server -> client: the only acceptable reply to `auth`.
pub const MSG_AUTH_RESPONSE: &str = "auth_response";
/// Client -> server heartbeat.
pub const MSG_PING: &str = "ping";
/// Server -> client heartbeat acknowledgment.
pub const MSG_PONG: &str = "pong";

/// Envelope fields that payloads may not shadow.
const RESERVED_FIELDS: [&str; 3] = ["type", "id", "timestamp"];

/// A single message on the wire: one JSON object per transport frame.
///
/// Every message carries `type`, a unique `id` and an RFC 3339 `timestamp`.
/// Type-specific fields sit next to them at the top level of the object and
/// are kept in `payload`. The `id` is only used for tracing; the protocol has
/// no request/response correlation beyond the initial auth exchange.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    /// Peers are trusted to stamp these, but a missing one is not fatal.
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Classified inbound message, as the connection state machine sees it.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    AuthResponse {
        success: bool,
        error: Option<String>,
    },
    Pong,
    /// Anything that isn't a lifecycle message; forwarded to the owner untouched.
    Application(Envelope),
}

impl Envelope {
    /// Build a message of the given type with a fresh id and timestamp.
    pub fn new(kind: impl Into<String>, mut payload: Map<String, Value>) -> Self {
        for field in RESERVED_FIELDS {
            payload.remove(field);
        }
        Self {
            kind: kind.into(),
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: timestamp_now(),
            payload,
        }
    }

    pub fn auth(token: &str) -> Self {
        let mut payload = Map::new();
        payload.insert("token".into(), Value::String(token.to_string()));
        Self::new(MSG_AUTH, payload)
    }

    pub fn auth_response(success: bool, error: Option<&str>) -> Self {
        let mut payload = Map::new();
        payload.insert("success".into(), Value::Bool(success));
        if let Some(error) = error {
            payload.insert("error".into(), Value::String(error.to_string()));
        }
        Self::new(MSG_AUTH_RESPONSE, payload)
    }

    pub fn ping() -> Self {
        Self::new(MSG_PING, Map::new())
    }

    pub fn pong() -> Self {
        Self::new(MSG_PONG, Map::new())
    }

    /// Look up a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }

    /// Serialize to the text that goes into one transport frame.
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("BUG: Envelope must serialize")
    }

    /// Parse one transport frame. Fails on invalid JSON, non-object roots and
    /// a missing or non-string `type`.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Classify the message for the connection state machine.
    ///
    /// Returns `None` when a lifecycle message is missing the fields it needs
    /// (e.g. an `auth_response` without a boolean `success`).
    pub fn into_inbound(self) -> Option<Inbound> {
        match self.kind.as_str() {
            MSG_AUTH_RESPONSE => {
                let success = self.field("success")?.as_bool()?;
                let error = self
                    .field("error")
                    .and_then(|v| v.as_str())
                    .map(str::to_string);
                Some(Inbound::AuthResponse { success, error })
            }
            MSG_PONG => Some(Inbound::Pong),
            _ => Some(Inbound::Application(self)),
        }
    }
}

/// Current UTC time as an RFC 3339 string.
pub fn timestamp_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}
