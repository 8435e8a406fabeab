//! Wire types for the panel/relay boundary and the backend request body.
//!
//! Every request crossing from the panel to the relay travels in a versioned
//! [`RelayEnvelope`] tagged with a [`RequestId`]. Replies echo the id so the
//! panel can tell a current reply from a stale one.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;
use crate::state::ChatMessage;

pub const PROTOCOL_VERSION: u32 = 1;

/// Correlates a relay reply with the request that caused it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Request kinds the relay understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayCommand {
    /// Message records are kept as raw JSON here and only read loosely
    /// (role and content) once the envelope is decoded.
    UserMessage { messages: Vec<Value> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayEnvelope {
    pub version: u32,
    pub id: RequestId,
    #[serde(flatten)]
    pub command: RelayCommand,
}

impl RelayEnvelope {
    pub fn user_message(id: RequestId, messages: &[ChatMessage]) -> Self {
        let messages = messages
            .iter()
            .map(|m| serde_json::json!({ "role": m.role.as_str(), "content": m.content }))
            .collect();

        Self {
            version: PROTOCOL_VERSION,
            id,
            command: RelayCommand::UserMessage { messages },
        }
    }

    /// Validate a raw envelope. The version is checked before anything else
    /// so a future envelope shape reports a version mismatch rather than a
    /// parse error.
    pub fn decode(value: Value) -> Result<DecodedRequest, ProtocolError> {
        let version = value
            .get("version")
            .and_then(Value::as_u64)
            .ok_or_else(|| ProtocolError::Malformed("missing or non-numeric version".to_string()))?;

        if version != u64::from(PROTOCOL_VERSION) {
            return Err(ProtocolError::UnsupportedVersion {
                found: u32::try_from(version).unwrap_or(u32::MAX),
                expected: PROTOCOL_VERSION,
            });
        }

        let envelope: RelayEnvelope =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

        envelope.validate()
    }

    pub fn validate(self) -> Result<DecodedRequest, ProtocolError> {
        match self.command {
            RelayCommand::UserMessage { messages } => {
                let messages = messages
                    .iter()
                    .enumerate()
                    .map(|(index, value)| WireMessage::from_value(index, value))
                    .collect::<Result<Vec<_>, _>>()?;

                Ok(DecodedRequest::UserMessage { id: self.id, messages })
            }
        }
    }
}

/// An envelope that passed validation
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedRequest {
    UserMessage { id: RequestId, messages: Vec<WireMessage> },
}

impl DecodedRequest {
    pub fn id(&self) -> RequestId {
        match self {
            DecodedRequest::UserMessage { id, .. } => *id,
        }
    }
}

/// A message record as the relay sees it: only `role` and `content` are
/// trusted. The role stays a string because the relay must forward whatever
/// the panel sent once sanitized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: String,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: role.into(), content: content.into() }
    }

    /// Missing or non-string fields read as empty strings; unknown fields are
    /// dropped.
    pub fn from_value(index: usize, value: &Value) -> Result<Self, ProtocolError> {
        let object = value
            .as_object()
            .ok_or(ProtocolError::MessageNotObject { index })?;

        let field = |name: &str| {
            object
                .get(name)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Ok(Self { role: field("role"), content: field("content") })
    }
}

/// JSON body POSTed to the backend's `/response/` endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RelayRequest {
    pub messages: Vec<WireMessage>,
    pub url: String,
}

/// What the relay answers for each request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RelayResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RelayResponse {
    pub fn answer(content: impl Into<String>) -> Self {
        Self { success: true, content: Some(content.into()), error: None }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self { success: false, content: None, error: Some(error.into()) }
    }

    /// Classify the reply. Shapes that match neither a success nor a failure
    /// are protocol violations.
    pub fn outcome(&self) -> ReplyOutcome<'_> {
        match (self.success, self.content.as_deref(), self.error.as_deref()) {
            (true, Some(content), _) if !content.is_empty() => ReplyOutcome::Answer(content),
            (false, _, Some(error)) => ReplyOutcome::Failure(error),
            _ => ReplyOutcome::Violation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyOutcome<'a> {
    Answer(&'a str),
    Failure(&'a str),
    Violation,
}

/// A relay response paired with the id of the request it answers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayReply {
    pub id: RequestId,
    #[serde(flatten)]
    pub response: RelayResponse,
}
