//! Message envelope exchanged over the queues.
//!
//! A message is created by its sender, read by exactly one receiver and
//! never mutated or forwarded. Follow-ups are always new messages.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Action vocabulary carried on the wire.
///
/// Unrecognized action strings deserialize into [`Action::Unknown`] so that
/// receivers can log and drop them instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    StartNewStory,
    GeneratePrompt,
    PromptReady,
    WriteDraft,
    DraftReady,
    Review,
    ReviewComplete,
    Edit,
    EditComplete,
    Revise,
    RevisionReady,
    DesignCover,
    CoverReady,
    Unknown(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Self::StartNewStory => "start_new_story",
            Self::GeneratePrompt => "generate_prompt",
            Self::PromptReady => "prompt_ready",
            Self::WriteDraft => "write_draft",
            Self::DraftReady => "draft_ready",
            Self::Review => "review",
            Self::ReviewComplete => "review_complete",
            Self::Edit => "edit",
            Self::EditComplete => "edit_complete",
            Self::Revise => "revise",
            Self::RevisionReady => "revision_ready",
            Self::DesignCover => "design_cover",
            Self::CoverReady => "cover_ready",
            Self::Unknown(other) => other,
        }
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "start_new_story" => Self::StartNewStory,
            "generate_prompt" => Self::GeneratePrompt,
            "prompt_ready" => Self::PromptReady,
            "write_draft" => Self::WriteDraft,
            "draft_ready" => Self::DraftReady,
            "review" => Self::Review,
            "review_complete" => Self::ReviewComplete,
            "edit" => Self::Edit,
            "edit_complete" => Self::EditComplete,
            "revise" => Self::Revise,
            "revision_ready" => Self::RevisionReady,
            "design_cover" => Self::DesignCover,
            "cover_ready" => Self::CoverReady,
            _ => Self::Unknown(value),
        }
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        action.as_str().to_string()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Action-specific key/value payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payload(Map<String, Value>);

impl Payload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.0.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// String value, ignoring empty strings
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    pub fn u32(&self, key: &str) -> Option<u32> {
        self.0
            .get(key)
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    /// The round number every review-cycle message carries
    pub fn round_number(&self) -> Option<u32> {
        self.u32("round_number")
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// The unit of inter-component communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: String,
    #[serde(default)]
    pub story_id: String,
    pub action: Action,
    #[serde(default)]
    pub payload: Payload,
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub target: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(story_id: impl Into<String>, action: Action) -> Self {
        Self {
            message_id: short_id(),
            story_id: story_id.into(),
            action,
            payload: Payload::new(),
            source: String::new(),
            target: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// Set sender and intended receiver
    pub fn route(mut self, source: impl Into<String>, target: impl Into<String>) -> Self {
        self.source = source.into();
        self.target = target.into();
        self
    }
}

/// Opaque 12-hex-char identifier used for messages and stories
pub fn short_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(12);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        let message = Message::new("s1", Action::ReviewComplete);
        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["action"], "review_complete");

        let parsed: Action = serde_json::from_str("\"cover_ready\"").unwrap();
        assert_eq!(parsed, Action::CoverReady);
    }

    #[test]
    fn test_unknown_action_survives_decoding() {
        let raw = r#"{"message_id":"m1","story_id":"s1","action":"translate","timestamp":"2024-01-01T00:00:00Z"}"#;
        let message: Message = serde_json::from_str(raw).unwrap();
        assert_eq!(message.action, Action::Unknown("translate".to_string()));
        assert_eq!(message.action.as_str(), "translate");
        assert!(message.payload.is_empty());
    }

    #[test]
    fn test_payload_accessors() {
        let payload = Payload::new()
            .with("round_number", 2)
            .with("approved", true)
            .with("feedback", "tighten the ending")
            .with("model", "");

        assert_eq!(payload.round_number(), Some(2));
        assert_eq!(payload.bool("approved"), Some(true));
        assert_eq!(payload.str("feedback"), Some("tighten the ending"));
        assert_eq!(payload.str("model"), None);
        assert_eq!(payload.u32("missing"), None);
    }

    #[test]
    fn test_short_id_shape() {
        let id = short_id();
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, short_id());
    }
}
