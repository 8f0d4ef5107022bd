//! Shared types used across the visage crates.
//!
//! Wire naming is camelCase to match the export/import document format the
//! browser client produces and consumes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// -----------------------------------------------------------------------------
// Storage keys: the five namespaces of the durable substrate
// -----------------------------------------------------------------------------

/// Key holding the JSON document mapping persona id -> ordered message log.
pub const CONVERSATIONS_KEY: &str = "conversations";

/// Key holding the JSON document mapping persona id -> PersonaConfig.
pub const PERSONAS_KEY: &str = "personas";

/// Key holding the last-selected persona id (plain UTF-8 string).
pub const CURRENT_PERSONA_KEY: &str = "currentPersona";

/// Key holding the admin bearer token (plain UTF-8 string). Durable across
/// sessions; paired with [`ADMIN_TOKEN_EXPIRY_KEY`].
pub const ADMIN_TOKEN_KEY: &str = "adminToken";

/// Key holding the admin token expiry as an RFC 3339 string.
pub const ADMIN_TOKEN_EXPIRY_KEY: &str = "adminTokenExpiry";

// -----------------------------------------------------------------------------
// Conversation messages
// -----------------------------------------------------------------------------

/// Author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One turn in a persona's conversation log. Immutable once appended; logs are
/// only ever extended or bulk-cleared, never edited.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
    /// Stamped by the store on append when the caller leaves it empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Message {
    /// A user turn with no timestamp; the store stamps it on append.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            timestamp: None,
        }
    }

    /// An assistant turn with no timestamp; the store stamps it on append.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            text: text.into(),
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, at: DateTime<Utc>) -> Self {
        self.timestamp = Some(at);
        self
    }
}

// -----------------------------------------------------------------------------
// Persona configuration
// -----------------------------------------------------------------------------

/// Configuration bundle for one persona preset. Saved wholesale: the caller
/// supplies the full object, the store never merges fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaConfig {
    /// Stable persona id (e.g. "companion", "code", "study").
    pub id: String,
    /// Name shown in the persona picker.
    pub display_name: String,
    /// Free-text personality description, editable from the settings panel.
    pub personality: String,
    /// Tone dial, 1 (formal) to 10 (playful). Clamped on save.
    #[serde(default = "default_tone")]
    pub tone: u8,
    /// Instruction text sent as the `system` message on every completion
    /// request for this persona.
    pub system_prompt: String,
    /// Completion model identifier. Empty means "use the configured default".
    #[serde(default)]
    pub model: String,
}

pub(crate) fn default_tone() -> u8 {
    5
}

// -----------------------------------------------------------------------------
// Admin session
// -----------------------------------------------------------------------------

/// Snapshot of the admin login state.
///
/// `authenticated` lives only as long as the process; it is the local UI
/// gate. `token`/`token_expiry` are durable and are what protected remote
/// calls actually present; expiry is authoritative for those calls, so the
/// two can legitimately disagree (stale flag, expired token).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminSession {
    pub authenticated: bool,
    pub token: Option<String>,
    pub token_expiry: Option<DateTime<Utc>>,
}

// -----------------------------------------------------------------------------
// Export / import
// -----------------------------------------------------------------------------

/// Backup document: the full conversation and persona state plus an export
/// timestamp. Import accepts a subset of the top-level keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub conversations: BTreeMap<String, Vec<Message>>,
    pub personas: BTreeMap<String, PersonaConfig>,
    pub export_date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_roles_serialize_lowercase() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        let json = serde_json::to_value(Message::assistant("hello")).unwrap();
        assert_eq!(json["role"], "assistant");
    }

    #[test]
    fn message_without_timestamp_omits_field() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert!(json.get("timestamp").is_none());
    }

    #[test]
    fn persona_config_uses_camel_case_wire_names() {
        let cfg = PersonaConfig {
            id: "companion".into(),
            display_name: "Companion".into(),
            personality: "warm".into(),
            tone: 7,
            system_prompt: "You are a companion.".into(),
            model: String::new(),
        };
        let json = serde_json::to_value(&cfg).unwrap();
        assert!(json.get("displayName").is_some());
        assert!(json.get("systemPrompt").is_some());
    }

    #[test]
    fn persona_config_tolerates_missing_tone_and_model() {
        let cfg: PersonaConfig = serde_json::from_value(serde_json::json!({
            "id": "study",
            "displayName": "Study Tutor",
            "personality": "patient",
            "systemPrompt": "You tutor."
        }))
        .unwrap();
        assert_eq!(cfg.tone, 5);
        assert!(cfg.model.is_empty());
    }
}
