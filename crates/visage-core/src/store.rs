//! Sled-backed persona-scoped conversation store.
//!
//! The substrate is one sled database holding five keys (see [`crate::shared`]):
//! two JSON documents (`conversations`, `personas`) and three plain strings
//! (`currentPersona`, `adminToken`, `adminTokenExpiry`). Every mutation of a
//! JSON document re-reads the whole blob, changes one entry, and writes the
//! whole blob back; there is no field-level update primitive. Two writers
//! issuing overlapping read-modify-write sequences can lose an update; the
//! store assumes a single active writer and does not lock.
//!
//! Reads never fail: a missing or unparsable blob degrades to an empty or
//! default value and is logged at `warn`. Writes report failure as
//! [`StoreError`] but never panic: conversation history is best-effort and a
//! storage hiccup must not take the conversation down with it.

use crate::error::StoreError;
use crate::personas::{builtin_config, fallback_config, DEFAULT_PERSONA_ID, KNOWN_PERSONA_IDS};
use crate::shared::{
    AdminSession, Message, PersonaConfig, Snapshot, ADMIN_TOKEN_EXPIRY_KEY, ADMIN_TOKEN_KEY,
    CONVERSATIONS_KEY, CURRENT_PERSONA_KEY, PERSONAS_KEY,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

const DEFAULT_PATH: &str = "./data/visage_store";

/// Persona-scoped persistent store for conversation logs, persona overrides,
/// and the admin session.
///
/// The `authenticated` flag is an in-memory atomic rather than a
/// sled key: it is session-scoped and must die with the process, while the
/// token and its expiry are durable. Token expiry is authoritative for remote
/// calls; the flag only gates local UI.
pub struct ConversationStore {
    db: sled::Db,
    admin_authenticated: AtomicBool,
}

impl ConversationStore {
    /// Opens or creates the store at `./data/visage_store`.
    pub fn new() -> Result<Self, sled::Error> {
        Self::open_path(DEFAULT_PATH)
    }

    /// Opens or creates the store at the given path.
    pub fn open_path<P: AsRef<Path>>(path: P) -> Result<Self, sled::Error> {
        let db = sled::open(path)?;
        Ok(Self {
            db,
            admin_authenticated: AtomicBool::new(false),
        })
    }

    // -------------------------------------------------------------------------
    // Conversation logs
    // -------------------------------------------------------------------------

    /// Returns the ordered message log for `persona_id`. Missing or corrupt
    /// data yields an empty log.
    pub fn get_log(&self, persona_id: &str) -> Vec<Message> {
        self.read_json_map::<Vec<Message>>(CONVERSATIONS_KEY)
            .remove(persona_id)
            .unwrap_or_default()
    }

    /// Appends one message to `persona_id`'s log, stamping the timestamp with
    /// the current time when the caller left it empty, and persists the whole
    /// updated document.
    pub fn append_message(&self, persona_id: &str, mut message: Message) -> Result<(), StoreError> {
        if message.timestamp.is_none() {
            message.timestamp = Some(Utc::now());
        }
        let mut logs = self.read_json_map::<Vec<Message>>(CONVERSATIONS_KEY);
        logs.entry(persona_id.to_string()).or_default().push(message);
        self.write_json_map(CONVERSATIONS_KEY, &logs)
    }

    /// Replaces `persona_id`'s log with an empty sequence. Other personas'
    /// logs are untouched.
    pub fn clear_log(&self, persona_id: &str) -> Result<(), StoreError> {
        let mut logs = self.read_json_map::<Vec<Message>>(CONVERSATIONS_KEY);
        logs.insert(persona_id.to_string(), Vec::new());
        self.write_json_map(CONVERSATIONS_KEY, &logs)
    }

    /// Empties every persona's log (every id present in the stored document
    /// plus the built-in set) in one write.
    pub fn clear_all_logs(&self) -> Result<(), StoreError> {
        let mut logs = self.read_json_map::<Vec<Message>>(CONVERSATIONS_KEY);
        for log in logs.values_mut() {
            log.clear();
        }
        for id in KNOWN_PERSONA_IDS {
            logs.entry(id.to_string()).or_default();
        }
        self.write_json_map(CONVERSATIONS_KEY, &logs)
    }

    // -------------------------------------------------------------------------
    // Persona configuration
    // -------------------------------------------------------------------------

    /// Returns the stored config for `persona_id`, the built-in preset when
    /// nothing is stored, or a generic synthesized config for ids outside the
    /// shipped set. Never fails; the synthesized config is not persisted.
    pub fn get_persona_config(&self, persona_id: &str) -> PersonaConfig {
        if let Some(stored) = self.stored_persona_config(persona_id) {
            return stored;
        }
        if let Some(builtin) = builtin_config(persona_id) {
            return builtin;
        }
        tracing::warn!(persona = persona_id, "no preset for persona id; synthesizing a generic config");
        fallback_config(persona_id)
    }

    /// The stored override only; `None` when the persona has never been
    /// saved. The completion path uses this to run its own fallback chain.
    pub fn stored_persona_config(&self, persona_id: &str) -> Option<PersonaConfig> {
        self.read_json_map::<PersonaConfig>(PERSONAS_KEY)
            .remove(persona_id)
    }

    /// Overwrites the stored config for `persona_id` wholesale. The id field
    /// is forced to match the key and the tone dial is clamped to 1–10.
    pub fn save_persona_config(
        &self,
        persona_id: &str,
        mut config: PersonaConfig,
    ) -> Result<(), StoreError> {
        config.id = persona_id.to_string();
        config.tone = config.tone.clamp(1, 10);
        let mut personas = self.read_json_map::<PersonaConfig>(PERSONAS_KEY);
        personas.insert(persona_id.to_string(), config);
        self.write_json_map(PERSONAS_KEY, &personas)
    }

    /// The last-selected persona id, defaulting to the companion persona.
    pub fn current_persona_id(&self) -> String {
        self.read_string(CURRENT_PERSONA_KEY)
            .unwrap_or_else(|| DEFAULT_PERSONA_ID.to_string())
    }

    pub fn set_current_persona_id(&self, persona_id: &str) -> Result<(), StoreError> {
        self.write_string(CURRENT_PERSONA_KEY, persona_id)
    }

    // -------------------------------------------------------------------------
    // Admin session
    // -------------------------------------------------------------------------

    /// Current admin state: the in-memory flag plus the durable token pair.
    pub fn admin_session(&self) -> AdminSession {
        AdminSession {
            authenticated: self.admin_authenticated.load(Ordering::Relaxed),
            token: self.read_string(ADMIN_TOKEN_KEY),
            token_expiry: self.admin_token_expiry(),
        }
    }

    /// Raises or lowers the session-scoped UI gate. Not persisted.
    pub fn set_admin_authenticated(&self, authenticated: bool) {
        self.admin_authenticated
            .store(authenticated, Ordering::Relaxed);
    }

    /// Persists the bearer token and its expiry.
    pub fn set_admin_token(&self, token: &str, expiry: DateTime<Utc>) -> Result<(), StoreError> {
        self.write_string(ADMIN_TOKEN_KEY, token)?;
        self.write_string(ADMIN_TOKEN_EXPIRY_KEY, &expiry.to_rfc3339())
    }

    /// Removes the token and expiry. The session flag is left alone; callers
    /// that want a full logout also call [`Self::set_admin_authenticated`].
    pub fn clear_admin_token(&self) -> Result<(), StoreError> {
        for key in [ADMIN_TOKEN_KEY, ADMIN_TOKEN_EXPIRY_KEY] {
            if let Err(e) = self.db.remove(key) {
                tracing::warn!(key, error = %e, "failed to remove admin token key");
                return Err(StoreError::Storage(e.to_string()));
            }
        }
        Ok(())
    }

    /// True when no expiry is recorded, the recorded expiry is unparsable, or
    /// the expiry is not in the future.
    pub fn is_admin_token_expired(&self) -> bool {
        match self.admin_token_expiry() {
            Some(expiry) => expiry <= Utc::now(),
            None => true,
        }
    }

    fn admin_token_expiry(&self) -> Option<DateTime<Utc>> {
        let raw = self.read_string(ADMIN_TOKEN_EXPIRY_KEY)?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(e) => {
                tracing::warn!(error = %e, "stored admin token expiry is unparsable; treating token as expired");
                None
            }
        }
    }

    // -------------------------------------------------------------------------
    // Export / import / wipe
    // -------------------------------------------------------------------------

    /// Read-only aggregate of all conversations and personas for backup.
    /// Never fails; personas that were never accessed fall back to their
    /// presets and an empty log.
    pub fn export_snapshot(&self) -> Snapshot {
        let mut conversations = self.read_json_map::<Vec<Message>>(CONVERSATIONS_KEY);
        let mut personas = self.read_json_map::<PersonaConfig>(PERSONAS_KEY);
        for id in KNOWN_PERSONA_IDS {
            conversations.entry(id.to_string()).or_default();
            personas
                .entry(id.to_string())
                .or_insert_with(|| builtin_config(id).unwrap_or_else(|| fallback_config(id)));
        }
        Snapshot {
            conversations,
            personas,
            export_date: Utc::now(),
        }
    }

    /// Restores conversations and/or personas from a snapshot document.
    ///
    /// The whole document is validated before anything is written: a
    /// non-object, or a present top-level key that does not deserialize,
    /// yields [`StoreError::Validation`] and leaves the store untouched.
    /// Present keys overwrite their namespace wholesale; absent keys are not
    /// deleted.
    pub fn import_snapshot(&self, data: &serde_json::Value) -> Result<(), StoreError> {
        let obj = data
            .as_object()
            .ok_or_else(|| StoreError::Validation("snapshot must be a JSON object".into()))?;

        let conversations = obj
            .get("conversations")
            .map(|v| {
                serde_json::from_value::<BTreeMap<String, Vec<Message>>>(v.clone())
                    .map_err(|e| StoreError::Validation(format!("conversations: {e}")))
            })
            .transpose()?;
        let personas = obj
            .get("personas")
            .map(|v| {
                serde_json::from_value::<BTreeMap<String, PersonaConfig>>(v.clone())
                    .map_err(|e| StoreError::Validation(format!("personas: {e}")))
            })
            .transpose()?;

        if let Some(map) = conversations {
            self.write_json_map(CONVERSATIONS_KEY, &map)?;
        }
        if let Some(map) = personas {
            self.write_json_map(PERSONAS_KEY, &map)?;
        }
        Ok(())
    }

    /// Wipes all durable state and lowers the session flag.
    pub fn clear_everything(&self) -> Result<(), StoreError> {
        self.admin_authenticated.store(false, Ordering::Relaxed);
        self.db.clear().map_err(|e| {
            tracing::warn!(error = %e, "failed to clear store");
            StoreError::Storage(e.to_string())
        })
    }

    // -------------------------------------------------------------------------
    // Substrate access: every failure is logged here and converted
    // -------------------------------------------------------------------------

    fn read_json_map<T: DeserializeOwned>(&self, key: &str) -> BTreeMap<String, T> {
        let bytes = match self.db.get(key) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return BTreeMap::new(),
            Err(e) => {
                tracing::warn!(key, error = %e, "substrate read failed; treating as empty");
                return BTreeMap::new();
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(map) => map,
            Err(e) => {
                tracing::warn!(key, error = %e, "stored document is unparsable; treating as empty");
                BTreeMap::new()
            }
        }
    }

    fn write_json_map<T: Serialize>(
        &self,
        key: &str,
        map: &BTreeMap<String, T>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(map).map_err(|e| {
            tracing::warn!(key, error = %e, "failed to serialize document");
            StoreError::Storage(e.to_string())
        })?;
        self.db.insert(key, bytes).map(|_| ()).map_err(|e| {
            tracing::warn!(key, error = %e, "substrate write failed");
            StoreError::Storage(e.to_string())
        })
    }

    fn read_string(&self, key: &str) -> Option<String> {
        match self.db.get(key) {
            Ok(Some(bytes)) => match String::from_utf8(bytes.to_vec()) {
                Ok(s) => Some(s),
                Err(e) => {
                    tracing::warn!(key, error = %e, "stored string is not UTF-8; treating as unset");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "substrate read failed; treating as unset");
                None
            }
        }
    }

    fn write_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.db
            .insert(key, value.as_bytes())
            .map(|_| ())
            .map_err(|e| {
                tracing::warn!(key, error = %e, "substrate write failed");
                StoreError::Storage(e.to_string())
            })
    }
}
