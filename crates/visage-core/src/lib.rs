//! visage-core: persona chat core library.
//!
//! Two components carry the weight: [`ConversationStore`], the persona-scoped
//! persistent store for conversation logs, persona overrides, and the admin
//! session; and [`CompletionGateway`], which turns a `(persona, user text)`
//! pair into one chat-completion request and normalizes the outcome. The UI
//! layer (see the `visage-gateway` add-on) reads and writes through the store
//! and calls the gateway; the two components only meet where the gateway
//! reads persona configuration from the store at call time.

mod auth;
mod config;
mod error;
mod gateway;
mod personas;
mod shared;
mod store;

// Shared types and storage keys
pub use shared::{
    AdminSession, Message, PersonaConfig, Role, Snapshot, ADMIN_TOKEN_EXPIRY_KEY, ADMIN_TOKEN_KEY,
    CONVERSATIONS_KEY, CURRENT_PERSONA_KEY, PERSONAS_KEY,
};

// Persona presets and the completion-path fallback chain
pub use personas::{
    builtin_config, fallback_config, resolve_model, resolve_system_prompt, DEFAULT_PERSONA_ID,
    KNOWN_PERSONA_IDS,
};

// Persistent store
pub use store::ConversationStore;

// Completion gateway
pub use gateway::CompletionGateway;

// Admin authentication
pub use auth::{AdminAuthClient, AdminSessionOutcome};

// Error taxonomy
pub use error::{RemoteError, StoreError};

// Configuration (service layer + user overrides)
pub use config::{GatewayConfig, UserConfig};
