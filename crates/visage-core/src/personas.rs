//! Built-in persona presets and the fallback chain.
//!
//! The preset table is fixed; user edits are stored as overrides in the
//! ConversationStore and never mutate this table. Unknown persona ids never
//! fail a lookup: configuration reads synthesize a generic config, while the
//! completion path routes unknown ids to the default persona's prompt.

use crate::shared::PersonaConfig;
use crate::store::ConversationStore;
use once_cell::sync::Lazy;

/// Persona selected when nothing is stored and when an unknown id reaches the
/// completion path.
pub const DEFAULT_PERSONA_ID: &str = "companion";

/// The fixed set of persona ids the UI ships with.
pub const KNOWN_PERSONA_IDS: [&str; 3] = ["companion", "code", "study"];

static BUILTIN_PERSONAS: Lazy<Vec<PersonaConfig>> = Lazy::new(|| {
    vec![
        PersonaConfig {
            id: "companion".into(),
            display_name: "Companion".into(),
            personality: "Warm, curious, and attentive. Remembers the thread of the \
                          conversation and asks follow-up questions."
                .into(),
            tone: 7,
            system_prompt: "You are a friendly companion. Hold a natural, warm \
                            conversation: listen closely, refer back to what the user \
                            has said, and keep replies concise unless asked to go \
                            deeper. Never lecture."
                .into(),
            model: "meta-llama/llama-3.3-70b-instruct".into(),
        },
        PersonaConfig {
            id: "code".into(),
            display_name: "Code Assistant".into(),
            personality: "Precise and pragmatic. Prefers working examples over theory."
                .into(),
            tone: 3,
            system_prompt: "You are a programming assistant. Answer with runnable code \
                            first, then a short explanation. State assumptions \
                            explicitly and point out edge cases the user has not \
                            mentioned."
                .into(),
            model: "qwen/qwen-2.5-coder-32b-instruct".into(),
        },
        PersonaConfig {
            id: "study".into(),
            display_name: "Study Tutor".into(),
            personality: "Patient and structured. Checks understanding before moving on."
                .into(),
            tone: 5,
            system_prompt: "You are a study tutor. Break topics into small steps, ask \
                            one check-in question after each explanation, and adapt to \
                            the user's answers instead of pushing forward on a fixed \
                            script."
                .into(),
            model: "meta-llama/llama-3.3-70b-instruct".into(),
        },
    ]
});

/// Returns the built-in preset for `id`, if it is one of the shipped personas.
pub fn builtin_config(id: &str) -> Option<PersonaConfig> {
    BUILTIN_PERSONAS.iter().find(|p| p.id == id).cloned()
}

/// Synthesizes a generic config for an id outside the shipped set: the
/// capitalized id as display name and a neutral personality/tone/prompt.
pub fn fallback_config(id: &str) -> PersonaConfig {
    PersonaConfig {
        id: id.to_string(),
        display_name: capitalize(id),
        personality: "A helpful assistant.".into(),
        tone: 5,
        system_prompt: "You are a helpful assistant. Answer clearly and concisely.".into(),
        model: String::new(),
    }
}

/// Resolves the system prompt for a completion request: stored non-empty
/// prompt, else the built-in prompt for the id, else the default persona's
/// built-in prompt (unknown ids are logged).
pub fn resolve_system_prompt(store: &ConversationStore, persona_id: &str) -> String {
    if let Some(stored) = store.stored_persona_config(persona_id) {
        if !stored.system_prompt.trim().is_empty() {
            return stored.system_prompt;
        }
    }
    if let Some(builtin) = builtin_config(persona_id) {
        return builtin.system_prompt;
    }
    tracing::warn!(
        persona = persona_id,
        "unknown persona id; using the {DEFAULT_PERSONA_ID} prompt"
    );
    builtin_config(DEFAULT_PERSONA_ID)
        .map(|p| p.system_prompt)
        .unwrap_or_else(|| fallback_config(DEFAULT_PERSONA_ID).system_prompt)
}

/// Resolves the model identifier the same way the prompt is resolved,
/// finishing at `default_model` when neither the stored override nor a
/// built-in preset names one.
pub fn resolve_model(store: &ConversationStore, persona_id: &str, default_model: &str) -> String {
    if let Some(stored) = store.stored_persona_config(persona_id) {
        if !stored.model.trim().is_empty() {
            return stored.model;
        }
    }
    if let Some(builtin) = builtin_config(persona_id) {
        if !builtin.model.is_empty() {
            return builtin.model;
        }
    }
    default_model.to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
