//! Integration tests for the ConversationStore: default configs, log
//! ordering, clear isolation, snapshot round-trips, and token expiry.

use chrono::{Duration, TimeZone, Utc};
use visage_core::{ConversationStore, Message, PersonaConfig, KNOWN_PERSONA_IDS};

fn open_store() -> (tempfile::TempDir, ConversationStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ConversationStore::open_path(dir.path()).unwrap();
    (dir, store)
}

#[test]
fn known_personas_have_defaults_without_any_save() {
    let (_dir, store) = open_store();
    for id in KNOWN_PERSONA_IDS {
        let cfg = store.get_persona_config(id);
        assert_eq!(cfg.id, id);
        assert!(!cfg.display_name.is_empty(), "{id} needs a display name");
        assert!(!cfg.system_prompt.is_empty(), "{id} needs a system prompt");
        assert!((1..=10).contains(&cfg.tone));
    }
}

#[test]
fn unknown_persona_synthesizes_generic_config() {
    let (_dir, store) = open_store();
    let cfg = store.get_persona_config("wizard");
    assert_eq!(cfg.display_name, "Wizard");
    assert!(!cfg.system_prompt.is_empty());
    // Not persisted: the stored view stays empty.
    assert!(store.stored_persona_config("wizard").is_none());
}

#[test]
fn append_preserves_order_and_fills_timestamps() {
    let (_dir, store) = open_store();
    let fixed = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();

    store
        .append_message("companion", Message::user("first"))
        .unwrap();
    store
        .append_message("companion", Message::assistant("second").with_timestamp(fixed))
        .unwrap();
    store
        .append_message("companion", Message::user("third"))
        .unwrap();

    let log = store.get_log("companion");
    assert_eq!(log.len(), 3);
    assert_eq!(log[0].text, "first");
    assert_eq!(log[1].text, "second");
    assert_eq!(log[2].text, "third");
    assert!(log[0].timestamp.is_some(), "omitted timestamp must be stamped");
    assert_eq!(log[1].timestamp, Some(fixed), "explicit timestamp must survive");
}

#[test]
fn clear_log_leaves_other_personas_alone() {
    let (_dir, store) = open_store();
    store
        .append_message("companion", Message::user("hello"))
        .unwrap();
    store.append_message("code", Message::user("fn main")).unwrap();

    store.clear_log("companion").unwrap();

    assert!(store.get_log("companion").is_empty());
    assert_eq!(store.get_log("code").len(), 1, "other logs must be untouched");
}

#[test]
fn clear_all_logs_empties_everything_in_one_pass() {
    let (_dir, store) = open_store();
    store
        .append_message("companion", Message::user("a"))
        .unwrap();
    store.append_message("study", Message::user("b")).unwrap();
    store.append_message("wizard", Message::user("c")).unwrap();

    store.clear_all_logs().unwrap();

    for id in ["companion", "code", "study", "wizard"] {
        assert!(store.get_log(id).is_empty(), "{id} should be empty");
    }
}

#[test]
fn current_persona_defaults_to_companion() {
    let (_dir, store) = open_store();
    assert_eq!(store.current_persona_id(), "companion");
    store.set_current_persona_id("code").unwrap();
    assert_eq!(store.current_persona_id(), "code");
}

#[test]
fn save_persona_config_overwrites_and_clamps() {
    let (_dir, store) = open_store();
    let config = PersonaConfig {
        id: "something-else".into(),
        display_name: "My Companion".into(),
        personality: "extra warm".into(),
        tone: 99,
        system_prompt: "You are extra warm.".into(),
        model: String::new(),
    };
    store.save_persona_config("companion", config).unwrap();

    let stored = store.stored_persona_config("companion").unwrap();
    assert_eq!(stored.id, "companion", "id field follows the storage key");
    assert_eq!(stored.display_name, "My Companion");
    assert_eq!(stored.tone, 10, "tone is clamped to 1-10");
}

#[test]
fn export_import_round_trips_into_a_fresh_store() {
    let (_dir, store) = open_store();
    let fixed = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
    store
        .append_message("companion", Message::user("hi").with_timestamp(fixed))
        .unwrap();
    store
        .append_message("companion", Message::assistant("hello!").with_timestamp(fixed))
        .unwrap();
    let mut custom = store.get_persona_config("study");
    custom.display_name = "Exam Coach".into();
    store.save_persona_config("study", custom).unwrap();

    let snapshot = store.export_snapshot();
    let document = serde_json::to_value(&snapshot).unwrap();

    let (_dir2, fresh) = open_store();
    fresh.import_snapshot(&document).unwrap();

    let log = fresh.get_log("companion");
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].text, "hi");
    assert_eq!(log[0].timestamp, Some(fixed));
    assert_eq!(
        fresh.get_persona_config("study").display_name,
        "Exam Coach",
        "persona overrides must survive the round trip"
    );
}

#[test]
fn export_covers_personas_never_accessed() {
    let (_dir, store) = open_store();
    let snapshot = store.export_snapshot();
    for id in KNOWN_PERSONA_IDS {
        assert!(snapshot.conversations.contains_key(id));
        assert!(snapshot.personas.contains_key(id));
        assert!(!snapshot.personas[id].system_prompt.is_empty());
    }
}

#[test]
fn malformed_import_changes_nothing_and_reports_failure() {
    let (_dir, store) = open_store();
    store
        .append_message("companion", Message::user("keep me"))
        .unwrap();

    assert!(store
        .import_snapshot(&serde_json::json!("just a string"))
        .is_err());
    assert!(store
        .import_snapshot(&serde_json::json!({ "conversations": "not a map" }))
        .is_err());
    assert!(store
        .import_snapshot(&serde_json::json!({ "personas": [1, 2, 3] }))
        .is_err());

    let log = store.get_log("companion");
    assert_eq!(log.len(), 1, "failed imports must not touch existing state");
    assert_eq!(log[0].text, "keep me");
}

#[test]
fn import_with_subset_of_keys_leaves_the_rest() {
    let (_dir, store) = open_store();
    store
        .append_message("companion", Message::user("original"))
        .unwrap();

    let document = serde_json::json!({
        "personas": {
            "code": {
                "id": "code",
                "displayName": "Rust Helper",
                "personality": "terse",
                "tone": 2,
                "systemPrompt": "You write Rust."
            }
        }
    });
    store.import_snapshot(&document).unwrap();

    assert_eq!(store.get_log("companion").len(), 1, "conversations untouched");
    assert_eq!(store.get_persona_config("code").display_name, "Rust Helper");
}

#[test]
fn token_expiry_cases() {
    let (_dir, store) = open_store();

    // No expiry recorded at all.
    assert!(store.is_admin_token_expired());

    // Expiry one hour in the past.
    store
        .set_admin_token("tok", Utc::now() - Duration::hours(1))
        .unwrap();
    assert!(store.is_admin_token_expired());

    // Expiry one hour in the future.
    store
        .set_admin_token("tok", Utc::now() + Duration::hours(1))
        .unwrap();
    assert!(!store.is_admin_token_expired());

    store.clear_admin_token().unwrap();
    assert!(store.is_admin_token_expired());
    assert!(store.admin_session().token.is_none());
}

#[test]
fn session_flag_is_independent_of_token() {
    let (_dir, store) = open_store();
    store.set_admin_authenticated(true);
    let session = store.admin_session();
    assert!(session.authenticated);
    assert!(session.token.is_none(), "flag does not imply a token");
    assert!(store.is_admin_token_expired(), "expiry stays authoritative");
}

#[test]
fn clear_everything_wipes_state_and_session() {
    let (_dir, store) = open_store();
    store
        .append_message("companion", Message::user("bye"))
        .unwrap();
    store.set_current_persona_id("study").unwrap();
    store
        .set_admin_token("tok", Utc::now() + Duration::hours(1))
        .unwrap();
    store.set_admin_authenticated(true);

    store.clear_everything().unwrap();

    assert!(store.get_log("companion").is_empty());
    assert_eq!(store.current_persona_id(), "companion");
    let session = store.admin_session();
    assert!(!session.authenticated);
    assert!(session.token.is_none());
}

#[test]
fn corrupt_conversations_blob_degrades_to_empty_and_recovers() {
    let dir = tempfile::tempdir().unwrap();
    {
        let db = sled::open(dir.path()).unwrap();
        db.insert("conversations", &b"}}}this is not json"[..]).unwrap();
        db.flush().unwrap();
    }

    let store = ConversationStore::open_path(dir.path()).unwrap();
    assert!(
        store.get_log("companion").is_empty(),
        "corruption is swallowed, not surfaced"
    );

    // The next write replaces the corrupt document.
    store
        .append_message("companion", Message::user("fresh start"))
        .unwrap();
    assert_eq!(store.get_log("companion").len(), 1);
}
