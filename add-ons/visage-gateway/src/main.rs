//! visage-gateway: HTTP surface for the persona chat core.
//!
//! The browser client is stateless: it renders what these routes return and
//! never holds the completion credential. All conversation, persona, and
//! admin semantics live in `visage-core`; this binary only wires the store,
//! the completion gateway, and the auth client to axum routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use visage_core::{
    AdminAuthClient, CompletionGateway, ConversationStore, GatewayConfig, Message, PersonaConfig,
    RemoteError, StoreError, UserConfig, KNOWN_PERSONA_IDS,
};

#[derive(Clone)]
struct AppState {
    store: Arc<ConversationStore>,
    completions: Arc<CompletionGateway>,
    auth: Arc<AdminAuthClient>,
}

/// JSON error envelope with the status the core's error kinds map to.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<RemoteError> for ApiError {
    fn from(err: RemoteError) -> Self {
        let status = match err {
            RemoteError::Validation(_) => StatusCode::BAD_REQUEST,
            RemoteError::AuthExpired => StatusCode::UNAUTHORIZED,
            RemoteError::Permission => StatusCode::FORBIDDEN,
            RemoteError::Connectivity(_)
            | RemoteError::Upstream { .. }
            | RemoteError::MalformedResponse(_) => StatusCode::BAD_GATEWAY,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let status = match err {
            StoreError::Validation(_) => StatusCode::BAD_REQUEST,
            StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env first: the completion key stays in backend configuration and
    // is never sent to or accepted from the browser client.
    if let Err(e) = dotenvy::dotenv() {
        eprintln!("[visage-gateway] .env not loaded: {e} (using system environment)");
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match GatewayConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("[visage-gateway] configuration error: {e}");
            std::process::exit(1);
        }
    };

    let store_path = std::path::Path::new(&config.storage_path).join("visage_store");
    let store = match ConversationStore::open_path(&store_path) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("[visage-gateway] cannot open store at {}: {e}", store_path.display());
            std::process::exit(1);
        }
    };

    let has_key = UserConfig::load()
        .ok()
        .and_then(|user| user.get_api_key())
        .is_some();
    if !has_key {
        tracing::warn!(
            "no completion API key configured; set VISAGE_API_KEY (or user_config.toml) for live replies"
        );
    }

    let state = AppState {
        store: Arc::new(store),
        completions: Arc::new(CompletionGateway::from_config(&config)),
        auth: Arc::new(AdminAuthClient::new(config.auth_endpoint.clone())),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/conversations", delete(clear_all_conversations))
        .route(
            "/api/v1/conversations/:persona_id",
            get(get_conversation).delete(clear_conversation),
        )
        .route("/api/v1/personas", get(list_personas))
        .route(
            "/api/v1/personas/:persona_id",
            get(get_persona).put(save_persona),
        )
        .route(
            "/api/v1/persona/current",
            get(current_persona).post(set_current_persona),
        )
        .route("/api/v1/admin/login", post(admin_login))
        .route("/api/v1/admin/logout", post(admin_logout))
        .route("/api/v1/admin/session", get(admin_session))
        .route("/api/v1/admin/verify", get(admin_verify))
        .route("/api/v1/export", get(export_snapshot))
        .route("/api/v1/import", post(import_snapshot))
        .route("/api/v1/storage", delete(clear_storage))
        .layer(cors)
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(app = %config.app_name, %addr, "gateway listening");
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("[visage-gateway] cannot bind {addr}: {e}");
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        eprintln!("[visage-gateway] server error: {e}");
        std::process::exit(1);
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// -----------------------------------------------------------------------------
// Chat
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChatBody {
    /// Defaults to the store's current persona when omitted.
    persona_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatReply {
    persona_id: String,
    reply: String,
}

/// POST /api/v1/chat: one conversation turn.
///
/// The user's message is persisted before the completion call; the assistant
/// reply is persisted only on success. A failed turn is returned to the
/// client for inline display and never written to the log, so exported
/// history stays free of error noise.
async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatBody>,
) -> Result<Json<ChatReply>, ApiError> {
    let persona_id = body
        .persona_id
        .unwrap_or_else(|| state.store.current_persona_id());
    let text = body.message.trim();
    if text.is_empty() {
        return Err(RemoteError::Validation("message must not be empty".into()).into());
    }

    // Storage hiccups are already logged by the store and must not kill the
    // turn; the reply the client receives is the source of truth for it.
    let _ = state.store.append_message(&persona_id, Message::user(text));

    let reply = state
        .completions
        .get_response(&state.store, &persona_id, text)
        .await?;

    let _ = state
        .store
        .append_message(&persona_id, Message::assistant(reply.clone()));
    Ok(Json(ChatReply { persona_id, reply }))
}

// -----------------------------------------------------------------------------
// Conversations
// -----------------------------------------------------------------------------

async fn get_conversation(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
) -> Json<Vec<Message>> {
    Json(state.store.get_log(&persona_id))
}

async fn clear_conversation(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.store.clear_log(&persona_id)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_all_conversations(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.clear_all_logs()?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Personas
// -----------------------------------------------------------------------------

async fn list_personas(State(state): State<AppState>) -> Json<Vec<PersonaConfig>> {
    let personas = KNOWN_PERSONA_IDS
        .iter()
        .map(|id| state.store.get_persona_config(id))
        .collect();
    Json(personas)
}

async fn get_persona(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
) -> Json<PersonaConfig> {
    Json(state.store.get_persona_config(&persona_id))
}

async fn save_persona(
    State(state): State<AppState>,
    Path(persona_id): Path<String>,
    Json(config): Json<PersonaConfig>,
) -> Result<Json<PersonaConfig>, ApiError> {
    state.store.save_persona_config(&persona_id, config)?;
    Ok(Json(state.store.get_persona_config(&persona_id)))
}

#[derive(Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CurrentPersona {
    persona_id: String,
}

async fn current_persona(State(state): State<AppState>) -> Json<CurrentPersona> {
    Json(CurrentPersona {
        persona_id: state.store.current_persona_id(),
    })
}

async fn set_current_persona(
    State(state): State<AppState>,
    Json(body): Json<CurrentPersona>,
) -> Result<StatusCode, ApiError> {
    state.store.set_current_persona_id(&body.persona_id)?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Admin
// -----------------------------------------------------------------------------

#[derive(Deserialize)]
struct LoginBody {
    code: String,
}

async fn admin_login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<visage_core::AdminSessionOutcome>, ApiError> {
    let outcome = state.auth.login(&state.store, &body.code).await?;
    Ok(Json(outcome))
}

async fn admin_logout(State(state): State<AppState>) -> StatusCode {
    state.auth.logout(&state.store);
    StatusCode::NO_CONTENT
}

/// Local session view. The token itself never leaves the backend; the client
/// only learns whether the gate is up and when it falls.
async fn admin_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    let session = state.store.admin_session();
    Json(json!({
        "authenticated": session.authenticated,
        "tokenExpiry": session.token_expiry,
        "tokenExpired": state.store.is_admin_token_expired(),
    }))
}

async fn admin_verify(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.auth.verify(&state.store).await?;
    Ok(StatusCode::NO_CONTENT)
}

// -----------------------------------------------------------------------------
// Export / import / wipe
// -----------------------------------------------------------------------------

async fn export_snapshot(State(state): State<AppState>) -> Json<visage_core::Snapshot> {
    Json(state.store.export_snapshot())
}

async fn import_snapshot(
    State(state): State<AppState>,
    Json(document): Json<serde_json::Value>,
) -> Result<StatusCode, ApiError> {
    state.store.import_snapshot(&document)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn clear_storage(State(state): State<AppState>) -> Result<StatusCode, ApiError> {
    state.store.clear_everything()?;
    Ok(StatusCode::NO_CONTENT)
}
