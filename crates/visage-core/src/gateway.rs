//! Chat-completion gateway: turns `(persona, user text)` into one request
//! against the configured completion endpoint and normalizes the outcome.
//!
//! The credential stays on this side of the wire: browser clients talk to
//! the visage HTTP service, never to the completion provider directly. The
//! gateway holds no state of its own; persona configuration is read from the
//! [`ConversationStore`] at call time.

use crate::config::{GatewayConfig, UserConfig};
use crate::error::RemoteError;
use crate::personas::{resolve_model, resolve_system_prompt};
use crate::store::ConversationStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// OpenAI-compatible request/response shapes. Anything the success path does
// not recognize is rejected as malformed rather than probed dynamically.

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatTurn>,
}

#[derive(Serialize)]
struct ChatTurn {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

#[derive(Deserialize)]
struct UpstreamErrorBody {
    error: UpstreamErrorDetail,
}

/// Providers disagree on the error body: some send `{"error": "boom"}`,
/// OpenAI-compatible ones send `{"error": {"message": "boom"}}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum UpstreamErrorDetail {
    Detailed { message: String },
    Plain(String),
}

/// Extracts a human-readable message from a non-success body, falling back
/// to a generic status line when the body is not a recognizable error
/// document.
pub(crate) fn upstream_message(status: u16, body: &str) -> String {
    match serde_json::from_str::<UpstreamErrorBody>(body) {
        Ok(parsed) => match parsed.error {
            UpstreamErrorDetail::Detailed { message } => message,
            UpstreamErrorDetail::Plain(message) => message,
        },
        Err(_) => format!("request failed with status {status}"),
    }
}

/// One-shot completion client for the configured endpoint.
pub struct CompletionGateway {
    endpoint: String,
    api_key: Option<String>,
    default_model: String,
    client: reqwest::Client,
}

impl CompletionGateway {
    /// Creates a gateway for `endpoint` with the default 60 s request timeout.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, DEFAULT_TIMEOUT)
    }

    /// Creates a gateway with an explicit request timeout. A stuck upstream
    /// fails the turn instead of blocking it forever.
    pub fn with_timeout(endpoint: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            default_model: String::new(),
            client,
        }
    }

    /// Attaches the bearer credential sent with every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into().trim().to_string();
        self.api_key = if key.is_empty() { None } else { Some(key) };
        self
    }

    /// Model used when neither the stored persona nor its preset names one.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Builds a gateway from service config plus the user's own overrides
    /// (`user_config.toml`, then environment).
    pub fn from_config(config: &GatewayConfig) -> Self {
        let user = UserConfig::load().unwrap_or_default();
        let endpoint = user
            .get_chat_endpoint()
            .unwrap_or_else(|| config.chat_endpoint.clone());
        let model = user
            .get_model()
            .unwrap_or_else(|| config.default_model.clone());
        let mut gateway =
            Self::with_timeout(endpoint, Duration::from_secs(config.request_timeout_secs))
                .with_default_model(model);
        if let Some(key) = user.get_api_key() {
            gateway = gateway.with_api_key(key);
        }
        gateway
    }

    /// Requests one assistant reply for `user_text` under `persona_id`'s
    /// system prompt and model.
    ///
    /// The exchange is exactly two messages (system + user). The call holds
    /// no local state and is idempotent from this side, but the upstream may
    /// bill per request; a retry happens only when the connection itself
    /// could not be established, never after a response (or a timeout) on a
    /// request that may have been processed.
    pub async fn get_response(
        &self,
        store: &ConversationStore,
        persona_id: &str,
        user_text: &str,
    ) -> Result<String, RemoteError> {
        let body = ChatRequest {
            model: resolve_model(store, persona_id, &self.default_model),
            messages: vec![
                ChatTurn {
                    role: "system",
                    content: resolve_system_prompt(store, persona_id),
                },
                ChatTurn {
                    role: "user",
                    content: user_text.to_string(),
                },
            ],
        };

        let response = self.send_with_one_retry(&body).await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(RemoteError::Upstream {
                status: status.as_u16(),
                message: upstream_message(status.as_u16(), &text),
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;
        match parsed.choices.into_iter().next() {
            Some(choice) => Ok(choice.message.content),
            None => Err(RemoteError::MalformedResponse(
                "response carried no choices".into(),
            )),
        }
    }

    async fn send_with_one_retry(&self, body: &ChatRequest) -> Result<reqwest::Response, RemoteError> {
        let mut retried = false;
        loop {
            let mut request = self.client.post(&self.endpoint).json(body);
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {}", key));
            }
            match request.send().await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_connect() && !retried => {
                    retried = true;
                    tracing::warn!(error = %e, "completion endpoint unreachable; retrying once");
                    tokio::time::sleep(Duration::from_millis(250)).await;
                }
                Err(e) => return Err(RemoteError::Connectivity(e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_message_reads_plain_error_field() {
        assert_eq!(upstream_message(500, r#"{"error":"boom"}"#), "boom");
    }

    #[test]
    fn upstream_message_reads_nested_error_field() {
        assert_eq!(
            upstream_message(429, r#"{"error":{"message":"slow down"}}"#),
            "slow down"
        );
    }

    #[test]
    fn upstream_message_falls_back_to_status_line() {
        assert_eq!(
            upstream_message(503, "<html>bad gateway</html>"),
            "request failed with status 503"
        );
        assert_eq!(upstream_message(500, ""), "request failed with status 500");
    }
}
