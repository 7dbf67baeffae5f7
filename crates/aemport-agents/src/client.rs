//! Chat completion client for OpenAI-compatible services.

use std::time::Duration;

use aemport_core::CollaboratorError;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ServiceConfig;

/// Longest error body kept in an error message.
const MAX_ERROR_BODY: usize = 400;

/// A text model answering one system + user prompt pair.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, CollaboratorError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Map a non-success HTTP status to a collaborator error.
pub fn status_error(status: StatusCode, body: &str) -> CollaboratorError {
    let body: String = body.chars().take(MAX_ERROR_BODY).collect();
    let message = format!("HTTP {status}: {body}");
    match status.as_u16() {
        401 | 403 => CollaboratorError::Unauthorized(message),
        404 => CollaboratorError::InvalidConfig(message),
        408 => CollaboratorError::Timeout(message),
        429 => CollaboratorError::RateLimited(message),
        400 | 413 | 422 => CollaboratorError::MalformedInput(message),
        500..=599 => CollaboratorError::Unavailable(message),
        _ => CollaboratorError::Other(message),
    }
}

/// Map a transport failure to a collaborator error.
pub fn transport_error(err: &reqwest::Error) -> CollaboratorError {
    if err.is_timeout() {
        CollaboratorError::Timeout(err.to_string())
    } else if err.is_connect() {
        CollaboratorError::Connection(err.to_string())
    } else if err.is_decode() {
        CollaboratorError::MalformedResponse(err.to_string())
    } else if err.is_builder() {
        CollaboratorError::InvalidConfig(err.to_string())
    } else {
        CollaboratorError::Other(err.to_string())
    }
}

/// Text of the first choice in a chat completion body.
pub fn first_choice_text(body: &str) -> Result<String, CollaboratorError> {
    let parsed: ChatResponse = serde_json::from_str(body)
        .map_err(|e| CollaboratorError::MalformedResponse(format!("not a chat completion: {e}")))?;
    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| {
            CollaboratorError::MalformedResponse("completion has no content".to_string())
        })
}

/// `POST {api_base}/chat/completions` client.
pub struct OpenAiChatClient {
    config: ServiceConfig,
    http_client: reqwest::Client,
}

impl OpenAiChatClient {
    pub fn new(config: ServiceConfig) -> Result<Self, CollaboratorError> {
        let problems = config.problems();
        if !problems.is_empty() {
            return Err(CollaboratorError::InvalidConfig(problems.join("; ")));
        }
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("aemport/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CollaboratorError::InvalidConfig(e.to_string()))?;
        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }
}

#[async_trait]
impl ChatModel for OpenAiChatClient {
    async fn complete(
        &self,
        system: &str,
        user: &str,
        temperature: f32,
    ) -> Result<String, CollaboratorError> {
        let request = ChatRequest {
            model: &self.config.model,
            temperature,
            max_tokens: self.config.max_tokens,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: user,
                },
            ],
        };
        debug!(model = %self.config.model, prompt_chars = user.len(), "sending chat completion");

        let response = self
            .http_client
            .post(self.config.completions_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| transport_error(&e))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        first_choice_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aemport_core::{classify_error, ErrorClass};

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            status_error(StatusCode::UNAUTHORIZED, "bad key"),
            CollaboratorError::Unauthorized(_)
        ));
        assert!(matches!(
            status_error(StatusCode::TOO_MANY_REQUESTS, ""),
            CollaboratorError::RateLimited(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_GATEWAY, ""),
            CollaboratorError::Unavailable(_)
        ));
        assert!(matches!(
            status_error(StatusCode::BAD_REQUEST, "context length"),
            CollaboratorError::MalformedInput(_)
        ));
    }

    #[test]
    fn test_status_classes_drive_retry() {
        let retryable = status_error(StatusCode::SERVICE_UNAVAILABLE, "");
        let fatal = status_error(StatusCode::FORBIDDEN, "");
        assert_eq!(classify_error(&retryable), ErrorClass::Retryable);
        assert_eq!(classify_error(&fatal), ErrorClass::Fatal);
    }

    #[test]
    fn test_error_body_is_truncated() {
        let body = "x".repeat(5000);
        let err = status_error(StatusCode::INTERNAL_SERVER_ERROR, &body);
        assert!(err.to_string().len() < 600);
    }

    #[test]
    fn test_first_choice_text() {
        let body = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"hello"}}]}"#;
        assert_eq!(first_choice_text(body).unwrap(), "hello");
    }

    #[test]
    fn test_empty_completion_is_malformed() {
        let body = r#"{"choices":[]}"#;
        assert!(matches!(
            first_choice_text(body),
            Err(CollaboratorError::MalformedResponse(_))
        ));
        assert!(matches!(
            first_choice_text("<html>gateway</html>"),
            Err(CollaboratorError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_client_rejects_invalid_config() {
        let err = OpenAiChatClient::new(ServiceConfig::default()).err().unwrap();
        assert!(matches!(err, CollaboratorError::InvalidConfig(_)));
    }
}
