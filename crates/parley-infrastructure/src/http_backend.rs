//! HTTP implementation of the `BackendClient` contract.
//!
//! Error classification matters here: an HTTP status error means the
//! backend answered and rejected the request (definitive), while a
//! transport error (connect failure, timeout) leaves the remote outcome
//! unknown (transient). The sync coordinator only rolls optimistic
//! state back on definitive failures.

use async_trait::async_trait;
use parley_core::backend::{BackendClient, ChatReply, HealthReport, RemoteSession};
use parley_core::error::{ParleyError, Result};
use parley_core::session::{Message, MessageKind, MessageRole, ModelConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

pub struct HttpBackendClient {
    http: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpBackendClient {
    pub fn new(base_url: impl Into<String>, api_token: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ParleyError::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Maps a non-2xx response to a definitive backend error carrying
    /// the status and a snippet of the body.
    async fn expect_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let snippet: String = body.chars().take(200).collect();
        Err(ParleyError::backend_definitive(format!(
            "{}: {}",
            status, snippet
        )))
    }
}

fn transport_error(err: reqwest::Error) -> ParleyError {
    ParleyError::backend_transient(err.to_string())
}

// -- Wire types --

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    session_id: &'a str,
    messages: Vec<WireMessage<'a>>,
    model_options: &'a ModelConfig,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: MessageRole,
    content: &'a str,
    message_type: MessageKind,
}

#[derive(Debug, Deserialize)]
struct SendMessageResponse {
    message: String,
    message_id: i64,
    #[serde(default)]
    model_used: Option<String>,
    #[serde(default)]
    token_count: Option<u64>,
    #[serde(default)]
    processing_time: Option<f64>,
}

#[derive(Debug, Serialize)]
struct CreateSessionRequest<'a> {
    name: &'a str,
    model_options: &'a ModelConfig,
}

#[derive(Debug, Deserialize)]
struct CreateSessionResponse {
    id: i64,
    name: String,
    created_at: String,
}

#[async_trait]
impl BackendClient for HttpBackendClient {
    async fn send_message(
        &self,
        session_id: &str,
        messages: &[Message],
        config: &ModelConfig,
    ) -> Result<ChatReply> {
        let request = SendMessageRequest {
            session_id,
            messages: messages
                .iter()
                .map(|m| WireMessage {
                    role: m.role,
                    content: &m.content,
                    message_type: m.kind,
                })
                .collect(),
            model_options: config,
        };

        let response = self
            .apply_auth(self.http.post(self.url("/api/chat-text/chat")))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::expect_success(response).await?;
        let reply: SendMessageResponse = response.json().await.map_err(transport_error)?;

        let mut metadata = HashMap::new();
        if let Some(model) = reply.model_used {
            metadata.insert("model_used".to_string(), serde_json::Value::from(model));
        }
        if let Some(tokens) = reply.token_count {
            metadata.insert("token_count".to_string(), serde_json::Value::from(tokens));
        }
        if let Some(elapsed) = reply.processing_time {
            metadata.insert(
                "processing_time".to_string(),
                serde_json::Value::from(elapsed),
            );
        }

        Ok(ChatReply {
            content: reply.message,
            correlation_id: reply.message_id.to_string(),
            metadata,
        })
    }

    async fn create_session(&self, title: &str, config: &ModelConfig) -> Result<RemoteSession> {
        let response = self
            .apply_auth(self.http.post(self.url("/api/chat-text/sessions")))
            .json(&CreateSessionRequest {
                name: title,
                model_options: config,
            })
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::expect_success(response).await?;
        let created: CreateSessionResponse = response.json().await.map_err(transport_error)?;
        Ok(RemoteSession {
            id: created.id.to_string(),
            title: created.name,
            created_at: created.created_at,
        })
    }

    async fn delete_session(&self, session_id: &str) -> Result<()> {
        let response = self
            .apply_auth(
                self.http
                    .delete(self.url(&format!("/api/chat-text/sessions/{}", session_id))),
            )
            .send()
            .await
            .map_err(transport_error)?;
        Self::expect_success(response).await?;
        Ok(())
    }

    async fn check_health(&self) -> Result<HealthReport> {
        let response = self
            .apply_auth(self.http.get(self.url("/health")))
            .send()
            .await
            .map_err(transport_error)?;
        let response = Self::expect_success(response).await?;
        response.json().await.map_err(transport_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::session::MessageDraft;

    #[test]
    fn test_base_url_trailing_slash_is_normalized() {
        let client = HttpBackendClient::new("http://api.test/", None).unwrap();
        assert_eq!(client.url("/health"), "http://api.test/health");
    }

    #[test]
    fn test_send_request_wire_shape() {
        let message = MessageDraft::user("hi there").into_message();
        let config = ModelConfig::default();
        let request = SendMessageRequest {
            session_id: "s-1",
            messages: vec![WireMessage {
                role: message.role,
                content: &message.content,
                message_type: message.kind,
            }],
            model_options: &config,
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["session_id"], "s-1");
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["messages"][0]["message_type"], "text");
        assert_eq!(json["model_options"]["model"], "microsoft/DialoGPT-medium");
    }

    #[test]
    fn test_send_response_tolerates_missing_metadata() {
        let reply: SendMessageResponse =
            serde_json::from_str(r#"{"message": "hello", "message_id": 42}"#).unwrap();
        assert_eq!(reply.message, "hello");
        assert_eq!(reply.message_id, 42);
        assert!(reply.model_used.is_none());
    }
}
