// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Remote completion service.
//!
//! Commitzilla asks an OpenAI-compatible chat completions endpoint to do the
//! actual rewriting. One request is made per commit: a system message holding
//! the instruction, and a user message holding the commit text. There are no
//! retries, a failed call simply means the original message is kept.

use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Chat completions endpoint used unless told otherwise.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Upper bound on the length of a rewritten message.
pub const MAX_TOKENS: u32 = 100;

/// Everything needed for one rewrite request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub model: String,
    pub instruction: String,
    pub message: String,
}

/// Layer of indirection for the completion service.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Request a completion and return the trimmed text of the first choice.
    async fn complete(&self, request: &CompletionRequest, api_key: &str) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
}

impl<'a> From<&'a CompletionRequest> for ChatRequest<'a> {
    fn from(request: &'a CompletionRequest) -> Self {
        Self {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.instruction,
                },
                ChatMessage {
                    role: "user",
                    content: &request.message,
                },
            ],
            max_tokens: MAX_TOKENS,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Debug, Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

impl ChatResponse {
    fn into_text(self) -> Result<String> {
        self.choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::EmptyResponse)
    }
}

/// Client for OpenAI-compatible chat completion endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiClient {
    endpoint: String,
    http: Client,
}

impl OpenAiClient {
    /// Construct client for [`DEFAULT_ENDPOINT`].
    ///
    /// # Errors
    ///
    /// - Return [`CompletionError::Transport`] if the HTTP client cannot be
    ///   initialized.
    pub fn new() -> Result<Self> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    /// Construct client for a custom endpoint.
    ///
    /// # Errors
    ///
    /// - Return [`CompletionError::Transport`] if the HTTP client cannot be
    ///   initialized.
    pub fn with_endpoint(endpoint: impl Into<String>) -> Result<Self> {
        Ok(Self {
            endpoint: endpoint.into(),
            http: Client::builder().build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Completion for OpenAiClient {
    #[instrument(skip(self, request, api_key), level = "debug")]
    async fn complete(&self, request: &CompletionRequest, api_key: &str) -> Result<String> {
        debug!("request completion from {} with {}", self.endpoint, request.model);
        let response = self
            .http
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .bearer_auth(api_key)
            .json(&ChatRequest::from(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(CompletionError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        response.json::<ChatResponse>().await?.into_text()
    }
}

/// Completion error types.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Service answered with a non-success status.
    #[error("completion service returned {status} {reason}")]
    Status { status: u16, reason: String },

    /// Request could not be sent, or the reply could not be decoded.
    #[error(transparent)]
    Transport(#[from] reqwest::Error),

    /// Reply carried no usable text.
    #[error("completion service returned no text")]
    EmptyResponse,
}

/// Friendly result alias :3
pub type Result<T, E = CompletionError> = std::result::Result<T, E>;


#[cfg(test)]
mod tests {
    use super::*;
    use one_shot::OneShotServer;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "gpt-4o-mini".into(),
            instruction: "Talk like Shakespeare.".into(),
            message: "fix typo".into(),
        }
    }

    fn split_request(raw: &str) -> (String, serde_json::Value) {
        let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw, ""));
        (
            head.to_ascii_lowercase(),
            serde_json::from_str(body).unwrap_or(serde_json::Value::Null),
        )
    }

    #[tokio::test]
    async fn complete_posts_chat_request() -> anyhow::Result<()> {
        let server = OneShotServer::start(
            "200 OK",
            r#"{"choices": [{"index": 0, "message": {"role": "assistant", "content": "  Lo! I hath mended a typo!\n"}}]}"#,
        )
        .await?;
        let client = OpenAiClient::with_endpoint(server.endpoint())?;

        let result = client.complete(&request(), "sk-test").await?;
        assert_eq!(result, "Lo! I hath mended a typo!");

        let (head, body) = split_request(&server.request().await?);
        let lines = head.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "post /v1/chat/completions http/1.1");
        assert!(lines.contains(&"authorization: bearer sk-test"));
        assert!(lines.contains(&"content-type: application/json"));
        assert_eq!(
            body,
            json!({
                "model": "gpt-4o-mini",
                "messages": [
                    {"role": "system", "content": "Talk like Shakespeare."},
                    {"role": "user", "content": "fix typo"},
                ],
                "max_tokens": 100,
            })
        );

        Ok(())
    }

    #[tokio::test]
    async fn complete_maps_error_status() -> anyhow::Result<()> {
        let server = OneShotServer::start(
            "401 Unauthorized",
            r#"{"error": {"message": "Incorrect API key provided"}}"#,
        )
        .await?;
        let client = OpenAiClient::with_endpoint(server.endpoint())?;

        let result = client.complete(&request(), "sk-wrong").await;
        assert!(matches!(
            &result,
            Err(CompletionError::Status { status: 401, reason }) if reason == "Unauthorized"
        ));
        server.request().await?;

        Ok(())
    }

    #[tokio::test]
    async fn complete_rejects_reply_without_text() -> anyhow::Result<()> {
        let server = OneShotServer::start("200 OK", r#"{"choices": []}"#).await?;
        let client = OpenAiClient::with_endpoint(server.endpoint())?;

        let result = client.complete(&request(), "sk-test").await;
        assert!(matches!(result, Err(CompletionError::EmptyResponse)));
        server.request().await?;

        Ok(())
    }

    #[test]
    fn request_body_layout() -> anyhow::Result<()> {
        let request = CompletionRequest {
            model: "gpt-4o-mini".into(),
            instruction: "Talk like a pirate.".into(),
            message: "fix typo".into(),
        };

        let result = serde_json::to_value(ChatRequest::from(&request))?;
        let expect = json!({
            "model": "gpt-4o-mini",
            "messages": [
                {"role": "system", "content": "Talk like a pirate."},
                {"role": "user", "content": "fix typo"},
            ],
            "max_tokens": 100,
        });
        assert_eq!(result, expect);

        Ok(())
    }

    #[test]
    fn reply_takes_first_choice_trimmed() -> anyhow::Result<()> {
        let response: ChatResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "  Arr, fixed!\n"}},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}},
            ],
        }))?;
        assert_eq!(response.into_text()?, "Arr, fixed!");

        Ok(())
    }

    #[test]
    fn reply_without_text_is_empty() -> anyhow::Result<()> {
        for body in [
            json!({"choices": []}),
            json!({}),
            json!({"choices": [{"message": {"role": "assistant", "content": null}}]}),
            json!({"choices": [{"message": {"role": "assistant", "content": "   "}}]}),
        ] {
            let response: ChatResponse = serde_json::from_value(body)?;
            assert!(matches!(
                response.into_text(),
                Err(CompletionError::EmptyResponse)
            ));
        }

        Ok(())
    }

    #[test]
    fn status_error_names_status_and_reason() {
        let err = CompletionError::Status {
            status: 401,
            reason: "Unauthorized".into(),
        };
        assert_eq!(err.to_string(), "completion service returned 401 Unauthorized");
    }
}
