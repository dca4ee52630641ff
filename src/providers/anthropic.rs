//! Anthropic provider implementation using the `/v1/messages` API.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::secrets::SecretValue;

use super::{check_http_response, CompletionProvider, CompletionRequest, ProviderError};

const MESSAGES_PATH: &str = "/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

// ---------------------------------------------------------------------------
// Wire types (pub for integration testing)
// ---------------------------------------------------------------------------

/// Anthropic messages API request body.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct AnthropicRequest<'a> {
    /// Model identifier.
    pub model: &'a str,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// System prompt, kept apart from user content.
    pub system: &'a str,
    /// Single-turn message list.
    pub messages: Vec<AnthropicMessage<'a>>,
}

/// A message in Anthropic format.
#[doc(hidden)]
#[derive(Debug, Serialize)]
pub struct AnthropicMessage<'a> {
    /// Always `"user"` for this single-turn client.
    pub role: &'a str,
    /// Plain-text content.
    pub content: &'a str,
}

/// Anthropic API response body; fields beyond `content` are ignored.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct AnthropicResponse {
    /// Content blocks in the response.
    pub content: Vec<AnthropicContentBlock>,
}

/// A content block in the Anthropic response.
#[doc(hidden)]
#[derive(Debug, Deserialize)]
pub struct AnthropicContentBlock {
    /// Block type, e.g. `"text"`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Text for `text` blocks.
    #[serde(default)]
    pub text: Option<String>,
}

// ---------------------------------------------------------------------------
// Request / Response builders (pub for integration testing)
// ---------------------------------------------------------------------------

/// Build an Anthropic API request from a completion request.
#[doc(hidden)]
pub fn build_request(request: &CompletionRequest) -> AnthropicRequest<'_> {
    AnthropicRequest {
        model: &request.model,
        max_tokens: request.max_tokens,
        temperature: request.temperature,
        system: &request.system_prompt,
        messages: vec![AnthropicMessage {
            role: "user",
            content: &request.user_prompt,
        }],
    }
}

/// Parse an Anthropic API response and return the first block's text.
///
/// # Errors
///
/// Returns `ProviderError::Parse` if the body cannot be deserialized or the
/// first block has no text, and `ProviderError::EmptyResponse` if there are
/// no content blocks at all.
#[doc(hidden)]
pub fn parse_response(body: &str) -> Result<String, ProviderError> {
    let resp: AnthropicResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::Parse(e.to_string()))?;

    let first = resp
        .content
        .into_iter()
        .next()
        .ok_or(ProviderError::EmptyResponse)?;

    first.text.ok_or_else(|| {
        ProviderError::Parse(format!(
            "first content block of type {:?} has no text",
            first.kind
        ))
    })
}

// ---------------------------------------------------------------------------
// Provider
// ---------------------------------------------------------------------------

/// Anthropic messages API provider.
#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    /// Create a provider for `base_url` whose HTTP client gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `ProviderError::Request` if the HTTP client cannot be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self {
            url: format!("{}{MESSAGES_PATH}", base_url.trim_end_matches('/')),
            client,
        })
    }

    /// Full endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait::async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn send(
        &self,
        request: &CompletionRequest,
        api_key: &SecretValue,
    ) -> Result<String, ProviderError> {
        let api_request = build_request(request);

        let response = self
            .client
            .post(&self.url)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .header("x-api-key", api_key.expose())
            .json(&api_request)
            .send()
            .await?;

        let payload = check_http_response(response).await?;
        parse_response(&payload)
    }

    fn name(&self) -> &str {
        "anthropic"
    }
}
