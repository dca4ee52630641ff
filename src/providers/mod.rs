//! Completion provider abstraction layer.
//!
//! Defines the provider-agnostic [`CompletionRequest`], the
//! [`CompletionProvider`] trait and the shared [`ProviderError`] type.
//! Wire field names live only in provider modules:
//! - [`anthropic::AnthropicProvider`]: Anthropic `/v1/messages` API
//!
//! Retry, timeout and classification policy is not a provider concern; see
//! [`crate::client::CompletionClient`].

use std::time::Duration;

use async_trait::async_trait;

use crate::redactor::Redactor;
use crate::secrets::SecretValue;

pub mod anthropic;

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// A single-turn completion request, built fresh for each submission.
#[derive(Clone, PartialEq)]
pub struct CompletionRequest {
    /// Fixed assistant persona, sent separately from user text.
    pub system_prompt: String,
    /// Rendered intake form.
    pub user_prompt: String,
    /// Model identifier.
    pub model: String,
    /// Maximum tokens in the response.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
}

impl std::fmt::Debug for CompletionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The user prompt carries patient data; only its size is shown.
        f.debug_struct("CompletionRequest")
            .field("system_prompt_chars", &self.system_prompt.chars().count())
            .field("user_prompt_chars", &self.user_prompt.chars().count())
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors returned by completion providers.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// HTTP transport failure from the client library.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Connection-level failure reported without a `reqwest` error.
    #[error("provider connection failed: {0}")]
    Connection(String),
    /// No response within the per-attempt deadline.
    #[error("provider did not respond within {0:?}")]
    Timeout(Duration),
    /// Upstream provider responded with an error status.
    #[error("provider returned non-success status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitized response body.
        body: String,
    },
    /// Response did not match expected schema.
    #[error("provider response parse error: {0}")]
    Parse(String),
    /// Response parsed but held no content blocks.
    #[error("empty response")]
    EmptyResponse,
}

impl ProviderError {
    /// HTTP status code, when the provider returned one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP helpers
// ---------------------------------------------------------------------------

/// Check HTTP response status and return body text or a structured error.
///
/// Error bodies are redacted and truncated before they are stored.
///
/// # Errors
///
/// Returns `ProviderError::Request` on transport failure, `ProviderError::HttpStatus` on non-2xx.
pub async fn check_http_response(response: reqwest::Response) -> Result<String, ProviderError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ProviderError::HttpStatus {
            status: status.as_u16(),
            body: Redactor::default().scrub_detail(&body),
        });
    }
    Ok(body)
}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// One outbound call to a completion provider.
///
/// Implementations translate [`CompletionRequest`] into their wire format,
/// send it once, and return the text of the first content block. They do
/// not retry; callers own that policy.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Send the request once and extract the reply text.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, status, or parse failure.
    async fn send(
        &self,
        request: &CompletionRequest,
        api_key: &SecretValue,
    ) -> Result<String, ProviderError>;

    /// Short provider name for logs.
    fn name(&self) -> &str;
}
