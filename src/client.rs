//! Lifecycle of one outbound completion call.
//!
//! [`CompletionClient`] wraps a [`CompletionProvider`] with a per-attempt
//! timeout, bounded retries with exponential backoff and jitter, failure
//! classification, and redaction of the API key from every failure detail.
//!
//! State machine per call:
//!
//! ```text
//! Idle -> Sending -> Success
//!                 -> Retrying -> Sending ...
//!                 -> Failed
//! ```
//!
//! Classification:
//!
//! | Provider outcome                         | Kind        | Retry            |
//! |------------------------------------------|-------------|------------------|
//! | connect failure, DNS, timeout, transport | `Transient` | up to the budget |
//! | HTTP 5xx (incl. 529 overloaded)          | `Transient` | up to the budget |
//! | HTTP 429                                 | `Rejected`  | at most once     |
//! | other HTTP 4xx                           | `Rejected`  | never            |
//! | unparseable body, no content blocks      | `Malformed` | never            |
//!
//! Dropping the future returned by [`CompletionClient::complete`] cancels the
//! in-flight request; nothing is spawned in the background.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::resolver::{ConfigError, ProviderConfig};
use crate::config::RetrySettings;
use crate::providers::{CompletionProvider, CompletionRequest, ProviderError};
use crate::redactor::Redactor;

/// Highest retry budget accepted from configuration.
pub const MAX_RETRY_BUDGET: u32 = 10;

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// Failure category surfaced to the presenter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Expected to succeed on retry: network, timeout, 5xx.
    Transient,
    /// The provider refused the request: auth, bad request, quota.
    Rejected,
    /// The provider answered with something unusable.
    Malformed,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Transient => "transient",
            Self::Rejected => "rejected",
            Self::Malformed => "malformed",
        })
    }
}

/// A classified failure with a redacted detail string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} failure: {detail}")]
pub struct CompletionFailure {
    /// Failure category.
    pub kind: FailureKind,
    /// Redacted, truncated diagnostic detail. Not meant for end users.
    pub detail: String,
    /// HTTP status, when the provider returned one.
    pub status: Option<u16>,
}

impl CompletionFailure {
    /// Whether this rejection came from provider rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        self.status == Some(429)
    }
}

/// Outcome of one completion call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionResult {
    /// Text of the first content block.
    Success(String),
    /// Classified failure after the retry budget was applied.
    Failure(CompletionFailure),
}

/// Call lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Not started.
    Idle,
    /// Request in flight.
    Sending,
    /// Waiting out a backoff delay before the next attempt.
    Retrying,
    /// Terminal: reply text obtained.
    Success,
    /// Terminal: gave up with the last observed failure.
    Failed,
}

impl ClientState {
    /// Whether no further transitions can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}

/// Full record of a call, for logging and tests.
#[derive(Debug, Clone)]
pub struct CompletionReport {
    /// Final outcome.
    pub result: CompletionResult,
    /// Number of provider calls made.
    pub attempts: u32,
    /// Backoff delays slept between attempts, in order.
    pub delays: Vec<Duration>,
    /// Every state entered, starting with [`ClientState::Idle`].
    pub transitions: Vec<ClientState>,
}

impl CompletionReport {
    /// The terminal state of the call.
    pub fn final_state(&self) -> ClientState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(ClientState::Idle)
    }
}

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Timeout and backoff parameters.
///
/// Delay before retry `i` (zero-based) is `min(base * factor^i, max_delay)`
/// plus up to `jitter_ratio` of that amount. The ratio is clamped below
/// `(factor - 1) / 2`, so delays strictly increase while under the ceiling.
/// [`RetryPolicy::validate`] keeps every retry of the budget under it.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt.
    pub max_retries: u32,
    /// First backoff delay.
    pub base_delay: Duration,
    /// Growth factor per retry, greater than 1.
    pub factor: f64,
    /// Jitter as a fraction of the computed delay.
    pub jitter_ratio: f64,
    /// Ceiling for the computed delay before jitter.
    pub max_delay: Duration,
    /// Deadline for a single attempt.
    pub request_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(500),
            factor: 2.0,
            jitter_ratio: 0.25,
            max_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Build a policy from configuration and [`validate`](Self::validate) it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the resulting policy is invalid.
    pub fn from_settings(settings: &RetrySettings) -> Result<Self, ConfigError> {
        let policy = Self {
            max_retries: settings.max_retries,
            base_delay: settings.base_delay(),
            factor: settings.factor,
            jitter_ratio: settings.jitter_ratio,
            max_delay: settings.max_delay(),
            request_timeout: settings.timeout(),
        };
        policy.validate()?;
        Ok(policy)
    }

    /// Check the policy bounds.
    ///
    /// The last retry's uncapped delay must fit under `max_delay`; a
    /// validated policy therefore never reaches the cap and its delays
    /// strictly increase.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero timeout or base delay, a
    /// factor not above 1, a jitter ratio outside `[0, 1]`, a retry budget
    /// above [`MAX_RETRY_BUDGET`], or a budget whose backoff would reach
    /// `max_delay`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid("timeout_secs must be positive".to_owned()));
        }
        if self.base_delay.is_zero() {
            return Err(ConfigError::Invalid("base_delay_ms must be positive".to_owned()));
        }
        if !(self.factor.is_finite() && self.factor > 1.0) {
            return Err(ConfigError::Invalid(format!(
                "backoff factor must be greater than 1, got {}",
                self.factor
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(ConfigError::Invalid(format!(
                "jitter_ratio must be within [0, 1], got {}",
                self.jitter_ratio
            )));
        }
        if self.max_retries > MAX_RETRY_BUDGET {
            return Err(ConfigError::Invalid(format!(
                "max_retries must be at most {MAX_RETRY_BUDGET}, got {}",
                self.max_retries
            )));
        }
        if let Some(last) = self.max_retries.checked_sub(1) {
            let exponent = i32::try_from(last).unwrap_or(i32::MAX);
            let longest = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
            if longest > self.max_delay.as_secs_f64() {
                return Err(ConfigError::Invalid(format!(
                    "{} retries from {:?} at factor {} reach max_delay {:?}; \
                     lower max_retries or raise max_delay_ms",
                    self.max_retries, self.base_delay, self.factor, self.max_delay
                )));
            }
        }
        Ok(())
    }

    /// Delay before retry `retry_index`, without jitter.
    pub fn nominal_delay(&self, retry_index: u32) -> Duration {
        let exponent = i32::try_from(retry_index).unwrap_or(i32::MAX);
        let ceiling = self.max_delay.as_secs_f64();
        let scaled = self.base_delay.as_secs_f64() * self.factor.powi(exponent);
        let secs = if scaled.is_finite() {
            scaled.min(ceiling)
        } else {
            ceiling
        };
        Duration::try_from_secs_f64(secs).unwrap_or(self.max_delay)
    }

    /// Delay before retry `retry_index`, with jitter applied.
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let nominal = self.nominal_delay(retry_index);
        let ratio = self.effective_jitter_ratio();
        if ratio <= 0.0 {
            return nominal;
        }
        let jitter = nominal.mul_f64(ratio * rand::random::<f64>());
        nominal.saturating_add(jitter)
    }

    fn effective_jitter_ratio(&self) -> f64 {
        let headroom = ((self.factor - 1.0) / 2.0).max(0.0);
        self.jitter_ratio.clamp(0.0, 1.0).min(headroom * 0.99)
    }
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// How many times a failure class may be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Retry up to the policy budget.
    Budget,
    /// Retry at most once, still within the budget.
    Once,
    /// Surface immediately.
    Never,
}

/// Classify a provider error into a failure kind and retry class.
pub fn classify(error: &ProviderError) -> (FailureKind, RetryClass) {
    match error {
        ProviderError::Connection(_) | ProviderError::Timeout(_) => {
            (FailureKind::Transient, RetryClass::Budget)
        }
        ProviderError::HttpStatus { status, .. } => classify_status(*status),
        ProviderError::Parse(_) | ProviderError::EmptyResponse => {
            (FailureKind::Malformed, RetryClass::Never)
        }
        ProviderError::Request(e) => {
            if let Some(status) = e.status() {
                classify_status(status.as_u16())
            } else if e.is_decode() {
                (FailureKind::Malformed, RetryClass::Never)
            } else if e.is_builder() {
                (FailureKind::Rejected, RetryClass::Never)
            } else {
                (FailureKind::Transient, RetryClass::Budget)
            }
        }
    }
}

/// Classify a non-success HTTP status.
pub fn classify_status(status: u16) -> (FailureKind, RetryClass) {
    match status {
        429 => (FailureKind::Rejected, RetryClass::Once),
        400..=499 => (FailureKind::Rejected, RetryClass::Never),
        500..=599 => (FailureKind::Transient, RetryClass::Budget),
        _ => (FailureKind::Malformed, RetryClass::Never),
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Owns the outbound call: timeout, retry, classification, redaction.
#[derive(Clone)]
pub struct CompletionClient {
    provider: Arc<dyn CompletionProvider>,
    policy: RetryPolicy,
}

impl fmt::Debug for CompletionClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionClient")
            .field("provider", &self.provider.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl CompletionClient {
    /// Client over `provider` with the given policy.
    pub fn new(provider: Arc<dyn CompletionProvider>, policy: RetryPolicy) -> Self {
        Self { provider, policy }
    }

    /// The active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run the call and return only its outcome.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
    ) -> CompletionResult {
        self.complete_with_report(request, config).await.result
    }

    /// Run the call and return the outcome with attempt and backoff history.
    pub async fn complete_with_report(
        &self,
        request: &CompletionRequest,
        config: &ProviderConfig,
    ) -> CompletionReport {
        let redactor = Redactor::new(vec![config.api_key.expose().to_owned()]);
        let mut attempts: u32 = 0;
        let mut delays = Vec::new();
        let mut transitions = vec![ClientState::Idle];
        let mut retries_used: u32 = 0;
        let mut once_retry_spent = false;

        loop {
            transitions.push(ClientState::Sending);
            attempts = attempts.saturating_add(1);
            debug!(
                provider = self.provider.name(),
                attempt = attempts,
                model = %request.model,
                "sending completion request"
            );

            let outcome = tokio::time::timeout(
                self.policy.request_timeout,
                self.provider.send(request, &config.api_key),
            )
            .await
            .unwrap_or(Err(ProviderError::Timeout(self.policy.request_timeout)));

            let error = match outcome {
                Ok(text) => {
                    info!(attempts, "completion succeeded");
                    transitions.push(ClientState::Success);
                    return CompletionReport {
                        result: CompletionResult::Success(text),
                        attempts,
                        delays,
                        transitions,
                    };
                }
                Err(error) => error,
            };

            let (kind, class) = classify(&error);
            let failure = CompletionFailure {
                kind,
                detail: redactor.scrub_detail(&error.to_string()),
                status: error.status(),
            };

            let class_allows = match class {
                RetryClass::Budget => true,
                RetryClass::Once => !once_retry_spent,
                RetryClass::Never => false,
            };
            if !class_allows || retries_used >= self.policy.max_retries {
                warn!(
                    attempts,
                    %kind,
                    status = ?failure.status,
                    detail = %failure.detail,
                    "completion failed"
                );
                transitions.push(ClientState::Failed);
                return CompletionReport {
                    result: CompletionResult::Failure(failure),
                    attempts,
                    delays,
                    transitions,
                };
            }

            if class == RetryClass::Once {
                once_retry_spent = true;
            }
            let delay = self.policy.delay_for(retries_used);
            retries_used = retries_used.saturating_add(1);
            delays.push(delay);
            transitions.push(ClientState::Retrying);
            warn!(
                attempt = attempts,
                %kind,
                status = ?failure.status,
                ?delay,
                "completion attempt failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
