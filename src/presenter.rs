//! Maps call outcomes to messages for the display sink.
//!
//! User-facing text is plain language only. Provider payloads, failure
//! details and the API key never reach a [`DisplayMessage`]; those stay in
//! the logs, already redacted by the client.

use crate::client::{CompletionFailure, CompletionResult, FailureKind};
use crate::config::resolver::ConfigError;
use crate::intake::{ContactDetails, ValidationError};

/// Shown when a call was requested without a name or number.
pub const MISSING_CONTACT_MESSAGE: &str =
    "Please provide both name and contact number to receive the call.";
/// Shown when the API key cannot be found.
pub const MISSING_KEY_MESSAGE: &str = "The diagnosis service is not configured. Please set the Claude API key to receive a diagnosis and treatment plan.";
/// Shown when model parameters are out of range.
pub const INVALID_CONFIG_MESSAGE: &str =
    "The diagnosis service is misconfigured. Please check the model settings.";
/// Shown for transient failures after retries are spent.
pub const TRANSIENT_MESSAGE: &str =
    "The diagnosis service is temporarily unavailable. Please try again in a few minutes.";
/// Shown for rejected requests.
pub const REJECTED_MESSAGE: &str =
    "The request was rejected by the diagnosis service. Please check the configuration.";
/// Shown for rate-limit rejections.
pub const RATE_LIMITED_MESSAGE: &str =
    "The diagnosis service is receiving too many requests. Please wait a moment and try again.";
/// Shown for unusable provider responses.
pub const MALFORMED_MESSAGE: &str =
    "The diagnosis service returned an unexpected response. Please try again.";

/// How a message should be styled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// The generated plan.
    Success,
    /// Something went wrong.
    Error,
    /// Follow-up call acknowledgement.
    Confirmation,
}

/// One message ready for a display sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayMessage {
    /// Styling hint.
    pub tone: Tone,
    /// Plain text to show.
    pub text: String,
}

impl DisplayMessage {
    /// Success-toned message.
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Success,
            text: text.into(),
        }
    }

    /// Error-toned message.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Error,
            text: text.into(),
        }
    }

    /// Confirmation-toned message.
    pub fn confirmation(text: impl Into<String>) -> Self {
        Self {
            tone: Tone::Confirmation,
            text: text.into(),
        }
    }
}

/// Where a submission ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The provider returned a plan.
    Completed,
    /// The form failed validation; no call was made.
    ValidationFailed(ValidationError),
    /// Configuration could not be resolved; no call was made.
    ConfigFailed(ConfigError),
    /// The call failed with the given kind.
    CompletionFailed(FailureKind),
}

/// Everything a sink needs to render one submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presentation {
    /// Where the submission ended.
    pub outcome: Outcome,
    /// Main message: the plan or an error.
    pub message: DisplayMessage,
    /// Follow-up call acknowledgement, only after a successful call.
    pub confirmation: Option<DisplayMessage>,
}

impl Presentation {
    /// Whether the submission produced a plan.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Completed
    }

    /// Messages in display order.
    pub fn messages(&self) -> impl Iterator<Item = &DisplayMessage> {
        std::iter::once(&self.message).chain(self.confirmation.as_ref())
    }
}

/// Stateless mapper from results to [`Presentation`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResultPresenter;

impl ResultPresenter {
    /// Create a presenter.
    pub fn new() -> Self {
        Self
    }

    /// Present a completion result.
    ///
    /// `contact` is the validated follow-up call details, if one was
    /// requested. The confirmation is a display stub; no call is placed.
    pub fn present(
        &self,
        result: &CompletionResult,
        contact: Option<&ContactDetails>,
    ) -> Presentation {
        match result {
            CompletionResult::Success(text) => Presentation {
                outcome: Outcome::Completed,
                message: DisplayMessage::success(text.clone()),
                confirmation: contact.map(call_confirmation),
            },
            CompletionResult::Failure(failure) => Presentation {
                outcome: Outcome::CompletionFailed(failure.kind),
                message: DisplayMessage::error(failure_message(failure)),
                confirmation: None,
            },
        }
    }

    /// Present a form validation failure.
    pub fn present_validation_error(&self, error: &ValidationError) -> Presentation {
        let text = match error {
            ValidationError::MissingContactInfo => MISSING_CONTACT_MESSAGE,
        };
        Presentation {
            outcome: Outcome::ValidationFailed(error.clone()),
            message: DisplayMessage::error(text),
            confirmation: None,
        }
    }

    /// Present a configuration failure.
    pub fn present_config_error(&self, error: &ConfigError) -> Presentation {
        let text = match error {
            ConfigError::Missing(_) => MISSING_KEY_MESSAGE,
            ConfigError::Invalid(_) => INVALID_CONFIG_MESSAGE,
        };
        Presentation {
            outcome: Outcome::ConfigFailed(error.clone()),
            message: DisplayMessage::error(text),
            confirmation: None,
        }
    }
}

fn failure_message(failure: &CompletionFailure) -> &'static str {
    match failure.kind {
        FailureKind::Transient => TRANSIENT_MESSAGE,
        FailureKind::Rejected if failure.is_rate_limited() => RATE_LIMITED_MESSAGE,
        FailureKind::Rejected => REJECTED_MESSAGE,
        FailureKind::Malformed => MALFORMED_MESSAGE,
    }
}

fn call_confirmation(contact: &ContactDetails) -> DisplayMessage {
    DisplayMessage::confirmation(format!(
        "Thank you, {}. A call will be placed to you at {} within the next 24 hours.",
        contact.name, contact.contact
    ))
}
