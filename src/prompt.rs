//! Renders an intake form into a completion request.
//!
//! The user prompt format is stable and byte-for-byte reproducible:
//!
//! ```text
//! Mental Health History: <history>
//! Current Symptoms: <symptoms joined with ", ">
//! Medication Preferences: <medication>
//! Treatment Preferences: <treatment>
//! Preferred Communication Method: <communication>
//!
//! Please provide a personalized diagnosis and treatment plan based on the above information.
//! ```
//!
//! Patient text is placed only in the user message; the persona lives in a
//! separate system field. That separation is the only prompt-injection
//! measure here: history text is interpolated as-is and could still contain
//! instructions aimed at the model.

use crate::config::resolver::ProviderConfig;
use crate::intake::{IntakeForm, Labelled};
use crate::providers::CompletionRequest;

/// Assistant persona sent as the system prompt.
pub const SYSTEM_PROMPT: &str = "You are a world-class psychiatrist who specializes in providing personalized mental health diagnoses and treatment plans.";

/// Closing instruction appended after the form fields.
pub const CLOSING_INSTRUCTION: &str =
    "Please provide a personalized diagnosis and treatment plan based on the above information.";

/// Render the form fields into the user prompt.
pub fn render_user_prompt(form: &IntakeForm) -> String {
    let symptoms = form
        .current_symptoms
        .as_slice()
        .iter()
        .map(|symptom| symptom.label())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "Mental Health History: {history}\n\
         Current Symptoms: {symptoms}\n\
         Medication Preferences: {medication}\n\
         Treatment Preferences: {treatment}\n\
         Preferred Communication Method: {communication}\n\
         \n\
         {CLOSING_INSTRUCTION}",
        history = form.mental_health_history,
        medication = form.medication_preference.label(),
        treatment = form.treatment_preference.label(),
        communication = form.communication_preference.label(),
    )
}

/// Pure builder from intake forms to [`CompletionRequest`]s.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    model: String,
    max_tokens: u32,
    temperature: f64,
}

impl PromptBuilder {
    /// Builder with the default persona and the given model parameters.
    pub fn new(model: impl Into<String>, max_tokens: u32, temperature: f64) -> Self {
        Self {
            system_prompt: SYSTEM_PROMPT.to_owned(),
            model: model.into(),
            max_tokens,
            temperature,
        }
    }

    /// Builder using the model parameters of a resolved config.
    pub fn from_config(config: &ProviderConfig) -> Self {
        Self::new(config.model_id.clone(), config.max_tokens, config.temperature)
    }

    /// Replace the persona. Configuration only; never derived from form input.
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Build the request for one submission. No I/O.
    pub fn build(&self, form: &IntakeForm) -> CompletionRequest {
        CompletionRequest {
            system_prompt: self.system_prompt.clone(),
            user_prompt: render_user_prompt(form),
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        }
    }
}
