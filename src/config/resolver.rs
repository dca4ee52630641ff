//! Resolves the provider credentials and model parameters for a process.
//!
//! Fails closed: a missing or blank key is an error, never a default.
//! There are no retries here; configuration absence is not transient.

use std::sync::Arc;

use tracing::debug;

use crate::secrets::{SecretStore, SecretValue};

use super::ProviderSettings;

/// Configuration failures, detected before any network call.
///
/// Messages name the secret, never its value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The named secret is absent or blank.
    #[error("secret {0:?} is missing or empty")]
    Missing(String),
    /// A model parameter is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Validated, immutable provider configuration.
///
/// Held behind an `Arc` for the life of the process and never mutated; a
/// reload would build a new value and swap the `Arc`.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Provider API key.
    pub api_key: SecretValue,
    /// Model identifier.
    pub model_id: String,
    /// Positive generation cap.
    pub max_tokens: u32,
    /// Sampling temperature in `[0, 1]`.
    pub temperature: f64,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &"[REDACTED]")
            .field("model_id", &self.model_id)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

/// Builds a [`ProviderConfig`] from settings plus an injected secret store.
pub struct ConfigResolver {
    store: Arc<dyn SecretStore>,
    settings: ProviderSettings,
}

impl ConfigResolver {
    /// Create a resolver over the given store and settings.
    pub fn new(store: Arc<dyn SecretStore>, settings: ProviderSettings) -> Self {
        Self { store, settings }
    }

    /// The settings this resolver validates.
    pub fn settings(&self) -> &ProviderSettings {
        &self.settings
    }

    /// Read the key and validate model parameters.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Missing`] if the key is absent or blank;
    /// [`ConfigError::Invalid`] if `max_tokens` is zero, the temperature is
    /// outside `[0, 1]`, or the model or secret name is empty.
    pub fn resolve(&self) -> Result<ProviderConfig, ConfigError> {
        let settings = &self.settings;

        if settings.secret_name.trim().is_empty() {
            return Err(ConfigError::Invalid("secret name is empty".to_owned()));
        }
        let api_key = self
            .store
            .get_secret(&settings.secret_name)
            .filter(|key| !key.is_blank())
            .ok_or_else(|| ConfigError::Missing(settings.secret_name.clone()))?;

        if settings.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model identifier is empty".to_owned()));
        }
        if settings.max_tokens == 0 {
            return Err(ConfigError::Invalid(
                "max_tokens must be greater than zero".to_owned(),
            ));
        }
        if !(0.0..=1.0).contains(&settings.temperature) {
            return Err(ConfigError::Invalid(format!(
                "temperature must be within [0, 1], got {}",
                settings.temperature
            )));
        }

        debug!(
            model = %settings.model,
            max_tokens = settings.max_tokens,
            temperature = settings.temperature,
            "provider configuration resolved"
        );

        Ok(ProviderConfig {
            api_key,
            model_id: settings.model.trim().to_owned(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
        })
    }
}

impl std::fmt::Debug for ConfigResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigResolver")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
