//! Orchestrates one submission from form to presentation.
//!
//! Order: validate form -> resolve config -> build prompt -> call provider ->
//! present. Validation and configuration failures return before any network
//! call is made.
//!
//! Identical rapid submissions are not deduplicated; each call to
//! [`SubmissionController::on_submit`] is independent. A UI that allows
//! double-clicks should disable its submit control while a call is pending.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{info, instrument, warn};

use crate::client::CompletionClient;
use crate::config::resolver::{ConfigError, ConfigResolver, ProviderConfig};
use crate::intake::IntakeForm;
use crate::presenter::{Presentation, ResultPresenter};
use crate::prompt::PromptBuilder;

/// Runs submissions against a shared, read-only provider configuration.
///
/// The configuration is resolved on first use and cached for the life of
/// the controller. A failed resolution is not cached, so every submission
/// re-checks until the key is present.
#[derive(Debug)]
pub struct SubmissionController {
    resolver: ConfigResolver,
    client: CompletionClient,
    presenter: ResultPresenter,
    config: OnceCell<Arc<ProviderConfig>>,
}

impl SubmissionController {
    /// Create a controller.
    pub fn new(resolver: ConfigResolver, client: CompletionClient) -> Self {
        Self {
            resolver,
            client,
            presenter: ResultPresenter::new(),
            config: OnceCell::new(),
        }
    }

    /// The resolved configuration, resolving it on first call.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigError`] from the resolver; nothing is cached then.
    pub async fn provider_config(&self) -> Result<Arc<ProviderConfig>, ConfigError> {
        self.config
            .get_or_try_init(|| async { self.resolver.resolve().map(Arc::new) })
            .await
            .cloned()
    }

    /// Handle one submit event.
    #[instrument(
        skip_all,
        fields(
            submission_id = %uuid::Uuid::new_v4(),
            communication = %form.communication_preference,
            symptoms = form.current_symptoms.len(),
        )
    )]
    pub async fn on_submit(&self, form: IntakeForm) -> Presentation {
        if let Err(error) = form.validate() {
            warn!(%error, "submission rejected by form validation");
            return self.presenter.present_validation_error(&error);
        }

        let config = match self.provider_config().await {
            Ok(config) => config,
            Err(error) => {
                warn!(%error, "submission stopped: provider configuration unavailable");
                return self.presenter.present_config_error(&error);
            }
        };

        let request = PromptBuilder::from_config(&config).build(&form);
        let contact = form.contact_details();

        let report = self.client.complete_with_report(&request, &config).await;
        info!(
            attempts = report.attempts,
            final_state = ?report.final_state(),
            "submission finished"
        );

        self.presenter.present(&report.result, contact.as_ref())
    }
}
