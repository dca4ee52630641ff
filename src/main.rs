//! PsychGuide command-line front end.
//!
//! Acts as the form input source (flags and/or a TOML form file) and wires
//! the console display sink to a [`SubmissionController`].

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};

use psychguide::client::{CompletionClient, RetryPolicy};
use psychguide::config::resolver::{ConfigError, ConfigResolver};
use psychguide::config::AppConfig;
use psychguide::controller::SubmissionController;
use psychguide::intake::{
    CommunicationPreference, IntakeForm, MedicationPreference, Symptom, TreatmentPreference,
};
use psychguide::logging;
use psychguide::presenter::ResultPresenter;
use psychguide::prompt::PromptBuilder;
use psychguide::providers::anthropic::AnthropicProvider;
use psychguide::secrets::{
    ChainedSecretStore, DotenvSecretStore, EnvSecretStore, KeychainSecretStore,
};
use psychguide::sink::{ConsoleSink, DisplaySink};

const INTRO: &str = "Psychiatric Patient Diagnosis and Treatment\n\
Provide your information to receive a personalized diagnosis and treatment recommendation.\n\
Your responses will remain confidential.";

#[derive(Debug, Parser)]
#[command(
    name = "psychguide",
    version,
    about = "Personalized diagnosis and treatment plan from an intake form"
)]
struct Cli {
    /// Config file (default: $PSYCHGUIDE_CONFIG or ~/.psychguide/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Also write JSON logs, rotated daily, into this directory.
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Submit an intake form and print the plan.
    Submit {
        #[command(flatten)]
        form: FormArgs,

        /// Skip the introduction text.
        #[arg(long)]
        quiet: bool,
    },
    /// Print the prompt a form would produce, without calling the provider.
    Prompt {
        #[command(flatten)]
        form: FormArgs,
    },
    /// Resolve configuration and report model settings.
    Check,
}

#[derive(Debug, Args)]
struct FormArgs {
    /// TOML file with form fields; flags below override it.
    #[arg(long)]
    form: Option<PathBuf>,

    /// Past psychiatric history.
    #[arg(long)]
    history: Option<String>,

    /// Current symptom; repeat for several (e.g. --symptom insomnia --symptom fatigue).
    #[arg(long = "symptom")]
    symptoms: Vec<Symptom>,

    /// Medication preference, e.g. "No Preference".
    #[arg(long)]
    medication: Option<MedicationPreference>,

    /// Treatment preference, e.g. "Mindfulness-Based Therapy".
    #[arg(long)]
    treatment: Option<TreatmentPreference>,

    /// "Text Only" or "Text and Call".
    #[arg(long)]
    communication: Option<CommunicationPreference>,

    /// Patient name, required for "Text and Call".
    #[arg(long)]
    name: Option<String>,

    /// Contact number, required for "Text and Call".
    #[arg(long)]
    contact: Option<String>,
}

impl FormArgs {
    fn into_form(self) -> anyhow::Result<IntakeForm> {
        let mut form = match &self.form {
            Some(path) => load_form(path)?,
            None => IntakeForm::default(),
        };
        if let Some(history) = self.history {
            form.mental_health_history = history;
        }
        if !self.symptoms.is_empty() {
            form.current_symptoms = self.symptoms.into_iter().collect();
        }
        if let Some(medication) = self.medication {
            form.medication_preference = medication;
        }
        if let Some(treatment) = self.treatment {
            form.treatment_preference = treatment;
        }
        if let Some(communication) = self.communication {
            form.communication_preference = communication;
        }
        if self.name.is_some() {
            form.patient_name = self.name;
        }
        if self.contact.is_some() {
            form.patient_contact = self.contact;
        }
        Ok(form)
    }
}

fn load_form(path: &Path) -> anyhow::Result<IntakeForm> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read form at {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("failed to parse form at {}", path.display()))
}

/// Env first, then the secrets file, then the keychain.
///
/// An unreadable or world-readable secrets file is a configuration failure.
fn secret_store(config: &AppConfig) -> Result<ChainedSecretStore, ConfigError> {
    let dotenv = config
        .secrets_file()
        .and_then(|path| DotenvSecretStore::load_if_present(&path))
        .map_err(|error| ConfigError::Invalid(format!("secrets file: {error:#}")))?;
    Ok(ChainedSecretStore::new()
        .with(EnvSecretStore::new())
        .with(dotenv)
        .with(KeychainSecretStore::new()))
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    let _guard = match &cli.log_dir {
        Some(dir) => Some(logging::init_with_file(dir, &config.logging.level)?),
        None => {
            logging::init_cli(&config.logging.level);
            None
        }
    };

    match cli.command {
        Command::Prompt { form } => {
            let form = form.into_form()?;
            let provider = &config.provider;
            let request =
                PromptBuilder::new(provider.model.clone(), provider.max_tokens, provider.temperature)
                    .build(&form);
            println!("{}", request.user_prompt);
            Ok(ExitCode::SUCCESS)
        }
        Command::Check => run_check(&config),
        Command::Submit { form, quiet } => {
            let form = form.into_form()?;
            if !quiet {
                eprintln!("{INTRO}\n");
            }
            run_submit(&config, form).await
        }
    }
}

fn run_check(config: &AppConfig) -> anyhow::Result<ExitCode> {
    let checked = RetryPolicy::from_settings(&config.retry).and_then(|policy| {
        let store = secret_store(config)?;
        let resolved = ConfigResolver::new(Arc::new(store), config.provider.clone()).resolve()?;
        Ok((policy, resolved))
    });
    match checked {
        Ok((policy, resolved)) => {
            println!("provider: {}", config.provider.base_url);
            println!("model: {}", resolved.model_id);
            println!("max_tokens: {}", resolved.max_tokens);
            println!("temperature: {}", resolved.temperature);
            println!("timeout: {:?}", policy.request_timeout);
            println!("max_retries: {}", policy.max_retries);
            println!("api key: present");
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            warn!(%error, "configuration check failed");
            eprintln!("error: {error}");
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run_submit(config: &AppConfig, form: IntakeForm) -> anyhow::Result<ExitCode> {
    let sink = ConsoleSink;
    let presenter = ResultPresenter::new();

    // Form problems are reported before any configuration problem.
    if let Err(error) = form.validate() {
        warn!(%error, "submission rejected by form validation");
        sink.show_presentation(&presenter.present_validation_error(&error));
        return Ok(ExitCode::FAILURE);
    }

    let setup = RetryPolicy::from_settings(&config.retry)
        .and_then(|policy| Ok((policy, secret_store(config)?)));
    let (policy, store) = match setup {
        Ok(setup) => setup,
        Err(error) => {
            warn!(%error, "submission stopped: configuration unavailable");
            sink.show_presentation(&presenter.present_config_error(&error));
            return Ok(ExitCode::FAILURE);
        }
    };

    let provider = AnthropicProvider::new(&config.provider.base_url, policy.request_timeout)
        .context("failed to build HTTP client")?;
    let client = CompletionClient::new(Arc::new(provider), policy);
    let resolver = ConfigResolver::new(Arc::new(store), config.provider.clone());
    let controller = SubmissionController::new(resolver, client);

    let presentation = tokio::select! {
        presentation = controller.on_submit(form) => presentation,
        _ = tokio::signal::ctrl_c() => {
            info!("submission cancelled by user");
            eprintln!("cancelled");
            return Ok(ExitCode::from(130));
        }
    };

    sink.show_presentation(&presentation);
    Ok(if presentation.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
