//! Provider configuration resolution tests.

use std::sync::Arc;

use psychguide::config::resolver::{ConfigError, ConfigResolver};
use psychguide::config::ProviderSettings;
use psychguide::secrets::{ChainedSecretStore, EnvSecretStore, InMemorySecretStore};

fn resolver_with_key(key: &str, settings: ProviderSettings) -> ConfigResolver {
    ConfigResolver::new(
        Arc::new(InMemorySecretStore::new().with_secret("claude_api_key", key)),
        settings,
    )
}

#[test]
fn resolves_defaults_with_key_present() {
    let config = resolver_with_key("sk-test-value", ProviderSettings::default())
        .resolve()
        .expect("resolves");

    assert_eq!(config.api_key.expose(), "sk-test-value");
    assert_eq!(config.model_id, "claude-3-5-sonnet-20240620");
    assert_eq!(config.max_tokens, 280);
    assert!((config.temperature - 0.7).abs() < f64::EPSILON);
}

#[test]
fn missing_key_is_reported_by_name() {
    let resolver = ConfigResolver::new(
        Arc::new(InMemorySecretStore::new()),
        ProviderSettings::default(),
    );
    assert_eq!(
        resolver.resolve().expect_err("no key"),
        ConfigError::Missing("claude_api_key".to_owned())
    );
}

#[test]
fn blank_key_counts_as_missing() {
    let result = resolver_with_key("   ", ProviderSettings::default()).resolve();
    assert!(matches!(result, Err(ConfigError::Missing(_))));
}

#[test]
fn zero_max_tokens_is_invalid() {
    let settings = ProviderSettings {
        max_tokens: 0,
        ..ProviderSettings::default()
    };
    let result = resolver_with_key("key", settings).resolve();
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn temperature_outside_unit_range_is_invalid() {
    for temperature in [-0.1, 1.01, f64::NAN] {
        let settings = ProviderSettings {
            temperature,
            ..ProviderSettings::default()
        };
        let result = resolver_with_key("key", settings).resolve();
        assert!(
            matches!(result, Err(ConfigError::Invalid(_))),
            "temperature {temperature} should be rejected"
        );
    }
}

#[test]
fn temperature_bounds_are_inclusive() {
    for temperature in [0.0, 1.0] {
        let settings = ProviderSettings {
            temperature,
            ..ProviderSettings::default()
        };
        assert!(resolver_with_key("key", settings).resolve().is_ok());
    }
}

#[test]
fn empty_model_is_invalid() {
    let settings = ProviderSettings {
        model: "  ".to_owned(),
        ..ProviderSettings::default()
    };
    let result = resolver_with_key("key", settings).resolve();
    assert!(matches!(result, Err(ConfigError::Invalid(_))));
}

#[test]
fn resolved_config_debug_hides_key() {
    let config = resolver_with_key("sk-test-super-secret", ProviderSettings::default())
        .resolve()
        .expect("resolves");
    let debug = format!("{config:?}");
    assert!(!debug.contains("sk-test-super-secret"));
    assert!(debug.contains("[REDACTED]"));
}

#[test]
fn error_messages_never_carry_the_key() {
    let settings = ProviderSettings {
        max_tokens: 0,
        ..ProviderSettings::default()
    };
    let error = resolver_with_key("sk-test-super-secret", settings)
        .resolve()
        .expect_err("invalid");
    assert!(!error.to_string().contains("sk-test-super-secret"));
}

#[test]
fn chained_store_falls_through_to_later_sources() {
    let store = ChainedSecretStore::new()
        .with(EnvSecretStore::with_resolver(|_| None))
        .with(InMemorySecretStore::new().with_secret("claude_api_key", "from-file"));
    let resolver = ConfigResolver::new(Arc::new(store), ProviderSettings::default());

    let config = resolver.resolve().expect("resolves");
    assert_eq!(config.api_key.expose(), "from-file");
}
