//! Secret store abstraction.
//!
//! The completion API key is only ever read through [`SecretStore`], never
//! from the config file or from anything the patient submits. Stores are
//! injected into [`crate::config::resolver::ConfigResolver`]; nothing here is
//! a process-wide global.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Opaque secret value that never appears in logs.
///
/// Debug output always shows `[REDACTED]` so a secret cannot leak through
/// `{:?}` formatting in error messages or tracing fields.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    /// Wrap a secret value.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Expose the raw secret. Use only at the point the secret is sent.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Whether the secret is empty or whitespace only.
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("[REDACTED]")
    }
}

/// Narrow read-only contract for secret lookup.
pub trait SecretStore: Send + Sync {
    /// Look up a secret by name. `None` when the store does not hold it.
    fn get_secret(&self, name: &str) -> Option<SecretValue>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// In-memory store, used by tests and by embedders that already hold the key.
#[derive(Clone, Default)]
pub struct InMemorySecretStore {
    secrets: BTreeMap<String, SecretValue>,
}

impl InMemorySecretStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with_secret(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert or overwrite a secret.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.secrets.insert(name.into(), SecretValue::new(value));
    }
}

impl std::fmt::Debug for InMemorySecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySecretStore")
            .field("keys", &self.secrets.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl SecretStore for InMemorySecretStore {
    fn get_secret(&self, name: &str) -> Option<SecretValue> {
        self.secrets.get(name).cloned()
    }
}

// ---------------------------------------------------------------------------
// Process environment
// ---------------------------------------------------------------------------

type EnvResolver = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Reads secrets from environment variables.
///
/// The secret name is upper-cased to form the variable name, so
/// `claude_api_key` is read from `CLAUDE_API_KEY`.
pub struct EnvSecretStore {
    resolver: EnvResolver,
}

impl EnvSecretStore {
    /// Store backed by the real process environment.
    pub fn new() -> Self {
        Self::with_resolver(|key| std::env::var(key).ok())
    }

    /// Store backed by a custom resolver (avoids `set_var` in tests).
    pub fn with_resolver(resolver: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        Self {
            resolver: Box::new(resolver),
        }
    }

    /// Environment variable name for a secret name.
    pub fn variable_name(name: &str) -> String {
        name.to_ascii_uppercase()
    }
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EnvSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvSecretStore").finish_non_exhaustive()
    }
}

impl SecretStore for EnvSecretStore {
    fn get_secret(&self, name: &str) -> Option<SecretValue> {
        (self.resolver)(&Self::variable_name(name)).map(SecretValue::new)
    }
}

// ---------------------------------------------------------------------------
// Dotenv file
// ---------------------------------------------------------------------------

/// Secrets loaded once from a private `.env` file.
///
/// Keys are matched the same way as [`EnvSecretStore`]: the secret name is
/// upper-cased, and an exact-case key is accepted as a fallback.
#[derive(Clone, Default)]
pub struct DotenvSecretStore {
    vars: BTreeMap<String, SecretValue>,
}

impl DotenvSecretStore {
    /// Load secrets from a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, is readable by group or
    /// others (unix), or contains a malformed entry.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Err(anyhow::anyhow!(
                "secrets file does not exist: {}",
                path.display()
            ));
        }

        validate_private_permissions(path)?;

        let mut vars = BTreeMap::new();
        let iter = dotenvy::from_path_iter(path)
            .with_context(|| format!("failed to read secrets at {}", path.display()))?;

        for item in iter {
            let (key, value) = item.with_context(|| {
                format!(
                    "failed to parse key-value entry in secrets file {}",
                    path.display()
                )
            })?;
            vars.insert(key, SecretValue::new(value));
        }

        debug!(path = %path.display(), keys = vars.len(), "loaded secrets file");
        Ok(Self { vars })
    }

    /// Load the file if it exists; a missing file yields an empty store.
    ///
    /// # Errors
    ///
    /// Same as [`DotenvSecretStore::load`] once the file exists.
    pub fn load_if_present(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            debug!(path = %path.display(), "no secrets file, skipping");
            Ok(Self::default())
        }
    }
}

impl std::fmt::Debug for DotenvSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DotenvSecretStore")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl SecretStore for DotenvSecretStore {
    fn get_secret(&self, name: &str) -> Option<SecretValue> {
        self.vars
            .get(&EnvSecretStore::variable_name(name))
            .or_else(|| self.vars.get(name))
            .cloned()
    }
}

#[cfg(unix)]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to inspect secrets file {}", path.display()))?;
    let mode = metadata.permissions().mode() & 0o777;

    if mode & 0o077 != 0 {
        return Err(anyhow::anyhow!(
            "secrets file {} must be 0600, found {:o}",
            path.display(),
            mode
        ));
    }

    Ok(())
}

#[cfg(not(unix))]
fn validate_private_permissions(path: &Path) -> anyhow::Result<()> {
    fs::metadata(path)
        .with_context(|| format!("failed to inspect secrets file {}", path.display()))?;
    Ok(())
}

// ---------------------------------------------------------------------------
// macOS keychain
// ---------------------------------------------------------------------------

/// Keychain service under which secrets are stored.
pub const KEYCHAIN_SERVICE: &str = "psychguide";

/// Reads generic passwords from the macOS login keychain.
///
/// The keychain account is the secret name. On other platforms every
/// lookup returns `None`.
#[derive(Debug, Clone)]
pub struct KeychainSecretStore {
    #[cfg_attr(not(target_os = "macos"), allow(dead_code))]
    service: String,
}

impl KeychainSecretStore {
    /// Store reading from [`KEYCHAIN_SERVICE`].
    pub fn new() -> Self {
        Self::with_service(KEYCHAIN_SERVICE)
    }

    /// Store reading from a custom keychain service.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

impl Default for KeychainSecretStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretStore for KeychainSecretStore {
    #[cfg(target_os = "macos")]
    fn get_secret(&self, name: &str) -> Option<SecretValue> {
        use security_framework::passwords::get_generic_password;

        let bytes = get_generic_password(&self.service, name)
            .map_err(|e| {
                debug!(service = %self.service, error = %e, "keychain entry not found");
            })
            .ok()?;
        let value = String::from_utf8(bytes)
            .map_err(|e| {
                tracing::warn!(service = %self.service, error = %e, "keychain entry is not valid UTF-8");
            })
            .ok()?;
        Some(SecretValue::new(value))
    }

    #[cfg(not(target_os = "macos"))]
    fn get_secret(&self, _name: &str) -> Option<SecretValue> {
        None
    }
}

// ---------------------------------------------------------------------------
// Chain
// ---------------------------------------------------------------------------

/// Tries each store in order and returns the first non-blank hit.
#[derive(Default)]
pub struct ChainedSecretStore {
    stores: Vec<Box<dyn SecretStore>>,
}

impl ChainedSecretStore {
    /// Empty chain; every lookup misses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a store to the end of the chain.
    pub fn with(mut self, store: impl SecretStore + 'static) -> Self {
        self.stores.push(Box::new(store));
        self
    }
}

impl std::fmt::Debug for ChainedSecretStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainedSecretStore")
            .field("stores", &self.stores.len())
            .finish()
    }
}

impl SecretStore for ChainedSecretStore {
    fn get_secret(&self, name: &str) -> Option<SecretValue> {
        self.stores
            .iter()
            .filter_map(|store| store.get_secret(name))
            .find(|value| !value.is_blank())
    }
}
