//! Password storage with configurable providers.
//!
//! Profiles only carry a `credential_ref`; the password behind it lives here.
//!
//! ## Provider Selection
//!
//! - **Debug builds**: JSON file `credentials.json` in the data directory,
//!   mode 0600. `BURROW_USE_KEYCHAIN=1` forces the keychain.
//! - **Release builds**: OS keychain (macOS Keychain, Windows Credential
//!   Manager, Linux Secret Service)
//! - **Fallback**: in-memory, lost on exit
//!
//! `BURROW_PASSWORD` answers lookups that find nothing stored.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use keyring::Entry;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{BurrowError, Result};

/// Service name used for keychain entries.
const KEYRING_SERVICE: &str = "dev.burrow.Burrow";

/// Environment variable to force keychain usage in debug builds.
const FORCE_KEYCHAIN_ENV: &str = "BURROW_USE_KEYCHAIN";

/// Environment variable consulted when no password is stored.
const PASSWORD_ENV: &str = "BURROW_PASSWORD";

// ============================================================================
// CredentialsProvider Trait
// ============================================================================

/// A credential storage backend.
pub trait CredentialsProvider: Send + Sync {
    fn store(&self, key: &str, value: &str) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    fn delete(&self, key: &str) -> Result<()>;

    fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// Provider name for logging.
    fn name(&self) -> &'static str;
}

// ============================================================================
// FileCredentialsProvider
// ============================================================================

/// JSON file storage, owner read/write only.
#[derive(Debug)]
pub struct FileCredentialsProvider {
    file_path: PathBuf,
    cache: RwLock<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CredentialsFile {
    credentials: HashMap<String, String>,
}

impl FileCredentialsProvider {
    /// Open (or lazily create) `credentials.json` under `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir).map_err(|e| {
            BurrowError::storage(
                format!("Failed to create data directory: {e}"),
                Some("Check permissions or set BURROW_DATA_DIR"),
            )
        })?;
        Self::with_path(data_dir.join("credentials.json"))
    }

    pub fn with_path(file_path: PathBuf) -> Result<Self> {
        let provider = Self { file_path, cache: RwLock::new(HashMap::new()) };
        provider.load_from_file()?;
        Ok(provider)
    }

    fn load_from_file(&self) -> Result<()> {
        if !self.file_path.exists() {
            return Ok(());
        }

        let contents = fs::read_to_string(&self.file_path).map_err(|e| {
            BurrowError::storage(format!("Failed to read credentials file: {e}"), None)
        })?;
        if contents.trim().is_empty() {
            return Ok(());
        }

        let parsed: CredentialsFile = serde_json::from_str(&contents).map_err(|e| {
            BurrowError::storage(format!("Invalid credentials file format: {e}"), None)
        })?;
        *self.cache.write() = parsed.credentials;
        Ok(())
    }

    fn save_to_file(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&CredentialsFile {
            credentials: self.cache.read().clone(),
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.file_path)
                .map_err(|e| {
                    BurrowError::storage(format!("Failed to create credentials file: {e}"), None)
                })?;
            file.write_all(json.as_bytes()).map_err(|e| {
                BurrowError::storage(format!("Failed to write credentials file: {e}"), None)
            })?;
        }

        #[cfg(not(unix))]
        {
            let mut file = fs::File::create(&self.file_path).map_err(|e| {
                BurrowError::storage(format!("Failed to create credentials file: {e}"), None)
            })?;
            file.write_all(json.as_bytes()).map_err(|e| {
                BurrowError::storage(format!("Failed to write credentials file: {e}"), None)
            })?;
        }

        Ok(())
    }
}

impl CredentialsProvider for FileCredentialsProvider {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.cache.write().insert(key.to_string(), value.to_string());
        self.save_to_file()?;
        tracing::debug!(key = key, "Credential stored in file");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.cache.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.cache.write().remove(key);
        self.save_to_file()?;
        tracing::debug!(key = key, "Credential deleted from file");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "FileCredentialsProvider"
    }
}

// ============================================================================
// KeychainCredentialsProvider
// ============================================================================

/// OS keychain storage.
#[derive(Debug)]
pub struct KeychainCredentialsProvider {
    service: String,
}

impl Default for KeychainCredentialsProvider {
    fn default() -> Self {
        Self { service: KEYRING_SERVICE.to_string() }
    }
}

impl KeychainCredentialsProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).map_err(|e| BurrowError::keyring(e.to_string(), None))
    }
}

impl CredentialsProvider for KeychainCredentialsProvider {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.entry(key)?.set_password(value)?;
        tracing::debug!(key = key, "Credential stored in keychain");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {
                tracing::debug!(key = key, "Credential deleted from keychain");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn name(&self) -> &'static str {
        "KeychainCredentialsProvider"
    }
}

// ============================================================================
// SessionCredentialsProvider (Fallback)
// ============================================================================

/// In-memory storage. Credentials are lost when the process exits.
#[derive(Debug, Default)]
pub struct SessionCredentialsProvider {
    store: RwLock<HashMap<String, String>>,
}

impl SessionCredentialsProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialsProvider for SessionCredentialsProvider {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.store.write().insert(key.to_string(), value.to_string());
        tracing::debug!(key = key, "Credential stored in session");
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.store.read().get(key).cloned())
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.store.write().remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "SessionCredentialsProvider"
    }
}

// ============================================================================
// CredentialService
// ============================================================================

fn select_provider(data_dir: &Path) -> Box<dyn CredentialsProvider> {
    let force_keychain = std::env::var(FORCE_KEYCHAIN_ENV).map(|v| v == "1").unwrap_or(false);

    if force_keychain || !cfg!(debug_assertions) {
        tracing::debug!(
            provider = "KeychainCredentialsProvider",
            forced = force_keychain,
            "Using keychain credential storage"
        );
        return Box::new(KeychainCredentialsProvider::new());
    }

    match FileCredentialsProvider::in_dir(data_dir) {
        Ok(provider) => Box::new(provider),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to create file provider, falling back to session");
            Box::new(SessionCredentialsProvider::new())
        }
    }
}

/// Password storage keyed by a profile's `credential_ref`.
pub struct CredentialService {
    provider: Box<dyn CredentialsProvider>,
    env_fallback: bool,
}

impl CredentialService {
    /// Pick the provider for this build, storing files under `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        let provider = select_provider(data_dir);
        tracing::info!(provider = provider.name(), "Credential service initialized");
        Self { provider, env_fallback: true }
    }

    /// Use a specific provider, without the environment fallback.
    pub fn with_provider(provider: Box<dyn CredentialsProvider>) -> Self {
        Self { provider, env_fallback: false }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Store a password. The value is never logged.
    pub fn store_password(&self, credential_ref: &str, password: &str) -> Result<()> {
        self.provider.store(credential_ref, password)?;
        tracing::debug!(credential_ref, "Password stored");
        Ok(())
    }

    /// Stored password, else `BURROW_PASSWORD`, else `None`.
    pub fn get_password(&self, credential_ref: &str) -> Result<Option<String>> {
        if let Some(password) = self.provider.get(credential_ref)? {
            return Ok(Some(password));
        }
        if self.env_fallback {
            return Ok(std::env::var(PASSWORD_ENV).ok().filter(|p| !p.is_empty()));
        }
        Ok(None)
    }

    pub fn delete_password(&self, credential_ref: &str) -> Result<()> {
        self.provider.delete(credential_ref)?;
        tracing::debug!(credential_ref, "Password deleted");
        Ok(())
    }

    pub fn has_password(&self, credential_ref: &str) -> Result<bool> {
        self.provider.exists(credential_ref)
    }
}

impl std::fmt::Debug for CredentialService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialService").field("provider", &self.provider.name()).finish()
    }
}
