//! Runtime configuration.
//!
//! Values come from built-in defaults, then `BURROW_*` environment
//! variables, then command-line flags applied by the binary.
//!
//! # Data Directory Locations
//!
//! - `BURROW_DATA_DIR` when set
//! - **macOS**: `~/Library/Application Support/dev.burrow.Burrow`
//! - **Windows**: `%APPDATA%\burrow\Burrow`
//! - **Linux**: `~/.local/share/burrow`
//! - **Debug builds**: `./burrow_data` in current directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BurrowError, Result};

/// Default number of rows per page.
pub const DEFAULT_PAGE_SIZE: usize = 100;
/// Largest accepted number of rows per page.
pub const MAX_PAGE_SIZE: usize = 10_000;
/// Default server-side statement timeout.
pub const DEFAULT_STATEMENT_TIMEOUT_MS: u64 = 10_000;
/// Default maximum pooled connections per session.
pub const DEFAULT_POOL_SIZE: usize = 4;
/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
/// Default listing cache time-to-live.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;
/// Extra client-side wait on top of the statement timeout before giving up
/// on a server that stopped answering.
pub const DEFAULT_TIMEOUT_GRACE_MS: u64 = 2_000;

/// Core configuration shared by sessions, executor and coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    pub page_size: usize,
    pub statement_timeout_ms: u64,
    pub pool_size: usize,
    pub connect_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub timeout_grace_ms: u64,
    pub data_dir: PathBuf,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            statement_timeout_ms: DEFAULT_STATEMENT_TIMEOUT_MS,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            timeout_grace_ms: DEFAULT_TIMEOUT_GRACE_MS,
            data_dir: default_data_dir(),
        }
    }
}

impl CoreConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = lookup("BURROW_PAGE_SIZE") {
            self.page_size = parse_positive("BURROW_PAGE_SIZE", &value)? as usize;
        }
        if let Some(value) = lookup("BURROW_STATEMENT_TIMEOUT_MS") {
            self.statement_timeout_ms = parse_positive("BURROW_STATEMENT_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("BURROW_POOL_SIZE") {
            self.pool_size = parse_positive("BURROW_POOL_SIZE", &value)? as usize;
        }
        if let Some(value) = lookup("BURROW_DATA_DIR") {
            if !value.trim().is_empty() {
                self.data_dir = PathBuf::from(value);
            }
        }
        self.validate()?;
        Ok(self)
    }

    /// Override the page size.
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        self.page_size = page_size;
        self.validate()?;
        Ok(self)
    }

    /// Override the statement timeout.
    pub fn with_statement_timeout_ms(mut self, timeout_ms: u64) -> Result<Self> {
        self.statement_timeout_ms = timeout_ms;
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(BurrowError::config("Page size must be greater than 0"));
        }
        if self.page_size > MAX_PAGE_SIZE {
            return Err(BurrowError::config(format!(
                "Page size must be at most {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.statement_timeout_ms == 0 {
            return Err(BurrowError::config("Statement timeout must be greater than 0"));
        }
        if self.pool_size == 0 {
            return Err(BurrowError::config("Pool size must be greater than 0"));
        }
        Ok(())
    }

    pub fn statement_timeout(&self) -> Duration {
        Duration::from_millis(self.statement_timeout_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

fn parse_positive(name: &str, value: &str) -> Result<u64> {
    match value.trim().parse::<u64>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(BurrowError::config(format!("{name} must be a positive integer, got '{value}'"))),
    }
}

/// Get the default data directory for the application.
pub fn default_data_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("BURROW_DATA_DIR") {
        return PathBuf::from(dir);
    }

    #[cfg(debug_assertions)]
    {
        PathBuf::from("./burrow_data")
    }

    #[cfg(not(debug_assertions))]
    {
        dirs::data_dir()
            .map(|d| {
                #[cfg(target_os = "macos")]
                {
                    d.join("dev.burrow.Burrow")
                }
                #[cfg(target_os = "windows")]
                {
                    d.join("burrow").join("Burrow")
                }
                #[cfg(not(any(target_os = "macos", target_os = "windows")))]
                {
                    d.join("burrow")
                }
            })
            .unwrap_or_else(|| PathBuf::from("./burrow_data"))
    }
}

/// Initialize the data directory, creating it if needed.
pub fn init_data_dir(path: &Path) -> Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(BurrowError::storage(
                format!("Data path exists but is not a directory: {}", path.display()),
                Some("Set BURROW_DATA_DIR to a different location"),
            ));
        }
        return Ok(());
    }

    std::fs::create_dir_all(path).map_err(|e| {
        BurrowError::storage(
            format!("Failed to create data directory '{}': {}", path.display(), e),
            Some("Check permissions or set BURROW_DATA_DIR"),
        )
    })?;

    tracing::info!(path = %path.display(), "Created data directory");
    Ok(())
}
