//! Local SQLite storage for connection profiles and UI state.
//!
//! Passwords are NOT stored here; they live with `CredentialService` under
//! each profile's `credential_ref`.

use std::path::{Path, PathBuf};

use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::config::init_data_dir;
use crate::error::{BurrowError, Result};
use crate::models::{ConnectionProfile, TlsMode};
use crate::services::credentials::CredentialService;

/// Query offered when nothing was run before.
pub const DEFAULT_QUERY: &str = "SELECT 1;";

const LAST_SELECTION_KEY: &str = "last_selection";
const LAST_QUERY_KEY: &str = "last_query";

/// Where connection profiles come from.
pub trait ProfileStore: Send + Sync {
    fn load_connection_profiles(&self) -> Result<Vec<ConnectionProfile>>;

    /// Add a profile. Names are unique.
    fn save_connection_profile(&self, profile: &ConnectionProfile) -> Result<()>;

    /// Remove a profile by name. Removing a missing profile is not an error.
    fn delete_connection_profile(&self, name: &str) -> Result<()>;
}

/// Save `profile` and its password together. If the password cannot be
/// stored the profile is removed again.
pub fn add_connection(
    store: &dyn ProfileStore,
    credentials: &CredentialService,
    profile: &ConnectionProfile,
    password: &str,
) -> Result<()> {
    store.save_connection_profile(profile)?;
    if let Err(e) = credentials.store_password(&profile.credential_ref, password) {
        tracing::warn!(profile = %profile.name, error = %e, "Password not stored, removing profile");
        if let Err(rollback) = store.delete_connection_profile(&profile.name) {
            tracing::error!(profile = %profile.name, error = %rollback, "Failed to remove profile");
        }
        return Err(e);
    }
    tracing::info!(profile = %profile.name, provider = credentials.provider_name(), "Connection saved");
    Ok(())
}

/// Connection, database and schema chosen most recently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSelection {
    pub connection: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
}

/// SQLite-based local storage.
///
/// Thread-safe via internal Mutex. Uses WAL mode for concurrent reads.
pub struct LocalStorage {
    connection: Mutex<Connection>,
    data_dir: PathBuf,
}

impl LocalStorage {
    /// Open or create `burrow.db` in the given data directory.
    pub fn open(data_dir: &Path) -> Result<Self> {
        init_data_dir(data_dir)?;
        Self::open_with_path(&data_dir.join("burrow.db"), data_dir)
    }

    pub fn open_with_path(db_path: &Path, data_dir: &Path) -> Result<Self> {
        let connection = Connection::open(db_path).map_err(|e| {
            BurrowError::storage(
                format!("Failed to open database '{}': {}", db_path.display(), e),
                Some("The database file may be corrupted. Try deleting it to start fresh."),
            )
        })?;

        Self::configure_connection(&connection)?;

        let storage = Self { connection: Mutex::new(connection), data_dir: data_dir.to_path_buf() };
        storage.run_migrations()?;

        tracing::info!(path = %db_path.display(), "Local storage opened");
        Ok(storage)
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA foreign_keys = ON;
            ",
        )
        .map_err(|e| BurrowError::storage(format!("Failed to configure database: {e}"), None))
    }

    fn run_migrations(&self) -> Result<()> {
        const DOMAIN: &str = "core";
        let conn = self.connection.lock();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                domain TEXT NOT NULL,
                step INTEGER NOT NULL,
                migration TEXT NOT NULL,
                PRIMARY KEY(domain, step)
            ) STRICT",
            [],
        )
        .map_err(|e| BurrowError::storage(format!("Failed to create migrations table: {e}"), None))?;

        let current_step: i64 = conn
            .query_row(
                "SELECT COALESCE(MAX(step), 0) FROM migrations WHERE domain = ?",
                [DOMAIN],
                |row| row.get(0),
            )
            .map_err(|e| BurrowError::storage(format!("Failed to read migrations: {e}"), None))?;

        if current_step < 1 {
            conn.execute_batch(
                "
                CREATE TABLE profiles (
                    name TEXT PRIMARY KEY,
                    host TEXT NOT NULL,
                    port INTEGER NOT NULL DEFAULT 5432,
                    username TEXT NOT NULL,
                    credential_ref TEXT NOT NULL,
                    dbname TEXT,
                    tls_mode TEXT NOT NULL DEFAULT 'prefer',
                    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                ) STRICT;

                CREATE TABLE ui_state (
                    key TEXT PRIMARY KEY,
                    value_json TEXT NOT NULL,
                    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
                ) STRICT;
                ",
            )
            .map_err(|e| BurrowError::storage(format!("Migration 1 failed: {e}"), None))?;

            conn.execute(
                "INSERT INTO migrations (domain, step, migration) VALUES (?, 1, 'initial_schema')",
                [DOMAIN],
            )
            .map_err(|e| BurrowError::storage(format!("Failed to record migration: {e}"), None))?;

            tracing::info!("Applied migration 1: initial_schema");
        }

        Ok(())
    }

    // ========== UI State Operations ==========

    pub fn save_ui_state(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.connection.lock();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO ui_state (key, value_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                value_json = excluded.value_json,
                updated_at = excluded.updated_at",
            params![key, serde_json::to_string(value)?, now],
        )
        .map_err(|e| BurrowError::storage(format!("Failed to save UI state: {e}"), None))?;

        Ok(())
    }

    pub fn load_ui_state(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let conn = self.connection.lock();

        let result: Option<String> = conn
            .query_row("SELECT value_json FROM ui_state WHERE key = ?", [key], |row| row.get(0))
            .optional()
            .map_err(|e| BurrowError::storage(format!("Failed to load UI state: {e}"), None))?;

        match result {
            Some(json_str) => {
                let value = serde_json::from_str(&json_str).map_err(|e| {
                    BurrowError::storage(format!("Invalid UI state JSON: {e}"), None)
                })?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    pub fn save_last_selection(&self, selection: &LastSelection) -> Result<()> {
        self.save_ui_state(LAST_SELECTION_KEY, &serde_json::to_value(selection)?)
    }

    /// Last saved selection; unreadable state counts as none.
    pub fn load_last_selection(&self) -> Result<LastSelection> {
        Ok(self
            .load_ui_state(LAST_SELECTION_KEY)?
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default())
    }

    pub fn save_last_query(&self, sql: &str) -> Result<()> {
        self.save_ui_state(LAST_QUERY_KEY, &serde_json::Value::String(sql.to_string()))
    }

    pub fn load_last_query(&self) -> Result<String> {
        Ok(self
            .load_ui_state(LAST_QUERY_KEY)?
            .and_then(|value| value.as_str().map(String::from))
            .filter(|sql| !sql.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_QUERY.to_string()))
    }
}

impl ProfileStore for LocalStorage {
    fn load_connection_profiles(&self) -> Result<Vec<ConnectionProfile>> {
        let conn = self.connection.lock();

        let mut stmt = conn
            .prepare(
                "SELECT name, host, port, username, credential_ref, dbname, tls_mode
                 FROM profiles ORDER BY name",
            )
            .map_err(|e| BurrowError::storage(format!("Failed to prepare query: {e}"), None))?;

        let rows = stmt
            .query_map([], |row| {
                let tls_mode: String = row.get(6)?;
                Ok(ConnectionProfile {
                    name: row.get(0)?,
                    host: row.get(1)?,
                    port: row.get(2)?,
                    user: row.get(3)?,
                    credential_ref: row.get(4)?,
                    dbname: row.get(5)?,
                    tls_mode: TlsMode::parse(&tls_mode),
                })
            })
            .map_err(|e| BurrowError::storage(format!("Failed to query profiles: {e}"), None))?;

        let mut profiles = Vec::new();
        for row in rows {
            profiles.push(
                row.map_err(|e| BurrowError::storage(format!("Failed to read row: {e}"), None))?,
            );
        }
        Ok(profiles)
    }

    fn save_connection_profile(&self, profile: &ConnectionProfile) -> Result<()> {
        profile.validate()?;
        let conn = self.connection.lock();

        let exists: Option<String> = conn
            .query_row("SELECT name FROM profiles WHERE name = ?", [&profile.name], |row| {
                row.get(0)
            })
            .optional()
            .map_err(|e| BurrowError::storage(format!("Failed to check profile: {e}"), None))?;
        if exists.is_some() {
            return Err(BurrowError::invalid_argument(format!(
                "Connection name already exists: {}",
                profile.name
            )));
        }

        conn.execute(
            "INSERT INTO profiles (name, host, port, username, credential_ref, dbname, tls_mode)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                profile.name,
                profile.host,
                profile.port,
                profile.user,
                profile.credential_ref,
                profile.dbname,
                profile.tls_mode.as_str(),
            ],
        )
        .map_err(|e| BurrowError::storage(format!("Failed to save profile: {e}"), None))?;

        tracing::debug!(name = %profile.name, "Connection profile saved");
        Ok(())
    }

    fn delete_connection_profile(&self, name: &str) -> Result<()> {
        let conn = self.connection.lock();
        conn.execute("DELETE FROM profiles WHERE name = ?", [name])
            .map_err(|e| BurrowError::storage(format!("Failed to delete profile: {e}"), None))?;
        tracing::debug!(name, "Connection profile deleted");
        Ok(())
    }
}

impl std::fmt::Debug for LocalStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStorage").field("data_dir", &self.data_dir).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_profiles_roundtrip() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        assert!(storage.load_connection_profiles().unwrap().is_empty());

        let prod = ConnectionProfile::new("prod", "db.internal", "app")
            .with_port(6543)
            .with_dbname("mydb")
            .with_tls_mode(TlsMode::Require);
        storage.save_connection_profile(&prod).unwrap();
        storage
            .save_connection_profile(&ConnectionProfile::new("local", "localhost", "me"))
            .unwrap();

        let loaded = storage.load_connection_profiles().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].name, "local");
        assert_eq!(loaded[1], prod);
    }

    #[test]
    fn test_duplicate_profile_rejected() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let profile = ConnectionProfile::new("prod", "localhost", "me");
        storage.save_connection_profile(&profile).unwrap();

        let err = storage.save_connection_profile(&profile).unwrap_err();
        assert!(matches!(
            err,
            BurrowError::InvalidArgument { ref message } if message == "Connection name already exists: prod"
        ));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let dir = tempdir().unwrap();
        {
            let storage = LocalStorage::open(dir.path()).unwrap();
            storage
                .save_connection_profile(&ConnectionProfile::new("prod", "localhost", "me"))
                .unwrap();
        }
        let storage = LocalStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_connection_profiles().unwrap().len(), 1);
    }

    struct ReadOnlyKeychain;

    impl crate::services::credentials::CredentialsProvider for ReadOnlyKeychain {
        fn store(&self, _key: &str, _value: &str) -> Result<()> {
            Err(BurrowError::keyring("keychain is locked", None))
        }

        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn delete(&self, _key: &str) -> Result<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "read-only"
        }
    }

    #[test]
    fn test_add_connection_stores_password() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let credentials = CredentialService::with_provider(Box::new(
            crate::services::credentials::SessionCredentialsProvider::new(),
        ));
        let profile = ConnectionProfile::new("prod", "localhost", "me");

        add_connection(&storage, &credentials, &profile, "pw").unwrap();
        assert_eq!(storage.load_connection_profiles().unwrap(), vec![profile.clone()]);
        assert_eq!(credentials.get_password("profile:prod").unwrap().as_deref(), Some("pw"));

        let err = add_connection(&storage, &credentials, &profile, "other").unwrap_err();
        assert!(matches!(err, BurrowError::InvalidArgument { .. }));
        assert_eq!(credentials.get_password("profile:prod").unwrap().as_deref(), Some("pw"));
    }

    #[test]
    fn test_add_connection_rolls_back_without_password() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        let credentials = CredentialService::with_provider(Box::new(ReadOnlyKeychain));
        let profile = ConnectionProfile::new("prod", "localhost", "me");

        let err = add_connection(&storage, &credentials, &profile, "pw").unwrap_err();
        assert!(matches!(err, BurrowError::Keyring { .. }));
        assert!(storage.load_connection_profiles().unwrap().is_empty());

        storage.delete_connection_profile("never-saved").unwrap();
    }

    #[test]
    fn test_last_query_default_and_update() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_last_query().unwrap(), DEFAULT_QUERY);

        storage.save_last_query("SELECT now()").unwrap();
        assert_eq!(storage.load_last_query().unwrap(), "SELECT now()");
    }

    #[test]
    fn test_last_selection() {
        let dir = tempdir().unwrap();
        let storage = LocalStorage::open(dir.path()).unwrap();
        assert_eq!(storage.load_last_selection().unwrap(), LastSelection::default());

        let selection = LastSelection {
            connection: Some("prod".into()),
            database: Some("mydb".into()),
            schema: None,
        };
        storage.save_last_selection(&selection).unwrap();
        assert_eq!(storage.load_last_selection().unwrap(), selection);
    }
}
