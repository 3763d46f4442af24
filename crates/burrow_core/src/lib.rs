//! Core of the Burrow terminal PostgreSQL browser.
//!
//! - **navigation**: The connection → database → schema → table → rows stack
//! - **coordinator**: Turns intents into requests and outcomes into views
//! - **router**: Keystrokes and `:` commands to intents
//! - **services**: Sessions, background fetches, credentials, storage
//! - **models**: Profiles, requests, outcomes and listings
//! - **error**: Error categories and user-facing failures
//! - **config**: Defaults and environment overrides
//! - **logging**: Structured logging setup

pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod models;
pub mod navigation;
pub mod router;
pub mod services;

#[cfg(test)]
mod testing;

pub use config::CoreConfig;
pub use coordinator::{Flow, ViewContent, ViewCoordinator, ViewState};
pub use error::{BurrowError, Failure, FailureKind, Result};
pub use models::{ConnectionProfile, ListEntry, QueryOutcome, RowPage, TlsMode};
pub use navigation::{EditMode, NavigationLevel, NavigationState, SelectionPath};
pub use router::{parse_command, CommandRouter, Intent, Key};
pub use services::{CredentialService, LocalStorage, PgSessionFactory, ProfileStore};
