//! Backend services for Burrow.
//!
//! - `session` - Pooled PostgreSQL sessions with deadpool-postgres
//! - `executor` - Background fetches with cancellation and one reconnect
//! - `catalog` - Catalog and paging statements
//! - `values` - Text rendering of PostgreSQL values
//! - `credentials` - Password storage in the OS keychain or a local file
//! - `storage` - Local SQLite storage for profiles and UI state

pub mod catalog;
pub mod credentials;
pub mod executor;
pub mod session;
pub mod storage;
pub mod values;

pub use credentials::CredentialService;
pub use executor::QueryExecutor;
pub use session::{PgSession, PgSessionFactory, QuerySession, SessionFactory};
pub use storage::{add_connection, LastSelection, LocalStorage, ProfileStore};
