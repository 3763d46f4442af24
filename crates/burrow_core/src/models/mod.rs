//! Data models for Burrow.
//!
//! - `connection` - ConnectionProfile, TlsMode, SessionOptions
//! - `query` - QueryRequest, QueryOutcome, QueryHandle, RowSet, RowPage
//! - `schema` - ListEntry, TableInfo, ListingCache

pub mod connection;
pub mod query;
pub mod schema;

pub use connection::{credential_ref_for, ConnectionProfile, SessionOptions, TlsMode};
pub use query::{
    ColumnInfo, OutcomeData, OutcomeResult, QueryHandle, QueryOutcome, QueryRequest,
    RequestTarget, RowPage, RowSet, SqlParam, Statement,
};
pub use schema::{ListEntry, ListingCache, TableInfo};
