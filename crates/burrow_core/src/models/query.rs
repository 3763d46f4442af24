//! Query request, result and outcome models.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio_postgres::types::ToSql;
use tokio_util::sync::CancellationToken;

use crate::error::Failure;
use crate::models::schema::ListEntry;
use crate::navigation::{AdHocQuery, NavigationLevel, RowsQuerySpec, SelectionPath};

/// Column metadata from query results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// PostgreSQL type OID
    pub type_oid: u32,
    /// Human-readable type name
    pub type_name: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self { name: name.into(), type_oid: 0, type_name: type_name.into() }
    }
}

/// A bound parameter. Only what the query builder needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlParam {
    Int(i64),
    Text(String),
}

impl SqlParam {
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            Self::Int(v) => v,
            Self::Text(v) => v,
        }
    }
}

/// SQL text plus its bound parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self { sql: sql.into(), params: Vec::new() }
    }

    pub fn bind(mut self, param: SqlParam) -> Self {
        self.params.push(param);
        self
    }
}

/// Rows as rendered text. `None` cells are SQL NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowSet {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl RowSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Text of the named column in the given row.
    pub fn value(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(index)?.as_deref()
    }
}

/// One page of a rows or ad-hoc result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPage {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<Option<String>>>,
    pub page_index: usize,
    pub page_size: usize,
    /// At least one more row exists past this page
    pub has_more: bool,
}

impl RowPage {
    /// Build a page from a set fetched with one extra look-ahead row.
    pub fn from_lookahead(set: RowSet, page_index: usize, page_size: usize) -> Self {
        let RowSet { columns, mut rows } = set;
        let has_more = rows.len() > page_size;
        rows.truncate(page_size);
        Self { columns, rows, page_index, page_size, has_more }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 1-based number of the first row on this page.
    pub fn first_row_number(&self) -> usize {
        self.page_index * self.page_size + 1
    }
}

/// What a request asks for, derived from the navigation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    Databases,
    Schemas,
    Tables { schema: String },
    Rows(RowsQuerySpec),
    AdHoc(AdHocQuery),
}

/// One issued fetch. Immutable once issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryRequest {
    /// Unique, monotonically increasing across all slots
    pub sequence: u64,
    /// Slot the request occupies
    pub level: NavigationLevel,
    pub path: SelectionPath,
    pub target: RequestTarget,
}

/// Data of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeData {
    Listing(Vec<ListEntry>),
    Page(RowPage),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeResult {
    Success(OutcomeData),
    Failure(Failure),
    Cancelled,
}

/// The single completion of a `QueryRequest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryOutcome {
    pub sequence: u64,
    pub level: NavigationLevel,
    pub result: OutcomeResult,
    /// The session was re-established while serving this request
    pub reconnected: bool,
    pub elapsed_ms: u64,
}

impl QueryOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self.result, OutcomeResult::Success(_))
    }
}

/// Handle for tracking and cancelling an issued request.
#[derive(Clone)]
pub struct QueryHandle {
    sequence: u64,
    level: NavigationLevel,
    cancel_token: CancellationToken,
    started_at: Instant,
}

impl QueryHandle {
    pub fn new(sequence: u64, level: NavigationLevel) -> Self {
        Self { sequence, level, cancel_token: CancellationToken::new(), started_at: Instant::now() }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn level(&self) -> NavigationLevel {
        self.level
    }

    /// Get elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Request cancellation. Calling it again does nothing.
    pub fn cancel(&self) {
        if !self.cancel_token.is_cancelled() {
            tracing::debug!(sequence = self.sequence, level = %self.level, "Cancellation requested");
            self.cancel_token.cancel();
        }
    }

    /// Check if cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Get a clone of the cancellation token.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }
}

impl std::fmt::Debug for QueryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHandle")
            .field("sequence", &self.sequence)
            .field("level", &self.level)
            .field("elapsed_ms", &self.elapsed_ms())
            .field("is_cancelled", &self.is_cancelled())
            .finish()
    }
}
