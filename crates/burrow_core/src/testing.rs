//! Scripted in-memory sessions for tests.
//!
//! `FakeSession` answers the catalog and paging statements against a small
//! fixture: database `mydb`, schema `public`, tables `gadgets` (empty) and
//! `widgets` with three rows of quantity 0, 3 and 7.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{BurrowError, QueryFailureKind, Result};
use crate::models::{ColumnInfo, ConnectionProfile, RowSet, SqlParam, Statement};
use crate::services::session::{QuerySession, SessionFactory};

#[derive(Default)]
pub struct FakeSession {
    database: String,
    /// Statements containing the key sleep this long before answering
    delays: Mutex<Vec<(String, Duration)>>,
    lose_next: AtomicBool,
    fail_reconnect: AtomicBool,
    fail_next: Mutex<Option<BurrowError>>,
    closed: AtomicBool,
    pub executed: Mutex<Vec<String>>,
    pub reconnects: AtomicUsize,
}

impl FakeSession {
    pub fn new(database: &str) -> Arc<Self> {
        Arc::new(Self { database: database.to_string(), ..Default::default() })
    }

    pub fn delay_when(&self, needle: &str, delay: Duration) {
        self.delays.lock().push((needle.to_string(), delay));
    }

    pub fn lose_connection_once(&self) {
        self.lose_next.store(true, Ordering::SeqCst);
    }

    pub fn fail_reconnects(&self) {
        self.fail_reconnect.store(true, Ordering::SeqCst);
    }

    pub fn fail_next(&self, err: BurrowError) {
        *self.fail_next.lock() = Some(err);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn executed_count(&self) -> usize {
        self.executed.lock().len()
    }

    fn delay_for(&self, sql: &str) -> Option<Duration> {
        self.delays.lock().iter().find(|(needle, _)| sql.contains(needle.as_str())).map(|(_, d)| *d)
    }
}

#[async_trait]
impl QuerySession for FakeSession {
    async fn execute(
        &self,
        statement: &Statement,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RowSet> {
        self.executed.lock().push(statement.sql.clone());
        if self.is_closed() {
            return Err(BurrowError::connection_lost("Session closed"));
        }

        if let Some(delay) = self.delay_for(&statement.sql) {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = tokio::time::sleep(timeout) => {
                    return Err(BurrowError::timeout(timeout.as_millis() as u64));
                }
                _ = cancel.cancelled() => return Err(BurrowError::QueryCancelled),
            }
        }
        if cancel.is_cancelled() {
            return Err(BurrowError::QueryCancelled);
        }

        if self.lose_next.swap(false, Ordering::SeqCst) {
            return Err(BurrowError::connection_lost("server closed the connection unexpectedly"));
        }
        if let Some(err) = self.fail_next.lock().take() {
            return Err(err);
        }
        respond(statement)
    }

    async fn reconnect(&self) -> Result<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        if self.fail_reconnect.load(Ordering::SeqCst) {
            return Err(BurrowError::connect(
                crate::error::ConnectFailureKind::Network,
                "Connection refused",
            ));
        }
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn database(&self) -> &str {
        &self.database
    }
}

fn names(values: &[&str]) -> RowSet {
    RowSet {
        columns: vec![ColumnInfo::new("name", "name")],
        rows: values.iter().map(|v| vec![Some(v.to_string())]).collect(),
    }
}

fn widgets() -> Vec<(i32, &'static str, i32)> {
    vec![(1, "bolt", 0), (2, "nut", 3), (3, "gear", 7)]
}

fn int_param(statement: &Statement, index: usize) -> usize {
    match statement.params.get(index) {
        Some(SqlParam::Int(v)) => *v as usize,
        _ => 0,
    }
}

fn text_param(statement: &Statement, index: usize) -> &str {
    match statement.params.get(index) {
        Some(SqlParam::Text(v)) => v,
        _ => "",
    }
}

fn respond(statement: &Statement) -> Result<RowSet> {
    let sql = statement.sql.as_str();

    if sql.contains("pg_database") {
        return Ok(names(&["mydb", "postgres"]));
    }
    if sql.contains("information_schema.schemata") {
        return Ok(names(&["information_schema", "public"]));
    }
    if sql.contains("c.relkind = 'r'") {
        if text_param(statement, 0) != "public" {
            return Ok(names(&[]));
        }
        return Ok(RowSet {
            columns: vec![ColumnInfo::new("name", "name"), ColumnInfo::new("estimated_rows", "int8")],
            rows: vec![
                vec![Some("gadgets".into()), Some("0".into())],
                vec![Some("widgets".into()), Some("3".into())],
            ],
        });
    }
    if sql.contains("c.relname = $2") {
        let known = text_param(statement, 0) == "public"
            && matches!(text_param(statement, 1), "widgets" | "gadgets");
        return Ok(if known { names(&[text_param(statement, 1)]) } else { names(&[]) });
    }
    if sql.contains("AS query_result") {
        let rows: Vec<Vec<Option<String>>> =
            (1..=5).map(|i| vec![Some(i.to_string())]).collect();
        return Ok(page(vec![ColumnInfo::new("n", "int4")], rows, statement));
    }
    if sql.contains("\"widgets\"") {
        if sql.contains("bogus") {
            return Err(BurrowError::Query {
                kind: QueryFailureKind::SyntaxError,
                message: "column \"bogus\" does not exist".into(),
                detail: None,
                hint: None,
                position: Some(38),
                code: Some("42703".into()),
            });
        }
        let mut fixture = widgets();
        if sql.contains("WHERE quantity > 0") {
            fixture.retain(|(_, _, q)| *q > 0);
        }
        if sql.contains("ORDER BY quantity desc") {
            fixture.reverse();
        }
        let rows = fixture
            .into_iter()
            .map(|(id, name, q)| vec![Some(id.to_string()), Some(name.into()), Some(q.to_string())])
            .collect();
        let columns = vec![
            ColumnInfo::new("id", "int4"),
            ColumnInfo::new("name", "text"),
            ColumnInfo::new("quantity", "int4"),
        ];
        return Ok(page(columns, rows, statement));
    }
    if sql.contains("\"gadgets\"") {
        return Ok(page(vec![ColumnInfo::new("id", "int4")], Vec::new(), statement));
    }
    Err(BurrowError::query(QueryFailureKind::Other, format!("unexpected statement: {sql}")))
}

fn page(columns: Vec<ColumnInfo>, rows: Vec<Vec<Option<String>>>, statement: &Statement) -> RowSet {
    let limit = int_param(statement, 0);
    let offset = int_param(statement, 1);
    RowSet { columns, rows: rows.into_iter().skip(offset).take(limit).collect() }
}

/// Hands out `FakeSession`s, remembering each by database.
#[derive(Default)]
pub struct FakeFactory {
    pub opened: Mutex<HashMap<String, Arc<FakeSession>>>,
    pub open_count: AtomicUsize,
    /// Applied to every session this factory opens
    delays: Mutex<Vec<(String, Duration)>>,
    fail_next_open: Mutex<Option<BurrowError>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn delay_when(&self, needle: &str, delay: Duration) {
        self.delays.lock().push((needle.to_string(), delay));
        for session in self.opened.lock().values() {
            session.delay_when(needle, delay);
        }
    }

    /// Make the next `open` fail with `err`.
    pub fn fail_next_open(&self, err: BurrowError) {
        *self.fail_next_open.lock() = Some(err);
    }

    pub fn session(&self, database: &str) -> Arc<FakeSession> {
        self.opened.lock().get(database).cloned().unwrap_or_else(|| panic!("no session for {database}"))
    }
}

impl SessionFactory for FakeFactory {
    fn open(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
    ) -> Result<Arc<dyn QuerySession>> {
        if let Some(err) = self.fail_next_open.lock().take() {
            return Err(err);
        }
        let database = database.unwrap_or_else(|| profile.maintenance_database());
        let session = FakeSession::new(database);
        for (needle, delay) in self.delays.lock().iter() {
            session.delay_when(needle, *delay);
        }
        self.open_count.fetch_add(1, Ordering::SeqCst);
        self.opened.lock().insert(database.to_string(), session.clone());
        Ok(session)
    }
}
