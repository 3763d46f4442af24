//! Query execution with cancellation and one-shot reconnect.
//!
//! `QueryExecutor::start` spawns a task per request and returns at once.
//! The task delivers exactly one `QueryOutcome` on the channel, tagged with
//! the request's sequence number:
//!
//! 1. Run the fetch for the request target.
//! 2. On `ConnectionLost`, reconnect the session and run the same request
//!    once more. A second failure is final.
//! 3. A fetch that finished wins over a cancel that raced it; otherwise a
//!    cancelled request reports `Cancelled`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{BurrowError, QueryFailureKind, Result};
use crate::models::{
    ListEntry, OutcomeData, OutcomeResult, QueryHandle, QueryOutcome, QueryRequest, RequestTarget,
    RowPage,
};
use crate::services::catalog;
use crate::services::session::QuerySession;

/// Starts fetches and delivers their outcomes.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    timeout: Duration,
}

impl QueryExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Spawn the fetch for `request`. Must be called inside a tokio runtime.
    pub fn start(
        &self,
        session: Arc<dyn QuerySession>,
        request: QueryRequest,
        tx: mpsc::UnboundedSender<QueryOutcome>,
    ) -> QueryHandle {
        let handle = QueryHandle::new(request.sequence, request.level);
        let task_handle = handle.clone();
        let timeout = self.timeout;

        tracing::debug!(
            sequence = request.sequence,
            level = %request.level,
            path = %request.path,
            database = session.database(),
            "Starting fetch"
        );

        tokio::spawn(async move {
            let outcome = run(session.as_ref(), &request, timeout, &task_handle).await;
            if tx.send(outcome).is_err() {
                tracing::debug!(sequence = request.sequence, "Outcome receiver dropped");
            }
        });

        handle
    }

    /// Request cancellation. Safe to call any number of times, even after
    /// the outcome was delivered.
    pub fn cancel(&self, handle: &QueryHandle) {
        handle.cancel();
    }
}

async fn run(
    session: &dyn QuerySession,
    request: &QueryRequest,
    timeout: Duration,
    handle: &QueryHandle,
) -> QueryOutcome {
    let token = handle.cancel_token();
    let mut reconnected = false;

    let result = match fetch(session, &request.target, timeout, &token).await {
        Err(e) if e.is_connection_lost() && !token.is_cancelled() => {
            tracing::warn!(sequence = request.sequence, error = %e, "Connection lost, reconnecting");
            match session.reconnect().await {
                Ok(()) => {
                    reconnected = true;
                    fetch(session, &request.target, timeout, &token).await
                }
                Err(re) => Err(BurrowError::connection_lost(format!(
                    "Connection lost; reconnect failed: {re}"
                ))),
            }
        }
        other => other,
    };

    let result = match result {
        Ok(data) => OutcomeResult::Success(data),
        Err(e) if e.is_cancelled() || token.is_cancelled() => OutcomeResult::Cancelled,
        Err(e) => {
            tracing::warn!(
                sequence = request.sequence,
                level = %request.level,
                category = e.category(),
                error = %e,
                "Fetch failed"
            );
            OutcomeResult::Failure(e.to_failure())
        }
    };

    let elapsed_ms = handle.elapsed_ms();
    tracing::debug!(
        sequence = request.sequence,
        level = %request.level,
        elapsed_ms,
        reconnected,
        "Fetch finished"
    );

    QueryOutcome { sequence: request.sequence, level: request.level, result, reconnected, elapsed_ms }
}

async fn fetch(
    session: &dyn QuerySession,
    target: &RequestTarget,
    timeout: Duration,
    cancel: &CancellationToken,
) -> Result<OutcomeData> {
    match target {
        RequestTarget::Databases => {
            let set = session.execute(&catalog::list_databases(), timeout, cancel).await?;
            Ok(OutcomeData::Listing(catalog::entries_from_names(&set)))
        }
        RequestTarget::Schemas => {
            let set = session.execute(&catalog::list_schemas(), timeout, cancel).await?;
            Ok(OutcomeData::Listing(catalog::entries_from_names(&set)))
        }
        RequestTarget::Tables { schema } => {
            let set = session.execute(&catalog::list_tables(schema), timeout, cancel).await?;
            let entries = catalog::tables_from(&set, schema).into_iter().map(ListEntry::from);
            Ok(OutcomeData::Listing(entries.collect()))
        }
        RequestTarget::Rows(spec) => {
            let found = session
                .execute(&catalog::relation_exists(&spec.schema, &spec.table), timeout, cancel)
                .await?;
            if found.is_empty() {
                return Err(BurrowError::query(
                    QueryFailureKind::SyntaxError,
                    format!("relation \"{}\".\"{}\" does not exist", spec.schema, spec.table),
                ));
            }
            let set = session.execute(&catalog::rows_page(spec)?, timeout, cancel).await?;
            Ok(OutcomeData::Page(RowPage::from_lookahead(set, spec.page_index, spec.page_size)))
        }
        RequestTarget::AdHoc(query) => {
            let set = session.execute(&catalog::adhoc_page(query)?, timeout, cancel).await?;
            Ok(OutcomeData::Page(RowPage::from_lookahead(set, query.page_index, query.page_size)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::navigation::{AdHocQuery, NavigationLevel, RowsQuerySpec, SelectionPath};
    use crate::testing::FakeSession;

    fn request(sequence: u64, level: NavigationLevel, target: RequestTarget) -> QueryRequest {
        QueryRequest {
            sequence,
            level,
            path: SelectionPath::from_segments(["local", "mydb", "public"]),
            target,
        }
    }

    fn widgets(page_size: usize) -> RequestTarget {
        RequestTarget::Rows(RowsQuerySpec::new("public", "widgets", page_size))
    }

    async fn run_one(
        session: Arc<FakeSession>,
        req: QueryRequest,
        timeout: Duration,
    ) -> QueryOutcome {
        let (tx, mut rx) = mpsc::unbounded_channel();
        QueryExecutor::new(timeout).start(session, req, tx);
        rx.recv().await.unwrap()
    }

    #[tokio::test]
    async fn test_rows_fetch_reports_last_page() {
        let session = FakeSession::new("mydb");
        let outcome =
            run_one(session, request(1, NavigationLevel::Rows, widgets(100)), Duration::from_secs(5))
                .await;

        assert_eq!(outcome.sequence, 1);
        assert!(!outcome.reconnected);
        match outcome.result {
            OutcomeResult::Success(OutcomeData::Page(page)) => {
                assert_eq!(page.row_count(), 3);
                assert!(!page.has_more);
                assert_eq!(page.columns.len(), 3);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rows_fetch_lookahead_sets_has_more() {
        let session = FakeSession::new("mydb");
        let outcome =
            run_one(session, request(1, NavigationLevel::Rows, widgets(2)), Duration::from_secs(5))
                .await;
        match outcome.result {
            OutcomeResult::Success(OutcomeData::Page(page)) => {
                assert_eq!(page.row_count(), 2);
                assert!(page.has_more);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_relation_fails_before_paging() {
        let session = FakeSession::new("mydb");
        let target = RequestTarget::Rows(RowsQuerySpec::new("public", "nope", 10));
        let outcome =
            run_one(session.clone(), request(3, NavigationLevel::Rows, target), Duration::from_secs(5))
                .await;

        match outcome.result {
            OutcomeResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Query(QueryFailureKind::SyntaxError));
                assert_eq!(failure.message, "relation \"public\".\"nope\" does not exist");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(session.executed_count(), 1);
    }

    #[tokio::test]
    async fn test_table_listing_carries_estimates() {
        let session = FakeSession::new("mydb");
        let target = RequestTarget::Tables { schema: "public".into() };
        let outcome =
            run_one(session, request(2, NavigationLevel::Table, target), Duration::from_secs(5)).await;
        match outcome.result {
            OutcomeResult::Success(OutcomeData::Listing(entries)) => {
                assert_eq!(entries[1], ListEntry::with_detail("widgets", "~3"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_timeout_surfaces_as_failure() {
        let session = FakeSession::new("mydb");
        session.delay_when("\"widgets\"", Duration::from_secs(5));
        let outcome = run_one(
            session,
            request(4, NavigationLevel::Rows, widgets(100)),
            Duration::from_millis(50),
        )
        .await;
        match outcome.result {
            OutcomeResult::Failure(failure) => {
                assert_eq!(failure.kind, FailureKind::Query(QueryFailureKind::Timeout));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_lost_retries_once() {
        let session = FakeSession::new("mydb");
        session.lose_connection_once();
        let outcome = run_one(
            session.clone(),
            request(5, NavigationLevel::Schema, RequestTarget::Schemas),
            Duration::from_secs(5),
        )
        .await;

        assert!(outcome.is_success());
        assert!(outcome.reconnected);
        assert_eq!(session.reconnects.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(session.executed_count(), 2);
    }

    #[tokio::test]
    async fn test_second_connection_loss_is_final() {
        let session = FakeSession::new("mydb");
        session.lose_connection_once();
        session.fail_next(BurrowError::connection_lost("server closed the connection"));
        let outcome = run_one(
            session.clone(),
            request(6, NavigationLevel::Schema, RequestTarget::Schemas),
            Duration::from_secs(5),
        )
        .await;

        match outcome.result {
            OutcomeResult::Failure(failure) => assert!(failure.is_connection_lost()),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(session.reconnects.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(session.executed_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_reconnect_reported() {
        let session = FakeSession::new("mydb");
        session.lose_connection_once();
        session.fail_reconnects();
        let outcome = run_one(
            session,
            request(7, NavigationLevel::Schema, RequestTarget::Schemas),
            Duration::from_secs(5),
        )
        .await;
        match outcome.result {
            OutcomeResult::Failure(failure) => {
                assert!(failure.is_connection_lost());
                assert!(failure.message.starts_with("Connection lost; reconnect failed"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_delivers_cancelled_once() {
        let session = FakeSession::new("mydb");
        session.delay_when("\"widgets\"", Duration::from_secs(5));
        let executor = QueryExecutor::new(Duration::from_secs(10));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = executor.start(session, request(8, NavigationLevel::Rows, widgets(10)), tx);
        executor.cancel(&handle);
        executor.cancel(&handle);

        let outcome = rx.recv().await.unwrap();
        assert_eq!(outcome.result, OutcomeResult::Cancelled);
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_cancel_after_completion_keeps_success() {
        let session = FakeSession::new("mydb");
        let executor = QueryExecutor::new(Duration::from_secs(10));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let handle = executor.start(session, request(9, NavigationLevel::Schema, RequestTarget::Schemas), tx);
        let outcome = rx.recv().await.unwrap();
        executor.cancel(&handle);
        assert!(outcome.is_success());
    }

    #[tokio::test]
    async fn test_adhoc_query_paged() {
        let session = FakeSession::new("mydb");
        let target = RequestTarget::AdHoc(AdHocQuery {
            sql: "SELECT n FROM t; -- five rows".into(),
            page_size: 2,
            page_index: 2,
        });
        let outcome =
            run_one(session, request(10, NavigationLevel::Query, target), Duration::from_secs(5)).await;
        match outcome.result {
            OutcomeResult::Success(OutcomeData::Page(page)) => {
                assert_eq!(page.rows, vec![vec![Some("5".to_string())]]);
                assert!(!page.has_more);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }
}
