//! Read-only, timeout-bounded database sessions.
//!
//! A session wraps a small deadpool-postgres pool for one database target.
//! Every statement runs inside its own `BEGIN READ ONLY` transaction with a
//! `SET LOCAL statement_timeout`, and the connection defaults are read-only
//! as well. A statement that is cancelled or overruns the client-side limit
//! gets a server-side cancel and its connection is dropped from the pool
//! instead of being reused.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod, Runtime};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use tokio_postgres::NoTls;
use tokio_util::sync::CancellationToken;

use crate::error::{BurrowError, ConnectFailureKind, Result};
use crate::models::{ConnectionProfile, RowSet, SessionOptions, Statement, TlsMode};
use crate::services::credentials::CredentialService;
use crate::services::values::rowset_from;

/// A live handle to one database target.
#[async_trait]
pub trait QuerySession: Send + Sync {
    /// Run one read-only statement, honouring `timeout` and `cancel`.
    async fn execute(
        &self,
        statement: &Statement,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RowSet>;

    /// Drop every pooled connection and prove a fresh one works.
    async fn reconnect(&self) -> Result<()>;

    /// Release all connections. Later calls to `execute` fail.
    fn close(&self);

    /// Database this session is bound to.
    fn database(&self) -> &str;
}

/// Opens sessions for a profile.
pub trait SessionFactory: Send + Sync {
    /// `database` of `None` opens a server-level session on the profile's
    /// maintenance database. Connecting is lazy; authentication and network
    /// failures surface from the first statement.
    fn open(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
    ) -> Result<Arc<dyn QuerySession>>;
}

#[derive(Clone)]
enum Tls {
    Plain,
    Native(MakeTlsConnector),
}

/// PostgreSQL session over a deadpool pool.
pub struct PgSession {
    pool: Pool,
    tls: Tls,
    database: String,
    options: SessionOptions,
}

impl PgSession {
    /// Build the pool. No connection is made yet.
    pub fn open(
        profile: &ConnectionProfile,
        database: &str,
        password: &str,
        options: SessionOptions,
    ) -> Result<Self> {
        let connect_timeout = Duration::from_secs(options.connect_timeout_secs);

        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&profile.host);
        pg_config.port(profile.port);
        pg_config.dbname(database);
        pg_config.user(&profile.user);
        pg_config.password(password);
        pg_config.application_name(&options.application_name);
        pg_config.connect_timeout(connect_timeout);
        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(60));
        pg_config.options(&format!(
            "-c default_transaction_read_only=on -c statement_timeout={}",
            options.statement_timeout_ms
        ));

        let manager_config = ManagerConfig { recycling_method: RecyclingMethod::Fast };
        let (manager, tls) = match profile.tls_mode {
            TlsMode::Disable => {
                pg_config.ssl_mode(tokio_postgres::config::SslMode::Disable);
                (Manager::from_config(pg_config, NoTls, manager_config), Tls::Plain)
            }
            mode => {
                pg_config.ssl_mode(if mode == TlsMode::Prefer {
                    tokio_postgres::config::SslMode::Prefer
                } else {
                    tokio_postgres::config::SslMode::Require
                });
                let tls = MakeTlsConnector::new(tls_connector(mode)?);
                (Manager::from_config(pg_config, tls.clone(), manager_config), Tls::Native(tls))
            }
        };

        let pool = Pool::builder(manager)
            .max_size(options.pool_size)
            .wait_timeout(Some(connect_timeout))
            .create_timeout(Some(connect_timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| {
                BurrowError::connect(
                    ConnectFailureKind::Network,
                    format!("Failed to create pool: {e}"),
                )
            })?;

        tracing::info!(
            profile = %profile.name,
            host = %profile.host,
            database = %database,
            tls = profile.tls_mode.as_str(),
            "Session opened"
        );

        Ok(Self { pool, tls, database: database.to_string(), options })
    }

    async fn acquire(&self, cancel: &CancellationToken) -> Result<Object> {
        tokio::select! {
            client = self.pool.get() => Ok(client?),
            _ = cancel.cancelled() => Err(BurrowError::QueryCancelled),
        }
    }

    /// Cancel server-side and drop a connection left mid-protocol with a
    /// transaction open.
    async fn abandon(&self, client: Object) {
        let token = client.cancel_token();
        let result = match &self.tls {
            Tls::Plain => token.cancel_query(NoTls).await,
            Tls::Native(tls) => token.cancel_query(tls.clone()).await,
        };
        if let Err(e) = result {
            tracing::debug!(error = %e, "Server-side cancel failed");
        }
        let _ = Object::take(client);
    }
}

/// Outcome of racing a statement against cancellation and the hard limit.
enum Step {
    Done(Result<RowSet>),
    Cancelled,
    TimedOut,
}

#[async_trait]
impl QuerySession for PgSession {
    async fn execute(
        &self,
        statement: &Statement,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<RowSet> {
        let client = self.acquire(cancel).await?;
        let timeout_ms = timeout.as_millis() as u64;
        let hard_limit = timeout + Duration::from_millis(self.options.timeout_grace_ms);

        let step = {
            let work = run_read_only(&client, statement, timeout_ms);
            tokio::select! {
                result = work => Step::Done(result),
                _ = cancel.cancelled() => Step::Cancelled,
                _ = tokio::time::sleep(hard_limit) => Step::TimedOut,
            }
        };

        match step {
            Step::Done(result) => {
                if client.is_closed() {
                    // Broken socket; keep it out of the pool.
                    let _ = Object::take(client);
                }
                result
            }
            Step::Cancelled => {
                self.abandon(client).await;
                tracing::debug!(database = %self.database, "Statement cancelled");
                Err(BurrowError::QueryCancelled)
            }
            Step::TimedOut => {
                self.abandon(client).await;
                tracing::warn!(database = %self.database, timeout_ms, "Statement overran its timeout");
                Err(BurrowError::timeout(timeout_ms))
            }
        }
    }

    async fn reconnect(&self) -> Result<()> {
        let _ = self.pool.retain(|_, _| false);
        let client = self.pool.get().await?;
        client.simple_query("SELECT 1").await?;
        tracing::info!(database = %self.database, "Session reconnected");
        Ok(())
    }

    fn close(&self) {
        self.pool.close();
        tracing::info!(database = %self.database, "Session closed");
    }

    fn database(&self) -> &str {
        &self.database
    }
}

async fn run_read_only(client: &Object, statement: &Statement, timeout_ms: u64) -> Result<RowSet> {
    client
        .batch_execute(&format!("BEGIN READ ONLY; SET LOCAL statement_timeout = {timeout_ms}"))
        .await?;

    let result = async {
        let prepared = client.prepare(&statement.sql).await?;
        let params: Vec<_> = statement.params.iter().map(|p| p.as_sql()).collect();
        let rows = client.query(&prepared, &params).await?;
        Ok::<_, BurrowError>(rowset_from(prepared.columns(), &rows))
    }
    .await;

    // Failed transactions need the rollback too.
    if let Err(e) = client.batch_execute("ROLLBACK").await {
        tracing::debug!(error = %e, "Rollback after read failed");
    }
    result
}

fn tls_connector(mode: TlsMode) -> Result<TlsConnector> {
    let mut builder = TlsConnector::builder();
    match mode {
        TlsMode::Disable | TlsMode::Prefer | TlsMode::Require => {
            builder.danger_accept_invalid_certs(true);
        }
        TlsMode::VerifyCa => {
            builder.danger_accept_invalid_hostnames(true);
        }
        TlsMode::VerifyFull => {}
    }
    builder.build().map_err(|e| {
        BurrowError::connect_with_source(
            ConnectFailureKind::Tls,
            format!("Failed to create TLS connector: {e}"),
            e,
        )
    })
}

/// Opens `PgSession`s, looking passwords up through the credential service.
pub struct PgSessionFactory {
    credentials: Arc<CredentialService>,
    options: SessionOptions,
}

impl PgSessionFactory {
    pub fn new(credentials: Arc<CredentialService>, options: SessionOptions) -> Self {
        Self { credentials, options }
    }
}

impl SessionFactory for PgSessionFactory {
    fn open(
        &self,
        profile: &ConnectionProfile,
        database: Option<&str>,
    ) -> Result<Arc<dyn QuerySession>> {
        let password = self.credentials.get_password(&profile.credential_ref)?.ok_or_else(|| {
            BurrowError::connect(
                ConnectFailureKind::Authentication,
                format!("No stored password for connection '{}'", profile.name),
            )
        })?;
        let database = database.unwrap_or_else(|| profile.maintenance_database());
        let session = PgSession::open(profile, database, &password, self.options.clone())?;
        Ok(Arc::new(session))
    }
}
