//! Error types for Burrow.
//!
//! `BurrowError` is the crate-wide error. Database failures are classified
//! into connect failures and query failures from their SQLSTATE; local
//! validation failures never touch the database. Anything crossing the
//! executor boundary is flattened into a cloneable [`Failure`].

use std::fmt;

use thiserror::Error;

/// Why a session could not be opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectFailureKind {
    /// Bad credentials or missing role.
    Authentication,
    /// Host unreachable, refused, or the pool could not hand out a connection.
    Network,
    /// TLS negotiation or certificate failure.
    Tls,
}

impl ConnectFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authentication => "auth",
            Self::Network => "network",
            Self::Tls => "tls",
        }
    }
}

/// Why an issued query failed. All of these are recoverable in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryFailureKind {
    SyntaxError,
    Timeout,
    ConnectionLost,
    PermissionDenied,
    Other,
}

impl QueryFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax error",
            Self::Timeout => "timeout",
            Self::ConnectionLost => "connection lost",
            Self::PermissionDenied => "permission denied",
            Self::Other => "query error",
        }
    }

    /// Classify a five character SQLSTATE code.
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "57014" => Self::Timeout,
            "42501" | "25006" => Self::PermissionDenied,
            "57P01" | "57P02" | "57P03" => Self::ConnectionLost,
            _ if code.starts_with("08") => Self::ConnectionLost,
            _ if code.starts_with("42") || code.starts_with("22") => Self::SyntaxError,
            _ => Self::Other,
        }
    }
}

/// Main error type for Burrow.
#[derive(Debug, Error)]
pub enum BurrowError {
    /// The session could not be established.
    #[error("Connection failed ({}): {message}", kind.as_str())]
    Connect {
        kind: ConnectFailureKind,
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A query reached the server and failed there, or lost its connection.
    #[error("{message}")]
    Query {
        kind: QueryFailureKind,
        /// Server error message, passed through untouched.
        message: String,
        /// Additional detail from PostgreSQL.
        detail: Option<String>,
        /// PostgreSQL hint.
        hint: Option<String>,
        /// Position in query (1-indexed).
        position: Option<usize>,
        /// SQLSTATE (e.g. "42P01").
        code: Option<String>,
    },

    /// The query was cancelled before it completed.
    #[error("Query cancelled")]
    QueryCancelled,

    /// A navigation step that the current level does not allow.
    #[error("Invalid transition: {message}")]
    InvalidTransition { message: String },

    /// A command argument or user value was rejected.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The command line named a command nobody knows.
    #[error("Unknown command: {command}")]
    UnknownCommand { command: String },

    /// Local SQLite storage error.
    #[error("Storage error: {message}")]
    Storage {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// OS keychain error.
    #[error("Keyring error: {message}")]
    Keyring {
        /// Human-readable error message.
        message: String,
        /// Actionable hint for the user.
        hint: Option<String>,
    },

    /// Configuration error.
    #[error("Config error: {message}")]
    Config { message: String },

    /// Unexpected internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable error message.
        message: String,
        /// Optional underlying error source.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl BurrowError {
    // ========== Constructors ==========

    /// Create a new connect failure.
    pub fn connect(kind: ConnectFailureKind, message: impl Into<String>) -> Self {
        Self::Connect { kind, message: message.into(), source: None }
    }

    /// Create a new connect failure with source.
    pub fn connect_with_source(
        kind: ConnectFailureKind,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connect { kind, message: message.into(), source: Some(Box::new(source)) }
    }

    /// Create a query failure without server details.
    pub fn query(kind: QueryFailureKind, message: impl Into<String>) -> Self {
        Self::Query {
            kind,
            message: message.into(),
            detail: None,
            hint: None,
            position: None,
            code: None,
        }
    }

    /// Create a statement timeout failure.
    pub fn timeout(timeout_ms: u64) -> Self {
        Self::Query {
            kind: QueryFailureKind::Timeout,
            message: format!("canceling statement due to statement timeout ({timeout_ms} ms)"),
            detail: None,
            hint: Some("Narrow the query with a WHERE clause or raise the statement timeout".into()),
            position: None,
            code: Some("57014".to_string()),
        }
    }

    /// Create a connection-lost failure.
    pub fn connection_lost(message: impl Into<String>) -> Self {
        Self::query(QueryFailureKind::ConnectionLost, message)
    }

    pub fn invalid_transition(message: impl Into<String>) -> Self {
        Self::InvalidTransition { message: message.into() }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn unknown_command(command: impl Into<String>) -> Self {
        Self::UnknownCommand { command: command.into() }
    }

    /// Create a new storage error.
    pub fn storage(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Storage { message: message.into(), hint: hint.map(String::from), source: None }
    }

    /// Create a new keyring error.
    pub fn keyring(message: impl Into<String>, hint: Option<&str>) -> Self {
        Self::Keyring { message: message.into(), hint: hint.map(String::from) }
    }

    /// Create a new config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config { message: message.into() }
    }

    /// Create a new internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    // ========== Methods ==========

    /// Check if this error represents a cancelled query.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::QueryCancelled)
    }

    /// Check if the connection under a query went away.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Query { kind: QueryFailureKind::ConnectionLost, .. })
    }

    /// Local validation errors never reach the database.
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Self::InvalidTransition { .. } | Self::InvalidArgument { .. } | Self::UnknownCommand { .. }
        )
    }

    /// Get the error category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "Connection",
            Self::Query { .. } | Self::QueryCancelled => "Query",
            Self::InvalidTransition { .. } => "Navigation",
            Self::InvalidArgument { .. } | Self::UnknownCommand { .. } => "Command",
            Self::Storage { .. } => "Storage",
            Self::Keyring { .. } => "Keyring",
            Self::Config { .. } => "Config",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Get actionable hint for the user.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Self::Connect { kind: ConnectFailureKind::Authentication, .. } => {
                Some("Check username and password")
            }
            Self::Connect { kind: ConnectFailureKind::Network, .. } => {
                Some("Check that the database server is running")
            }
            Self::Connect { kind: ConnectFailureKind::Tls, .. } => {
                Some("Verify the TLS mode and server certificate")
            }
            Self::Query { hint, .. } => hint.as_deref(),
            Self::QueryCancelled => None,
            Self::InvalidTransition { .. } => None,
            Self::InvalidArgument { .. } => None,
            Self::UnknownCommand { .. } => Some("Type :help for the list of commands"),
            Self::Storage { hint, .. } => hint.as_deref(),
            Self::Keyring { hint, .. } => hint.as_deref(),
            Self::Config { .. } => None,
            Self::Internal { .. } => Some("Please report this issue"),
        }
    }

    /// Flatten into the cloneable form delivered inside query outcomes.
    pub fn to_failure(&self) -> Failure {
        let kind = match self {
            Self::Connect { kind, .. } => FailureKind::Connect(*kind),
            Self::Query { kind, .. } => FailureKind::Query(*kind),
            _ => FailureKind::Query(QueryFailureKind::Other),
        };
        let message = match self {
            Self::Query { message, .. } | Self::Connect { message, .. } => message.clone(),
            other => other.to_string(),
        };

        let detail = match self {
            Self::Query { detail, code, position, .. } => {
                let mut parts = Vec::new();
                if let Some(code) = code {
                    parts.push(format!("Code: {code}"));
                }
                if let Some(pos) = position {
                    parts.push(format!("Position: {pos}"));
                }
                if let Some(detail) = detail {
                    parts.push(format!("Detail: {detail}"));
                }
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
            _ => None,
        };

        Failure { kind, message, hint: self.hint().map(String::from), detail }
    }
}

/// Failure classification carried in a `QueryOutcome::Failure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Fatal to the session; the view returns to the connection list.
    Connect(ConnectFailureKind),
    /// Shown inline, prior data retained.
    Query(QueryFailureKind),
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(kind) => write!(f, "connect failure ({})", kind.as_str()),
            Self::Query(kind) => f.write_str(kind.as_str()),
        }
    }
}

/// User-displayable failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    /// Message as reported by the driver or server.
    pub message: String,
    /// Actionable suggestion.
    pub hint: Option<String>,
    /// Code, position and server detail, one per line.
    pub detail: Option<String>,
}

impl Failure {
    pub fn is_connect(&self) -> bool {
        matches!(self.kind, FailureKind::Connect(_))
    }

    pub fn is_connection_lost(&self) -> bool {
        self.kind == FailureKind::Query(QueryFailureKind::ConnectionLost)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// ========== Error Conversions ==========

/// Convert from tokio_postgres::Error to BurrowError.
impl From<tokio_postgres::Error> for BurrowError {
    fn from(err: tokio_postgres::Error) -> Self {
        if let Some(db_err) = err.as_db_error() {
            let message = db_err.message().to_string();
            let code = db_err.code().code();

            if code.starts_with("28") {
                return BurrowError::Connect {
                    kind: ConnectFailureKind::Authentication,
                    message,
                    source: Some(Box::new(err)),
                };
            }

            let position = db_err.position().and_then(|p| match p {
                tokio_postgres::error::ErrorPosition::Original(pos) => Some(*pos as usize),
                tokio_postgres::error::ErrorPosition::Internal { .. } => None,
            });
            return BurrowError::Query {
                kind: QueryFailureKind::from_sqlstate(code),
                message,
                detail: db_err.detail().map(String::from),
                hint: db_err.hint().map(String::from),
                position,
                code: Some(code.to_string()),
            };
        }

        if err.is_closed() {
            return BurrowError::connection_lost("Connection closed");
        }

        // No server error: the socket or protocol failed under us.
        BurrowError::connection_lost(err.to_string())
    }
}

/// Convert from a pool acquisition failure to BurrowError.
impl From<deadpool_postgres::PoolError> for BurrowError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        use deadpool_postgres::PoolError;

        match err {
            PoolError::Backend(pg_err) => match BurrowError::from(pg_err) {
                BurrowError::Query { kind: QueryFailureKind::ConnectionLost, message, .. } => {
                    let kind = if message.to_ascii_lowercase().contains("tls") {
                        ConnectFailureKind::Tls
                    } else {
                        ConnectFailureKind::Network
                    };
                    BurrowError::connect(kind, message)
                }
                BurrowError::Query { message, .. } => {
                    BurrowError::connect(ConnectFailureKind::Network, message)
                }
                other => other,
            },
            PoolError::Timeout(_) => BurrowError::connect(
                ConnectFailureKind::Network,
                "Timed out waiting for a database connection",
            ),
            other => BurrowError::connect(ConnectFailureKind::Network, other.to_string()),
        }
    }
}

/// Convert from rusqlite::Error to BurrowError.
impl From<rusqlite::Error> for BurrowError {
    fn from(err: rusqlite::Error) -> Self {
        BurrowError::Storage {
            message: err.to_string(),
            hint: Some("The local database may be corrupted".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from std::io::Error to BurrowError.
impl From<std::io::Error> for BurrowError {
    fn from(err: std::io::Error) -> Self {
        BurrowError::Storage {
            message: err.to_string(),
            hint: Some("Check file permissions and disk space".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from serde_json::Error to BurrowError.
impl From<serde_json::Error> for BurrowError {
    fn from(err: serde_json::Error) -> Self {
        BurrowError::Storage {
            message: format!("JSON error: {err}"),
            hint: Some("Data may be corrupted".to_string()),
            source: Some(Box::new(err)),
        }
    }
}

/// Convert from keyring::Error to BurrowError.
impl From<keyring::Error> for BurrowError {
    fn from(err: keyring::Error) -> Self {
        BurrowError::Keyring {
            message: err.to_string(),
            hint: Some("Grant Burrow access to the system keychain".to_string()),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, BurrowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlstate_classification() {
        assert_eq!(QueryFailureKind::from_sqlstate("57014"), QueryFailureKind::Timeout);
        assert_eq!(QueryFailureKind::from_sqlstate("42601"), QueryFailureKind::SyntaxError);
        assert_eq!(QueryFailureKind::from_sqlstate("42703"), QueryFailureKind::SyntaxError);
        assert_eq!(QueryFailureKind::from_sqlstate("22P02"), QueryFailureKind::SyntaxError);
        assert_eq!(QueryFailureKind::from_sqlstate("42501"), QueryFailureKind::PermissionDenied);
        assert_eq!(QueryFailureKind::from_sqlstate("25006"), QueryFailureKind::PermissionDenied);
        assert_eq!(QueryFailureKind::from_sqlstate("08006"), QueryFailureKind::ConnectionLost);
        assert_eq!(QueryFailureKind::from_sqlstate("57P01"), QueryFailureKind::ConnectionLost);
        assert_eq!(QueryFailureKind::from_sqlstate("53100"), QueryFailureKind::Other);
    }

    #[test]
    fn test_to_failure_keeps_server_message() {
        let err = BurrowError::Query {
            kind: QueryFailureKind::SyntaxError,
            message: "syntax error at or near \"frm\"".to_string(),
            detail: None,
            hint: None,
            position: Some(10),
            code: Some("42601".to_string()),
        };
        let failure = err.to_failure();
        assert_eq!(failure.kind, FailureKind::Query(QueryFailureKind::SyntaxError));
        assert_eq!(failure.message, "syntax error at or near \"frm\"");
        assert_eq!(failure.detail.as_deref(), Some("Code: 42601\nPosition: 10"));
    }

    #[test]
    fn test_connect_failure_is_connect() {
        let failure =
            BurrowError::connect(ConnectFailureKind::Authentication, "password rejected").to_failure();
        assert!(failure.is_connect());
        assert_eq!(failure.hint.as_deref(), Some("Check username and password"));
        assert_eq!(failure.message, "password rejected");
        assert_eq!(failure.to_string(), "connect failure (auth): password rejected");
    }

    #[test]
    fn test_local_errors() {
        assert!(BurrowError::unknown_command("frobnicate").is_local());
        assert!(BurrowError::invalid_argument("page size must be > 0").is_local());
        assert!(!BurrowError::timeout(10).is_local());
        assert!(BurrowError::connection_lost("gone").is_connection_lost());
    }
}
