//! Database error taxonomy and MySQL error classification.

use menuscout_core::RecordError;
use thiserror::Error;

use crate::retry::RetryConfigError;

/// MySQL server errors that clear up on their own: can't connect (2003),
/// server gone away (2006), lost connection (2013), too many connections
/// (1040), lock wait timeout (1205), deadlock (1213), record changed (1020).
const TEMPORARY_CODES: &[u16] = &[2003, 2006, 2013, 1040, 1205, 1213, 1020];

/// Access denied (1044, 1045), unknown database/table/column (1049, 1146,
/// 1054), syntax error (1064).
const PERMANENT_CODES: &[u16] = &[1044, 1045, 1049, 1146, 1054, 1064];

/// Data errors that belong to the offending row only: null in NOT NULL
/// column, duplicate key, out of range, truncated, bad value, too long,
/// foreign key.
const ROW_SCOPED_CODES: &[u16] = &[1048, 1062, 1264, 1265, 1366, 1406, 1452];

const CONNECTION_KEYWORDS: &[&str] = &["connection", "timeout", "broken pipe", "reset by peer"];

/// Whether an error is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retrying cannot help: auth, missing schema objects, syntax, bad data.
    Permanent,
    /// Connection trouble, lock contention, or anything unrecognized.
    Temporary,
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("DATABASE_URL is not set")]
    MissingDatabaseUrl,

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),

    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// The guarding breaker rejected the call before any attempt was made.
    #[error("circuit breaker open for {resource}; call not attempted")]
    CircuitOpen { resource: String },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<DbError>,
    },

    #[error("query exceeded {timeout_secs}s timeout")]
    QueryTimeout { timeout_secs: u64 },

    #[error("{kind} parent '{key}' does not exist")]
    MissingParent { kind: &'static str, key: String },

    #[error(transparent)]
    InvalidRecord(#[from] RecordError),

    #[error("scrape run {id} is not in expected status '{expected_status}'")]
    InvalidRunTransition {
        id: i64,
        expected_status: &'static str,
    },

    #[error(transparent)]
    InvalidRetryConfig(#[from] RetryConfigError),
}

impl DbError {
    /// Classify this error for the retry loop.
    ///
    /// Errors that already went through a retry loop or a breaker
    /// ([`DbError::RetriesExhausted`], [`DbError::CircuitOpen`]) are permanent
    /// so an outer executor does not multiply attempts.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            DbError::Sqlx(err) => classify_sqlx(err),
            DbError::QueryTimeout { .. } => ErrorClass::Temporary,
            DbError::MissingDatabaseUrl
            | DbError::NotFound
            | DbError::Migration(_)
            | DbError::CircuitOpen { .. }
            | DbError::RetriesExhausted { .. }
            | DbError::MissingParent { .. }
            | DbError::InvalidRecord(_)
            | DbError::InvalidRunTransition { .. }
            | DbError::InvalidRetryConfig(_) => ErrorClass::Permanent,
        }
    }

    /// `true` when the error concerns a single record and a batch may carry on
    /// with the remaining rows.
    #[must_use]
    pub fn is_row_scoped(&self) -> bool {
        match self {
            DbError::InvalidRecord(_) => true,
            DbError::Sqlx(err) => mysql_code(err).is_some_and(|code| ROW_SCOPED_CODES.contains(&code)),
            _ => false,
        }
    }

    #[must_use]
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, DbError::CircuitOpen { .. })
    }
}

/// MySQL vendor error number, when the error came from the server.
fn mysql_code(err: &sqlx::Error) -> Option<u16> {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
            .map(sqlx::mysql::MySqlDatabaseError::number),
        _ => None,
    }
}

fn classify_sqlx(err: &sqlx::Error) -> ErrorClass {
    match err {
        sqlx::Error::Database(db_err) => classify_code(mysql_code(err), db_err.message()),
        sqlx::Error::Configuration(_)
        | sqlx::Error::RowNotFound
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::Encode(_)
        | sqlx::Error::PoolClosed => ErrorClass::Permanent,
        _ => ErrorClass::Temporary,
    }
}

/// Classify a server error from its vendor code and message.
///
/// Known temporary codes and connection-flavoured messages win over known
/// permanent codes; unknown errors are temporary.
#[must_use]
pub fn classify_code(code: Option<u16>, message: &str) -> ErrorClass {
    if let Some(code) = code {
        if TEMPORARY_CODES.contains(&code) {
            return ErrorClass::Temporary;
        }
    }

    let lowered = message.to_lowercase();
    if CONNECTION_KEYWORDS.iter().any(|kw| lowered.contains(kw)) {
        return ErrorClass::Temporary;
    }

    match code {
        Some(code) if PERMANENT_CODES.contains(&code) || ROW_SCOPED_CODES.contains(&code) => {
            ErrorClass::Permanent
        }
        _ => ErrorClass::Temporary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_codes_are_temporary() {
        for code in [2003, 2006, 2013, 1040, 1205, 1213] {
            assert_eq!(classify_code(Some(code), "boom"), ErrorClass::Temporary, "{code}");
        }
    }

    #[test]
    fn schema_and_auth_codes_are_permanent() {
        assert_eq!(
            classify_code(Some(1045), "Access denied for user 'scout'@'%'"),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_code(Some(1146), "Table 'menuscout.restaurantes' doesn't exist"),
            ErrorClass::Permanent
        );
        assert_eq!(
            classify_code(Some(1064), "You have an error in your SQL syntax"),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn connection_message_overrides_code() {
        assert_eq!(
            classify_code(Some(1045), "Connection reset by peer"),
            ErrorClass::Temporary
        );
    }

    #[test]
    fn unknown_errors_default_to_temporary() {
        assert_eq!(classify_code(Some(9999), "something odd"), ErrorClass::Temporary);
        assert_eq!(classify_code(None, "something odd"), ErrorClass::Temporary);
    }

    #[test]
    fn pool_and_io_failures_are_temporary() {
        assert_eq!(DbError::Sqlx(sqlx::Error::PoolTimedOut).class(), ErrorClass::Temporary);
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(DbError::Sqlx(sqlx::Error::Io(io)).class(), ErrorClass::Temporary);
        assert_eq!(DbError::QueryTimeout { timeout_secs: 30 }.class(), ErrorClass::Temporary);
    }

    #[test]
    fn decode_and_config_failures_are_permanent() {
        assert_eq!(
            DbError::Sqlx(sqlx::Error::ColumnNotFound("rating".to_string())).class(),
            ErrorClass::Permanent
        );
        assert_eq!(
            DbError::Sqlx(sqlx::Error::Configuration("bad url".into())).class(),
            ErrorClass::Permanent
        );
    }

    #[test]
    fn exhausted_and_open_errors_are_not_retried_again() {
        let exhausted = DbError::RetriesExhausted {
            operation: "acquire".to_string(),
            attempts: 5,
            source: Box::new(DbError::Sqlx(sqlx::Error::PoolTimedOut)),
        };
        assert_eq!(exhausted.class(), ErrorClass::Permanent);
        let open = DbError::CircuitOpen {
            resource: "connection".to_string(),
        };
        assert_eq!(open.class(), ErrorClass::Permanent);
        assert!(open.is_circuit_open());
    }

    #[test]
    fn invalid_record_is_row_scoped() {
        let err = DbError::from(RecordError::MissingField {
            kind: "restaurant",
            field: "name",
        });
        assert!(err.is_row_scoped());
        assert!(!DbError::Sqlx(sqlx::Error::PoolTimedOut).is_row_scoped());
    }
}
