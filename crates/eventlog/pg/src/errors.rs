//! Mapping of `sqlx` errors onto [`EventLogError`].
//!
//! Classification is driven by SQLSTATE codes:
//!
//! | SQLSTATE          | Meaning                         | Mapped to               |
//! |-------------------|---------------------------------|-------------------------|
//! | `40001`           | serialization_failure           | `SerializationConflict` |
//! | `40P01`           | deadlock_detected               | `SerializationConflict` |
//! | `08xxx`, `57P0x`  | connection exception / shutdown | `ConnectionLost`        |
//! | anything else     |                                 | `Backend`               |
//!
//! Unique violations (`23505`), missing partitions (`23514`) and duplicate
//! relations (`42P07`, `42P17`) are only meaningful to specific statements,
//! see [`is_unique_violation`], [`is_missing_partition`] and
//! [`is_duplicate_relation`].

use eventlog_core::EventLogError;

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";
const CHECK_VIOLATION: &str = "23514";
const DUPLICATE_TABLE: &str = "42P07";
const INVALID_OBJECT_DEFINITION: &str = "42P17";

/// Map a `sqlx` error onto the engine's error type.
pub fn db_error(err: sqlx::Error) -> EventLogError {
    if let Some(code) = sqlstate(&err) {
        if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED {
            return EventLogError::SerializationConflict(err.to_string());
        }
        if code.starts_with("08") || code.starts_with("57P0") {
            return EventLogError::ConnectionLost(err.to_string());
        }
    }

    match err {
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
            EventLogError::ConnectionLost(err.to_string())
        }
        sqlx::Error::WorkerCrashed => EventLogError::ConnectionLost(err.to_string()),
        other => EventLogError::backend(other),
    }
}

/// SQLSTATE of a database error, if any.
pub fn sqlstate(err: &sqlx::Error) -> Option<String> {
    err.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code.into_owned())
}

/// A uniqueness constraint rejected the row.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    sqlstate(err).as_deref() == Some(UNIQUE_VIOLATION)
}

/// DDL lost a race against a concurrent transaction creating the same
/// relation, or a partition for the same bound.
pub fn is_duplicate_relation(err: &sqlx::Error) -> bool {
    matches!(
        sqlstate(err).as_deref(),
        Some(DUPLICATE_TABLE) | Some(INVALID_OBJECT_DEFINITION)
    )
}

/// The row was routed to a partitioned table with no matching partition.
///
/// Postgres reports this as a check violation with the message
/// `no partition of relation "..." found for row`.
pub fn is_missing_partition(err: &sqlx::Error) -> bool {
    match err.as_database_error() {
        Some(db_err) => {
            db_err.code().as_deref() == Some(CHECK_VIOLATION)
                && db_err.message().contains("no partition")
        }
        None => false,
    }
}
