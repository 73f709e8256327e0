//! Safe global position.
//!
//! `global_position` comes from a sequence, so positions are handed out in
//! order but committed in any order: while a transaction holding position
//! 10 is still open, position 11 may already be visible. A reader that
//! advanced past 11 would never see 10.
//!
//! Every append holds the shared side of a transaction-scoped advisory lock
//! from before it draws a position until it ends. Taking the exclusive side
//! therefore waits for every append in flight; the highest committed
//! position read right after is final.
//!
//! The lock is taken in a READ COMMITTED transaction of its own so the
//! maximum is read from a snapshot taken after the waited-for commits.

use crate::errors::db_error;
use eventlog_core::Result;
use sqlx::PgPool;

/// Advisory lock key shared by appends (shared) and safe-position readers
/// (exclusive). ASCII of `eventlog`.
pub const SAFE_POSITION_LOCK_KEY: i64 = 0x6576_656e_746c_6f67;

/// Highest global position below which no in-flight append can still
/// commit. `0` for an empty log.
pub async fn safe_global_position(pool: &PgPool) -> Result<i64> {
    let mut tx = pool.begin().await.map_err(db_error)?;
    sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(SAFE_POSITION_LOCK_KEY)
        .execute(&mut *tx)
        .await
        .map_err(db_error)?;
    let position: i64 = sqlx::query_scalar("SELECT COALESCE(MAX(global_position), 0) FROM events")
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error)?;
    tx.commit().await.map_err(db_error)?;
    Ok(position)
}
