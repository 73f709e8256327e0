//! Transaction coordinator.
//!
//! Runs a [`UnitOfWork`] inside a SERIALIZABLE transaction and recovers from
//! the conditions a concurrent event log runs into:
//!
//! ```text
//!            ┌──────────────┐
//!  ┌────────►│ BEGIN        │
//!  │         │ SERIALIZABLE │
//!  │         └──────┬───────┘
//!  │                ▼
//!  │         ┌──────────────┐   Ok    ┌────────┐
//!  │         │ unit.run()   ├────────►│ COMMIT │──► output
//!  │         └──────┬───────┘         └───┬────┘
//!  │                │ Err                 │ Err (40001)
//!  │                ▼                     │
//!  │   serialization conflict / deadlock ◄┘  → backoff, retry
//!  ├── partition race                        → backoff, retry
//!  ├── missing partitions                    → ensure partitions, retry
//!  └── connection lost (first time only)     → retry on a fresh connection
//! ```
//!
//! Attempts are bounded by [`RetryPolicy::max_attempts`]; when the budget is
//! spent the last error is returned wrapped in
//! [`EventLogError::RetriesExhausted`].

use crate::errors::db_error;
use crate::pool::ConnectionPool;
use async_trait::async_trait;
use eventlog_core::{EventLogError, PartitionCatalog, Result, RetryPolicy, Stream};
use sqlx::{PgConnection, PgPool};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A re-runnable piece of work executed inside one transaction.
///
/// Implementations must derive everything they write from what they read in
/// the same call, since the coordinator may run them several times.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    type Output: Send;

    async fn run(&self, conn: &mut PgConnection) -> Result<Self::Output>;
}

/// Runs units of work in serializable transactions with bounded retries.
#[derive(Clone)]
pub struct TransactionCoordinator {
    pool: PgPool,
    retry: RetryPolicy,
    catalog: Option<Arc<dyn PartitionCatalog>>,
}

impl std::fmt::Debug for TransactionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("retry", &self.retry)
            .field("heals_partitions", &self.catalog.is_some())
            .finish_non_exhaustive()
    }
}

impl TransactionCoordinator {
    pub fn new(pool: &ConnectionPool, retry: RetryPolicy) -> Self {
        Self {
            pool: pool.pool().clone(),
            retry,
            catalog: None,
        }
    }

    /// Heal missing partitions through `catalog` before retrying.
    pub fn with_catalog(mut self, catalog: Arc<dyn PartitionCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Run `unit` in a new serializable transaction, retrying as needed.
    pub async fn transaction<U: UnitOfWork>(&self, unit: &U) -> Result<U::Output> {
        let mut attempt: u32 = 0;
        let mut reconnected = false;

        loop {
            attempt += 1;
            let err = match self.attempt(unit).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            match err {
                EventLogError::MissingPartitions {
                    stream,
                    event_types,
                } if self.catalog.is_some() => {
                    if !self.retry.can_retry(attempt) {
                        return Err(exhausted(
                            attempt,
                            EventLogError::MissingPartitions {
                                stream,
                                event_types,
                            },
                        ));
                    }
                    self.heal(&stream, &event_types).await?;
                }
                err if err.is_retryable() => {
                    if !self.retry.can_retry(attempt) {
                        return Err(exhausted(attempt, err));
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(attempt, ?delay, error = %err, "transaction conflicted, retrying");
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                err if err.is_connection_lost() && !reconnected => {
                    reconnected = true;
                    warn!(error = %err, "connection lost, retrying once on a fresh connection");
                }
                err => return Err(err),
            }
        }
    }

    /// Run `unit` on a connection that already has an open transaction.
    ///
    /// No nested transaction or savepoint is created; failures propagate to
    /// whoever owns the outer transaction.
    pub async fn run_inline<U: UnitOfWork>(
        conn: &mut PgConnection,
        unit: &U,
    ) -> Result<U::Output> {
        unit.run(conn).await
    }

    async fn attempt<U: UnitOfWork>(&self, unit: &U) -> Result<U::Output> {
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        match unit.run(&mut tx).await {
            Ok(output) => {
                tx.commit().await.map_err(db_error)?;
                Ok(output)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    debug!(error = %rollback_err, "rollback after failed unit of work failed");
                }
                Err(err)
            }
        }
    }

    async fn heal(&self, stream: &Stream, event_types: &[String]) -> Result<()> {
        let Some(catalog) = &self.catalog else {
            return Ok(());
        };
        for event_type in event_types {
            info!(%stream, event_type, "creating missing partitions");
            catalog
                .ensure(&stream.context, &stream.stream_name, event_type)
                .await?;
        }
        Ok(())
    }
}

fn exhausted(attempts: u32, last: EventLogError) -> EventLogError {
    EventLogError::RetriesExhausted {
        attempts,
        last: Box::new(last),
    }
}
