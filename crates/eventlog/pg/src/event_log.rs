//! PostgreSQL event log.

use crate::append::{AppendCommand, AppendMany, EventModifier, PlainEvents};
use crate::delete::{DeleteEvent, DeleteStream};
use crate::link::{check_originals, resolve_links, LinkModifier};
use crate::partition::PgPartitionCatalog;
use crate::pool::{ConnectionPool, PoolConfig};
use crate::safe_position::safe_global_position;
use crate::schema;
use crate::transaction::TransactionCoordinator;
use async_trait::async_trait;
use eventlog_core::{
    AppendOptions, Event, EventLog, EventLogConfig, EventLogError, MiddlewareChain,
    PartitionCatalog, ReadOptions, Result, SafePositionSource, Stream,
};
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tracing::{debug, instrument};

/// One stream's share of an [`PgEventLog::append_many`] call.
#[derive(Debug, Clone)]
pub struct AppendBatch {
    pub stream: Stream,
    pub events: Vec<Event>,
    pub options: AppendOptions,
}

impl AppendBatch {
    pub fn new(stream: Stream, events: Vec<Event>) -> Self {
        Self {
            stream,
            events,
            options: AppendOptions::default(),
        }
    }

    pub fn with_options(mut self, options: AppendOptions) -> Self {
        self.options = options;
        self
    }
}

/// Event log stored in one partitioned PostgreSQL table.
#[derive(Clone)]
pub struct PgEventLog {
    pub(crate) pool: ConnectionPool,
    pub(crate) config: EventLogConfig,
    pub(crate) catalog: Arc<PgPartitionCatalog>,
    pub(crate) coordinator: TransactionCoordinator,
    pub(crate) middlewares: MiddlewareChain,
}

impl Debug for PgEventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgEventLog")
            .field("config", &self.config)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl PgEventLog {
    pub fn new(pool: ConnectionPool, config: EventLogConfig) -> Self {
        let catalog = Arc::new(PgPartitionCatalog::new(&pool, config.retry.clone()));
        let coordinator = TransactionCoordinator::new(&pool, config.retry.clone())
            .with_catalog(catalog.clone());
        Self {
            pool,
            config,
            catalog,
            coordinator,
            middlewares: MiddlewareChain::new(),
        }
    }

    /// Connect a pool and build an event log on top of it.
    pub async fn connect(pool_config: &PoolConfig, config: EventLogConfig) -> Result<Self> {
        let pool = ConnectionPool::connect(pool_config)
            .await
            .map_err(EventLogError::backend)?;
        Ok(Self::new(pool, config))
    }

    /// Middlewares applied on every append and read.
    pub fn with_middlewares(mut self, middlewares: MiddlewareChain) -> Self {
        self.middlewares = middlewares;
        self
    }

    /// Create the schema if it does not exist.
    pub async fn migrate(&self) -> Result<()> {
        schema::migrate(self.pool.pool()).await
    }

    pub fn config(&self) -> &EventLogConfig {
        &self.config
    }

    pub fn catalog(&self) -> &PgPartitionCatalog {
        &self.catalog
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Append with an explicit event modifier.
    ///
    /// An empty batch writes nothing but is still checked against the stream
    /// kind and the expected revision.
    pub async fn append_with(
        &self,
        stream: &Stream,
        events: &[Event],
        options: &AppendOptions,
        modifier: &dyn EventModifier,
    ) -> Result<Vec<Event>> {
        let command = AppendCommand {
            stream,
            events,
            options,
            modifier,
            middlewares: &self.middlewares,
        };
        let persisted = self.coordinator.transaction(&command).await?;
        debug!(
            %stream,
            count = persisted.len(),
            last_revision = persisted.last().and_then(|e| e.stream_revision),
            "events appended"
        );
        Ok(persisted)
    }

    /// Append to several streams atomically: either every batch is
    /// committed or none is.
    #[instrument(skip(self, batches), fields(batches = batches.len()))]
    pub async fn append_many(&self, batches: Vec<AppendBatch>) -> Result<Vec<Vec<Event>>> {
        let commands = batches
            .iter()
            .map(|batch| AppendCommand {
                stream: &batch.stream,
                events: &batch.events,
                options: &batch.options,
                modifier: &PlainEvents,
                middlewares: &self.middlewares,
            })
            .collect();
        self.coordinator.transaction(&AppendMany { commands }).await
    }

    /// Append link events pointing at persisted `originals` to `stream`.
    #[instrument(skip(self, stream, originals, options), fields(stream = %stream, count = originals.len()))]
    pub async fn link_to(
        &self,
        stream: &Stream,
        originals: &[Event],
        options: AppendOptions,
    ) -> Result<Vec<Event>> {
        check_originals(originals)?;

        let mut partitions = HashMap::with_capacity(originals.len());
        for original in originals {
            let (Some(id), Some(context), Some(stream_name)) = (
                original.id,
                original.context.as_deref(),
                original.stream_name.as_deref(),
            ) else {
                return Err(EventLogError::InvalidRequest(
                    "link target must be a persisted event".to_string(),
                ));
            };
            let leaf = self
                .catalog
                .find_leaf(context, stream_name, &original.event_type)
                .await?
                .ok_or_else(|| {
                    EventLogError::InvalidRequest(format!(
                        "no partition holds link target {id}"
                    ))
                })?;
            partitions.insert(id, leaf.id);
        }

        self.append_with(stream, originals, &options, &LinkModifier::new(partitions))
            .await
    }

    /// Replace link rows by their originals, see [`resolve_links`].
    pub async fn resolve_links(&self, events: Vec<Event>) -> Result<Vec<Event>> {
        let mut events = resolve_links(self.pool.pool(), &self.catalog, events).await?;
        for event in &mut events {
            if event.link.is_some() {
                self.middlewares.deserialize(event)?;
            }
        }
        Ok(events)
    }

    pub(crate) fn normalize(&self, mut options: ReadOptions) -> ReadOptions {
        if options.max_count <= 0 {
            options.max_count = self.config.max_count;
        }
        options
    }
}

#[async_trait]
impl EventLog for PgEventLog {
    #[instrument(skip(self, stream, events, options), fields(stream = %stream, count = events.len()))]
    async fn append(
        &self,
        stream: &Stream,
        events: Vec<Event>,
        options: AppendOptions,
    ) -> Result<Vec<Event>> {
        self.append_with(stream, &events, &options, &PlainEvents)
            .await
    }

    #[instrument(skip(self, stream, options), fields(stream = %stream))]
    async fn read(&self, stream: &Stream, options: ReadOptions) -> Result<Vec<Event>> {
        let options = self.normalize(options);
        let mut events = self.read_rows(stream, &options).await?;
        self.middlewares.deserialize_all(&mut events)?;
        Ok(events)
    }

    #[instrument(skip(self, stream), fields(stream = %stream))]
    async fn delete_stream(&self, stream: &Stream) -> Result<bool> {
        self.coordinator.transaction(&DeleteStream { stream }).await
    }

    #[instrument(skip(self, event), fields(id = ?event.id))]
    async fn delete_event(&self, event: &Event, force: bool) -> Result<bool> {
        self.coordinator
            .transaction(&DeleteEvent {
                event,
                force,
                max_records_to_lock: self.config.max_records_to_lock,
            })
            .await
    }
}

#[async_trait]
impl SafePositionSource for PgEventLog {
    async fn safe_global_position(&self) -> Result<i64> {
        safe_global_position(self.pool.pool()).await
    }
}
