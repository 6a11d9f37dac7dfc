//! # PostgreSQL Storage
//!
//! `sqlx` backed implementations of the queue item and runner status stores.
//!
//! ## Schema
//!
//! Created by the migrations in `migrations/` (see [`run_migrations`]):
//!
//! - `tasker_queue_items`: one row per queue item, keyed by `id BIGSERIAL`
//! - `tasker_queue_runner_status`: singleton row keyed by `name`
//!
//! ## Optimistic Writes
//!
//! Updating a queue item is a single `UPDATE ... WHERE id = $1 AND <conditions>`
//! statement; zero affected rows is a save conflict. The runner status
//! compare-and-set works the same way against the expected guid and
//! alive-since timestamp. There is no read-then-write in application code.

use super::{
    QueueItemFilter, QueueItemSort, QueueStorageError, QueueStorageResult,
    RunnerStatusStorageError, RunnerStatusStorageResult, SortDirection, TaskQueueStorage,
    TaskRunnerStatusStorage,
};
use crate::constants::storage::TASK_RUNNER_STATUS_NAME;
use crate::models::{QueueItem, QueueItemId, QueueItemRecord, TaskRunnerStatus};
use crate::state_machine::{QueueItemStatus, StateMachineError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::{debug, instrument, warn};

const QUEUE_ITEM_COLUMNS: &str = "id, status, queue_name, context, task_type, serialized_task, \
    progress, last_execution_progress, retries, failure_description, create_timestamp, \
    queue_timestamp, last_update_timestamp, start_timestamp, finish_timestamp, fail_timestamp, \
    earliest_start_timestamp";

/// Oldest queued row of every queue without an `in_progress` row, filtered by
/// `head_filter` before `LIMIT $1`. Mirrors `select_oldest_queued`.
fn queue_heads_query(head_filter: &str) -> String {
    format!(
        r#"
        SELECT {QUEUE_ITEM_COLUMNS} FROM (
            SELECT DISTINCT ON (queue_name) *
            FROM tasker_queue_items
            WHERE status = 'queued'
              AND queue_name IS NOT NULL
              AND queue_name NOT IN (
                  SELECT queue_name FROM tasker_queue_items
                  WHERE status = 'in_progress' AND queue_name IS NOT NULL
              )
            ORDER BY queue_name, queue_timestamp ASC NULLS FIRST, id ASC
        ) oldest
        {head_filter}
        ORDER BY queue_timestamp ASC NULLS FIRST, id ASC
        LIMIT $1
        "#
    )
}

/// Apply the schema migrations bundled with the crate
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

#[derive(Debug, FromRow)]
struct QueueItemRow {
    id: i64,
    status: String,
    queue_name: Option<String>,
    context: String,
    task_type: String,
    serialized_task: String,
    progress: i32,
    last_execution_progress: i32,
    retries: i32,
    failure_description: String,
    create_timestamp: DateTime<Utc>,
    queue_timestamp: Option<DateTime<Utc>>,
    last_update_timestamp: Option<DateTime<Utc>>,
    start_timestamp: Option<DateTime<Utc>>,
    finish_timestamp: Option<DateTime<Utc>>,
    fail_timestamp: Option<DateTime<Utc>>,
    earliest_start_timestamp: Option<DateTime<Utc>>,
}

impl QueueItemRow {
    fn into_item(self) -> QueueStorageResult<QueueItem> {
        let id = self.id;
        let status: QueueItemStatus = self.status.parse().map_err(|reason| {
            QueueStorageError::corrupted(Some(id), StateMachineError::InvalidStatus(reason))
        })?;

        let record = QueueItemRecord {
            id: Some(id),
            status,
            queue_name: self.queue_name,
            context: self.context,
            task_type: self.task_type,
            serialized_task: self.serialized_task,
            progress_basis_points: from_db_int(id, "progress", self.progress)?,
            last_execution_progress_basis_points: from_db_int(
                id,
                "last_execution_progress",
                self.last_execution_progress,
            )?,
            retries: from_db_int(id, "retries", self.retries)?,
            failure_description: self.failure_description,
            create_timestamp: self.create_timestamp,
            queue_timestamp: self.queue_timestamp,
            last_update_timestamp: self.last_update_timestamp,
            start_timestamp: self.start_timestamp,
            finish_timestamp: self.finish_timestamp,
            fail_timestamp: self.fail_timestamp,
            earliest_start_timestamp: self.earliest_start_timestamp,
        };

        QueueItem::from_record(record).map_err(|error| QueueStorageError::corrupted(Some(id), error))
    }
}

fn from_db_int(id: QueueItemId, column: &str, value: i32) -> QueueStorageResult<u32> {
    u32::try_from(value).map_err(|_| QueueStorageError::Corrupted {
        id,
        reason: format!("negative {column}: {value}"),
    })
}

fn to_db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn to_db_bigint(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn push_conditions(builder: &mut QueryBuilder<'static, Postgres>, filter: &QueueItemFilter) {
    if let Some(status) = filter.status {
        builder.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(queue_name) = &filter.queue_name {
        builder.push(" AND queue_name = ").push_bind(queue_name.clone());
    }
    if let Some(context) = &filter.context {
        builder.push(" AND context = ").push_bind(context.clone());
    }
    if let Some(task_type) = &filter.task_type {
        builder.push(" AND task_type = ").push_bind(task_type.clone());
    }
}

pub(crate) fn find_all_query(
    filter: &QueueItemFilter,
    sort: Option<QueueItemSort>,
    offset: usize,
    limit: Option<usize>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new(format!(
        "SELECT {QUEUE_ITEM_COLUMNS} FROM tasker_queue_items WHERE TRUE"
    ));
    push_conditions(&mut builder, filter);

    builder.push(" ORDER BY ");
    if let Some(sort) = sort {
        builder.push(sort.field.column()).push(match sort.direction {
            SortDirection::Ascending => " ASC NULLS FIRST, ",
            SortDirection::Descending => " DESC NULLS LAST, ",
        });
    }
    builder.push("id ASC");

    builder.push(" OFFSET ").push_bind(to_db_bigint(offset));
    if let Some(limit) = limit {
        builder.push(" LIMIT ").push_bind(to_db_bigint(limit));
    }
    builder
}

pub(crate) fn update_query(
    id: QueueItemId,
    record: &QueueItemRecord,
    conditions: Option<&QueueItemFilter>,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE tasker_queue_items SET status = ");
    builder
        .push_bind(record.status.as_str())
        .push(", queue_name = ")
        .push_bind(record.queue_name.clone())
        .push(", context = ")
        .push_bind(record.context.clone())
        .push(", serialized_task = ")
        .push_bind(record.serialized_task.clone())
        .push(", progress = ")
        .push_bind(to_db_int(record.progress_basis_points))
        .push(", last_execution_progress = ")
        .push_bind(to_db_int(record.last_execution_progress_basis_points))
        .push(", retries = ")
        .push_bind(to_db_int(record.retries))
        .push(", failure_description = ")
        .push_bind(record.failure_description.clone())
        .push(", queue_timestamp = ")
        .push_bind(record.queue_timestamp)
        .push(", last_update_timestamp = ")
        .push_bind(record.last_update_timestamp)
        .push(", start_timestamp = ")
        .push_bind(record.start_timestamp)
        .push(", finish_timestamp = ")
        .push_bind(record.finish_timestamp)
        .push(", fail_timestamp = ")
        .push_bind(record.fail_timestamp)
        .push(", earliest_start_timestamp = ")
        .push_bind(record.earliest_start_timestamp)
        .push(" WHERE id = ")
        .push_bind(id);

    if let Some(conditions) = conditions {
        push_conditions(&mut builder, conditions);
    }
    builder
}

/// Queue item storage on PostgreSQL
#[derive(Debug, Clone)]
pub struct PgQueueStorage {
    pool: PgPool,
}

impl PgQueueStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn insert(&self, record: &QueueItemRecord) -> QueueStorageResult<QueueItemId> {
        let query = r#"
            INSERT INTO tasker_queue_items (
                status, queue_name, context, task_type, serialized_task, progress,
                last_execution_progress, retries, failure_description, create_timestamp,
                queue_timestamp, last_update_timestamp, start_timestamp, finish_timestamp,
                fail_timestamp, earliest_start_timestamp
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            RETURNING id
        "#;

        let (id,): (i64,) = sqlx::query_as(query)
            .bind(record.status.as_str())
            .bind(&record.queue_name)
            .bind(&record.context)
            .bind(&record.task_type)
            .bind(&record.serialized_task)
            .bind(to_db_int(record.progress_basis_points))
            .bind(to_db_int(record.last_execution_progress_basis_points))
            .bind(to_db_int(record.retries))
            .bind(&record.failure_description)
            .bind(record.create_timestamp)
            .bind(record.queue_timestamp)
            .bind(record.last_update_timestamp)
            .bind(record.start_timestamp)
            .bind(record.finish_timestamp)
            .bind(record.fail_timestamp)
            .bind(record.earliest_start_timestamp)
            .fetch_one(&self.pool)
            .await?;

        debug!(item_id = id, task_type = %record.task_type, "Inserted queue item");
        Ok(id)
    }
}

#[async_trait]
impl TaskQueueStorage for PgQueueStorage {
    #[instrument(skip(self, item, conditions), fields(item_id = ?item.id()))]
    async fn save(
        &self,
        item: &QueueItem,
        conditions: Option<&QueueItemFilter>,
    ) -> QueueStorageResult<QueueItemId> {
        let record = item.as_record();
        let Some(id) = record.id else {
            return self.insert(record).await;
        };

        let result = update_query(id, record, conditions)
            .build()
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            warn!(item_id = id, conditions = ?conditions, "Queue item save lost optimistic race");
            return Err(QueueStorageError::SaveConflict { id });
        }
        Ok(id)
    }

    async fn find(&self, id: QueueItemId) -> QueueStorageResult<Option<QueueItem>> {
        let query = format!("SELECT {QUEUE_ITEM_COLUMNS} FROM tasker_queue_items WHERE id = $1");
        let row = sqlx::query_as::<_, QueueItemRow>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(QueueItemRow::into_item).transpose()
    }

    #[instrument(skip(self))]
    async fn find_oldest_queued_items(&self, limit: usize) -> QueueStorageResult<Vec<QueueItem>> {
        let query = queue_heads_query("");
        let rows = sqlx::query_as::<_, QueueItemRow>(&query)
            .bind(to_db_bigint(limit))
            .fetch_all(&self.pool)
            .await?;

        debug!(found = rows.len(), "Loaded oldest queued items");
        rows.into_iter().map(QueueItemRow::into_item).collect()
    }

    #[instrument(skip(self))]
    async fn find_startable_queued_items(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> QueueStorageResult<Vec<QueueItem>> {
        let query = queue_heads_query(
            "WHERE earliest_start_timestamp IS NULL OR earliest_start_timestamp <= $2",
        );
        let rows = sqlx::query_as::<_, QueueItemRow>(&query)
            .bind(to_db_bigint(limit))
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        debug!(found = rows.len(), "Loaded startable queued items");
        rows.into_iter().map(QueueItemRow::into_item).collect()
    }

    async fn find_all(
        &self,
        filter: &QueueItemFilter,
        sort: Option<QueueItemSort>,
        offset: usize,
        limit: Option<usize>,
    ) -> QueueStorageResult<Vec<QueueItem>> {
        let mut builder = find_all_query(filter, sort, offset, limit);
        let rows = builder
            .build_query_as::<QueueItemRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(QueueItemRow::into_item).collect()
    }
}

/// Runner status storage on PostgreSQL
#[derive(Debug, Clone)]
pub struct PgRunnerStatusStorage {
    pool: PgPool,
    name: String,
}

impl PgRunnerStatusStorage {
    pub fn new(pool: PgPool) -> Self {
        Self::with_name(pool, TASK_RUNNER_STATUS_NAME)
    }

    /// Use a different singleton row, e.g. to run isolated schedulers side by side
    pub fn with_name(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }
}

#[async_trait]
impl TaskRunnerStatusStorage for PgRunnerStatusStorage {
    async fn get_status(&self) -> RunnerStatusStorageResult<TaskRunnerStatus> {
        let row: Option<(String, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT guid, alive_since FROM tasker_queue_runner_status WHERE name = $1",
        )
        .bind(&self.name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map_or_else(TaskRunnerStatus::null, |(guid, alive_since)| {
            TaskRunnerStatus::from_parts(guid, alive_since)
        }))
    }

    #[instrument(skip(self), fields(name = %self.name))]
    async fn set_status(
        &self,
        expected: &TaskRunnerStatus,
        status: TaskRunnerStatus,
    ) -> RunnerStatusStorageResult<()> {
        let result = if expected.is_null() {
            // A missing row counts as the null status
            sqlx::query(
                r#"
                INSERT INTO tasker_queue_runner_status (name, guid, alive_since)
                VALUES ($1, $2, $3)
                ON CONFLICT (name) DO UPDATE
                SET guid = EXCLUDED.guid, alive_since = EXCLUDED.alive_since
                WHERE tasker_queue_runner_status.guid = ''
                "#,
            )
            .bind(&self.name)
            .bind(status.guid())
            .bind(status.alive_since())
            .execute(&self.pool)
            .await?
        } else {
            sqlx::query(
                r#"
                UPDATE tasker_queue_runner_status
                SET guid = $2, alive_since = $3
                WHERE name = $1 AND guid = $4 AND alive_since IS NOT DISTINCT FROM $5
                "#,
            )
            .bind(&self.name)
            .bind(status.guid())
            .bind(status.alive_since())
            .bind(expected.guid())
            .bind(expected.alive_since())
            .execute(&self.pool)
            .await?
        };

        if result.rows_affected() == 0 {
            return Err(RunnerStatusStorageError::conflict(expected));
        }
        Ok(())
    }
}
