use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    AggregateId, AggregateRecord, AggregateWrite, ChangeSet, EntryId, OutboxEntry, OutboxStats,
    OutboxStatus, RecordQuery, Result, StoreError, UniqueKey, Version,
    query::escape_like,
    store::{RecordStream, Store},
};

const RECORD_COLUMNS: &str = "aggregate_id, aggregate_type, version, updated_at, state";

const OUTBOX_COLUMNS: &str = "id, sequence, aggregate_id, aggregate_type, event_type, payload, \
     metadata, status, attempts, last_error, available_at, locked_until, created_at, dispatched_at";

const STREAM_PAGE_SIZE: i64 = 500;

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a small pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_record(row: PgRow) -> Result<AggregateRecord> {
        Ok(AggregateRecord {
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            version: Version::new(row.try_get("version")?),
            updated_at: row.try_get("updated_at")?,
            state: row.try_get("state")?,
        })
    }

    fn row_to_entry(row: PgRow) -> Result<OutboxEntry> {
        let metadata_json: serde_json::Value = row.try_get("metadata")?;
        let metadata: HashMap<String, serde_json::Value> = serde_json::from_value(metadata_json)?;
        let status: String = row.try_get("status")?;
        let attempts: i32 = row.try_get("attempts")?;

        Ok(OutboxEntry {
            id: EntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            sequence: row.try_get("sequence")?,
            aggregate_id: AggregateId::from_uuid(row.try_get::<Uuid, _>("aggregate_id")?),
            aggregate_type: row.try_get("aggregate_type")?,
            event_type: row.try_get("event_type")?,
            payload: row.try_get("payload")?,
            metadata,
            status: OutboxStatus::parse(&status)
                .ok_or_else(|| StoreError::CorruptRow(format!("unknown outbox status {status}")))?,
            attempts: u32::try_from(attempts)
                .map_err(|_| StoreError::CorruptRow(format!("negative attempts {attempts}")))?,
            last_error: row.try_get("last_error")?,
            available_at: row.try_get("available_at")?,
            locked_until: row.try_get("locked_until")?,
            created_at: row.try_get("created_at")?,
            dispatched_at: row.try_get("dispatched_at")?,
        })
    }

    async fn current_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: AggregateId,
    ) -> Result<Version> {
        let version: Option<i64> =
            sqlx::query_scalar("SELECT version FROM aggregates WHERE aggregate_id = $1")
                .bind(aggregate_id.as_uuid())
                .fetch_optional(&mut **tx)
                .await?;
        Ok(version.map(Version::new).unwrap_or(Version::initial()))
    }

    /// Locks every existing row the change set writes or checks, in id order
    /// so concurrent commits queue instead of deadlocking, then verifies the
    /// checked versions.
    async fn lock_and_check(
        tx: &mut Transaction<'_, Postgres>,
        changes: &ChangeSet,
    ) -> Result<()> {
        let mut ids: Vec<Uuid> = changes
            .writes
            .iter()
            .filter(|w| !w.expected_version.is_initial())
            .map(|w| w.record.aggregate_id.as_uuid())
            .chain(changes.checks.iter().map(|c| c.aggregate_id.as_uuid()))
            .collect();
        if ids.is_empty() {
            return Ok(());
        }
        ids.sort_unstable();

        let rows = sqlx::query(
            "SELECT aggregate_id, version FROM aggregates \
             WHERE aggregate_id = ANY($1) ORDER BY aggregate_id FOR UPDATE",
        )
        .bind(&ids[..])
        .fetch_all(&mut **tx)
        .await?;
        let mut locked = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: Uuid = row.try_get("aggregate_id")?;
            let version: i64 = row.try_get("version")?;
            locked.insert(id, Version::new(version));
        }

        for check in &changes.checks {
            let actual = locked
                .get(&check.aggregate_id.as_uuid())
                .copied()
                .unwrap_or(Version::initial());
            if actual != check.expected_version {
                return Err(StoreError::ConcurrencyConflict {
                    aggregate_id: check.aggregate_id,
                    expected: check.expected_version,
                    actual,
                });
            }
        }
        Ok(())
    }

    async fn write_record(tx: &mut Transaction<'_, Postgres>, write: &AggregateWrite) -> Result<()> {
        let record = &write.record;
        let affected = if write.expected_version.is_initial() {
            sqlx::query(
                r#"
                INSERT INTO aggregates (aggregate_id, aggregate_type, version, updated_at, state)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (aggregate_id) DO NOTHING
                "#,
            )
            .bind(record.aggregate_id.as_uuid())
            .bind(&record.aggregate_type)
            .bind(record.version.as_i64())
            .bind(record.updated_at)
            .bind(&record.state)
            .execute(&mut **tx)
            .await?
            .rows_affected()
        } else {
            sqlx::query(
                r#"
                UPDATE aggregates
                SET version = $3, updated_at = $4, state = $5
                WHERE aggregate_id = $1 AND version = $2
                "#,
            )
            .bind(record.aggregate_id.as_uuid())
            .bind(write.expected_version.as_i64())
            .bind(record.version.as_i64())
            .bind(record.updated_at)
            .bind(&record.state)
            .execute(&mut **tx)
            .await?
            .rows_affected()
        };

        if affected == 0 {
            let actual = Self::current_version(tx, record.aggregate_id).await?;
            return Err(StoreError::ConcurrencyConflict {
                aggregate_id: record.aggregate_id,
                expected: write.expected_version,
                actual,
            });
        }
        Ok(())
    }

    async fn claim_key(tx: &mut Transaction<'_, Postgres>, key: &UniqueKey) -> Result<()> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO unique_keys (scope, value, owner_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (scope, value) DO NOTHING
            "#,
        )
        .bind(&key.scope)
        .bind(&key.value)
        .bind(key.owner.as_uuid())
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if inserted == 0 {
            let owner: Uuid =
                sqlx::query_scalar("SELECT owner_id FROM unique_keys WHERE scope = $1 AND value = $2")
                    .bind(&key.scope)
                    .bind(&key.value)
                    .fetch_one(&mut **tx)
                    .await?;
            if owner != key.owner.as_uuid() {
                return Err(StoreError::UniqueViolation {
                    scope: key.scope.clone(),
                    value: key.value.clone(),
                });
            }
        }
        Ok(())
    }

    async fn fetch_page(
        pool: &PgPool,
        aggregate_type: &str,
        after: Uuid,
    ) -> Result<Vec<AggregateRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM aggregates \
             WHERE aggregate_type = $1 AND aggregate_id > $2 \
             ORDER BY aggregate_id ASC LIMIT $3"
        ))
        .bind(aggregate_type)
        .bind(after)
        .bind(STREAM_PAGE_SIZE)
        .fetch_all(pool)
        .await?;

        rows.into_iter().map(Self::row_to_record).collect()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn commit(&self, changes: ChangeSet) -> Result<()> {
        changes.validate()?;
        if changes.is_empty() {
            return Ok(());
        }

        // Dropping `tx` on any early return rolls everything back.
        let mut tx = self.pool.begin().await?;

        Self::lock_and_check(&mut tx, &changes).await?;

        for write in &changes.writes {
            Self::write_record(&mut tx, write).await?;
        }

        for check in changes.checks.iter().filter(|c| c.bump) {
            sqlx::query("UPDATE aggregates SET version = version + 1 WHERE aggregate_id = $1")
                .bind(check.aggregate_id.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        for key in &changes.released_keys {
            sqlx::query("DELETE FROM unique_keys WHERE scope = $1 AND value = $2 AND owner_id = $3")
                .bind(&key.scope)
                .bind(&key.value)
                .bind(key.owner.as_uuid())
                .execute(&mut *tx)
                .await?;
        }

        for key in &changes.claimed_keys {
            Self::claim_key(&mut tx, key).await?;
        }

        for entry in &changes.outbox {
            let metadata_json = serde_json::to_value(&entry.metadata)?;
            sqlx::query(
                r#"
                INSERT INTO outbox (id, aggregate_id, aggregate_type, event_type, payload, metadata,
                                    status, attempts, available_at, created_at)
                VALUES ($1, $2, $3, $4, $5, $6, 'pending', 0, $7, $8)
                "#,
            )
            .bind(entry.id.as_uuid())
            .bind(entry.aggregate_id.as_uuid())
            .bind(&entry.aggregate_type)
            .bind(&entry.event_type)
            .bind(&entry.payload)
            .bind(metadata_json)
            .bind(entry.available_at)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn load(&self, aggregate_id: AggregateId) -> Result<Option<AggregateRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM aggregates WHERE aggregate_id = $1"
        ))
        .bind(aggregate_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_record).transpose()
    }

    async fn query(&self, query: RecordQuery) -> Result<Vec<AggregateRecord>> {
        let mut sql = format!("SELECT {RECORD_COLUMNS} FROM aggregates WHERE 1=1");
        let mut param_count = 0;

        if query.aggregate_type.is_some() {
            param_count += 1;
            sql.push_str(&format!(" AND aggregate_type = ${param_count}"));
        }
        for _ in &query.field_equals {
            param_count += 2;
            sql.push_str(&format!(
                " AND COALESCE(state -> ${}, 'null'::jsonb) = ${}",
                param_count - 1,
                param_count
            ));
        }
        if query.field_prefix.is_some() {
            param_count += 2;
            sql.push_str(&format!(
                " AND state ->> ${} LIKE ${}",
                param_count - 1,
                param_count
            ));
        }

        if query.order_by.is_some() {
            param_count += 1;
            sql.push_str(&format!(
                " ORDER BY state ->> ${param_count} ASC, aggregate_id ASC"
            ));
        } else {
            sql.push_str(" ORDER BY aggregate_id ASC");
        }

        if query.limit.is_some() {
            param_count += 1;
            sql.push_str(&format!(" LIMIT ${param_count}"));
        }
        if query.offset.is_some() {
            param_count += 1;
            sql.push_str(&format!(" OFFSET ${param_count}"));
        }

        let mut sqlx_query = sqlx::query(&sql);

        if let Some(aggregate_type) = query.aggregate_type {
            sqlx_query = sqlx_query.bind(aggregate_type);
        }
        for (field, value) in query.field_equals {
            sqlx_query = sqlx_query.bind(field).bind(value);
        }
        if let Some((field, prefix)) = query.field_prefix {
            sqlx_query = sqlx_query
                .bind(field)
                .bind(format!("{}%", escape_like(&prefix)));
        }
        if let Some(order_by) = query.order_by {
            sqlx_query = sqlx_query.bind(order_by);
        }
        if let Some(limit) = query.limit {
            sqlx_query = sqlx_query.bind(limit as i64);
        }
        if let Some(offset) = query.offset {
            sqlx_query = sqlx_query.bind(offset as i64);
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::row_to_record).collect()
    }

    async fn stream_records(&self, aggregate_type: &str) -> Result<RecordStream> {
        use futures_util::{TryStreamExt, stream};

        let pool = self.pool.clone();
        let aggregate_type = aggregate_type.to_string();

        // Keyset pagination so the stream owns its state and never holds a
        // connection between pages.
        let pages = stream::try_unfold(Some(Uuid::nil()), move |cursor| {
            let pool = pool.clone();
            let aggregate_type = aggregate_type.clone();
            async move {
                let Some(after) = cursor else {
                    return Ok(None);
                };
                Self::fetch_page(&pool, &aggregate_type, after)
                    .await
                    .map(|page| {
                        if page.is_empty() {
                            return None;
                        }
                        let next = if (page.len() as i64) < STREAM_PAGE_SIZE {
                            None
                        } else {
                            page.last().map(|r| r.aggregate_id.as_uuid())
                        };
                        Some((page, next))
                    })
            }
        });

        let records = pages
            .map_ok(|page| stream::iter(page.into_iter().map(Ok)))
            .try_flatten();
        Ok(Box::pin(records))
    }

    async fn unique_key_owner(&self, scope: &str, value: &str) -> Result<Option<AggregateId>> {
        let owner: Option<Uuid> =
            sqlx::query_scalar("SELECT owner_id FROM unique_keys WHERE scope = $1 AND value = $2")
                .bind(scope)
                .bind(value)
                .fetch_optional(&self.pool)
                .await?;
        Ok(owner.map(AggregateId::from_uuid))
    }

    async fn claim_pending(
        &self,
        limit: usize,
        visibility_timeout: Duration,
    ) -> Result<Vec<OutboxEntry>> {
        let now = Utc::now();
        let locked_until = now
            + chrono::Duration::from_std(visibility_timeout)
                .unwrap_or_else(|_| chrono::Duration::seconds(30));

        let rows = sqlx::query(&format!(
            r#"
            UPDATE outbox SET locked_until = $2
            WHERE id IN (
                SELECT id FROM outbox
                WHERE status = 'pending'
                  AND available_at <= $1
                  AND (locked_until IS NULL OR locked_until <= $1)
                ORDER BY sequence ASC
                LIMIT $3
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {OUTBOX_COLUMNS}
            "#
        ))
        .bind(now)
        .bind(locked_until)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut entries = rows
            .into_iter()
            .map(Self::row_to_entry)
            .collect::<Result<Vec<_>>>()?;
        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }

    async fn mark_dispatched(&self, id: EntryId) -> Result<()> {
        let affected = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'dispatched', dispatched_at = $2, locked_until = NULL
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 {
            return Err(StoreError::OutboxEntryNotFound(id));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: EntryId,
        error: &str,
        retry_at: DateTime<Utc>,
        max_attempts: u32,
    ) -> Result<OutboxStatus> {
        let status: Option<String> = sqlx::query_scalar(
            r#"
            UPDATE outbox
            SET attempts = attempts + 1,
                last_error = $2,
                locked_until = NULL,
                status = CASE WHEN attempts + 1 >= $4 THEN 'failed' ELSE 'pending' END,
                available_at = CASE WHEN attempts + 1 >= $4 THEN available_at ELSE $3 END
            WHERE id = $1
            RETURNING status
            "#,
        )
        .bind(id.as_uuid())
        .bind(error)
        .bind(retry_at)
        .bind(i64::from(max_attempts))
        .fetch_optional(&self.pool)
        .await?;

        let status = status.ok_or(StoreError::OutboxEntryNotFound(id))?;
        OutboxStatus::parse(&status)
            .ok_or_else(|| StoreError::CorruptRow(format!("unknown outbox status {status}")))
    }

    async fn release(&self, id: EntryId) -> Result<()> {
        sqlx::query("UPDATE outbox SET locked_until = NULL WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn outbox_entry(&self, id: EntryId) -> Result<Option<OutboxEntry>> {
        let row = sqlx::query(&format!("SELECT {OUTBOX_COLUMNS} FROM outbox WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;
        row.map(Self::row_to_entry).transpose()
    }

    async fn failed_entries(&self, limit: usize) -> Result<Vec<OutboxEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {OUTBOX_COLUMNS} FROM outbox WHERE status = 'failed' \
             ORDER BY sequence ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn retry_failed(&self, id: EntryId) -> Result<bool> {
        let affected = sqlx::query(
            r#"
            UPDATE outbox
            SET status = 'pending', attempts = 0, available_at = $2, locked_until = NULL
            WHERE id = $1 AND status = 'failed'
            "#,
        )
        .bind(id.as_uuid())
        .bind(Utc::now())
        .execute(&self.pool)
        .await?
        .rows_affected();

        if affected == 0 && self.outbox_entry(id).await?.is_none() {
            return Err(StoreError::OutboxEntryNotFound(id));
        }
        Ok(affected > 0)
    }

    async fn outbox_stats(&self) -> Result<OutboxStats> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS total FROM outbox GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        let mut stats = OutboxStats::default();
        for row in rows {
            let status: String = row.try_get("status")?;
            let total: i64 = row.try_get("total")?;
            let total = total.max(0) as u64;
            match OutboxStatus::parse(&status) {
                Some(OutboxStatus::Pending) => stats.pending = total,
                Some(OutboxStatus::Dispatched) => stats.dispatched = total,
                Some(OutboxStatus::Failed) => stats.failed = total,
                None => {
                    tracing::warn!(%status, "ignoring unknown outbox status");
                }
            }
        }
        Ok(stats)
    }
}
