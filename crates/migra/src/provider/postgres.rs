//! PostgreSQL dialect provider. `tags` is stored as `TEXT[]`; tag filtering uses the
//! array-overlap operator (`&&`). Transactions use `tokio_postgres::Transaction` directly.
//!
//! Connections come from a small `deadpool_postgres::Pool` rather than a single long-lived
//! client, mirroring the teacher's `pool::create_pool_with_manager_config` — each provider
//! call checks out a connection and returns it to the pool on drop (§5 "Resource
//! acquisition"). A one-shot CLI invocation never needs more than a handful of connections, so
//! the pool is sized small rather than the teacher's library default of 16.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::NoTls;

use super::{Provider, validate_table_name};
use crate::error::{MigraError, MigraResult};
use crate::revision::{AppliedRevision, Revision, RevisionFilter};

const POOL_MAX_SIZE: usize = 4;

pub struct PostgresProvider {
    pool: Pool,
    table: String,
}

impl PostgresProvider {
    /// Connect to `dsn` and validate `migration_table`. Connection failures raise
    /// [`MigraError::Connect`].
    pub async fn connect(dsn: &str, migration_table: &str) -> MigraResult<Self> {
        validate_table_name(migration_table)?;

        let pg_config: tokio_postgres::Config = dsn
            .parse()
            .map_err(|e: tokio_postgres::Error| MigraError::connect(format!("invalid postgres dsn: {e}")))?;

        let manager_config = ManagerConfig { recycling_method: RecyclingMethod::Fast };
        let manager = Manager::from_config(pg_config, NoTls, manager_config);
        let pool = Pool::builder(manager)
            .max_size(POOL_MAX_SIZE)
            .build()
            .map_err(|e| MigraError::connect(format!("failed to build postgres pool: {e}")))?;

        // Fail fast at construction rather than on first use (§7: "Connection failures at
        // construction or on the first use raise a dedicated ConnectError").
        pool.get().await.map_err(|e| MigraError::connect(format!("failed to connect to postgres: {e}")))?;

        Ok(Self { pool, table: migration_table.to_string() })
    }

    fn quoted_table(&self) -> String {
        format!("\"{}\"", self.table)
    }

    async fn client(&self) -> MigraResult<deadpool_postgres::Client> {
        self.pool.get().await.map_err(MigraError::from)
    }

    /// Best-effort session-scoped advisory lock keyed by a hash of the bookkeeping table name
    /// (§5: "Concurrent invocations" — documented as best-effort, not a substitute for
    /// external serialisation).
    fn advisory_lock_key(&self) -> i64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        self.table.hash(&mut hasher);
        hasher.finish() as i64
    }
}

#[async_trait]
impl Provider for PostgresProvider {
    #[tracing::instrument(skip(self))]
    async fn create_bookkeeping(&self) -> MigraResult<()> {
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                revision_id TEXT PRIMARY KEY,
                down_revision_id TEXT,
                message TEXT NOT NULL DEFAULT '',
                tags TEXT[],
                author TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )",
            self.quoted_table()
        );
        let client = self.client().await?;
        client.batch_execute(&sql).await.map_err(|e| MigraError::Connect(e.to_string()))?;
        tracing::info!(table = %self.table, "bookkeeping table ensured");
        Ok(())
    }

    async fn drop_bookkeeping(&self) -> MigraResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", self.quoted_table());
        let client = self.client().await?;
        client.batch_execute(&sql).await.map_err(|e| MigraError::Connect(e.to_string()))?;
        Ok(())
    }

    async fn get_head(&self) -> MigraResult<Option<AppliedRevision>> {
        let sql = format!(
            "SELECT revision_id, down_revision_id, message, tags, author, created_at
             FROM {} ORDER BY created_at DESC LIMIT 1",
            self.quoted_table()
        );
        let client = self.client().await?;
        let row = client.query_opt(&sql, &[]).await.map_err(|e| MigraError::Connect(e.to_string()))?;
        Ok(row.map(row_to_applied))
    }

    #[tracing::instrument(skip(self, rev), fields(revision_id = %rev.revision_id))]
    async fn apply_up(&self, rev: &Revision) -> MigraResult<u64> {
        let lock_key = self.advisory_lock_key();
        let mut client = self.client().await?;
        let tx = client
            .build_transaction()
            .start()
            .await
            .map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;

        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&lock_key])
            .await
            .map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;

        if let Some(sql) = &rev.up_sql {
            tx.batch_execute(sql).await.map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;
        }

        let tags: Option<Vec<String>> = rev.tags.as_ref().map(|t| t.iter().cloned().collect());
        let insert = format!(
            "INSERT INTO {} (revision_id, down_revision_id, message, tags, author, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
            self.quoted_table()
        );
        let affected = tx
            .execute(
                &insert,
                &[
                    &rev.revision_id,
                    &rev.down_revision_id,
                    &rev.message,
                    &tags,
                    &rev.author,
                    &rev.created_at,
                ],
            )
            .await
            .map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;

        tx.commit().await.map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;
        Ok(affected)
    }

    #[tracing::instrument(skip(self, rev), fields(revision_id = %rev.revision_id))]
    async fn apply_down(&self, rev: &Revision) -> MigraResult<u64> {
        let lock_key = self.advisory_lock_key();
        let mut client = self.client().await?;
        let tx = client
            .build_transaction()
            .start()
            .await
            .map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;

        tx.execute("SELECT pg_advisory_xact_lock($1)", &[&lock_key])
            .await
            .map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;

        if let Some(sql) = &rev.down_sql {
            tx.batch_execute(sql).await.map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;
        }

        let delete = format!("DELETE FROM {} WHERE revision_id = $1", self.quoted_table());
        let affected = tx
            .execute(&delete, &[&rev.revision_id])
            .await
            .map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;

        tx.commit().await.map_err(|e| MigraError::sql(rev.revision_id.as_str(), e))?;
        Ok(affected)
    }

    async fn list(&self, filter: &RevisionFilter) -> MigraResult<Vec<AppliedRevision>> {
        let mut sql = format!(
            "SELECT revision_id, down_revision_id, message, tags, author, created_at FROM {}",
            self.quoted_table()
        );
        let mut clauses = Vec::new();
        let mut params: Vec<&(dyn tokio_postgres::types::ToSql + Sync)> = Vec::new();

        let tags_vec: Option<Vec<String>> = filter.tags.as_ref().map(|t| t.iter().cloned().collect());

        if let Some(author) = &filter.author {
            params.push(author);
            clauses.push(format!("author = ${}", params.len()));
        }
        if let Some(tags) = &tags_vec {
            params.push(tags);
            clauses.push(format!("tags && ${}", params.len()));
        }
        if let Some(since) = &filter.since {
            params.push(since);
            clauses.push(format!("created_at >= ${}", params.len()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let client = self.client().await?;
        let rows = client.query(&sql, &params).await.map_err(|e| MigraError::Connect(e.to_string()))?;
        Ok(rows.into_iter().map(row_to_applied).collect())
    }
}

fn row_to_applied(row: tokio_postgres::Row) -> AppliedRevision {
    let tags: Option<Vec<String>> = row.get("tags");
    let created_at: DateTime<Utc> = row.get("created_at");
    AppliedRevision {
        revision_id: row.get("revision_id"),
        down_revision_id: row.get("down_revision_id"),
        message: row.get("message"),
        author: row.get("author"),
        tags: tags.map(|t| t.into_iter().collect()),
        created_at,
    }
}
