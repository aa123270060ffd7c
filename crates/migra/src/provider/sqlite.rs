//! SQLite dialect provider. `tags` is stored as comma-joined `TEXT`; tag filtering expands to
//! an `OR` of four `LIKE` patterns per requested tag. DSNs look like `sqlite:///path/to.db` or
//! `sqlite://:memory:`.
//!
//! `rusqlite` is synchronous, so every call is dispatched through `tokio::task::spawn_blocking`
//! to keep the trait's async signature uniform across dialects.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

use super::{Provider, validate_table_name};
use crate::error::{MigraError, MigraResult};
use crate::revision::{AppliedRevision, Revision, RevisionFilter};

pub struct SqliteProvider {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl SqliteProvider {
    pub async fn connect(dsn: &str, migration_table: &str) -> MigraResult<Self> {
        validate_table_name(migration_table)?;
        let path = parse_sqlite_path(dsn)?;
        let table = migration_table.to_string();

        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, rusqlite::Error> {
            Connection::open(path)
        })
        .await
        .map_err(|e| MigraError::connect(format!("sqlite connect task panicked: {e}")))?
        .map_err(|e| MigraError::connect(format!("failed to open sqlite database: {e}")))?;

        Ok(Self { conn: Arc::new(Mutex::new(conn)), table })
    }

    async fn with_conn<T, F>(&self, f: F) -> MigraResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("sqlite connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| MigraError::connect(format!("sqlite task panicked: {e}")))?
        .map_err(MigraError::from)
    }

    /// Like [`Self::with_conn`], but failures are attributed to `revision_id` as
    /// [`MigraError::Sql`] rather than [`MigraError::Connect`] — the user's SQL (or the
    /// bookkeeping insert/delete alongside it) is what failed, not the connection itself
    /// (§7: SQLError is distinct from ConnectError).
    async fn with_conn_for_revision<T, F>(&self, revision_id: String, f: F) -> MigraResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn.lock().expect("sqlite connection mutex poisoned");
            f(&guard)
        })
        .await
        .map_err(|e| MigraError::connect(format!("sqlite task panicked: {e}")))?
        .map_err(|e| MigraError::sql(revision_id, e))
    }
}

/// `sqlite:///relative/or/absolute/path.db`, with `sqlite://:memory:` (or the bare
/// `:memory:`) supported for in-memory databases.
fn parse_sqlite_path(dsn: &str) -> MigraResult<String> {
    let rest = dsn
        .strip_prefix("sqlite://")
        .ok_or_else(|| MigraError::config(format!("not a sqlite dsn: '{dsn}'")))?;
    if rest == ":memory:" || rest.is_empty() {
        return Ok(":memory:".to_string());
    }
    Ok(rest.trim_start_matches('/').to_string())
}

fn tags_to_column(tags: &Option<std::collections::BTreeSet<String>>) -> Option<String> {
    tags.as_ref().map(|t| t.iter().cloned().collect::<Vec<_>>().join(","))
}

fn column_to_tags(value: Option<String>) -> Option<std::collections::BTreeSet<String>> {
    value.map(|v| v.split(',').filter(|s| !s.is_empty()).map(String::from).collect())
}

fn row_to_applied(row: &rusqlite::Row) -> rusqlite::Result<AppliedRevision> {
    let tags_raw: Option<String> = row.get("tags")?;
    let created_at_raw: String = row.get("created_at")?;
    let created_at = parse_sqlite_timestamp(&created_at_raw);
    Ok(AppliedRevision {
        revision_id: row.get("revision_id")?,
        down_revision_id: row.get("down_revision_id")?,
        message: row.get("message")?,
        author: row.get("author")?,
        tags: column_to_tags(tags_raw),
        created_at,
    })
}

fn parse_sqlite_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").map(|n| n.and_utc())
        })
        .unwrap_or_else(|_| Utc::now())
}

#[async_trait]
impl Provider for SqliteProvider {
    async fn create_bookkeeping(&self) -> MigraResult<()> {
        let table = self.table.clone();
        self.with_conn(move |conn| {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    revision_id TEXT PRIMARY KEY NOT NULL,
                    down_revision_id TEXT,
                    message TEXT NOT NULL DEFAULT '',
                    tags TEXT,
                    author TEXT,
                    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                )"
            ))
        })
        .await
    }

    async fn drop_bookkeeping(&self) -> MigraResult<()> {
        let table = self.table.clone();
        self.with_conn(move |conn| conn.execute_batch(&format!("DROP TABLE IF EXISTS {table}")))
            .await
    }

    async fn get_head(&self) -> MigraResult<Option<AppliedRevision>> {
        let table = self.table.clone();
        self.with_conn(move |conn| {
            let sql = format!(
                "SELECT revision_id, down_revision_id, message, tags, author, created_at
                 FROM {table} ORDER BY created_at DESC LIMIT 1"
            );
            conn.query_row(&sql, [], row_to_applied).map(Some).or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
        })
        .await
    }

    async fn apply_up(&self, rev: &Revision) -> MigraResult<u64> {
        let table = self.table.clone();
        let rev = rev.clone();
        let revision_id = rev.revision_id.clone();
        self.with_conn_for_revision(revision_id, move |conn| {
            conn.execute_batch("BEGIN")?;
            let result: Result<u64, rusqlite::Error> = (|| {
                if let Some(sql) = &rev.up_sql {
                    conn.execute_batch(sql)?;
                }
                let tags = tags_to_column(&rev.tags);
                let insert = format!(
                    "INSERT INTO {table}
                        (revision_id, down_revision_id, message, tags, author, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
                );
                let affected = conn.execute(
                    &insert,
                    rusqlite::params![
                        rev.revision_id,
                        rev.down_revision_id,
                        rev.message,
                        tags,
                        rev.author,
                        rev.created_at.to_rfc3339(),
                    ],
                )?;
                Ok(affected as u64)
            })();

            match &result {
                Ok(_) => conn.execute_batch("COMMIT")?,
                Err(_) => conn.execute_batch("ROLLBACK")?,
            }
            result
        })
        .await
    }

    async fn apply_down(&self, rev: &Revision) -> MigraResult<u64> {
        let table = self.table.clone();
        let rev = rev.clone();
        let revision_id = rev.revision_id.clone();
        self.with_conn_for_revision(revision_id, move |conn| {
            conn.execute_batch("BEGIN")?;
            let result: Result<u64, rusqlite::Error> = (|| {
                if let Some(sql) = &rev.down_sql {
                    conn.execute_batch(sql)?;
                }
                let delete = format!("DELETE FROM {table} WHERE revision_id = ?1");
                let affected = conn.execute(&delete, rusqlite::params![rev.revision_id])?;
                Ok(affected as u64)
            })();

            match &result {
                Ok(_) => conn.execute_batch("COMMIT")?,
                Err(_) => conn.execute_batch("ROLLBACK")?,
            }
            result
        })
        .await
    }

    async fn list(&self, filter: &RevisionFilter) -> MigraResult<Vec<AppliedRevision>> {
        let table = self.table.clone();
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let mut sql = format!(
                "SELECT revision_id, down_revision_id, message, tags, author, created_at FROM {table}"
            );
            let mut clauses: Vec<String> = Vec::new();

            if let Some(author) = &filter.author {
                clauses.push(format!("author = '{}'", escape_literal(author)));
            }
            if let Some(tags) = &filter.tags {
                let mut tag_clauses = Vec::new();
                for tag in tags {
                    let t = escape_literal(tag);
                    tag_clauses.push(format!(
                        "(tags = '{t}' OR tags LIKE '{t},%' OR tags LIKE '%,{t}' OR tags LIKE '%,{t},%')"
                    ));
                }
                if !tag_clauses.is_empty() {
                    clauses.push(format!("({})", tag_clauses.join(" OR ")));
                }
            }
            if let Some(since) = &filter.since {
                clauses.push(format!("created_at >= '{}'", since.to_rfc3339()));
            }

            if !clauses.is_empty() {
                sql.push_str(" WHERE ");
                sql.push_str(&clauses.join(" AND "));
            }
            sql.push_str(" ORDER BY created_at DESC");

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_applied)?;
            rows.collect()
        })
        .await
    }
}

/// Single-quote escaping for the hand-built `LIKE` clauses above — values come from CLI
/// filters, not end users, but this keeps a stray `'` from breaking the statement.
fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}
