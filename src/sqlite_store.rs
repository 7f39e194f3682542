//! SQLite-backed [`RecordStore`] implementation.
//!
//! Every mutating method runs in one transaction. Timestamps are stored as
//! unix milliseconds, paths as UTF-8 (lossy) text.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use filevault_core::identity::ContentIdentity;
use filevault_core::models::{ContentKind, FileObservation, ListQuery, TrackedFileRecord};
use filevault_core::store::RecordStore;

const COLUMNS: &str = "content_identity, current_location, original_location, content_kind, \
                       size_bytes, admitted_at, last_confirmed_at, is_valid";

/// SQLite implementation of the [`RecordStore`] trait.
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn millis_to_utc(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {}", ms))
}

fn row_to_record(row: &SqliteRow) -> Result<TrackedFileRecord> {
    let identity: String = row.get("content_identity");
    let kind: String = row.get("content_kind");
    let current: String = row.get("current_location");
    let original: String = row.get("original_location");
    let size: i64 = row.get("size_bytes");
    let valid: i64 = row.get("is_valid");

    Ok(TrackedFileRecord {
        content_identity: identity
            .parse()
            .with_context(|| format!("corrupt identity in tracked_files: {}", identity))?,
        current_location: PathBuf::from(current),
        original_location: PathBuf::from(original),
        content_kind: kind.parse::<ContentKind>().map_err(|e| anyhow!(e))?,
        size_bytes: size.max(0) as u64,
        admitted_at: millis_to_utc(row.get("admitted_at"))?,
        last_confirmed_at: millis_to_utc(row.get("last_confirmed_at"))?,
        is_valid: valid != 0,
    })
}

/// Invalidate valid records other than `keep` that still claim `location`.
async fn release_location(
    tx: &mut Transaction<'_, Sqlite>,
    location: &str,
    keep: &ContentIdentity,
) -> Result<u64> {
    let done = sqlx::query(
        "UPDATE tracked_files SET is_valid = 0 \
         WHERE current_location = ? AND is_valid = 1 AND content_identity != ?",
    )
    .bind(location)
    .bind(keep.as_str())
    .execute(&mut **tx)
    .await?;
    Ok(done.rows_affected())
}

/// Escape `%`, `_` and the escape character itself for a LIKE pattern.
fn like_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert(&self, obs: &FileObservation, now: DateTime<Utc>) -> Result<TrackedFileRecord> {
        let location = path_text(&obs.location);
        let ts = now.timestamp_millis();
        let mut tx = self.pool.begin().await?;

        let released = release_location(&mut tx, &location, &obs.content_identity).await?;
        if released > 0 {
            tracing::debug!(location = %location, released, "location re-claimed by new content");
        }

        sqlx::query(
            r#"
            INSERT INTO tracked_files (content_identity, current_location, original_location,
                                       content_kind, size_bytes, admitted_at,
                                       last_confirmed_at, is_valid)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(content_identity) DO UPDATE SET
                current_location = excluded.current_location,
                size_bytes = excluded.size_bytes,
                last_confirmed_at = excluded.last_confirmed_at,
                is_valid = 1
            "#,
        )
        .bind(obs.content_identity.as_str())
        .bind(&location)
        .bind(&location)
        .bind(obs.content_kind.as_str())
        .bind(obs.size_bytes as i64)
        .bind(ts)
        .bind(ts)
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {} FROM tracked_files WHERE content_identity = ?",
            COLUMNS
        ))
        .bind(obs.content_identity.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row_to_record(&row)
    }

    async fn get_by_identity(&self, identity: &ContentIdentity) -> Result<Option<TrackedFileRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tracked_files WHERE content_identity = ?",
            COLUMNS
        ))
        .bind(identity.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn get_by_location(&self, location: &Path) -> Result<Option<TrackedFileRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM tracked_files WHERE current_location = ? \
             ORDER BY is_valid DESC, last_confirmed_at DESC LIMIT 1",
            COLUMNS
        ))
        .bind(path_text(location))
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_record).transpose()
    }

    async fn search_by_name(&self, substring: &str, limit: i64) -> Result<Vec<TrackedFileRecord>> {
        let pattern = format!("%{}%", like_escape(substring));
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tracked_files WHERE current_location LIKE ? ESCAPE '\\' \
             ORDER BY admitted_at DESC, content_identity ASC LIMIT ?",
            COLUMNS
        ))
        .bind(pattern)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn set_location(
        &self,
        identity: &ContentIdentity,
        location: &Path,
        size_bytes: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let location = path_text(location);
        let mut tx = self.pool.begin().await?;

        // Write first. A deferred transaction that reads first cannot be
        // upgraded once another connection commits, and fails with
        // SQLITE_BUSY instead of waiting on the busy timeout.
        let done = sqlx::query(
            r#"
            UPDATE tracked_files SET
                current_location = ?,
                size_bytes = COALESCE(?, size_bytes),
                last_confirmed_at = ?,
                is_valid = 1
            WHERE content_identity = ?
            "#,
        )
        .bind(&location)
        .bind(size_bytes.map(|s| s as i64))
        .bind(now.timestamp_millis())
        .bind(identity.as_str())
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        release_location(&mut tx, &location, identity).await?;
        tx.commit().await?;
        Ok(true)
    }

    async fn invalidate(&self, identity: &ContentIdentity) -> Result<bool> {
        let done = sqlx::query("UPDATE tracked_files SET is_valid = 0 WHERE content_identity = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete(&self, identity: &ContentIdentity) -> Result<bool> {
        let done = sqlx::query("DELETE FROM tracked_files WHERE content_identity = ?")
            .bind(identity.as_str())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<TrackedFileRecord>> {
        let filter = if query.valid_only {
            "WHERE is_valid = 1"
        } else {
            ""
        };
        // LIMIT -1 is "no limit" in SQLite.
        let rows = sqlx::query(&format!(
            "SELECT {} FROM tracked_files {} \
             ORDER BY admitted_at DESC, content_identity ASC LIMIT ? OFFSET ?",
            COLUMNS, filter
        ))
        .bind(query.limit.map(|l| l.max(0)).unwrap_or(-1))
        .bind(query.offset.unwrap_or(0).max(0))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }

    async fn count(&self, valid_only: bool) -> Result<i64> {
        let sql = if valid_only {
            "SELECT COUNT(*) FROM tracked_files WHERE is_valid = 1"
        } else {
            "SELECT COUNT(*) FROM tracked_files"
        };
        let n: i64 = sqlx::query_scalar(sql).fetch_one(&self.pool).await?;
        Ok(n)
    }
}
