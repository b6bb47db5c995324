//! Progress record operations, keyed by destination path.

use crate::error::DatabaseError;
use crate::types::{RESUME_PENDING, TransferStatus};
use crate::{Error, Result};
use std::path::Path;

use super::{Database, ProgressRecord, ProgressRow, ProgressUpdate};

const SELECT_PROGRESS: &str = r#"
    SELECT
        destination_path, status, expected_size, progress_bytes,
        resume_total, resume_status, updated_at
    FROM progress
"#;

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// SQLite integers are signed; sizes past `i64::MAX` are rejected
fn to_db_int(value: Option<u64>, field: &str) -> Result<Option<i64>> {
    value.map(i64::try_from).transpose().map_err(|_| {
        Error::Database(DatabaseError::QueryFailed(format!(
            "{} {:?} exceeds the storable range",
            field, value
        )))
    })
}

impl Database {
    /// Insert or update the progress record for a destination path
    ///
    /// Repeated calls with the same path overwrite the fields named in
    /// `update` and never create a second row. The read and write happen in
    /// one write transaction.
    pub async fn upsert_progress(
        &self,
        destination_path: &Path,
        update: ProgressUpdate,
    ) -> Result<ProgressRecord> {
        let key = path_key(destination_path);

        let mut conn = self.pool.acquire().await.map_err(|e| {
            Error::Database(DatabaseError::ConnectionFailed(format!(
                "Failed to acquire connection: {}",
                e
            )))
        })?;

        // Write lock up front: a deferred read-then-write upgrade fails under concurrent writers
        sqlx::query("BEGIN IMMEDIATE")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to begin progress transaction: {}",
                    e
                )))
            })?;

        let result = async {
            let current = sqlx::query_as::<_, ProgressRow>(&format!(
                "{SELECT_PROGRESS} WHERE destination_path = ?"
            ))
            .bind(&key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to read progress: {}",
                    e
                )))
            })?
            .map(ProgressRecord::from);

            let record = update.merge_into(current, destination_path.to_path_buf());
            let expected_size = to_db_int(record.expected_size, "expected_size")?;
            let progress_bytes = to_db_int(record.progress_bytes, "progress_bytes")?;

            sqlx::query(
                r#"
                INSERT INTO progress (
                    destination_path, status, expected_size, progress_bytes,
                    resume_total, resume_status, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(destination_path) DO UPDATE SET
                    status = excluded.status,
                    expected_size = excluded.expected_size,
                    progress_bytes = excluded.progress_bytes,
                    resume_total = excluded.resume_total,
                    resume_status = excluded.resume_status,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&key)
            .bind(record.status.to_i32())
            .bind(expected_size)
            .bind(progress_bytes)
            .bind(record.resume_total.map(i64::from))
            .bind(record.resume_status.map(i64::from))
            .bind(record.updated_at)
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to upsert progress: {}",
                    e
                )))
            })?;

            Ok::<ProgressRecord, Error>(record)
        }
        .await;

        let record = match result {
            Ok(record) => record,
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                return Err(e);
            }
        };

        sqlx::query("COMMIT")
            .execute(&mut *conn)
            .await
            .map_err(|e| {
                Error::Database(DatabaseError::QueryFailed(format!(
                    "Failed to commit progress: {}",
                    e
                )))
            })?;

        Ok(record)
    }

    /// Get the progress record for a destination path
    pub async fn get_progress(&self, destination_path: &Path) -> Result<Option<ProgressRecord>> {
        let row = sqlx::query_as::<_, ProgressRow>(&format!(
            "{SELECT_PROGRESS} WHERE destination_path = ?"
        ))
        .bind(path_key(destination_path))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to get progress: {}",
                e
            )))
        })?;

        Ok(row.map(ProgressRecord::from))
    }

    /// List all progress records, most recently updated first
    pub async fn list_progress(&self) -> Result<Vec<ProgressRecord>> {
        let rows = sqlx::query_as::<_, ProgressRow>(&format!(
            "{SELECT_PROGRESS} ORDER BY updated_at DESC, destination_path ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to list progress: {}",
                e
            )))
        })?;

        Ok(rows.into_iter().map(ProgressRecord::from).collect())
    }

    /// Set the status of a progress record (caller-driven transitions)
    pub async fn set_progress_status(
        &self,
        destination_path: &Path,
        status: TransferStatus,
    ) -> Result<ProgressRecord> {
        self.upsert_progress(
            destination_path,
            ProgressUpdate {
                status: Some(status),
                ..Default::default()
            },
        )
        .await
    }

    /// Record that a resume action has been started for this path
    ///
    /// Increments `resume_total` and marks `resume_status` pending.
    pub async fn mark_resume_pending(&self, destination_path: &Path) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE progress
            SET resume_total = COALESCE(resume_total, 0) + 1,
                resume_status = ?,
                updated_at = ?
            WHERE destination_path = ?
            "#,
        )
        .bind(i64::from(RESUME_PENDING))
        .bind(chrono::Utc::now().timestamp())
        .bind(path_key(destination_path))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to mark resume pending: {}",
                e
            )))
        })?;

        Ok(())
    }

    /// Clear `resume_status` once the resume action has finished
    pub async fn clear_resume_status(&self, destination_path: &Path) -> Result<()> {
        sqlx::query(
            "UPDATE progress SET resume_status = NULL, updated_at = ? WHERE destination_path = ?",
        )
        .bind(chrono::Utc::now().timestamp())
        .bind(path_key(destination_path))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to clear resume status: {}",
                e
            )))
        })?;

        Ok(())
    }
}
