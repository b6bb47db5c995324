//! Transfer request lookups.

use crate::error::DatabaseError;
use crate::types::PeerId;
use crate::{Error, Result};

use super::{Database, NewTransferRequest, TransferRequest};

impl Database {
    /// Insert a new transfer request
    pub async fn insert_transfer_request(&self, request: &NewTransferRequest) -> Result<i64> {
        let now = chrono::Utc::now().timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO transfer_requests (
                file_name, peer_id, network, bot, pack, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.file_name)
        .bind(request.peer_id)
        .bind(&request.network)
        .bind(&request.bot)
        .bind(&request.pack)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to insert transfer request: {}",
                e
            )))
        })?;

        Ok(result.last_insert_rowid())
    }

    /// Find the most recent request for a file name
    ///
    /// With a peer given only that peer's requests match; without one any
    /// peer matches.
    pub async fn find_transfer_request(
        &self,
        file_name: &str,
        peer_id: Option<PeerId>,
    ) -> Result<Option<TransferRequest>> {
        let row = sqlx::query_as::<_, TransferRequest>(
            r#"
            SELECT id, file_name, peer_id, network, bot, pack, created_at
            FROM transfer_requests
            WHERE file_name = ? AND (? IS NULL OR peer_id = ?)
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(file_name)
        .bind(peer_id)
        .bind(peer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            Error::Database(DatabaseError::QueryFailed(format!(
                "Failed to find transfer request: {}",
                e
            )))
        })?;

        Ok(row)
    }
}
