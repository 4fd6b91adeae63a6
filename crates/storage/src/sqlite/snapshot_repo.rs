use chrono::Utc;
use recall_core::model::{SessionId, SessionSnapshot};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, from_json, ser, to_json};
use crate::repository::{SessionStore, StorageError};

#[async_trait::async_trait]
impl SessionStore for SqliteRepository {
    async fn get_snapshot(&self, id: &SessionId) -> Result<Option<SessionSnapshot>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT payload
                FROM session_snapshots
                WHERE session_id = ?1
            ",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.map(|row| {
            let payload: String = row.try_get("payload").map_err(ser)?;
            from_json("snapshot payload", &payload)
        })
        .transpose()
    }

    async fn put_snapshot(
        &self,
        id: &SessionId,
        snapshot: &SessionSnapshot,
    ) -> Result<(), StorageError> {
        let payload = to_json(snapshot)?;

        sqlx::query(
            r"
                INSERT INTO session_snapshots (session_id, flow, status, payload, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(session_id) DO UPDATE SET
                    flow = excluded.flow,
                    status = excluded.status,
                    payload = excluded.payload,
                    updated_at = excluded.updated_at
            ",
        )
        .bind(id.as_str())
        .bind(snapshot.flow.as_str())
        .bind(snapshot.status.as_str())
        .bind(payload)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        tracing::debug!(session = %id, unit = snapshot.active_unit_index, "snapshot written");
        Ok(())
    }
}
