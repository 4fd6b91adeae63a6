use recall_core::model::{SessionId, SessionSummary, UnitScore};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, from_json, index_to_i64, ser, to_json};
use crate::repository::{SessionSummaryRepository, SessionSummaryRow, StorageError};

fn map_summary_row(row: &sqlx::sqlite::SqliteRow) -> Result<SessionSummary, StorageError> {
    let session_id: String = row.try_get("session_id").map_err(ser)?;
    let session_id = session_id.parse::<SessionId>().map_err(ser)?;
    let started_at = row.try_get("started_at").map_err(ser)?;
    let completed_at = row.try_get("completed_at").map_err(ser)?;
    let scores_raw: String = row.try_get("unit_scores").map_err(ser)?;
    let unit_scores: Vec<UnitScore> = from_json("unit_scores", &scores_raw)?;

    SessionSummary::from_persisted(session_id, started_at, completed_at, unit_scores).map_err(ser)
}

fn map_summary_row_with_id(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<SessionSummaryRow, StorageError> {
    let id: i64 = row.try_get("id").map_err(ser)?;
    let summary = map_summary_row(row)?;
    Ok(SessionSummaryRow::new(id, summary))
}

#[async_trait::async_trait]
impl SessionSummaryRepository for SqliteRepository {
    async fn save_summary(&self, summary: &SessionSummary) -> Result<i64, StorageError> {
        let unit_scores = to_json(&summary.unit_scores())?;

        sqlx::query(
            r"
                INSERT INTO session_summaries (
                    session_id, started_at, completed_at, unit_count, average_score, unit_scores
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(session_id) DO NOTHING
            ",
        )
        .bind(summary.session_id().as_str())
        .bind(summary.started_at())
        .bind(summary.completed_at())
        .bind(index_to_i64("unit_count", summary.unit_count())?)
        .bind(i64::from(summary.average_score()))
        .bind(unit_scores)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        let row = sqlx::query("SELECT id FROM session_summaries WHERE session_id = ?1")
            .bind(summary.session_id().as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(conn)?;
        row.try_get("id").map_err(ser)
    }

    async fn get_summary(&self, id: i64) -> Result<SessionSummary, StorageError> {
        let row = sqlx::query(
            r"
                SELECT session_id, started_at, completed_at, unit_scores
                FROM session_summaries
                WHERE id = ?1
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?
        .ok_or(StorageError::NotFound)?;

        map_summary_row(&row)
    }

    async fn summary_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Option<SessionSummaryRow>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, session_id, started_at, completed_at, unit_scores
                FROM session_summaries
                WHERE session_id = ?1
            ",
        )
        .bind(session_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(conn)?;

        row.as_ref().map(map_summary_row_with_id).transpose()
    }
}
