use recall_core::model::{AnalysisResult, SessionId};
use sqlx::Row;

use super::SqliteRepository;
use super::mapping::{conn, from_json, index_from_i64, index_to_i64, ser, to_json, u32_from_i64};
use crate::repository::{StorageError, UnitResultRecord, UnitResultRepository};

fn map_unit_result_row(
    session_id: &SessionId,
    row: &sqlx::sqlite::SqliteRow,
) -> Result<UnitResultRecord, StorageError> {
    let unit_index = index_from_i64("unit_index", row.try_get("unit_index").map_err(ser)?)?;
    let attempt = u32_from_i64("attempt", row.try_get("attempt").map_err(ser)?)?;
    let responses_raw: String = row.try_get("responses").map_err(ser)?;
    let analysis_raw: Option<String> = row.try_get("analysis").map_err(ser)?;

    Ok(UnitResultRecord {
        session_id: session_id.clone(),
        unit_index,
        attempt,
        responses: from_json("responses", &responses_raw)?,
        analysis: analysis_raw
            .map(|raw| from_json::<AnalysisResult>("analysis", &raw))
            .transpose()?,
        recorded_at: row.try_get("recorded_at").map_err(ser)?,
    })
}

#[async_trait::async_trait]
impl UnitResultRepository for SqliteRepository {
    async fn upsert_unit_result(&self, record: &UnitResultRecord) -> Result<(), StorageError> {
        let responses = to_json(&record.responses)?;
        let analysis = record.analysis.as_ref().map(to_json).transpose()?;
        let score = record.analysis.as_ref().map(|a| i64::from(a.score));

        sqlx::query(
            r"
                INSERT INTO unit_results (
                    session_id, unit_index, attempt, responses, analysis, score, recorded_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(session_id, unit_index) DO UPDATE SET
                    attempt = excluded.attempt,
                    responses = excluded.responses,
                    analysis = excluded.analysis,
                    score = excluded.score,
                    recorded_at = excluded.recorded_at
            ",
        )
        .bind(record.session_id.as_str())
        .bind(index_to_i64("unit_index", record.unit_index)?)
        .bind(i64::from(record.attempt))
        .bind(responses)
        .bind(analysis)
        .bind(score)
        .bind(record.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(conn)?;

        Ok(())
    }

    async fn list_unit_results(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<UnitResultRecord>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT unit_index, attempt, responses, analysis, recorded_at
                FROM unit_results
                WHERE session_id = ?1
                ORDER BY unit_index ASC
            ",
        )
        .bind(session_id.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(conn)?;

        rows.iter()
            .map(|row| map_unit_result_row(session_id, row))
            .collect()
    }
}
