use sqlx::PgPool;
use time::Date;
use uuid::Uuid;

use crate::error::ApiError;

use super::repo_types::{
    AggregateSummary, AttendanceRecord, ExportRow, StatusCounts, UpsertEntry,
};

const RECORD_COLUMNS: &str =
    "id, principal_id, day, status, note, recorded_by, category, created_at, updated_at";

/// Insert-or-update in a single round trip. The `(principal_id, day)`
/// uniqueness constraint plus `ON CONFLICT` guarantees at most one row per
/// cell even under concurrent writers; `created_at` survives the update,
/// `updated_at` always reflects the later write.
const UPSERT_SQL: &str = "INSERT INTO attendance \
         (principal_id, day, status, note, recorded_by, category) \
     VALUES ($1, $2, $3, $4, $5, $6) \
     ON CONFLICT (principal_id, day) DO UPDATE SET \
         status = EXCLUDED.status, \
         note = EXCLUDED.note, \
         recorded_by = EXCLUDED.recorded_by, \
         category = EXCLUDED.category, \
         updated_at = now() \
     RETURNING id, principal_id, day, status, note, recorded_by, category, created_at, updated_at";

impl AttendanceRecord {
    pub async fn upsert(
        db: &PgPool,
        entry: &UpsertEntry,
        recorded_by: Uuid,
    ) -> Result<AttendanceRecord, ApiError> {
        let record = sqlx::query_as::<_, AttendanceRecord>(UPSERT_SQL)
            .bind(entry.principal_id)
            .bind(entry.day)
            .bind(entry.status)
            .bind(entry.note.as_deref())
            .bind(recorded_by)
            .bind(entry.category.as_str())
            .fetch_one(db)
            .await?;
        Ok(record)
    }

    /// Apply a day's roster as a unit. All entries land in one transaction;
    /// a failure on any row rolls back every other row.
    pub async fn upsert_batch(
        db: &PgPool,
        entries: &[UpsertEntry],
        recorded_by: Uuid,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let mut tx = db.begin().await?;
        let mut written = Vec::with_capacity(entries.len());
        for entry in entries {
            let record = sqlx::query_as::<_, AttendanceRecord>(UPSERT_SQL)
                .bind(entry.principal_id)
                .bind(entry.day)
                .bind(entry.status)
                .bind(entry.note.as_deref())
                .bind(recorded_by)
                .bind(entry.category.as_str())
                .fetch_one(&mut *tx)
                .await?;
            written.push(record);
        }
        tx.commit().await?;
        Ok(written)
    }

    /// A principal's records, newest day first. No range returns everything.
    pub async fn query_by_principal(
        db: &PgPool,
        principal_id: Uuid,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance \
             WHERE principal_id = $1 \
               AND ($2::date IS NULL OR day >= $2) \
               AND ($3::date IS NULL OR day <= $3) \
             ORDER BY day DESC"
        ))
        .bind(principal_id)
        .bind(start)
        .bind(end)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn query_by_category(
        db: &PgPool,
        category: &str,
        recorded_by: Option<Uuid>,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance \
             WHERE category = $1 \
               AND ($2::uuid IS NULL OR recorded_by = $2) \
               AND ($3::date IS NULL OR day >= $3) \
               AND ($4::date IS NULL OR day <= $4) \
             ORDER BY day DESC"
        ))
        .bind(category)
        .bind(recorded_by)
        .bind(start)
        .bind(end)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    pub async fn todays_records(
        db: &PgPool,
        principal_id: Uuid,
        category: &str,
        today: Date,
    ) -> Result<Vec<AttendanceRecord>, ApiError> {
        let rows = sqlx::query_as::<_, AttendanceRecord>(&format!(
            "SELECT {RECORD_COLUMNS} FROM attendance \
             WHERE principal_id = $1 AND category = $2 AND day = $3"
        ))
        .bind(principal_id)
        .bind(category)
        .bind(today)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Category-wide counts in one statement.
    pub async fn summary(
        db: &PgPool,
        category: &str,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<AggregateSummary, ApiError> {
        let counts = sqlx::query_as::<_, StatusCounts>(
            "SELECT count(*) AS total, \
                    count(*) FILTER (WHERE status = 'PRESENT') AS present, \
                    count(*) FILTER (WHERE status = 'ABSENT') AS absent, \
                    count(*) FILTER (WHERE status = 'LATE') AS late \
             FROM attendance \
             WHERE category = $1 \
               AND ($2::date IS NULL OR day >= $2) \
               AND ($3::date IS NULL OR day <= $3)",
        )
        .bind(category)
        .bind(start)
        .bind(end)
        .fetch_one(db)
        .await?;
        Ok(counts.into())
    }

    /// Per-principal counts, optionally narrowed to one category.
    pub async fn principal_summary(
        db: &PgPool,
        principal_id: Uuid,
        category: Option<&str>,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<AggregateSummary, ApiError> {
        let counts = sqlx::query_as::<_, StatusCounts>(
            "SELECT count(*) AS total, \
                    count(*) FILTER (WHERE status = 'PRESENT') AS present, \
                    count(*) FILTER (WHERE status = 'ABSENT') AS absent, \
                    count(*) FILTER (WHERE status = 'LATE') AS late \
             FROM attendance \
             WHERE principal_id = $1 \
               AND ($2::varchar IS NULL OR category = $2) \
               AND ($3::date IS NULL OR day >= $3) \
               AND ($4::date IS NULL OR day <= $4)",
        )
        .bind(principal_id)
        .bind(category)
        .bind(start)
        .bind(end)
        .fetch_one(db)
        .await?;
        Ok(counts.into())
    }

    /// Records joined with principal identity for the export service.
    pub async fn export_rows(
        db: &PgPool,
        start: Date,
        end: Date,
    ) -> Result<Vec<ExportRow>, ApiError> {
        let rows = sqlx::query_as::<_, ExportRow>(
            "SELECT p.display_name, p.external_id, a.day, a.status, a.note, a.category \
             FROM attendance a \
             JOIN principals p ON p.id = a.principal_id \
             WHERE a.day >= $1 AND a.day <= $2 \
             ORDER BY a.day DESC, p.display_name",
        )
        .bind(start)
        .bind(end)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
