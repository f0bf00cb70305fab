use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ActivityLog {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub action: String,
    pub description: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub recorded_at: OffsetDateTime,
}

/// Append an activity entry. Best effort: a failed insert is logged and
/// never fails the operation being recorded.
pub async fn record(
    db: &PgPool,
    principal_id: Uuid,
    action: &str,
    description: &str,
    ip_address: Option<&str>,
    user_agent: Option<&str>,
) {
    let result = sqlx::query(
        r#"
        INSERT INTO activity_logs (principal_id, action, description, ip_address, user_agent)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(principal_id)
    .bind(action)
    .bind(description)
    .bind(ip_address)
    .bind(user_agent)
    .execute(db)
    .await;
    if let Err(e) = result {
        warn!(error = %e, action, "activity log insert failed");
    }
}

/// Activity entries, newest first. `principal_id = None` is the
/// directory-wide feed.
pub async fn list(
    db: &PgPool,
    principal_id: Option<Uuid>,
    start: Option<Date>,
    end: Option<Date>,
    limit: i64,
    offset: i64,
) -> Result<Vec<ActivityLog>, ApiError> {
    let rows = sqlx::query_as::<_, ActivityLog>(
        r#"
        SELECT id, principal_id, action, description, ip_address, user_agent, recorded_at
        FROM activity_logs
        WHERE ($1::uuid IS NULL OR principal_id = $1)
          AND ($2::date IS NULL OR recorded_at >= $2::date)
          AND ($3::date IS NULL OR recorded_at < $3::date + INTERVAL '1 day')
        ORDER BY recorded_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(principal_id)
    .bind(start)
    .bind(end)
    .bind(limit)
    .bind(offset)
    .fetch_all(db)
    .await?;
    Ok(rows)
}
