use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::activity;
use crate::authz::{self, Role, ANY_PRINCIPAL, ATTENDANCE_WRITERS, OWNER_ONLY};
use crate::cache::{STATS_TTL, SUMMARY_TTL};
use crate::error::ApiError;
use crate::identity::extractors::AuthPrincipal;
use crate::state::AppState;

use super::dto::{
    BatchResponse, CategoryQuery, DayRange, ExportQuery, RecordAttendanceRequest,
    RecordBatchRequest, StatsQuery, TodayQuery,
};
use super::repo_types::{AggregateSummary, AttendanceRecord};
use super::services;

pub fn read_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance/principal/:id", get(get_principal_attendance))
        .route("/attendance/category/:category", get(get_category_attendance))
        .route("/attendance/today", get(get_todays_records))
        .route("/attendance/stats", get(get_principal_stats))
        .route("/attendance/summary/:category", get(get_category_summary))
        .route("/attendance/export", get(export_attendance))
}

pub fn write_routes() -> Router<AppState> {
    Router::new()
        .route("/attendance", post(record_attendance))
        .route("/attendance/batch", post(record_attendance_batch))
}

/// Whether the upsert inserted or overwrote is visible in the returned
/// timestamps: both default to the same transaction clock on insert, and
/// only `updated_at` moves on the conflict path.
fn write_status(record: &AttendanceRecord) -> StatusCode {
    if record.created_at == record.updated_at {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
    let ua = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    (ip, ua)
}

#[instrument(skip(state, caller, headers, payload))]
pub async fn record_attendance(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    headers: HeaderMap,
    Json(payload): Json<RecordAttendanceRequest>,
) -> Result<(StatusCode, Json<AttendanceRecord>), ApiError> {
    authz::require(caller.role, ATTENDANCE_WRITERS)?;

    // Validation happens before the subject lookup so a bad status never
    // costs a directory round trip, let alone a write.
    let status = services::validate_fields(&payload.status, &payload.category)?;
    let day = payload.day.unwrap_or_else(|| state.config.today());

    let subject = services::resolve_subject(
        &state,
        &caller,
        payload.token.as_deref(),
        payload.principal_id,
    )
    .await?;

    let entry = super::repo_types::UpsertEntry {
        principal_id: subject.id,
        day,
        status,
        note: payload.note.clone(),
        category: payload.category.clone(),
    };
    let record = AttendanceRecord::upsert(&state.db, &entry, caller.id).await?;

    services::invalidate_after_write(&state.cache, &entry.category, subject.id).await;

    let (ip, ua) = client_meta(&headers);
    activity::repo::record(
        &state.db,
        caller.id,
        "ATTENDANCE_RECORDED",
        &format!(
            "recorded {} for {} on {}",
            record.status, subject.external_id, record.day
        ),
        ip.as_deref(),
        ua.as_deref(),
    )
    .await;

    info!(
        subject = %subject.id,
        day = %record.day,
        status = %record.status,
        "attendance recorded"
    );
    Ok((write_status(&record), Json(record)))
}

#[instrument(skip(state, caller, headers, payload))]
pub async fn record_attendance_batch(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    headers: HeaderMap,
    Json(payload): Json<RecordBatchRequest>,
) -> Result<Json<BatchResponse>, ApiError> {
    authz::require(caller.role, ATTENDANCE_WRITERS)?;

    let today = state.config.today();
    let entries = services::validate_batch(payload.records, today)?;

    // Subjects are resolved and permission-checked up front; the batch is
    // rejected whole if any entry fails, before the transaction opens.
    let mut errors = Vec::new();
    for entry in &entries {
        match services::resolve_subject(&state, &caller, None, Some(entry.principal_id)).await {
            Ok(_) => {}
            Err(e) => errors.push(format!("{}: {}", entry.principal_id, e)),
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::PartialFailure(errors));
    }

    let written = AttendanceRecord::upsert_batch(&state.db, &entries, caller.id).await?;

    for entry in &entries {
        services::invalidate_after_write(&state.cache, &entry.category, entry.principal_id).await;
    }

    let (ip, ua) = client_meta(&headers);
    activity::repo::record(
        &state.db,
        caller.id,
        "ATTENDANCE_BATCH_RECORDED",
        &format!("recorded {} attendance entries", written.len()),
        ip.as_deref(),
        ua.as_deref(),
    )
    .await;

    info!(count = written.len(), "attendance batch recorded");
    Ok(Json(BatchResponse {
        written: written.len(),
    }))
}

/// Per-record reads always hit the store directly; only aggregates are
/// served from cache.
#[instrument(skip(state, caller))]
pub async fn get_principal_attendance(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Path(id): Path<Uuid>,
    Query(range): Query<DayRange>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    if caller.id != id {
        authz::require(caller.role, OWNER_ONLY)?;
    }
    let records =
        AttendanceRecord::query_by_principal(&state.db, id, range.start, range.end).await?;
    Ok(Json(records))
}

#[instrument(skip(state, caller))]
pub async fn get_category_attendance(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Path(category): Path<String>,
    Query(q): Query<CategoryQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    authz::require(caller.role, ATTENDANCE_WRITERS)?;
    // Supervisors see only records they personally recorded.
    let recorded_by = if caller.role == Role::Supervisor {
        Some(caller.id)
    } else {
        q.recorded_by
    };
    let records =
        AttendanceRecord::query_by_category(&state.db, &category, recorded_by, q.start, q.end)
            .await?;
    Ok(Json(records))
}

#[instrument(skip(state, caller))]
pub async fn get_todays_records(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Query(q): Query<TodayQuery>,
) -> Result<Json<Vec<AttendanceRecord>>, ApiError> {
    authz::require(caller.role, ANY_PRINCIPAL)?;
    let today = state.config.today();
    let records =
        AttendanceRecord::todays_records(&state.db, caller.id, &q.category, today).await?;
    Ok(Json(records))
}

#[instrument(skip(state, caller))]
pub async fn get_principal_stats(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Query(q): Query<StatsQuery>,
) -> Result<Json<AggregateSummary>, ApiError> {
    authz::require(caller.role, ANY_PRINCIPAL)?;

    let key = services::stats_cache_key(caller.id, q.category.as_deref(), q.start, q.end);
    if let Some(cached) = state.cache.get(&key).await {
        if let Ok(summary) = serde_json::from_value::<AggregateSummary>(cached) {
            return Ok(Json(summary));
        }
    }

    let summary = AttendanceRecord::principal_summary(
        &state.db,
        caller.id,
        q.category.as_deref(),
        q.start,
        q.end,
    )
    .await?;
    if let Ok(value) = serde_json::to_value(&summary) {
        state.cache.set(&key, value, STATS_TTL).await;
    }
    Ok(Json(summary))
}

#[instrument(skip(state, caller))]
pub async fn get_category_summary(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Path(category): Path<String>,
    Query(range): Query<DayRange>,
) -> Result<Json<AggregateSummary>, ApiError> {
    authz::require(caller.role, ATTENDANCE_WRITERS)?;

    let key = services::summary_cache_key(&category, range.start, range.end);
    if let Some(cached) = state.cache.get(&key).await {
        if let Ok(summary) = serde_json::from_value::<AggregateSummary>(cached) {
            return Ok(Json(summary));
        }
    }

    let summary = AttendanceRecord::summary(&state.db, &category, range.start, range.end).await?;
    if let Ok(value) = serde_json::to_value(&summary) {
        state.cache.set(&key, value, SUMMARY_TTL).await;
    }
    Ok(Json(summary))
}

/// Hands plain rows to the export collaborator; the ledger knows nothing
/// about the rendered format.
#[instrument(skip(state, caller))]
pub async fn export_attendance(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Query(q): Query<ExportQuery>,
) -> Result<Response, ApiError> {
    authz::require(caller.role, ATTENDANCE_WRITERS)?;

    let rows = AttendanceRecord::export_rows(&state.db, q.start, q.end).await?;
    let table: Vec<Vec<String>> = rows
        .into_iter()
        .map(|r| {
            vec![
                r.display_name,
                r.external_id,
                r.day.to_string(),
                r.status.to_string(),
                r.note.unwrap_or_default(),
                r.category,
            ]
        })
        .collect();

    let blob = state
        .export
        .render_table(
            &["Name", "External ID", "Day", "Status", "Note", "Category"],
            table,
        )
        .await
        .map_err(ApiError::Internal)?;

    let filename = format!(
        "attendance-{}-to-{}.{}",
        q.start,
        q.end,
        state.export.file_extension()
    );
    Ok((
        [
            (header::CONTENT_TYPE, state.export.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        blob,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::repo_types::AttendanceStatus;
    use time::macros::datetime;

    fn record(
        created: time::OffsetDateTime,
        updated: time::OffsetDateTime,
    ) -> AttendanceRecord {
        AttendanceRecord {
            id: Uuid::new_v4(),
            principal_id: Uuid::new_v4(),
            day: created.date(),
            status: AttendanceStatus::Present,
            note: None,
            recorded_by: Uuid::new_v4(),
            category: "morning".into(),
            created_at: created,
            updated_at: updated,
        }
    }

    #[test]
    fn fresh_upsert_reports_created() {
        let at = datetime!(2024-03-01 08:00 UTC);
        assert_eq!(write_status(&record(at, at)), StatusCode::CREATED);
    }

    #[test]
    fn overwriting_upsert_reports_ok() {
        let created = datetime!(2024-03-01 08:00 UTC);
        let updated = datetime!(2024-03-01 09:30 UTC);
        assert_eq!(write_status(&record(created, updated)), StatusCode::OK);
    }
}
