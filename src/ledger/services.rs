use std::str::FromStr;

use time::Date;
use uuid::Uuid;

use crate::authz;
use crate::cache::AggregateCache;
use crate::directory::repo_types::Principal;
use crate::error::ApiError;
use crate::ledger::dto::BatchEntry;
use crate::ledger::repo_types::{AttendanceStatus, UpsertEntry};
use crate::state::AppState;

/// Resolve the subject of a check-in from either a scanned token or an
/// explicit id, then run the content-level check: does this writer get to
/// record this subject at all.
pub async fn resolve_subject(
    state: &AppState,
    writer: &Principal,
    token: Option<&str>,
    principal_id: Option<Uuid>,
) -> Result<Principal, ApiError> {
    let subject = match (token, principal_id) {
        (Some(raw), _) => Principal::resolve_by_token(&state.db, raw).await?,
        (None, Some(id)) => {
            let principal = Principal::find_by_id(&state.db, id)
                .await?
                .ok_or_else(|| ApiError::NotFound("principal not found".into()))?;
            if !principal.active {
                return Err(ApiError::Inactive);
            }
            principal
        }
        (None, None) => {
            return Err(ApiError::Validation(
                "either token or principal_id is required".into(),
            ))
        }
    };

    authz::may_record_subject(
        writer.role,
        writer.group_id.as_deref(),
        subject.role,
        subject.group_id.as_deref(),
    )?;
    Ok(subject)
}

/// Boundary validation of the writable fields. Nothing reaches the store
/// until this has passed.
pub fn validate_fields(raw_status: &str, category: &str) -> Result<AttendanceStatus, ApiError> {
    let status = AttendanceStatus::from_str(raw_status)?;
    if category.trim().is_empty() {
        return Err(ApiError::Validation("category is required".into()));
    }
    Ok(status)
}

pub fn validate_entry(
    principal_id: Uuid,
    raw_status: &str,
    category: &str,
    note: Option<String>,
    day: Date,
) -> Result<UpsertEntry, ApiError> {
    let status = validate_fields(raw_status, category)?;
    Ok(UpsertEntry {
        principal_id,
        day,
        status,
        note,
        category: category.to_string(),
    })
}

/// All-or-nothing batch validation: any bad entry rejects the whole batch
/// with the per-entry failures listed, and no entry is written.
pub fn validate_batch(
    entries: Vec<BatchEntry>,
    default_day: Date,
) -> Result<Vec<UpsertEntry>, ApiError> {
    if entries.is_empty() {
        return Err(ApiError::Validation("records must be non-empty".into()));
    }
    let mut validated = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for entry in entries {
        match validate_entry(
            entry.principal_id,
            &entry.status,
            &entry.category,
            entry.note,
            entry.day.unwrap_or(default_day),
        ) {
            Ok(v) => validated.push(v),
            Err(e) => errors.push(format!("{}: {}", entry.principal_id, e)),
        }
    }
    if !errors.is_empty() {
        return Err(ApiError::PartialFailure(errors));
    }
    Ok(validated)
}

pub fn summary_cache_key(category: &str, start: Option<Date>, end: Option<Date>) -> String {
    format!("summary:{}:{:?}:{:?}", category, start, end)
}

pub fn stats_cache_key(
    principal_id: Uuid,
    category: Option<&str>,
    start: Option<Date>,
    end: Option<Date>,
) -> String {
    format!(
        "stats:{}:{}:{:?}:{:?}",
        principal_id,
        category.unwrap_or("*"),
        start,
        end
    )
}

/// Drop every aggregate a write could have gone stale: the written
/// category's summaries and the subject's per-principal stats.
pub async fn invalidate_after_write(cache: &AggregateCache, category: &str, principal_id: Uuid) {
    cache.invalidate_prefix(&format!("summary:{}:", category)).await;
    cache.invalidate_prefix(&format!("stats:{}:", principal_id)).await;
}

/// Deleting a principal cascades their attendance and activity rows away,
/// and their records may sit in any category, so every summary and feed
/// goes along with their own stats.
pub async fn invalidate_after_delete(cache: &AggregateCache, principal_id: Uuid) {
    cache.invalidate_prefix("summary:").await;
    cache.invalidate_prefix(&format!("stats:{}:", principal_id)).await;
    cache.invalidate_prefix("activity:").await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    fn entry(principal: Uuid, status: &str) -> BatchEntry {
        BatchEntry {
            principal_id: principal,
            status: status.into(),
            category: "morning".into(),
            note: None,
            day: None,
        }
    }

    #[test]
    fn validate_entry_rejects_unknown_status() {
        let err = validate_entry(
            Uuid::new_v4(),
            "SLEEPING",
            "morning",
            None,
            date!(2024 - 03 - 01),
        )
        .unwrap_err();
        assert_eq!(err.kind(), "invalid_status");
    }

    #[test]
    fn validate_entry_rejects_blank_category() {
        let err =
            validate_entry(Uuid::new_v4(), "PRESENT", "  ", None, date!(2024 - 03 - 01))
                .unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[test]
    fn batch_with_one_bad_entry_rejects_all() {
        let entries = vec![
            entry(Uuid::new_v4(), "PRESENT"),
            entry(Uuid::new_v4(), "LATE"),
            entry(Uuid::new_v4(), "SLEEPING"),
            entry(Uuid::new_v4(), "ABSENT"),
            entry(Uuid::new_v4(), "PRESENT"),
        ];
        let err = validate_batch(entries, date!(2024 - 03 - 01)).unwrap_err();
        assert_eq!(err.kind(), "partial_failure");
        match err {
            ApiError::PartialFailure(details) => assert_eq!(details.len(), 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn batch_defaults_missing_day() {
        let today = date!(2024 - 03 - 01);
        let validated = validate_batch(vec![entry(Uuid::new_v4(), "PRESENT")], today).unwrap();
        assert_eq!(validated[0].day, today);
    }

    #[test]
    fn empty_batch_is_a_validation_error() {
        let err = validate_batch(vec![], date!(2024 - 03 - 01)).unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn delete_invalidation_drops_summaries_and_own_stats() {
        use std::time::Duration;
        let cache = AggregateCache::new();
        let gone = Uuid::new_v4();
        let kept = Uuid::new_v4();
        let ttl = Duration::from_secs(60);
        cache
            .set(&summary_cache_key("morning", None, None), serde_json::json!(1), ttl)
            .await;
        cache
            .set(&stats_cache_key(gone, None, None, None), serde_json::json!(2), ttl)
            .await;
        cache
            .set(&stats_cache_key(kept, None, None, None), serde_json::json!(3), ttl)
            .await;

        invalidate_after_delete(&cache, gone).await;

        assert_eq!(cache.get(&summary_cache_key("morning", None, None)).await, None);
        assert_eq!(cache.get(&stats_cache_key(gone, None, None, None)).await, None);
        assert!(cache.get(&stats_cache_key(kept, None, None, None)).await.is_some());
    }

    #[test]
    fn cache_keys_incorporate_every_parameter() {
        let id = Uuid::new_v4();
        let a = stats_cache_key(id, Some("morning"), None, None);
        let b = stats_cache_key(id, Some("evening"), None, None);
        assert_ne!(a, b);
        let c = summary_cache_key("morning", Some(date!(2024 - 03 - 01)), None);
        let d = summary_cache_key("morning", None, None);
        assert_ne!(c, d);
    }
}
