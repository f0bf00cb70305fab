use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use time::Date;
use tracing::instrument;
use uuid::Uuid;

use crate::authz::Role;
use crate::cache::ACTIVITY_TTL;
use crate::error::ApiError;
use crate::identity::extractors::AuthPrincipal;
use crate::state::AppState;

use super::repo;

pub fn activity_routes() -> Router<AppState> {
    Router::new().route("/activity", get(list_activity))
}

#[derive(Debug, Deserialize)]
pub struct ActivityQuery {
    pub principal_id: Option<Uuid>,
    pub start: Option<Date>,
    pub end: Option<Date>,
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    50
}

/// Owners may read any principal's feed, or all feeds by omitting
/// `principal_id`; everyone else reads their own.
#[instrument(skip(state, caller))]
async fn list_activity(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Query(q): Query<ActivityQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let scope = if caller.role == Role::Owner {
        q.principal_id
    } else {
        if q.principal_id.is_some() && q.principal_id != Some(caller.id) {
            return Err(ApiError::Forbidden(
                "only owners may read other principals' activity".into(),
            ));
        }
        Some(caller.id)
    };

    let scope_key = scope.map(|id| id.to_string()).unwrap_or_else(|| "all".into());
    let cache_key = format!(
        "activity:{}:{:?}:{:?}:{}:{}",
        scope_key, q.start, q.end, q.limit, q.offset
    );
    if let Some(cached) = state.cache.get(&cache_key).await {
        return Ok(Json(cached));
    }

    let logs = repo::list(&state.db, scope, q.start, q.end, q.limit, q.offset).await?;
    let body = json!({
        "logs": logs,
        "pagination": { "limit": q.limit, "offset": q.offset },
    });
    state.cache.set(&cache_key, body.clone(), ACTIVITY_TTL).await;
    Ok(Json(body))
}
