use axum::{
    extract::{FromRef, Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::activity;
use crate::authz::{self, Role, ANY_PRINCIPAL, ATTENDANCE_WRITERS, OWNER_ONLY};
use crate::config::AppConfig;
use crate::error::ApiError;
use crate::identity::{extractors::AuthPrincipal, jwt::JwtKeys, password::hash_secret};
use crate::ledger;
use crate::state::AppState;

use super::dto::{
    BootstrapRequest, CreatePrincipalRequest, LoginRequest, PrincipalFilter, PublicPrincipal,
    ResolveTokenRequest, RosterQuery, SessionResponse,
};
use super::repo_types::Principal;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/bootstrap", post(bootstrap_owner))
        .route("/auth/me", get(get_me))
}

pub fn principal_routes() -> Router<AppState> {
    Router::new()
        .route("/principals", post(create_principal).get(list_principals))
        .route("/principals/roster", get(roster))
        .route("/principals/resolve", post(resolve_token))
        .route("/principals/export", get(export_principals))
        .route("/principals/:id", delete(delete_principal))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn check_bootstrap_token(config: &AppConfig, provided: &str) -> Result<(), ApiError> {
    match config.bootstrap_token.as_deref() {
        Some(expected) if expected == provided => Ok(()),
        _ => Err(ApiError::Forbidden("invalid bootstrap token".into())),
    }
}

fn validate_new_account(
    email: &str,
    secret: &str,
    external_id: &str,
    display_name: &str,
) -> Result<(), ApiError> {
    if !is_valid_email(email) {
        warn!(email = %email, "invalid email");
        return Err(ApiError::Validation("invalid email".into()));
    }
    if secret.len() < 8 {
        return Err(ApiError::Validation("secret too short".into()));
    }
    if external_id.is_empty() || display_name.trim().is_empty() {
        return Err(ApiError::Validation(
            "external_id and display_name are required".into(),
        ));
    }
    Ok(())
}

fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
    let ua = headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());
    (ip, ua)
}

#[instrument(skip(state, headers, payload))]
pub async fn login(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    // External ids are case-sensitive; only emails are normalized.
    payload.identifier = payload.identifier.trim().to_string();
    if payload.identifier.contains('@') {
        payload.identifier = payload.identifier.to_lowercase();
    }

    let principal =
        Principal::resolve_by_credentials(&state.db, &payload.identifier, &payload.secret).await?;

    let keys = JwtKeys::from_ref(&state);
    let session_token = keys
        .issue_session(principal.id, principal.role)
        .map_err(ApiError::Internal)?;

    let (ip, ua) = client_meta(&headers);
    activity::repo::record(
        &state.db,
        principal.id,
        "LOGIN",
        "logged in",
        ip.as_deref(),
        ua.as_deref(),
    )
    .await;

    info!(principal_id = %principal.id, role = %principal.role, "principal logged in");
    Ok(Json(SessionResponse {
        session_token,
        principal: principal.into(),
    }))
}

#[instrument(skip(caller))]
pub async fn get_me(AuthPrincipal(caller): AuthPrincipal) -> Json<PublicPrincipal> {
    Json(caller.into())
}

/// Creates an Owner gated by the `BOOTSTRAP_TOKEN` secret instead of a
/// session, so a fresh deployment with an empty directory can mint its
/// first account.
#[instrument(skip(state, headers, payload))]
pub async fn bootstrap_owner(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut payload): Json<BootstrapRequest>,
) -> Result<(StatusCode, Json<PublicPrincipal>), ApiError> {
    check_bootstrap_token(&state.config, &payload.token)?;

    payload.email = payload.email.trim().to_lowercase();
    payload.external_id = payload.external_id.trim().to_string();
    validate_new_account(
        &payload.email,
        &payload.secret,
        &payload.external_id,
        &payload.display_name,
    )?;

    let hash = hash_secret(&payload.secret).map_err(ApiError::Internal)?;
    let principal = Principal::create(
        &state.db,
        &payload.external_id,
        &payload.display_name,
        &payload.email,
        &hash,
        Role::Owner,
        payload.group_id.as_deref(),
    )
    .await?;

    let (ip, ua) = client_meta(&headers);
    activity::repo::record(
        &state.db,
        principal.id,
        "OWNER_BOOTSTRAPPED",
        "bootstrapped initial owner",
        ip.as_deref(),
        ua.as_deref(),
    )
    .await;

    info!(principal_id = %principal.id, external_id = %principal.external_id, "owner bootstrapped");
    Ok((StatusCode::CREATED, Json(principal.into())))
}

#[instrument(skip(state, caller, headers, payload))]
pub async fn create_principal(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    headers: HeaderMap,
    Json(mut payload): Json<CreatePrincipalRequest>,
) -> Result<Json<PublicPrincipal>, ApiError> {
    authz::require(caller.role, OWNER_ONLY)?;

    payload.email = payload.email.trim().to_lowercase();
    payload.external_id = payload.external_id.trim().to_string();
    validate_new_account(
        &payload.email,
        &payload.secret,
        &payload.external_id,
        &payload.display_name,
    )?;

    let hash = hash_secret(&payload.secret).map_err(ApiError::Internal)?;
    let principal = Principal::create(
        &state.db,
        &payload.external_id,
        &payload.display_name,
        &payload.email,
        &hash,
        payload.role,
        payload.group_id.as_deref(),
    )
    .await?;

    let (ip, ua) = client_meta(&headers);
    activity::repo::record(
        &state.db,
        caller.id,
        "PRINCIPAL_CREATED",
        &format!("created principal {}", principal.external_id),
        ip.as_deref(),
        ua.as_deref(),
    )
    .await;

    info!(principal_id = %principal.id, external_id = %principal.external_id, "principal created");
    Ok(Json(principal.into()))
}

#[instrument(skip(state, caller))]
pub async fn list_principals(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Query(filter): Query<PrincipalFilter>,
) -> Result<Json<Vec<PublicPrincipal>>, ApiError> {
    authz::require(caller.role, OWNER_ONLY)?;
    let principals = Principal::list(&state.db, filter.role, filter.group_id.as_deref()).await?;
    Ok(Json(principals.into_iter().map(Into::into).collect()))
}

/// Active members of one group. A group-scoped supervisor may only fetch
/// their own group's roster.
#[instrument(skip(state, caller))]
pub async fn roster(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Query(q): Query<RosterQuery>,
) -> Result<Json<Vec<PublicPrincipal>>, ApiError> {
    authz::require(caller.role, ATTENDANCE_WRITERS)?;
    if caller.role == Role::Supervisor {
        if let Some(ref own) = caller.group_id {
            if *own != q.group_id {
                return Err(ApiError::Forbidden(
                    "roster is outside the supervisor's group".into(),
                ));
            }
        }
    }
    let members = Principal::roster(&state.db, &q.group_id).await?;
    Ok(Json(members.into_iter().map(Into::into).collect()))
}

fn principal_export_row(p: &Principal) -> Vec<String> {
    vec![
        p.external_id.clone(),
        p.display_name.clone(),
        p.email.clone(),
        p.role.to_string(),
        p.group_id.clone().unwrap_or_default(),
        if p.active { "yes" } else { "no" }.to_string(),
    ]
}

/// The whole directory rendered through the export collaborator,
/// owner-only. Secret hashes never reach the table.
#[instrument(skip(state, caller))]
pub async fn export_principals(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
) -> Result<Response, ApiError> {
    authz::require(caller.role, OWNER_ONLY)?;

    let principals = Principal::list(&state.db, None, None).await?;
    let table: Vec<Vec<String>> = principals.iter().map(principal_export_row).collect();

    let blob = state
        .export
        .render_table(
            &["External ID", "Name", "Email", "Role", "Group", "Active"],
            table,
        )
        .await
        .map_err(ApiError::Internal)?;

    let filename = format!(
        "principals-{}.{}",
        state.config.today(),
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

#[instrument(skip(state, caller, payload))]
pub async fn resolve_token(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    Json(payload): Json<ResolveTokenRequest>,
) -> Result<Json<PublicPrincipal>, ApiError> {
    authz::require(caller.role, ANY_PRINCIPAL)?;
    let principal = Principal::resolve_by_token(&state.db, &payload.token).await?;
    Ok(Json(principal.into()))
}

#[instrument(skip(state, caller, headers))]
pub async fn delete_principal(
    State(state): State<AppState>,
    AuthPrincipal(caller): AuthPrincipal,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    authz::require(caller.role, OWNER_ONLY)?;

    // Lockout guard: an owner may never delete itself.
    if id == caller.id {
        return Err(ApiError::Forbidden("cannot delete your own account".into()));
    }

    let target = Principal::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("principal not found".into()))?;

    Principal::delete(&state.db, id).await?;

    // The cascade just removed their attendance and activity rows; drop
    // every aggregate that could still be counting them.
    ledger::services::invalidate_after_delete(&state.cache, id).await;

    let (ip, ua) = client_meta(&headers);
    activity::repo::record(
        &state.db,
        caller.id,
        "PRINCIPAL_DELETED",
        &format!("deleted principal {}", target.external_id),
        ip.as_deref(),
        ua.as_deref(),
    )
    .await;

    info!(principal_id = %id, "principal deleted");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[tokio::test]
    async fn bootstrap_gate_accepts_matching_token() {
        let state = AppState::fake();
        assert!(check_bootstrap_token(&state.config, "test-bootstrap").is_ok());
    }

    #[tokio::test]
    async fn bootstrap_gate_rejects_wrong_token() {
        let state = AppState::fake();
        let err = check_bootstrap_token(&state.config, "guessed").unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[tokio::test]
    async fn bootstrap_gate_is_closed_when_unconfigured() {
        let state = AppState::fake();
        let mut config = (*state.config).clone();
        config.bootstrap_token = None;
        let err = check_bootstrap_token(&config, "test-bootstrap").unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn new_account_validation_rejects_bad_fields() {
        assert!(validate_new_account("ada@example.com", "longenough", "U001", "Ada").is_ok());
        assert!(validate_new_account("not-an-email", "longenough", "U001", "Ada").is_err());
        assert!(validate_new_account("ada@example.com", "short", "U001", "Ada").is_err());
        assert!(validate_new_account("ada@example.com", "longenough", "", "Ada").is_err());
        assert!(validate_new_account("ada@example.com", "longenough", "U001", "  ").is_err());
    }

    #[test]
    fn export_row_carries_identity_but_never_the_hash() {
        let principal = Principal {
            id: Uuid::new_v4(),
            external_id: "U001".into(),
            display_name: "Ada".into(),
            email: "ada@example.com".into(),
            secret_hash: "argon2-hash".into(),
            role: Role::Supervisor,
            group_id: None,
            active: false,
            identity_token: "{}".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let row = principal_export_row(&principal);
        assert_eq!(row, vec!["U001", "Ada", "ada@example.com", "SUPERVISOR", "", "no"]);
        assert!(!row.iter().any(|f| f.contains("argon2-hash")));
    }
}
