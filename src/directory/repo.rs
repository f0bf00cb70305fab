use sqlx::PgPool;
use uuid::Uuid;

use crate::authz::Role;
use crate::directory::repo_types::Principal;
use crate::error::ApiError;
use crate::identity::password::verify_secret;
use crate::token;

const PRINCIPAL_COLUMNS: &str = "id, external_id, display_name, email, secret_hash, role, \
     group_id, active, identity_token, created_at, updated_at";

impl Principal {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> Result<Option<Principal>, ApiError> {
        let principal = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(principal)
    }

    /// Lookup by login identifier: email or human-facing external id.
    pub async fn find_by_identifier(
        db: &PgPool,
        identifier: &str,
    ) -> Result<Option<Principal>, ApiError> {
        let principal = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE email = $1 OR external_id = $1"
        ))
        .bind(identifier)
        .fetch_optional(db)
        .await?;
        Ok(principal)
    }

    async fn find_by_identity_token(
        db: &PgPool,
        identity_token: &str,
    ) -> Result<Option<Principal>, ApiError> {
        let principal = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals WHERE identity_token = $1"
        ))
        .bind(identity_token)
        .fetch_optional(db)
        .await?;
        Ok(principal)
    }

    /// Resolve a scanned token to a live principal. A token that fails to
    /// decode, or decodes to an identity with no directory entry, is
    /// `NotFound`; a matching but disabled principal is `Inactive`.
    pub async fn resolve_by_token(db: &PgPool, raw: &str) -> Result<Principal, ApiError> {
        let identity = token::decode(raw)
            .map_err(|_| ApiError::NotFound("no principal matches this token".into()))?;
        let principal = Self::find_by_identity_token(db, &identity.canonical())
            .await?
            .ok_or_else(|| ApiError::NotFound("no principal matches this token".into()))?;
        if !principal.active {
            return Err(ApiError::Inactive);
        }
        Ok(principal)
    }

    /// Resolve a credential pair. The stored hash never leaves this
    /// function; comparison is delegated to the identity service.
    pub async fn resolve_by_credentials(
        db: &PgPool,
        identifier: &str,
        secret: &str,
    ) -> Result<Principal, ApiError> {
        let principal = Self::find_by_identifier(db, identifier)
            .await?
            .ok_or_else(|| ApiError::Unauthorized("invalid credentials".into()))?;
        let ok = verify_secret(secret, &principal.secret_hash)
            .map_err(|_| ApiError::Unauthorized("invalid credentials".into()))?;
        if !ok {
            return Err(ApiError::Unauthorized("invalid credentials".into()));
        }
        if !principal.active {
            return Err(ApiError::Inactive);
        }
        Ok(principal)
    }

    /// Insert a new principal. The identity token is derived here so it can
    /// never drift from the stored identity fields. `secret_hash` must
    /// already be hashed by the identity service.
    #[allow(clippy::too_many_arguments)]
    pub async fn create(
        db: &PgPool,
        external_id: &str,
        display_name: &str,
        email: &str,
        secret_hash: &str,
        role: Role,
        group_id: Option<&str>,
    ) -> Result<Principal, ApiError> {
        let identity_token = token::encode(external_id, display_name, role);
        sqlx::query_as::<_, Principal>(&format!(
            "INSERT INTO principals \
                 (external_id, display_name, email, secret_hash, role, group_id, identity_token) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {PRINCIPAL_COLUMNS}"
        ))
        .bind(external_id)
        .bind(display_name)
        .bind(email)
        .bind(secret_hash)
        .bind(role)
        .bind(group_id)
        .bind(identity_token)
        .fetch_one(db)
        .await
        .map_err(|e| ApiError::from_db_unique(e, "external id or email already registered"))
    }

    /// Delete a principal. Their own attendance rows cascade; rows they
    /// recorded for others keep the foreign key and block the delete, which
    /// surfaces as a conflict rather than a store failure.
    pub async fn delete(db: &PgPool, id: Uuid) -> Result<u64, ApiError> {
        let result = sqlx::query("DELETE FROM principals WHERE id = $1")
            .bind(id)
            .execute(db)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23503") => {
                    ApiError::Conflict(
                        "principal has recorded attendance for others and cannot be deleted".into(),
                    )
                }
                _ => ApiError::Store(e),
            })?;
        Ok(result.rows_affected())
    }

    pub async fn list(
        db: &PgPool,
        role: Option<Role>,
        group_id: Option<&str>,
    ) -> Result<Vec<Principal>, ApiError> {
        let rows = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals \
             WHERE ($1::principal_role IS NULL OR role = $1) \
               AND ($2::varchar IS NULL OR group_id = $2) \
             ORDER BY display_name"
        ))
        .bind(role)
        .bind(group_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }

    /// Active members of one group, the roster a supervisor records a day's
    /// attendance against.
    pub async fn roster(db: &PgPool, group_id: &str) -> Result<Vec<Principal>, ApiError> {
        let rows = sqlx::query_as::<_, Principal>(&format!(
            "SELECT {PRINCIPAL_COLUMNS} FROM principals \
             WHERE role = $1 AND group_id = $2 AND active = TRUE \
             ORDER BY display_name"
        ))
        .bind(Role::Member)
        .bind(group_id)
        .fetch_all(db)
        .await?;
        Ok(rows)
    }
}
