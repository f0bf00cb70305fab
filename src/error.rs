use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error taxonomy shared by every handler. Each variant carries enough
/// structure for a caller to tell a permanent failure from a transient one
/// without parsing the message.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    NotFound(String),

    #[error("account is deactivated")]
    Inactive,

    #[error("{0}")]
    Conflict(String),

    #[error("invalid attendance status: {0}")]
    InvalidStatus(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("malformed identity token: {0}")]
    Parse(String),

    #[error("batch rejected: {} invalid entries", .0.len())]
    PartialFailure(Vec<String>),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Validation(String),

    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "not_found",
            ApiError::Inactive => "inactive",
            ApiError::Conflict(_) => "conflict",
            ApiError::InvalidStatus(_) => "invalid_status",
            ApiError::Forbidden(_) => "forbidden",
            ApiError::Parse(_) => "parse_error",
            ApiError::PartialFailure(_) => "partial_failure",
            ApiError::Unauthorized(_) => "unauthorized",
            ApiError::Validation(_) => "validation",
            ApiError::Store(_) => "store_error",
            ApiError::Internal(_) => "internal",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Inactive | ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::InvalidStatus(_)
            | ApiError::Parse(_)
            | ApiError::PartialFailure(_)
            | ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only store-level failures are worth retrying; everything else is a
    /// deterministic rejection of the request as given.
    pub fn retryable(&self) -> bool {
        matches!(self, ApiError::Store(_) | ApiError::Internal(_))
    }

    /// Translate a unique-constraint violation into `Conflict`; every other
    /// database failure stays a `Store` error.
    pub fn from_db_unique(err: sqlx::Error, conflict_msg: &str) -> Self {
        if let sqlx::Error::Database(ref db) = err {
            if db.code().as_deref() == Some("23505") {
                return ApiError::Conflict(conflict_msg.to_string());
            }
        }
        ApiError::Store(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, kind = self.kind(), "request rejected");
        }
        let mut body = json!({
            "error": self.kind(),
            "message": self.to_string(),
            "retryable": self.retryable(),
        });
        if let ApiError::PartialFailure(ref errors) = self {
            body["details"] = json!(errors);
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_are_not_retryable() {
        assert!(!ApiError::InvalidStatus("SLEEPING".into()).retryable());
        assert!(!ApiError::Forbidden("no".into()).retryable());
        assert!(!ApiError::Parse("bad json".into()).retryable());
    }

    #[test]
    fn store_errors_are_retryable() {
        assert!(ApiError::Store(sqlx::Error::PoolTimedOut).retryable());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ApiError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ApiError::Inactive.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::PartialFailure(vec!["e".into()]).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
