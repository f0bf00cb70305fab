use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::authz::Role;

/// Principal record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Principal {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub secret_hash: String,
    pub role: Role,
    pub group_id: Option<String>,
    pub active: bool,
    pub identity_token: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
