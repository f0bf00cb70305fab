use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::authz::Role;
use crate::directory::repo_types::Principal;

/// Request body for login. `identifier` is an email or an external id.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub secret: String,
}

/// Request body for principal creation.
#[derive(Debug, Deserialize)]
pub struct CreatePrincipalRequest {
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub secret: String,
    pub role: Role,
    pub group_id: Option<String>,
}

/// Request body for the first-owner bootstrap. `token` must match the
/// `BOOTSTRAP_TOKEN` secret; no session is involved, so a fresh deployment
/// can mint its initial account.
#[derive(Debug, Deserialize)]
pub struct BootstrapRequest {
    pub token: String,
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub secret: String,
    pub group_id: Option<String>,
}

/// Request body for resolving a scanned identity token.
#[derive(Debug, Deserialize)]
pub struct ResolveTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct PrincipalFilter {
    pub role: Option<Role>,
    pub group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RosterQuery {
    pub group_id: String,
}

/// Public part of a principal returned to clients; never carries the
/// secret hash.
#[derive(Debug, Serialize)]
pub struct PublicPrincipal {
    pub id: Uuid,
    pub external_id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
    pub group_id: Option<String>,
    pub active: bool,
    pub identity_token: String,
}

impl From<Principal> for PublicPrincipal {
    fn from(p: Principal) -> Self {
        Self {
            id: p.id,
            external_id: p.external_id,
            display_name: p.display_name,
            email: p.email,
            role: p.role,
            group_id: p.group_id,
            active: p.active,
            identity_token: p.identity_token,
        }
    }
}

/// Response returned after login.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub session_token: String,
    pub principal: PublicPrincipal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::OffsetDateTime;

    #[test]
    fn public_principal_omits_secret_hash() {
        let principal = Principal {
            id: Uuid::new_v4(),
            external_id: "U001".into(),
            display_name: "Ada".into(),
            email: "ada@example.com".into(),
            secret_hash: "argon2-hash".into(),
            role: Role::Member,
            group_id: None,
            active: true,
            identity_token: "{}".into(),
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };
        let json = serde_json::to_string(&PublicPrincipal::from(principal)).unwrap();
        assert!(json.contains("ada@example.com"));
        assert!(!json.contains("argon2-hash"));
    }
}
