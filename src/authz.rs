use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Three-tier role hierarchy. Stored in Postgres as the `principal_role`
/// enum and carried verbatim in session claims and identity tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "principal_role", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Owner,
    Supervisor,
    Member,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Supervisor => "SUPERVISOR",
            Role::Member => "MEMBER",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Allowed-role set per operation. Sets are explicit, never derived from
/// rank, so that each entry point declares exactly who may call it.
pub const OWNER_ONLY: &[Role] = &[Role::Owner];
pub const ATTENDANCE_WRITERS: &[Role] = &[Role::Owner, Role::Supervisor];
pub const ANY_PRINCIPAL: &[Role] = &[Role::Owner, Role::Supervisor, Role::Member];

pub fn authorize(caller: Role, required: &[Role]) -> bool {
    required.contains(&caller)
}

/// Gate used at the top of every protected handler. Fails before any
/// directory or ledger work happens.
pub fn require(caller: Role, required: &[Role]) -> Result<(), ApiError> {
    if authorize(caller, required) {
        Ok(())
    } else {
        Err(ApiError::Forbidden(format!(
            "{} role may not perform this operation",
            caller
        )))
    }
}

/// Content-level check on top of the coarse gate: who may a writer record
/// attendance for. Owners may record anyone. Supervisors may record only
/// Members, and only within their own group when they have one; a
/// group-unscoped Supervisor may record any Member.
pub fn may_record_subject(
    writer_role: Role,
    writer_group: Option<&str>,
    subject_role: Role,
    subject_group: Option<&str>,
) -> Result<(), ApiError> {
    match writer_role {
        Role::Owner => Ok(()),
        Role::Supervisor => {
            if subject_role != Role::Member {
                return Err(ApiError::Forbidden(
                    "supervisors may only record attendance for members".into(),
                ));
            }
            match writer_group {
                Some(group) if subject_group != Some(group) => Err(ApiError::Forbidden(
                    "subject is outside the supervisor's group".into(),
                )),
                _ => Ok(()),
            }
        }
        Role::Member => Err(ApiError::Forbidden(
            "members may not record attendance".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_sets_are_not_hierarchical() {
        assert!(authorize(Role::Owner, OWNER_ONLY));
        assert!(!authorize(Role::Supervisor, OWNER_ONLY));
        assert!(!authorize(Role::Member, OWNER_ONLY));

        assert!(authorize(Role::Owner, ATTENDANCE_WRITERS));
        assert!(authorize(Role::Supervisor, ATTENDANCE_WRITERS));
        assert!(!authorize(Role::Member, ATTENDANCE_WRITERS));
    }

    #[test]
    fn require_reports_forbidden() {
        let err = require(Role::Member, ATTENDANCE_WRITERS).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn owner_records_anyone() {
        assert!(may_record_subject(Role::Owner, None, Role::Supervisor, None).is_ok());
        assert!(may_record_subject(Role::Owner, Some("g1"), Role::Member, Some("g2")).is_ok());
    }

    #[test]
    fn supervisor_records_only_members() {
        let err = may_record_subject(Role::Supervisor, None, Role::Supervisor, None).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        assert!(may_record_subject(Role::Supervisor, None, Role::Member, Some("g1")).is_ok());
    }

    #[test]
    fn grouped_supervisor_is_scoped_to_own_group() {
        assert!(may_record_subject(Role::Supervisor, Some("g1"), Role::Member, Some("g1")).is_ok());
        let err = may_record_subject(Role::Supervisor, Some("g1"), Role::Member, Some("g2"))
            .unwrap_err();
        assert_eq!(err.kind(), "forbidden");
        let err =
            may_record_subject(Role::Supervisor, Some("g1"), Role::Member, None).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }

    #[test]
    fn member_never_records() {
        let err = may_record_subject(Role::Member, None, Role::Member, None).unwrap_err();
        assert_eq!(err.kind(), "forbidden");
    }
}
