use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::{Date, OffsetDateTime};
use uuid::Uuid;

use crate::error::ApiError;

/// Attendance status for one principal/day cell. Unknown strings are
/// rejected at the DTO boundary before any store access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "attendance_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "PRESENT",
            AttendanceStatus::Absent => "ABSENT",
            AttendanceStatus::Late => "LATE",
        }
    }
}

impl std::str::FromStr for AttendanceStatus {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRESENT" => Ok(AttendanceStatus::Present),
            "ABSENT" => Ok(AttendanceStatus::Absent),
            "LATE" => Ok(AttendanceStatus::Late),
            other => Err(ApiError::InvalidStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row per (principal, calendar day).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AttendanceRecord {
    pub id: Uuid,
    pub principal_id: Uuid,
    pub day: Date,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub recorded_by: Uuid,
    pub category: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// A validated entry ready to be written; produced from request DTOs only
/// after every field has passed boundary validation.
#[derive(Debug, Clone)]
pub struct UpsertEntry {
    pub principal_id: Uuid,
    pub day: Date,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub category: String,
}

/// Raw count row backing an aggregate summary.
#[derive(Debug, FromRow)]
pub struct StatusCounts {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
}

/// Derived, cache-only aggregate; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateSummary {
    pub total: i64,
    pub present: i64,
    pub absent: i64,
    pub late: i64,
    /// Present share as a whole percentage, 0 when there are no records.
    pub rate: i64,
}

impl From<StatusCounts> for AggregateSummary {
    fn from(c: StatusCounts) -> Self {
        let rate = if c.total > 0 {
            ((c.present as f64 / c.total as f64) * 100.0).round() as i64
        } else {
            0
        };
        Self {
            total: c.total,
            present: c.present,
            absent: c.absent,
            late: c.late,
            rate,
        }
    }
}

/// Joined row handed to the export service.
#[derive(Debug, FromRow)]
pub struct ExportRow {
    pub display_name: String,
    pub external_id: String,
    pub day: Date,
    pub status: AttendanceStatus,
    pub note: Option<String>,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn status_parses_known_values() {
        assert_eq!(
            AttendanceStatus::from_str("PRESENT").unwrap(),
            AttendanceStatus::Present
        );
        assert_eq!(
            AttendanceStatus::from_str("LATE").unwrap(),
            AttendanceStatus::Late
        );
    }

    #[test]
    fn status_rejects_unknown_values() {
        let err = AttendanceStatus::from_str("SLEEPING").unwrap_err();
        assert_eq!(err.kind(), "invalid_status");
        // Lowercase is not accepted either; the wire format is canonical.
        assert!(AttendanceStatus::from_str("present").is_err());
    }

    #[test]
    fn summary_rate_rounds_to_whole_percent() {
        let summary: AggregateSummary = StatusCounts {
            total: 3,
            present: 2,
            absent: 1,
            late: 0,
        }
        .into();
        assert_eq!(summary.rate, 67);
    }

    #[test]
    fn summary_rate_is_zero_without_records() {
        let summary: AggregateSummary = StatusCounts {
            total: 0,
            present: 0,
            absent: 0,
            late: 0,
        }
        .into();
        assert_eq!(summary.rate, 0);
        assert_eq!(summary.total, 0);
    }
}
