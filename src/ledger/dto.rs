use serde::{Deserialize, Serialize};
use time::Date;
use uuid::Uuid;

/// Body for a single check-in. The subject is either a scanned identity
/// token or an explicit principal id; `day` defaults to the server's
/// current calendar day.
#[derive(Debug, Deserialize)]
pub struct RecordAttendanceRequest {
    pub token: Option<String>,
    pub principal_id: Option<Uuid>,
    pub status: String,
    pub category: String,
    pub note: Option<String>,
    pub day: Option<Date>,
}

/// One entry of a roster batch.
#[derive(Debug, Deserialize)]
pub struct BatchEntry {
    pub principal_id: Uuid,
    pub status: String,
    pub category: String,
    pub note: Option<String>,
    pub day: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct RecordBatchRequest {
    pub records: Vec<BatchEntry>,
}

#[derive(Debug, Serialize)]
pub struct BatchResponse {
    pub written: usize,
}

#[derive(Debug, Deserialize)]
pub struct DayRange {
    pub start: Option<Date>,
    pub end: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct CategoryQuery {
    pub recorded_by: Option<Uuid>,
    pub start: Option<Date>,
    pub end: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct TodayQuery {
    pub category: String,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub category: Option<String>,
    pub start: Option<Date>,
    pub end: Option<Date>,
}

#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    pub start: Date,
    pub end: Date,
}
