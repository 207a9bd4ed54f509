use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::nomination::NominationSubmission;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominationListQuery {
    pub status: Option<String>,
    pub category: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NominationUpdateRequest {
    pub status: Option<String>,
    pub why_nominated: Option<String>,
    /// An empty string removes the image
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BulkUploadRequest {
    /// Status given to every inserted row: `draft` (default) or `approved`
    pub status: Option<String>,
    pub nominations: Vec<NominationSubmission>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkUploadResponse {
    pub inserted: Vec<i64>,
    pub failed: Vec<BulkRowError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRowError {
    pub index: usize,
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteListQuery {
    pub category: Option<String>,
    pub nomination_id: Option<i64>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminStatsView {
    pub nominations: StatusCounts,
    pub votes_total: i64,
    pub votes_by_category: Vec<CategoryVoteCount>,
    pub sync_backlog: SyncBacklog,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub draft: i64,
    pub approved: i64,
    pub rejected: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVoteCount {
    pub category: String,
    pub votes: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncBacklog {
    pub pending: i64,
    pub failed: i64,
}
