use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoteSubmission {
    pub nomination_id: Option<i64>,
    pub voter: VoterInput,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoterInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCastResponse {
    pub id: i64,
    pub nomination_id: i64,
    pub category: String,
    pub total_votes: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteCountsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCountEntry {
    pub nomination_id: i64,
    pub slug: Option<String>,
    pub name: String,
    pub category: String,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCountsView {
    pub category: Option<String>,
    pub total_votes: i64,
    pub nominees: Vec<VoteCountEntry>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VoteCheckQuery {
    pub email: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCheckResponse {
    pub has_voted: bool,
    pub nomination_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteView {
    pub id: i64,
    pub nomination_id: i64,
    pub category: String,
    pub voter_email: String,
    pub voter_first_name: String,
    pub voter_last_name: String,
    pub voter_linkedin_url: Option<String>,
    pub created_at: DateTime<Utc>,
}
