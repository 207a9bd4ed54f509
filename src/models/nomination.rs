use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Public nomination form payload. Every field is optional at the serde
/// level so that missing values surface as field-level validation errors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NominationSubmission {
    pub category: Option<String>,
    pub nominee: NomineeInput,
    pub nominator: NominatorInput,
    pub why_nominated: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NomineeInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub job_title: Option<String>,
    pub company_name: Option<String>,
    pub linkedin: Option<String>,
    pub website: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NominatorInput {
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationCreatedResponse {
    pub id: i64,
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NominationCheckQuery {
    pub category: Option<String>,
    pub email: Option<String>,
    pub linkedin: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationCheckResponse {
    pub exists: bool,
    pub status: Option<String>,
    pub live_slug: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NomineeListQuery {
    pub category: Option<String>,
    pub q: Option<String>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// Approved nominee as shown on the public listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomineeSummary {
    pub id: i64,
    pub slug: String,
    pub category: String,
    pub category_label: String,
    pub nominee_type: String,
    pub name: String,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub image_url: Option<String>,
    pub linkedin_url: String,
    pub votes: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NomineeView {
    #[serde(flatten)]
    pub summary: NomineeSummary,
    pub website_url: Option<String>,
    pub why_nominated: String,
    pub approved_at: Option<DateTime<Utc>>,
}

/// Full record for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NominationView {
    pub id: i64,
    pub category: String,
    pub nominee_type: String,
    pub nominee_name: String,
    pub nominee_first_name: Option<String>,
    pub nominee_last_name: Option<String>,
    pub nominee_email: Option<String>,
    pub nominee_job_title: Option<String>,
    pub nominee_company: Option<String>,
    pub linkedin_url: String,
    pub website_url: Option<String>,
    pub image_url: Option<String>,
    pub why_nominated: String,
    pub nominator_name: String,
    pub nominator_email: String,
    pub status: String,
    pub live_slug: Option<String>,
    pub source: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub moderated_at: Option<DateTime<Utc>>,
}
