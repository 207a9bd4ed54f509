use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteSettingsView {
    pub nominations_open: bool,
    pub voting_open: bool,
    pub voting_closes_at: Option<DateTime<Utc>>,
    /// `voting_open` and the closing time, if any, not yet reached
    pub voting_active: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdateRequest {
    pub nominations_open: Option<bool>,
    pub voting_open: Option<bool>,
    /// RFC 3339 timestamp; an empty string clears the closing time
    pub voting_closes_at: Option<String>,
}
