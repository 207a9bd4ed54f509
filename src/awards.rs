use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Matches the `live_slug` column width.
pub const MAX_SLUG_LEN: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NomineeType {
    Person,
    Company,
}

impl NomineeType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Person => "person",
            Self::Company => "company",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    TopRecruiter,
    TopExecutiveLeader,
    RisingStarUnder30,
    TopStaffingInfluencer,
    TopThoughtLeader,
    TopGlobalRecruiter,
    TopAiDrivenStaffingPlatform,
    TopDigitalExperienceForClients,
    TopWomenLedStaffingFirm,
    FastestGrowingStaffingFirm,
    BestStaffingProcessAtScale,
    BestRecruitmentAgency,
    BestInHouseRecruitmentTeam,
    BestStaffingPodcastOrShow,
}

impl Category {
    pub const ALL: [Category; 14] = [
        Self::TopRecruiter,
        Self::TopExecutiveLeader,
        Self::RisingStarUnder30,
        Self::TopStaffingInfluencer,
        Self::TopThoughtLeader,
        Self::TopGlobalRecruiter,
        Self::TopAiDrivenStaffingPlatform,
        Self::TopDigitalExperienceForClients,
        Self::TopWomenLedStaffingFirm,
        Self::FastestGrowingStaffingFirm,
        Self::BestStaffingProcessAtScale,
        Self::BestRecruitmentAgency,
        Self::BestInHouseRecruitmentTeam,
        Self::BestStaffingPodcastOrShow,
    ];

    pub fn slug(self) -> &'static str {
        match self {
            Self::TopRecruiter => "top-recruiter",
            Self::TopExecutiveLeader => "top-executive-leader",
            Self::RisingStarUnder30 => "rising-star-under-30",
            Self::TopStaffingInfluencer => "top-staffing-influencer",
            Self::TopThoughtLeader => "top-thought-leader",
            Self::TopGlobalRecruiter => "top-global-recruiter",
            Self::TopAiDrivenStaffingPlatform => "top-ai-driven-staffing-platform",
            Self::TopDigitalExperienceForClients => "top-digital-experience-for-clients",
            Self::TopWomenLedStaffingFirm => "top-women-led-staffing-firm",
            Self::FastestGrowingStaffingFirm => "fastest-growing-staffing-firm",
            Self::BestStaffingProcessAtScale => "best-staffing-process-at-scale",
            Self::BestRecruitmentAgency => "best-recruitment-agency",
            Self::BestInHouseRecruitmentTeam => "best-in-house-recruitment-team",
            Self::BestStaffingPodcastOrShow => "best-staffing-podcast-or-show",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::TopRecruiter => "Top Recruiter",
            Self::TopExecutiveLeader => "Top Executive Leader",
            Self::RisingStarUnder30 => "Rising Star (Under 30)",
            Self::TopStaffingInfluencer => "Top Staffing Influencer",
            Self::TopThoughtLeader => "Top Thought Leader",
            Self::TopGlobalRecruiter => "Top Global Recruiter",
            Self::TopAiDrivenStaffingPlatform => "Top AI-Driven Staffing Platform",
            Self::TopDigitalExperienceForClients => "Top Digital Experience for Clients",
            Self::TopWomenLedStaffingFirm => "Top Women-Led Staffing Firm",
            Self::FastestGrowingStaffingFirm => "Fastest Growing Staffing Firm",
            Self::BestStaffingProcessAtScale => "Best Staffing Process at Scale",
            Self::BestRecruitmentAgency => "Best Recruitment Agency",
            Self::BestInHouseRecruitmentTeam => "Best In-House Recruitment Team",
            Self::BestStaffingPodcastOrShow => "Best Staffing Podcast or Show",
        }
    }

    pub fn nominee_type(self) -> NomineeType {
        match self {
            Self::TopRecruiter
            | Self::TopExecutiveLeader
            | Self::RisingStarUnder30
            | Self::TopStaffingInfluencer
            | Self::TopThoughtLeader
            | Self::TopGlobalRecruiter => NomineeType::Person,
            _ => NomineeType::Company,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown award category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Category::ALL
            .into_iter()
            .find(|category| category.slug() == normalized)
            .ok_or(UnknownCategory(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NominationStatus {
    Draft,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StatusError {
    #[error("unknown nomination status: {0}")]
    Unknown(String),
    #[error("cannot move a nomination from {from} to {to}")]
    InvalidTransition {
        from: NominationStatus,
        to: NominationStatus,
    },
}

/// Outcome of a moderation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed(NominationStatus),
    Unchanged,
}

impl NominationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Only drafts are moderated; asking for the current status is a no-op.
    pub fn transition(self, to: NominationStatus) -> Result<Transition, StatusError> {
        match (self, to) {
            (from, to) if from == to => Ok(Transition::Unchanged),
            (Self::Draft, Self::Approved) | (Self::Draft, Self::Rejected) => {
                Ok(Transition::Changed(to))
            }
            (from, to) => Err(StatusError::InvalidTransition { from, to }),
        }
    }
}

impl fmt::Display for NominationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NominationStatus {
    type Err = StatusError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "draft" | "pending" => Ok(Self::Draft),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(StatusError::Unknown(other.to_string())),
        }
    }
}

pub const SOURCE_PUBLIC: &str = "public";
pub const SOURCE_BULK: &str = "bulk";

/// Public URL key of an approved nominee, e.g. `jane-doe-top-recruiter-42`.
/// The name part is shortened so the whole key fits in `MAX_SLUG_LEN`.
pub fn live_slug(name: &str, category: Category, id: i64) -> String {
    assert!(id >= 0, "Nomination id must be non-negative");

    let suffix = format!("{}-{id}", category.slug());
    let name_budget = MAX_SLUG_LEN.saturating_sub(suffix.len() + 1);

    let mut slug = String::with_capacity(MAX_SLUG_LEN);
    let mut pending_dash = false;
    for ch in name.chars() {
        if !ch.is_ascii_alphanumeric() {
            pending_dash = true;
            continue;
        }
        let dash = pending_dash && !slug.is_empty();
        if slug.len() + usize::from(dash) + 1 > name_budget {
            break;
        }
        if dash {
            slug.push('-');
        }
        pending_dash = false;
        slug.push(ch.to_ascii_lowercase());
    }

    if !slug.is_empty() {
        slug.push('-');
    }
    slug.push_str(&suffix);
    slug
}
