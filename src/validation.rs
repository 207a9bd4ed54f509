use std::collections::BTreeMap;

use reqwest::Url;
use thiserror::Error;
use validator::{ValidateEmail, ValidateLength, ValidateUrl};

use crate::awards::{Category, NomineeType};
use crate::models::nomination::NominationSubmission;
use crate::models::vote::VoteSubmission;

pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_NAME_LEN: usize = 100;
pub const MAX_FULL_NAME_LEN: usize = 200;
/// Raw input bound for any URL field, checked before parsing.
pub const MAX_URL_LEN: usize = 1024;
pub const MAX_LINKEDIN_URL_LEN: usize = 256;
pub const MAX_WEBSITE_URL_LEN: usize = 512;
pub const MAX_IMAGE_URL_LEN: usize = 1024;
pub const MIN_WHY_LEN: usize = 10;
pub const MAX_WHY_LEN: usize = 2000;

const LINKEDIN_HOST: &str = "linkedin.com";

/// Field-level validation failures keyed by dotted path (`nominee.email`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed for {} field(s)", .fields.len())]
pub struct ValidationErrors {
    pub fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.fields
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    /// Records the error of `result` under `field` and yields the value otherwise.
    fn check<T>(&mut self, field: &str, result: Result<T, String>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(message) => {
                self.add(field, message);
                None
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkedinKind {
    Profile,
    Organization,
}

impl From<NomineeType> for LinkedinKind {
    fn from(value: NomineeType) -> Self {
        match value {
            NomineeType::Person => Self::Profile,
            NomineeType::Company => Self::Organization,
        }
    }
}

/// A nomination that passed validation, with every transform applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidNomination {
    pub category: Category,
    pub nominee_type: NomineeType,
    pub nominee_name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub job_title: Option<String>,
    pub company: Option<String>,
    pub linkedin_url: String,
    pub website_url: Option<String>,
    pub image_url: Option<String>,
    pub why_nominated: String,
    pub nominator_name: String,
    pub nominator_email: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidVote {
    pub nomination_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub linkedin_url: Option<String>,
}

pub fn validate_nomination(
    submission: &NominationSubmission,
) -> Result<ValidNomination, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let category = match submission.category.as_deref().map(str::trim) {
        None | Some("") => {
            errors.add("category", "is required");
            None
        }
        Some(raw) => errors.check("category", raw.parse::<Category>().map_err(|e| e.to_string())),
    };

    let nominee = &submission.nominee;
    let nominator_name = errors.check(
        "nominator.name",
        normalize_name(submission.nominator.name.as_deref(), MAX_FULL_NAME_LEN),
    );
    let nominator_email = errors.check(
        "nominator.email",
        normalize_email(submission.nominator.email.as_deref()),
    );
    let why_nominated = errors.check(
        "why_nominated",
        normalize_text(
            submission.why_nominated.as_deref(),
            MIN_WHY_LEN,
            MAX_WHY_LEN,
        ),
    );
    let image_url = errors
        .check(
            "nominee.image_url",
            normalize_optional_url(nominee.image_url.as_deref(), false, MAX_IMAGE_URL_LEN),
        )
        .flatten();

    let Some(category) = category else {
        return Err(errors);
    };
    let nominee_type = category.nominee_type();

    let linkedin_url = errors.check(
        "nominee.linkedin",
        required(nominee.linkedin.as_deref())
            .and_then(|raw| normalize_linkedin(raw, nominee_type.into())),
    );

    let (first_name, last_name, email, job_title, company, website_url) = match nominee_type {
        NomineeType::Person => {
            let first = errors.check(
                "nominee.first_name",
                normalize_name(nominee.first_name.as_deref(), MAX_NAME_LEN),
            );
            let last = errors.check(
                "nominee.last_name",
                normalize_name(nominee.last_name.as_deref(), MAX_NAME_LEN),
            );
            let email = errors.check("nominee.email", normalize_email(nominee.email.as_deref()));
            let job_title = errors
                .check(
                    "nominee.job_title",
                    normalize_optional_text(nominee.job_title.as_deref(), MAX_NAME_LEN),
                )
                .flatten();
            let company = errors
                .check(
                    "nominee.company_name",
                    normalize_optional_text(nominee.company_name.as_deref(), MAX_NAME_LEN),
                )
                .flatten();
            (first, last, email, job_title, company, None)
        }
        NomineeType::Company => {
            let company = errors.check(
                "nominee.company_name",
                normalize_name(nominee.company_name.as_deref(), MAX_NAME_LEN),
            );
            let email = match nominee.email.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(raw) => errors.check("nominee.email", normalize_email(Some(raw))),
            };
            let website = errors
                .check(
                    "nominee.website",
                    normalize_optional_url(nominee.website.as_deref(), true, MAX_WEBSITE_URL_LEN),
                )
                .flatten();
            (None, None, email, None, company, website)
        }
    };

    if !errors.is_empty() {
        return Err(errors);
    }

    let nominee_name = match nominee_type {
        NomineeType::Person => format!(
            "{} {}",
            first_name.as_deref().unwrap_or_default(),
            last_name.as_deref().unwrap_or_default()
        ),
        NomineeType::Company => company.clone().unwrap_or_default(),
    };

    // Every required value is present once no errors were recorded.
    match (linkedin_url, why_nominated, nominator_name, nominator_email) {
        (Some(linkedin_url), Some(why_nominated), Some(nominator_name), Some(nominator_email)) => {
            Ok(ValidNomination {
                category,
                nominee_type,
                nominee_name,
                first_name,
                last_name,
                email,
                job_title,
                company,
                linkedin_url,
                website_url,
                image_url,
                why_nominated,
                nominator_name,
                nominator_email,
            })
        }
        _ => Err(errors),
    }
}

pub fn validate_vote(submission: &VoteSubmission) -> Result<ValidVote, ValidationErrors> {
    let mut errors = ValidationErrors::default();

    let nomination_id = match submission.nomination_id {
        Some(id) if id > 0 => Some(id),
        Some(_) => {
            errors.add("nomination_id", "must be a positive identifier");
            None
        }
        None => {
            errors.add("nomination_id", "is required");
            None
        }
    };

    let voter = &submission.voter;
    let first_name = errors.check(
        "voter.first_name",
        normalize_name(voter.first_name.as_deref(), MAX_NAME_LEN),
    );
    let last_name = errors.check(
        "voter.last_name",
        normalize_name(voter.last_name.as_deref(), MAX_NAME_LEN),
    );
    let email = errors.check("voter.email", normalize_email(voter.email.as_deref()));
    let linkedin_url = match voter.linkedin.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => errors.check(
            "voter.linkedin",
            normalize_linkedin(raw, LinkedinKind::Profile),
        ),
    };

    match (nomination_id, first_name, last_name, email) {
        (Some(nomination_id), Some(first_name), Some(last_name), Some(email))
            if errors.is_empty() =>
        {
            Ok(ValidVote {
                nomination_id,
                first_name,
                last_name,
                email,
                linkedin_url,
            })
        }
        _ => Err(errors),
    }
}

fn required(value: Option<&str>) -> Result<&str, String> {
    match value.map(str::trim) {
        None | Some("") => Err("is required".to_string()),
        Some(trimmed) => Ok(trimmed),
    }
}

fn at_most(value: &str, max_len: usize) -> Result<(), String> {
    if value.validate_length(None, Some(max_len as u64), None) {
        Ok(())
    } else {
        Err(format!("must be at most {max_len} characters"))
    }
}

/// Trims and lowercases an email address and checks its shape.
pub fn normalize_email(value: Option<&str>) -> Result<String, String> {
    let email = required(value)?.to_ascii_lowercase();
    at_most(&email, MAX_EMAIL_LEN)?;
    if !email.validate_email() {
        return Err("must be a valid email address".to_string());
    }
    // `validate_email` accepts single-label domains.
    match email.rsplit_once('@') {
        Some((_, domain)) if domain.contains('.') => Ok(email),
        _ => Err("must be a valid email address".to_string()),
    }
}

/// Canonical form: `https://www.linkedin.com/<kind>/<handle>` with the
/// handle lowercased and query, fragment and extra path segments dropped.
pub fn normalize_linkedin(value: &str, kind: LinkedinKind) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("is required".to_string());
    }
    at_most(trimmed, MAX_URL_LEN)?;

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let invalid = || "must be a LinkedIn URL".to_string();
    if !with_scheme.validate_url() {
        return Err(invalid());
    }
    let url = Url::parse(&with_scheme).map_err(|_| invalid())?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    let host = url.host_str().ok_or_else(invalid)?.to_ascii_lowercase();
    if host != LINKEDIN_HOST && !host.ends_with(".linkedin.com") {
        return Err(invalid());
    }

    let mut segments = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty());
    let section = segments.next().map(str::to_ascii_lowercase);
    let handle = segments.next().map(str::to_ascii_lowercase);

    let section = match (kind, section.as_deref()) {
        (LinkedinKind::Profile, Some("in")) => "in",
        (LinkedinKind::Organization, Some(s @ ("company" | "school" | "showcase"))) => s,
        (LinkedinKind::Profile, _) => {
            return Err("must be a LinkedIn profile URL (linkedin.com/in/...)".to_string());
        }
        (LinkedinKind::Organization, _) => {
            return Err("must be a LinkedIn company page URL (linkedin.com/company/...)".to_string());
        }
    };

    let handle = handle.ok_or_else(|| "is missing the LinkedIn handle".to_string())?;
    let valid_handle = handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '%'));
    if !valid_handle {
        return Err("contains an invalid LinkedIn handle".to_string());
    }

    let canonical = format!("https://www.linkedin.com/{section}/{handle}");
    at_most(&canonical, MAX_LINKEDIN_URL_LEN)?;
    Ok(canonical)
}

pub fn normalize_name(value: Option<&str>, max_len: usize) -> Result<String, String> {
    let name = required(value)?;
    at_most(name, max_len)?;
    Ok(collapse_whitespace(name))
}

pub fn normalize_text(value: Option<&str>, min_len: usize, max_len: usize) -> Result<String, String> {
    let text = required(value)?;
    if !text.validate_length(Some(min_len as u64), None, None) {
        return Err(format!("must be at least {min_len} characters"));
    }
    at_most(text, max_len)?;
    Ok(text.to_string())
}

pub fn normalize_optional_text(value: Option<&str>, max_len: usize) -> Result<Option<String>, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => normalize_name(Some(text), max_len).map(Some),
    }
}

/// Accepts `http`/`https` URLs only; `add_scheme` prefixes bare hosts with
/// `https://`. `max_len` bounds the normalised URL that gets stored.
pub fn normalize_optional_url(
    value: Option<&str>,
    add_scheme: bool,
    max_len: usize,
) -> Result<Option<String>, String> {
    let trimmed = match value.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(trimmed) => trimmed,
    };
    at_most(trimmed, MAX_URL_LEN)?;

    let candidate = if add_scheme && !trimmed.contains("://") {
        format!("https://{trimmed}")
    } else {
        trimmed.to_string()
    };
    if !candidate.validate_url() {
        return Err("must be a valid URL".to_string());
    }
    let url = Url::parse(&candidate).map_err(|_| "must be a valid URL".to_string())?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err("must be an http(s) URL".to_string());
    }

    let normalized = url.to_string();
    at_most(&normalized, max_len)?;
    Ok(Some(normalized))
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::nomination::{NominatorInput, NomineeInput};
    use crate::models::vote::VoterInput;

    fn person_submission() -> NominationSubmission {
        NominationSubmission {
            category: Some("top-recruiter".to_string()),
            nominee: NomineeInput {
                first_name: Some(" Jane ".to_string()),
                last_name: Some("Doe".to_string()),
                email: Some("Jane.Doe@Example.COM".to_string()),
                job_title: Some("Head of Talent".to_string()),
                company_name: Some("Acme Staffing".to_string()),
                linkedin: Some("linkedin.com/in/JaneDoe/?trk=public".to_string()),
                website: None,
                image_url: Some("https://cdn.example.com/jane.png".to_string()),
            },
            nominator: NominatorInput {
                name: Some("John  Smith".to_string()),
                email: Some("JOHN@example.org".to_string()),
            },
            why_nominated: Some("Placed 300 candidates this year.".to_string()),
        }
    }

    #[test]
    fn person_nomination_is_normalized() {
        let valid = validate_nomination(&person_submission()).expect("valid nomination");
        assert_eq!(valid.category, Category::TopRecruiter);
        assert_eq!(valid.nominee_name, "Jane Doe");
        assert_eq!(valid.email.as_deref(), Some("jane.doe@example.com"));
        assert_eq!(valid.linkedin_url, "https://www.linkedin.com/in/janedoe");
        assert_eq!(valid.nominator_name, "John Smith");
        assert_eq!(valid.nominator_email, "john@example.org");
    }

    #[test]
    fn company_nomination_requires_company_page() {
        let mut submission = person_submission();
        submission.category = Some("best-recruitment-agency".to_string());
        submission.nominee.company_name = Some("Acme Staffing".to_string());

        let errors = validate_nomination(&submission).unwrap_err();
        assert!(errors.fields.contains_key("nominee.linkedin"));

        submission.nominee.linkedin = Some("https://uk.linkedin.com/company/acme-staffing/".to_string());
        submission.nominee.website = Some("acme.example.com".to_string());
        let valid = validate_nomination(&submission).expect("valid company nomination");
        assert_eq!(valid.nominee_type, NomineeType::Company);
        assert_eq!(valid.nominee_name, "Acme Staffing");
        assert_eq!(
            valid.linkedin_url,
            "https://www.linkedin.com/company/acme-staffing"
        );
        assert_eq!(valid.website_url.as_deref(), Some("https://acme.example.com/"));
        assert_eq!(valid.first_name, None);
    }

    #[test]
    fn missing_fields_are_reported_together() {
        let errors = validate_nomination(&NominationSubmission::default()).unwrap_err();
        assert_eq!(errors.fields.get("category").map(String::as_str), Some("is required"));
        assert!(errors.fields.contains_key("nominator.name"));
        assert!(errors.fields.contains_key("nominator.email"));
        assert!(errors.fields.contains_key("why_nominated"));
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut submission = person_submission();
        submission.category = Some("best-dog".to_string());
        let errors = validate_nomination(&submission).unwrap_err();
        assert!(errors.fields["category"].contains("unknown award category"));
    }

    #[test]
    fn short_reason_is_rejected() {
        let mut submission = person_submission();
        submission.why_nominated = Some("great".to_string());
        let errors = validate_nomination(&submission).unwrap_err();
        assert_eq!(errors.fields.len(), 1);
        assert!(errors.fields.contains_key("why_nominated"));
    }

    #[test]
    fn linkedin_normalization() {
        assert_eq!(
            normalize_linkedin("http://www.LinkedIn.com/in/Jane-Doe-123#about", LinkedinKind::Profile),
            Ok("https://www.linkedin.com/in/jane-doe-123".to_string())
        );
        assert!(normalize_linkedin("https://linkedin.evil.com/in/jane", LinkedinKind::Profile).is_err());
        assert!(normalize_linkedin("https://notlinkedin.com/in/jane", LinkedinKind::Profile).is_err());
        assert!(normalize_linkedin("https://www.linkedin.com/in/", LinkedinKind::Profile).is_err());
        assert!(normalize_linkedin("ftp://linkedin.com/in/jane", LinkedinKind::Profile).is_err());
        assert!(normalize_linkedin("linkedin.com/company/acme", LinkedinKind::Profile).is_err());
        assert_eq!(
            normalize_linkedin("linkedin.com/school/mit", LinkedinKind::Organization),
            Ok("https://www.linkedin.com/school/mit".to_string())
        );
    }

    #[test]
    fn email_normalization() {
        assert_eq!(normalize_email(Some("  A@B.Co ")), Ok("a@b.co".to_string()));
        assert!(normalize_email(Some("no-at-sign")).is_err());
        assert!(normalize_email(Some("a@b")).is_err());
        assert!(normalize_email(Some("a@@b.com")).is_err());
        assert!(normalize_email(Some("a b@c.com")).is_err());
        assert!(normalize_email(Some("a@b..com")).is_err());
        assert_eq!(normalize_email(None), Err("is required".to_string()));
    }

    #[test]
    fn image_url_must_be_http() {
        assert!(normalize_optional_url(Some("javascript:alert(1)"), false, MAX_IMAGE_URL_LEN).is_err());
        assert_eq!(normalize_optional_url(Some("  "), false, MAX_IMAGE_URL_LEN), Ok(None));
    }

    #[test]
    fn url_limits_follow_their_columns() {
        let long_handle = format!("https://www.linkedin.com/in/{}", "x".repeat(600));
        assert_eq!(
            normalize_linkedin(&long_handle, LinkedinKind::Profile),
            Err(format!("must be at most {MAX_LINKEDIN_URL_LEN} characters"))
        );
        let tracked = format!("linkedin.com/in/jane?trk={}", "t".repeat(600));
        assert_eq!(
            normalize_linkedin(&tracked, LinkedinKind::Profile),
            Ok("https://www.linkedin.com/in/jane".to_string())
        );

        let website = format!("acme.example.com/{}", "p".repeat(600));
        assert!(normalize_optional_url(Some(&website), true, MAX_WEBSITE_URL_LEN).is_err());
        assert!(normalize_optional_url(Some(&website), true, MAX_IMAGE_URL_LEN).is_ok());
    }

    #[test]
    fn oversized_vote_linkedin_is_a_field_error() {
        let submission = VoteSubmission {
            nomination_id: Some(3),
            voter: VoterInput {
                first_name: Some("Ann".to_string()),
                last_name: Some("Lee".to_string()),
                email: Some("ann@example.com".to_string()),
                linkedin: Some(format!("linkedin.com/in/{}", "a".repeat(300))),
            },
        };
        let errors = validate_vote(&submission).unwrap_err();
        assert!(errors.fields["voter.linkedin"].contains("at most 256"));
    }

    #[test]
    fn vote_validation() {
        let submission = VoteSubmission {
            nomination_id: Some(12),
            voter: VoterInput {
                first_name: Some("Ann".to_string()),
                last_name: Some("Lee".to_string()),
                email: Some("ANN@Example.com".to_string()),
                linkedin: Some("".to_string()),
            },
        };
        let valid = validate_vote(&submission).expect("valid vote");
        assert_eq!(valid.email, "ann@example.com");
        assert_eq!(valid.linkedin_url, None);

        let errors = validate_vote(&VoteSubmission::default()).unwrap_err();
        assert_eq!(errors.fields["nomination_id"], "is required");
        assert!(errors.fields.contains_key("voter.email"));

        let mut negative = submission.clone();
        negative.nomination_id = Some(0);
        assert!(validate_vote(&negative).is_err());
    }
}
