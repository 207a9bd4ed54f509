use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::sea_query::{Expr, Func};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use tracing::info;

use crate::awards::{Category, NominationStatus, SOURCE_PUBLIC, live_slug};
use crate::entities::{nomination, vote};
use crate::models::nomination::{
    NominationCheckQuery, NominationCheckResponse, NominationCreatedResponse, NominationSubmission,
    NominationView, NomineeListQuery, NomineeSummary, NomineeView,
};
use crate::sync::{self, CrmEvent};
use crate::state::AppState;
use crate::validation::{
    LinkedinKind, ValidNomination, ValidationErrors, normalize_email, normalize_linkedin,
    validate_nomination,
};

use super::settings::current_settings;
use super::{ApiJson, HttpError, Page, is_unique_violation};

const DEFAULT_NOMINEE_LIMIT: u64 = 50;
const MAX_NOMINEE_LIMIT: u64 = 200;
const MAX_SEARCH_LEN: usize = 100;
pub(super) const DUPLICATE_NOMINATION: &str =
    "This nominee has already been nominated in this category";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/nominations", post(submit_nomination))
        .route("/nominations/check", get(check_nomination))
        .route("/nominees", get(list_nominees))
        .route("/nominees/{slug}", get(get_nominee))
}

async fn submit_nomination(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<NominationSubmission>,
) -> Result<Json<NominationCreatedResponse>, HttpError> {
    let valid = validate_nomination(&submission)?;

    let settings = current_settings(&state).await?;
    if !settings.nominations_open {
        return Err(HttpError::forbidden("Nominations are closed"));
    }

    if find_duplicate(&state.database, &valid).await?.is_some() {
        return Err(HttpError::conflict(DUPLICATE_NOMINATION));
    }

    let txn = state.database.begin().await?;
    let created = insert_nomination(&txn, &valid, NominationStatus::Draft, SOURCE_PUBLIC)
        .await
        .map_err(duplicate_or_internal)?;
    sync::enqueue(&txn, &submitted_event(&created)).await?;
    txn.commit().await?;

    info!(
        "Nomination {} received for {} in {}",
        created.id, created.nominee_name, created.category
    );

    Ok(Json(NominationCreatedResponse {
        id: created.id,
        status: created.status,
    }))
}

async fn check_nomination(
    Query(query): Query<NominationCheckQuery>,
    State(state): State<AppState>,
) -> Result<Json<NominationCheckResponse>, HttpError> {
    let category = match query.category.as_deref() {
        Some(raw) => raw.parse::<Category>()?,
        None => return Err(ValidationErrors::single("category", "is required").into()),
    };

    let mut select =
        nomination::Entity::find().filter(nomination::Column::Category.eq(category.slug()));

    if let Some(linkedin) = query.linkedin.as_deref().filter(|v| !v.trim().is_empty()) {
        let kind = LinkedinKind::from(category.nominee_type());
        let normalized = normalize_linkedin(linkedin, kind)
            .map_err(|message| ValidationErrors::single("linkedin", message))?;
        select = select.filter(nomination::Column::LinkedinUrl.eq(normalized));
    } else if query.email.as_deref().is_some_and(|v| !v.trim().is_empty()) {
        let email = normalize_email(query.email.as_deref())
            .map_err(|message| ValidationErrors::single("email", message))?;
        select = select.filter(nomination::Column::NomineeEmail.eq(email));
    } else {
        return Err(HttpError::bad_request("email or linkedin is required"));
    }

    let existing = select
        .order_by_asc(nomination::Column::Id)
        .one(&state.database)
        .await?;

    let response = match existing {
        Some(model) => NominationCheckResponse {
            exists: true,
            status: Some(model.status),
            live_slug: model.live_slug,
        },
        None => NominationCheckResponse {
            exists: false,
            status: None,
            live_slug: None,
        },
    };
    Ok(Json(response))
}

async fn list_nominees(
    Query(query): Query<NomineeListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<NomineeSummary>>, HttpError> {
    let page = Page::from_query(
        query.limit,
        query.offset,
        DEFAULT_NOMINEE_LIMIT,
        MAX_NOMINEE_LIMIT,
    )?;

    let mut select = nomination::Entity::find()
        .filter(nomination::Column::Status.eq(NominationStatus::Approved.as_str()));

    if let Some(raw) = query.category.as_deref().filter(|v| !v.trim().is_empty()) {
        let category = raw.parse::<Category>()?;
        select = select.filter(nomination::Column::Category.eq(category.slug()));
    }

    if let Some(pattern) = query.q.as_deref().and_then(search_pattern) {
        select = select.filter(
            Expr::expr(Func::lower(Expr::col(nomination::Column::NomineeName))).like(pattern),
        );
    }

    let models = select
        .order_by_desc(nomination::Column::CreatedAt)
        .order_by_desc(nomination::Column::Id)
        .limit(page.limit)
        .offset(page.offset)
        .all(&state.database)
        .await?;

    let ids = models.iter().map(|model| model.id).collect::<Vec<_>>();
    let totals = vote_totals(&state.database, &ids).await?;

    let summaries = models
        .into_iter()
        .map(|model| {
            let votes = totals.get(&model.id).copied().unwrap_or(0);
            nominee_summary(model, votes)
        })
        .collect::<Vec<_>>();

    Ok(Json(summaries))
}

async fn get_nominee(
    Path(slug): Path<String>,
    State(state): State<AppState>,
) -> Result<Json<NomineeView>, HttpError> {
    let slug = slug.trim().to_ascii_lowercase();
    if slug.is_empty() || slug.len() > crate::awards::MAX_SLUG_LEN {
        return Err(HttpError::not_found("Nominee not found"));
    }

    let model = nomination::Entity::find()
        .filter(nomination::Column::LiveSlug.eq(slug))
        .filter(nomination::Column::Status.eq(NominationStatus::Approved.as_str()))
        .one(&state.database)
        .await?
        .ok_or_else(|| HttpError::not_found("Nominee not found"))?;

    let votes = vote_totals(&state.database, &[model.id])
        .await?
        .get(&model.id)
        .copied()
        .unwrap_or(0);

    let website_url = model.website_url.clone();
    let why_nominated = model.why_nominated.clone();
    let approved_at = model.moderated_at.map(|at| at.with_timezone(&Utc));
    Ok(Json(NomineeView {
        summary: nominee_summary(model, votes),
        website_url,
        why_nominated,
        approved_at,
    }))
}

/// Lowercased `LIKE` pattern; wildcard characters in the input are dropped.
fn search_pattern(raw: &str) -> Option<String> {
    let cleaned = raw
        .trim()
        .chars()
        .filter(|ch| !matches!(ch, '%' | '_' | '\\'))
        .take(MAX_SEARCH_LEN)
        .collect::<String>()
        .to_lowercase();
    (!cleaned.is_empty()).then(|| format!("%{cleaned}%"))
}

pub(super) async fn find_duplicate<C: ConnectionTrait>(
    db: &C,
    valid: &ValidNomination,
) -> Result<Option<nomination::Model>, DbErr> {
    nomination::Entity::find()
        .filter(nomination::Column::Category.eq(valid.category.slug()))
        .filter(nomination::Column::LinkedinUrl.eq(valid.linkedin_url.as_str()))
        .one(db)
        .await
}

/// Inserts a validated nomination; approved rows get their live slug once the id is known.
pub(super) async fn insert_nomination<C: ConnectionTrait>(
    db: &C,
    valid: &ValidNomination,
    status: NominationStatus,
    source: &str,
) -> Result<nomination::Model, DbErr> {
    let now = Utc::now().fixed_offset();
    let approved = status == NominationStatus::Approved;

    let row = nomination::ActiveModel {
        id: NotSet,
        category: Set(valid.category.slug().to_string()),
        nominee_type: Set(valid.nominee_type.as_str().to_string()),
        nominee_name: Set(valid.nominee_name.clone()),
        nominee_first_name: Set(valid.first_name.clone()),
        nominee_last_name: Set(valid.last_name.clone()),
        nominee_email: Set(valid.email.clone()),
        nominee_job_title: Set(valid.job_title.clone()),
        nominee_company: Set(valid.company.clone()),
        linkedin_url: Set(valid.linkedin_url.clone()),
        website_url: Set(valid.website_url.clone()),
        image_url: Set(valid.image_url.clone()),
        why_nominated: Set(valid.why_nominated.clone()),
        nominator_name: Set(valid.nominator_name.clone()),
        nominator_email: Set(valid.nominator_email.clone()),
        status: Set(status.as_str().to_string()),
        live_slug: Set(None),
        source: Set(source.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        moderated_at: Set(approved.then_some(now)),
    };
    let created = row.insert(db).await?;
    if !approved {
        return Ok(created);
    }

    let slug = live_slug(&created.nominee_name, valid.category, created.id);
    let mut active: nomination::ActiveModel = created.into();
    active.live_slug = Set(Some(slug));
    active.update(db).await
}

pub(super) fn duplicate_or_internal(err: DbErr) -> HttpError {
    if is_unique_violation(&err) {
        HttpError::conflict(DUPLICATE_NOMINATION)
    } else {
        HttpError::internal(err)
    }
}

pub(super) fn submitted_event(model: &nomination::Model) -> CrmEvent {
    CrmEvent::NominationSubmitted {
        nomination_id: model.id,
        category: model.category.clone(),
        nominee_type: model.nominee_type.clone(),
        nominee_name: model.nominee_name.clone(),
        nominee_first_name: model.nominee_first_name.clone(),
        nominee_last_name: model.nominee_last_name.clone(),
        nominee_email: model.nominee_email.clone(),
        nominee_linkedin: model.linkedin_url.clone(),
        nominator_name: model.nominator_name.clone(),
        nominator_email: model.nominator_email.clone(),
    }
}

/// Vote totals keyed by nomination id; nominations without votes are absent.
pub(super) async fn vote_totals<C: ConnectionTrait>(
    db: &C,
    nomination_ids: &[i64],
) -> Result<HashMap<i64, i64>, DbErr> {
    if nomination_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows = vote::Entity::find()
        .filter(vote::Column::NominationId.is_in(nomination_ids.iter().copied()))
        .select_only()
        .column(vote::Column::NominationId)
        .column_as(vote::Column::Id.count(), "votes")
        .group_by(vote::Column::NominationId)
        .into_tuple::<(i64, i64)>()
        .all(db)
        .await?;
    Ok(rows.into_iter().collect())
}

pub(super) fn category_label(slug: &str) -> String {
    slug.parse::<Category>()
        .map(|category| category.label().to_string())
        .unwrap_or_else(|_| slug.to_string())
}

fn nominee_summary(model: nomination::Model, votes: i64) -> NomineeSummary {
    NomineeSummary {
        id: model.id,
        slug: model.live_slug.unwrap_or_default(),
        category_label: category_label(&model.category),
        category: model.category,
        nominee_type: model.nominee_type,
        name: model.nominee_name,
        job_title: model.nominee_job_title,
        company: model.nominee_company,
        image_url: model.image_url,
        linkedin_url: model.linkedin_url,
        votes,
    }
}

pub(super) fn nomination_view(model: nomination::Model) -> NominationView {
    let utc = |at: sea_orm::prelude::DateTimeWithTimeZone| -> DateTime<Utc> { at.with_timezone(&Utc) };
    NominationView {
        id: model.id,
        category: model.category,
        nominee_type: model.nominee_type,
        nominee_name: model.nominee_name,
        nominee_first_name: model.nominee_first_name,
        nominee_last_name: model.nominee_last_name,
        nominee_email: model.nominee_email,
        nominee_job_title: model.nominee_job_title,
        nominee_company: model.nominee_company,
        linkedin_url: model.linkedin_url,
        website_url: model.website_url,
        image_url: model.image_url,
        why_nominated: model.why_nominated,
        nominator_name: model.nominator_name,
        nominator_email: model.nominator_email,
        status: model.status,
        live_slug: model.live_slug,
        source: model.source,
        created_at: utc(model.created_at),
        updated_at: utc(model.updated_at),
        moderated_at: model.moderated_at.map(utc),
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Method, Request, StatusCode};
    use serde_json::json;

    use super::super::tests::{json_request, send, test_router};
    use super::*;

    fn person_nomination(linkedin: &str) -> serde_json::Value {
        json!({
            "category": "top-recruiter",
            "nominee": {
                "first_name": "Jane",
                "last_name": "Doe",
                "email": "jane@example.com",
                "linkedin": linkedin
            },
            "nominator": {"name": "John Smith", "email": "john@example.org"},
            "why_nominated": "Placed two hundred nurses during the winter surge."
        })
    }

    #[tokio::test]
    async fn invalid_linkedin_url_is_rejected() {
        let request = json_request(
            Method::POST,
            "/api/nominations",
            person_nomination("https://example.com/in/jane"),
        );
        let (status, body) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Validation failed");
        assert!(body["fields"]["nominee.linkedin"].is_string());
    }

    #[tokio::test]
    async fn all_field_errors_are_reported_together() {
        let request = json_request(
            Method::POST,
            "/api/nominations",
            json!({"category": "top-recruiter", "why_nominated": "short"}),
        );
        let (status, body) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        let fields = body["fields"].as_object().unwrap();
        for field in [
            "nominee.first_name",
            "nominee.last_name",
            "nominee.email",
            "nominee.linkedin",
            "nominator.name",
            "nominator.email",
            "why_nominated",
        ] {
            assert!(fields.contains_key(field), "missing {field}");
        }
    }

    #[tokio::test]
    async fn check_requires_known_category() {
        let request = Request::builder()
            .uri("/api/nominations/check?category=best-dog&email=a@b.com")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["category"].is_string());
    }

    #[tokio::test]
    async fn check_requires_email_or_linkedin() {
        let request = Request::builder()
            .uri("/api/nominations/check?category=top-recruiter")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn nominee_listing_rejects_zero_limit() {
        let request = Request::builder()
            .uri("/api/nominees?limit=0")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn longest_live_slug_reaches_storage() {
        let name = format!("{} {}", "a".repeat(100), "b".repeat(100));
        let slug = live_slug(&name, Category::TopRecruiter, 42);
        let request = Request::builder()
            .uri(format!("/api/nominees/{slug}"))
            .body(Body::empty())
            .unwrap();
        // The test state has no database, so a lookup surfaces as a 500.
        let (status, _) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let oversized = "a".repeat(crate::awards::MAX_SLUG_LEN + 1);
        let request = Request::builder()
            .uri(format!("/api/nominees/{oversized}"))
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(test_router(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[test]
    fn search_pattern_strips_wildcards() {
        assert_eq!(search_pattern(" Jane_D% ").as_deref(), Some("%janed%"));
        assert_eq!(search_pattern("%%"), None);
    }

    #[test]
    fn unknown_category_slug_is_its_own_label() {
        assert_eq!(category_label("top-recruiter"), Category::TopRecruiter.label());
        assert_eq!(category_label("legacy"), "legacy");
    }
}
