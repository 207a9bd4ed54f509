use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use chrono::Utc;
use sea_orm::ActiveValue::Set;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, TransactionTrait,
};
use tracing::{info, warn};

use crate::auth::AdminSession;
use crate::awards::{Category, NominationStatus, SOURCE_BULK, Transition, live_slug};
use crate::entities::{crm_sync_event, nomination, vote};
use crate::models::admin::{
    AdminStatsView, BulkRowError, BulkUploadRequest, BulkUploadResponse, CategoryVoteCount,
    LoginRequest, NominationListQuery, NominationUpdateRequest, SessionView, StatusCounts,
    SyncBacklog, VoteListQuery,
};
use crate::models::nomination::{NominationSubmission, NominationView};
use crate::models::sync::{SyncQuery, SyncSummary};
use crate::models::vote::VoteView;
use crate::sync::{self, CrmEvent, STATUS_FAILED, STATUS_PENDING};
use crate::state::AppState;
use crate::validation::{
    MAX_IMAGE_URL_LEN, MAX_WHY_LEN, MIN_WHY_LEN, ValidNomination, ValidationErrors,
    normalize_optional_url, normalize_text, validate_nomination,
};

use super::nominations::{
    DUPLICATE_NOMINATION, find_duplicate, insert_nomination, nomination_view,
};
use super::{ApiJson, HttpError, Page, is_unique_violation};

const DEFAULT_ADMIN_LIMIT: u64 = 100;
const MAX_ADMIN_LIMIT: u64 = 500;
pub(super) const MAX_BULK_ROWS: usize = 500;
const BULK_NOMINATOR_NAME: &str = "World Staffing Awards";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/session", get(current_session))
        .route("/nominations", get(list_nominations))
        .route("/nominations/bulk", post(bulk_upload))
        .route(
            "/nominations/{id}",
            patch(update_nomination).delete(delete_nomination),
        )
        .route("/votes", get(list_votes))
        .route("/stats", get(stats))
        .route("/sync/hubspot", post(sync_hubspot))
}

async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ApiJson(request): ApiJson<LoginRequest>,
) -> Result<(CookieJar, Json<SessionView>), HttpError> {
    let auth = Arc::clone(&state.auth);
    let LoginRequest { email, password } = request;
    let attempted = email.trim().to_ascii_lowercase();

    let verified = tokio::task::spawn_blocking(move || auth.verify_credentials(&email, &password))
        .await
        .map_err(HttpError::internal)?;

    let email = match verified {
        Ok(email) => email,
        Err(err) => {
            warn!("Rejected admin login for {attempted}");
            return Err(err.into());
        }
    };

    let (token, session) = state.auth.issue_session(&email)?;
    info!("Admin {email} logged in");

    let jar = jar.add(state.auth.session_cookie(token));
    Ok((
        jar,
        Json(SessionView {
            email: session.email,
            expires_at: session.expires_at,
        }),
    ))
}

async fn logout(State(state): State<AppState>, jar: CookieJar) -> (StatusCode, CookieJar) {
    (StatusCode::NO_CONTENT, jar.add(state.auth.removal_cookie()))
}

async fn current_session(session: AdminSession) -> Json<SessionView> {
    Json(SessionView {
        email: session.email,
        expires_at: session.expires_at,
    })
}

async fn list_nominations(
    _session: AdminSession,
    Query(query): Query<NominationListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<NominationView>>, HttpError> {
    let page = Page::from_query(query.limit, query.offset, DEFAULT_ADMIN_LIMIT, MAX_ADMIN_LIMIT)?;

    let mut select = nomination::Entity::find();
    if let Some(raw) = query.status.as_deref().filter(|v| !v.trim().is_empty()) {
        let status = raw.parse::<NominationStatus>()?;
        select = select.filter(nomination::Column::Status.eq(status.as_str()));
    }
    if let Some(raw) = query.category.as_deref().filter(|v| !v.trim().is_empty()) {
        let category = raw.parse::<Category>()?;
        select = select.filter(nomination::Column::Category.eq(category.slug()));
    }

    let models = select
        .order_by_desc(nomination::Column::CreatedAt)
        .order_by_desc(nomination::Column::Id)
        .limit(page.limit)
        .offset(page.offset)
        .all(&state.database)
        .await?;

    Ok(Json(models.into_iter().map(nomination_view).collect()))
}

/// Checked update values; `image_url: Some(None)` removes the image.
#[derive(Debug, Default)]
struct NominationChanges {
    status: Option<NominationStatus>,
    why_nominated: Option<String>,
    image_url: Option<Option<String>>,
}

impl NominationChanges {
    fn parse(request: &NominationUpdateRequest) -> Result<Self, HttpError> {
        let mut errors = ValidationErrors::default();
        let mut changes = Self::default();

        if let Some(raw) = request.status.as_deref() {
            match raw.parse::<NominationStatus>() {
                Ok(status) => changes.status = Some(status),
                Err(err) => errors.add("status", err.to_string()),
            }
        }
        if let Some(raw) = request.why_nominated.as_deref() {
            match normalize_text(Some(raw), MIN_WHY_LEN, MAX_WHY_LEN) {
                Ok(text) => changes.why_nominated = Some(text),
                Err(message) => errors.add("why_nominated", message),
            }
        }
        if let Some(raw) = request.image_url.as_deref() {
            match normalize_optional_url(Some(raw), false, MAX_IMAGE_URL_LEN) {
                Ok(url) => changes.image_url = Some(url),
                Err(message) => errors.add("image_url", message),
            }
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }
        if changes.status.is_none() && changes.why_nominated.is_none() && changes.image_url.is_none()
        {
            return Err(HttpError::bad_request("No changes requested"));
        }
        Ok(changes)
    }
}

async fn update_nomination(
    session: AdminSession,
    Path(id): Path<i64>,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<NominationUpdateRequest>,
) -> Result<Json<NominationView>, HttpError> {
    let changes = NominationChanges::parse(&request)?;

    let txn = state.database.begin().await?;
    let current = nomination::Entity::find_by_id(id)
        .lock_exclusive()
        .one(&txn)
        .await?
        .ok_or_else(|| HttpError::not_found("Nomination not found"))?;

    let previous = current
        .status
        .parse::<NominationStatus>()
        .map_err(HttpError::internal)?;
    let transition = match changes.status {
        Some(to) => previous.transition(to)?,
        None => Transition::Unchanged,
    };

    let category = current.category.parse::<Category>().ok();
    let now = Utc::now().fixed_offset();
    let mut active: nomination::ActiveModel = current.clone().into();

    if let Some(text) = changes.why_nominated {
        active.why_nominated = Set(text);
    }
    if let Some(image_url) = changes.image_url {
        active.image_url = Set(image_url);
    }
    if let Transition::Changed(to) = transition {
        active.status = Set(to.as_str().to_string());
        active.moderated_at = Set(Some(now));
        if to == NominationStatus::Approved && current.live_slug.is_none() {
            let category = category.ok_or_else(|| {
                HttpError::internal(format!("nomination {id} has unknown category"))
            })?;
            active.live_slug = Set(Some(live_slug(&current.nominee_name, category, id)));
        }
    }
    active.updated_at = Set(now);

    let updated = active.update(&txn).await?;

    if let Transition::Changed(to) = transition {
        let event = CrmEvent::NominationStatusChanged {
            nomination_id: updated.id,
            category: updated.category.clone(),
            nominee_name: updated.nominee_name.clone(),
            contact_email: updated
                .nominee_email
                .clone()
                .unwrap_or_else(|| updated.nominator_email.clone()),
            status: to.as_str().to_string(),
            live_slug: updated.live_slug.clone(),
        };
        sync::enqueue(&txn, &event).await?;
    }
    txn.commit().await?;

    if let Transition::Changed(to) = transition {
        state.cache.invalidate_vote_counts();
        info!(
            "Admin {} moved nomination {id} from {previous} to {to}",
            session.email
        );
    } else {
        info!("Admin {} edited nomination {id}", session.email);
    }

    Ok(Json(nomination_view(updated)))
}

async fn delete_nomination(
    session: AdminSession,
    Path(id): Path<i64>,
    State(state): State<AppState>,
) -> Result<StatusCode, HttpError> {
    let result = nomination::Entity::delete_by_id(id)
        .exec(&state.database)
        .await?;
    if result.rows_affected == 0 {
        return Err(HttpError::not_found("Nomination not found"));
    }

    state.cache.invalidate_vote_counts();
    info!("Admin {} deleted nomination {id}", session.email);
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_upload(
    session: AdminSession,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<BulkUploadRequest>,
) -> Result<Json<BulkUploadResponse>, HttpError> {
    let status = match request.status.as_deref() {
        None => NominationStatus::Draft,
        Some(raw) => match raw.parse::<NominationStatus>()? {
            NominationStatus::Rejected => {
                return Err(ValidationErrors::single(
                    "status",
                    "bulk uploads may only be draft or approved",
                )
                .into());
            }
            other => other,
        },
    };

    if request.nominations.is_empty() {
        return Err(HttpError::bad_request("nominations must not be empty"));
    }
    if request.nominations.len() > MAX_BULK_ROWS {
        return Err(HttpError::bad_request(format!(
            "at most {MAX_BULK_ROWS} nominations per upload"
        )));
    }

    let mut response = BulkUploadResponse::default();
    let mut seen = HashSet::new();

    for (index, row) in request.nominations.iter().enumerate() {
        let row = with_nominator_defaults(row, &session.email);
        let valid = match validate_nomination(&row) {
            Ok(valid) => valid,
            Err(errors) => {
                response.failed.push(BulkRowError {
                    index,
                    errors: errors.fields,
                });
                continue;
            }
        };

        let duplicate_error = || BulkRowError {
            index,
            errors: ValidationErrors::single("nominee.linkedin", DUPLICATE_NOMINATION).fields,
        };

        if !seen.insert((valid.category, valid.linkedin_url.clone()))
            || find_duplicate(&state.database, &valid).await?.is_some()
        {
            response.failed.push(duplicate_error());
            continue;
        }

        match insert_bulk_row(&state.database, &valid, status).await {
            Ok(created) => response.inserted.push(created.id),
            Err(err) if is_unique_violation(&err) => response.failed.push(duplicate_error()),
            Err(err) => return Err(HttpError::internal(err)),
        }
    }

    if status == NominationStatus::Approved && !response.inserted.is_empty() {
        state.cache.invalidate_vote_counts();
    }
    info!(
        "Admin {} bulk uploaded {} nomination(s) as {status}, {} rejected",
        session.email,
        response.inserted.len(),
        response.failed.len()
    );

    Ok(Json(response))
}

/// The insert and the slug of an approved row commit as one unit.
async fn insert_bulk_row(
    db: &DatabaseConnection,
    valid: &ValidNomination,
    status: NominationStatus,
) -> Result<nomination::Model, DbErr> {
    let txn = db.begin().await?;
    let created = insert_nomination(&txn, valid, status, SOURCE_BULK).await?;
    txn.commit().await?;
    Ok(created)
}

/// Rows without a nominator are attributed to the awards team and the uploading admin.
fn with_nominator_defaults(row: &NominationSubmission, admin_email: &str) -> NominationSubmission {
    let blank = |value: &Option<String>| value.as_deref().is_none_or(|v| v.trim().is_empty());
    let mut row = row.clone();
    if blank(&row.nominator.name) {
        row.nominator.name = Some(BULK_NOMINATOR_NAME.to_string());
    }
    if blank(&row.nominator.email) {
        row.nominator.email = Some(admin_email.to_string());
    }
    row
}

async fn list_votes(
    _session: AdminSession,
    Query(query): Query<VoteListQuery>,
    State(state): State<AppState>,
) -> Result<Json<Vec<VoteView>>, HttpError> {
    let page = Page::from_query(query.limit, query.offset, DEFAULT_ADMIN_LIMIT, MAX_ADMIN_LIMIT)?;

    let mut select = vote::Entity::find();
    if let Some(raw) = query.category.as_deref().filter(|v| !v.trim().is_empty()) {
        let category = raw.parse::<Category>()?;
        select = select.filter(vote::Column::Category.eq(category.slug()));
    }
    if let Some(nomination_id) = query.nomination_id {
        select = select.filter(vote::Column::NominationId.eq(nomination_id));
    }

    let votes = select
        .order_by_desc(vote::Column::Id)
        .limit(page.limit)
        .offset(page.offset)
        .all(&state.database)
        .await?;

    Ok(Json(votes.into_iter().map(vote_view).collect()))
}

pub(super) fn vote_view(model: vote::Model) -> VoteView {
    VoteView {
        id: model.id,
        nomination_id: model.nomination_id,
        category: model.category,
        voter_email: model.voter_email,
        voter_first_name: model.voter_first_name,
        voter_last_name: model.voter_last_name,
        voter_linkedin_url: model.voter_linkedin_url,
        created_at: model.created_at.with_timezone(&Utc),
    }
}

async fn stats(
    _session: AdminSession,
    State(state): State<AppState>,
) -> Result<Json<AdminStatsView>, HttpError> {
    let by_status = nomination::Entity::find()
        .select_only()
        .column(nomination::Column::Status)
        .column_as(nomination::Column::Id.count(), "total")
        .group_by(nomination::Column::Status)
        .into_tuple::<(String, i64)>()
        .all(&state.database)
        .await?;

    let mut nominations = StatusCounts::default();
    for (status, total) in by_status {
        match status.parse::<NominationStatus>() {
            Ok(NominationStatus::Draft) => nominations.draft += total,
            Ok(NominationStatus::Approved) => nominations.approved += total,
            Ok(NominationStatus::Rejected) => nominations.rejected += total,
            Err(_) => warn!("Ignoring {total} nomination(s) with unknown status {status}"),
        }
    }

    let votes_by_category = vote::Entity::find()
        .select_only()
        .column(vote::Column::Category)
        .column_as(vote::Column::Id.count(), "total")
        .group_by(vote::Column::Category)
        .order_by_asc(vote::Column::Category)
        .into_tuple::<(String, i64)>()
        .all(&state.database)
        .await?
        .into_iter()
        .map(|(category, votes)| CategoryVoteCount { category, votes })
        .collect::<Vec<_>>();

    let backlog = crm_sync_event::Entity::find()
        .filter(crm_sync_event::Column::Status.is_in([STATUS_PENDING, STATUS_FAILED]))
        .select_only()
        .column(crm_sync_event::Column::Status)
        .column_as(crm_sync_event::Column::Id.count(), "total")
        .group_by(crm_sync_event::Column::Status)
        .into_tuple::<(String, i64)>()
        .all(&state.database)
        .await?;

    let mut sync_backlog = SyncBacklog::default();
    for (status, total) in backlog {
        match status.as_str() {
            STATUS_PENDING => sync_backlog.pending = total,
            STATUS_FAILED => sync_backlog.failed = total,
            _ => {}
        }
    }

    Ok(Json(AdminStatsView {
        nominations,
        votes_total: votes_by_category.iter().map(|entry| entry.votes).sum(),
        votes_by_category,
        sync_backlog,
    }))
}

async fn sync_hubspot(
    session: AdminSession,
    Query(query): Query<SyncQuery>,
    State(state): State<AppState>,
) -> Result<Json<SyncSummary>, HttpError> {
    let summary = state
        .crm_sync
        .run_once(query.limit, query.include_failed)
        .await?;
    info!(
        "Admin {} ran HubSpot sync: {} processed, {} failed",
        session.email, summary.processed, summary.failed
    );
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::AUTHORIZATION;
    use axum::http::{Method, Request};
    use serde_json::{Value, json};

    use sea_orm::{DbBackend, MockDatabase};

    use super::super::tests::{json_request, send, test_state};
    use super::super::router;
    use super::*;
    use crate::auth::tests::TEST_ADMIN_EMAIL;
    use crate::awards::NomineeType;

    fn valid_nomination() -> ValidNomination {
        ValidNomination {
            category: Category::TopRecruiter,
            nominee_type: NomineeType::Person,
            nominee_name: "Jane Doe".to_string(),
            first_name: Some("Jane".to_string()),
            last_name: Some("Doe".to_string()),
            email: Some("jane@example.com".to_string()),
            job_title: None,
            company: None,
            linkedin_url: "https://www.linkedin.com/in/janedoe".to_string(),
            website_url: None,
            image_url: None,
            why_nominated: "Placed three hundred candidates.".to_string(),
            nominator_name: BULK_NOMINATOR_NAME.to_string(),
            nominator_email: TEST_ADMIN_EMAIL.to_string(),
        }
    }

    fn stored_nomination(id: i64, live_slug: Option<String>) -> nomination::Model {
        let now = Utc::now().fixed_offset();
        nomination::Model {
            id,
            category: Category::TopRecruiter.slug().to_string(),
            nominee_type: "person".to_string(),
            nominee_name: "Jane Doe".to_string(),
            nominee_first_name: Some("Jane".to_string()),
            nominee_last_name: Some("Doe".to_string()),
            nominee_email: Some("jane@example.com".to_string()),
            nominee_job_title: None,
            nominee_company: None,
            linkedin_url: "https://www.linkedin.com/in/janedoe".to_string(),
            website_url: None,
            image_url: None,
            why_nominated: "Placed three hundred candidates.".to_string(),
            nominator_name: BULK_NOMINATOR_NAME.to_string(),
            nominator_email: TEST_ADMIN_EMAIL.to_string(),
            status: NominationStatus::Approved.as_str().to_string(),
            live_slug,
            source: SOURCE_BULK.to_string(),
            created_at: now,
            updated_at: now,
            moderated_at: Some(now),
        }
    }

    fn authorized(mut request: Request<Body>, state: &AppState) -> Request<Body> {
        let (token, _) = state.auth.issue_session(TEST_ADMIN_EMAIL).unwrap();
        request
            .headers_mut()
            .insert(AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        request
    }

    async fn send_as_admin(request: Request<Body>) -> (StatusCode, Value) {
        let state = test_state();
        let request = authorized(request, &state);
        send(router(state, &[]), request).await
    }

    #[tokio::test]
    async fn approved_bulk_row_and_slug_share_a_transaction() {
        let slug = live_slug("Jane Doe", Category::TopRecruiter, 9);
        let database = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![stored_nomination(9, None)]])
            .append_query_results([vec![stored_nomination(9, Some(slug.clone()))]])
            .into_connection();

        let created = insert_bulk_row(&database, &valid_nomination(), NominationStatus::Approved)
            .await
            .unwrap();
        assert_eq!(created.live_slug.as_deref(), Some(slug.as_str()));

        let log = database.into_transaction_log();
        assert_eq!(log.len(), 1, "{log:?}");
    }

    #[tokio::test]
    async fn failed_slug_update_fails_the_row() {
        let database = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![stored_nomination(9, None)]])
            .append_query_results([Vec::<nomination::Model>::new()])
            .into_connection();

        let result =
            insert_bulk_row(&database, &valid_nomination(), NominationStatus::Approved).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sync_without_hubspot_is_unavailable() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/admin/sync/hubspot")
            .body(Body::empty())
            .unwrap();
        let (status, body) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "HubSpot sync is not configured");
    }

    #[tokio::test]
    async fn update_requires_some_change() {
        let request = json_request(Method::PATCH, "/api/admin/nominations/1", json!({}));
        let (status, body) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "No changes requested");
    }

    #[tokio::test]
    async fn update_rejects_unknown_status() {
        let request = json_request(
            Method::PATCH,
            "/api/admin/nominations/1",
            json!({"status": "published", "why_nominated": "tiny"}),
        );
        let (status, body) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["status"].is_string());
        assert!(body["fields"]["why_nominated"].is_string());
    }

    #[tokio::test]
    async fn bulk_upload_is_bounded() {
        let rows = vec![json!({}); MAX_BULK_ROWS + 1];
        let request = json_request(
            Method::POST,
            "/api/admin/nominations/bulk",
            json!({"nominations": rows}),
        );
        let (status, _) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = json_request(
            Method::POST,
            "/api/admin/nominations/bulk",
            json!({"nominations": []}),
        );
        let (status, _) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn bulk_upload_cannot_reject() {
        let request = json_request(
            Method::POST,
            "/api/admin/nominations/bulk",
            json!({"status": "rejected", "nominations": [{}]}),
        );
        let (status, body) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["fields"]["status"].is_string());
    }

    #[tokio::test]
    async fn bulk_rows_with_errors_are_reported_per_row() {
        // Invalid rows never reach storage, so a disconnected database is enough.
        let request = json_request(
            Method::POST,
            "/api/admin/nominations/bulk",
            json!({"nominations": [
                {"category": "nope"},
                {"category": "top-recruiter", "nominee": {"first_name": "Jane"}}
            ]}),
        );
        let (status, body) = send_as_admin(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["inserted"], json!([]));
        let failed = body["failed"].as_array().unwrap();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0]["index"], 0);
        assert!(failed[0]["errors"]["category"].is_string());
        assert_eq!(failed[1]["index"], 1);
        assert!(failed[1]["errors"]["nominee.last_name"].is_string());
        assert!(failed[1]["errors"].get("nominator.email").is_none());
    }

    #[test]
    fn nominator_defaults_fill_only_blanks() {
        let mut row = NominationSubmission::default();
        row.nominator.name = Some("  ".to_string());
        let filled = with_nominator_defaults(&row, TEST_ADMIN_EMAIL);
        assert_eq!(filled.nominator.name.as_deref(), Some(BULK_NOMINATOR_NAME));
        assert_eq!(filled.nominator.email.as_deref(), Some(TEST_ADMIN_EMAIL));

        row.nominator.email = Some("ops@example.com".to_string());
        let kept = with_nominator_defaults(&row, TEST_ADMIN_EMAIL);
        assert_eq!(kept.nominator.email.as_deref(), Some("ops@example.com"));
    }

    #[test]
    fn empty_image_url_removes_image() {
        let request = NominationUpdateRequest {
            image_url: Some(String::new()),
            ..NominationUpdateRequest::default()
        };
        let changes = NominationChanges::parse(&request).unwrap();
        assert_eq!(changes.image_url, Some(None));
    }
}
