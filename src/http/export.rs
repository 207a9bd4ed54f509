use axum::extract::{Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::SecondsFormat;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::Serialize;
use tracing::info;

use crate::auth::AdminSession;
use crate::awards::{Category, NominationStatus};
use crate::entities::{nomination, vote};
use crate::models::admin::NominationListQuery;
use crate::state::AppState;

use super::HttpError;

const NOMINATION_HEADERS: [&str; 18] = [
    "id",
    "category",
    "nominee_type",
    "nominee_name",
    "nominee_email",
    "nominee_job_title",
    "nominee_company",
    "linkedin_url",
    "website_url",
    "image_url",
    "why_nominated",
    "nominator_name",
    "nominator_email",
    "status",
    "live_slug",
    "source",
    "created_at",
    "moderated_at",
];

const VOTE_HEADERS: [&str; 9] = [
    "id",
    "nomination_id",
    "nominee_name",
    "category",
    "voter_email",
    "voter_first_name",
    "voter_last_name",
    "voter_linkedin_url",
    "created_at",
];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/export/nominations.csv", get(export_nominations))
        .route("/export/votes.csv", get(export_votes))
}

#[derive(Debug, Serialize)]
struct NominationRow {
    id: i64,
    category: String,
    nominee_type: String,
    nominee_name: String,
    nominee_email: Option<String>,
    nominee_job_title: Option<String>,
    nominee_company: Option<String>,
    linkedin_url: String,
    website_url: Option<String>,
    image_url: Option<String>,
    why_nominated: String,
    nominator_name: String,
    nominator_email: String,
    status: String,
    live_slug: Option<String>,
    source: String,
    created_at: String,
    moderated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct VoteRow {
    id: i64,
    nomination_id: i64,
    nominee_name: String,
    category: String,
    voter_email: String,
    voter_first_name: String,
    voter_last_name: String,
    voter_linkedin_url: Option<String>,
    created_at: String,
}

async fn export_nominations(
    session: AdminSession,
    Query(query): Query<NominationListQuery>,
    State(state): State<AppState>,
) -> Result<Response, HttpError> {
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
        .order_by_asc(nomination::Column::Id)
        .all(&state.database)
        .await?;

    let rows = models.into_iter().map(|model| NominationRow {
        id: model.id,
        category: model.category,
        nominee_type: model.nominee_type,
        nominee_name: sanitize_cell(model.nominee_name),
        nominee_email: model.nominee_email,
        nominee_job_title: model.nominee_job_title.map(sanitize_cell),
        nominee_company: model.nominee_company.map(sanitize_cell),
        linkedin_url: model.linkedin_url,
        website_url: model.website_url,
        image_url: model.image_url,
        why_nominated: sanitize_cell(model.why_nominated),
        nominator_name: sanitize_cell(model.nominator_name),
        nominator_email: model.nominator_email,
        status: model.status,
        live_slug: model.live_slug,
        source: model.source,
        created_at: model.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        moderated_at: model
            .moderated_at
            .map(|at| at.to_rfc3339_opts(SecondsFormat::Secs, true)),
    });

    let (body, count) = write_csv(&NOMINATION_HEADERS, rows).map_err(HttpError::internal)?;
    info!("Admin {} exported {count} nomination(s)", session.email);
    Ok(csv_response("nominations.csv", body))
}

async fn export_votes(
    session: AdminSession,
    State(state): State<AppState>,
) -> Result<Response, HttpError> {
    let votes = vote::Entity::find()
        .find_also_related(nomination::Entity)
        .order_by_asc(vote::Column::Id)
        .all(&state.database)
        .await?;

    let rows = votes.into_iter().map(|(vote, nominee)| VoteRow {
        id: vote.id,
        nomination_id: vote.nomination_id,
        nominee_name: nominee
            .map(|nominee| sanitize_cell(nominee.nominee_name))
            .unwrap_or_default(),
        category: vote.category,
        voter_email: vote.voter_email,
        voter_first_name: sanitize_cell(vote.voter_first_name),
        voter_last_name: sanitize_cell(vote.voter_last_name),
        voter_linkedin_url: vote.voter_linkedin_url,
        created_at: vote.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
    });

    let (body, count) = write_csv(&VOTE_HEADERS, rows).map_err(HttpError::internal)?;
    info!("Admin {} exported {count} vote(s)", session.email);
    Ok(csv_response("votes.csv", body))
}

/// Header row first so that an empty export is still a valid sheet.
fn write_csv<T: Serialize>(
    headers: &[&str],
    rows: impl IntoIterator<Item = T>,
) -> Result<(Vec<u8>, usize), csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(headers)?;

    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }

    let body = writer
        .into_inner()
        .map_err(|err| csv::Error::from(err.into_error()))?;
    Ok((body, count))
}

/// Prefixes values a spreadsheet would evaluate as a formula.
fn sanitize_cell(value: String) -> String {
    if value.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{value}")
    } else {
        value
    }
}

fn csv_response(filename: &str, body: Vec<u8>) -> Response {
    (
        [
            (CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        body,
    )
        .into_response()
}
