use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, TransactionTrait,
};
use tracing::info;

use crate::awards::{Category, NominationStatus};
use crate::entities::{nomination, vote};
use crate::models::vote::{
    VoteCastResponse, VoteCheckQuery, VoteCheckResponse, VoteCountEntry, VoteCountsQuery,
    VoteCountsView, VoteSubmission,
};
use crate::state::{ApiCache, AppState};
use crate::sync::{self, CrmEvent};
use crate::validation::{ValidationErrors, normalize_email, validate_vote};

use super::nominations::vote_totals;
use super::settings::current_settings;
use super::{ApiJson, HttpError, is_unique_violation};

const DUPLICATE_VOTE: &str = "You have already voted in this category";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/votes", post(cast_vote))
        .route("/votes/counts", get(vote_counts))
        .route("/votes/check", get(check_vote))
}

async fn cast_vote(
    State(state): State<AppState>,
    ApiJson(submission): ApiJson<VoteSubmission>,
) -> Result<Json<VoteCastResponse>, HttpError> {
    let valid = validate_vote(&submission)?;

    let settings = current_settings(&state).await?;
    if !settings.voting_active_at(Utc::now()) {
        return Err(HttpError::forbidden("Voting is closed"));
    }

    let nominee = nomination::Entity::find_by_id(valid.nomination_id)
        .one(&state.database)
        .await?
        .filter(|model| model.status == NominationStatus::Approved.as_str())
        .ok_or_else(|| HttpError::not_found("Nominee not found"))?;

    let already_voted = vote::Entity::find()
        .filter(vote::Column::VoterEmail.eq(valid.email.as_str()))
        .filter(vote::Column::Category.eq(nominee.category.as_str()))
        .count(&state.database)
        .await?;
    if already_voted > 0 {
        return Err(HttpError::conflict(DUPLICATE_VOTE));
    }

    let row = vote::ActiveModel {
        id: NotSet,
        nomination_id: Set(nominee.id),
        category: Set(nominee.category.clone()),
        voter_email: Set(valid.email.clone()),
        voter_first_name: Set(valid.first_name.clone()),
        voter_last_name: Set(valid.last_name.clone()),
        voter_linkedin_url: Set(valid.linkedin_url.clone()),
        created_at: Set(Utc::now().fixed_offset()),
    };

    let txn = state.database.begin().await?;
    let created = row.insert(&txn).await.map_err(|err| {
        if is_unique_violation(&err) {
            HttpError::conflict(DUPLICATE_VOTE)
        } else {
            HttpError::internal(err)
        }
    })?;
    let event = CrmEvent::VoteCast {
        vote_id: created.id,
        nomination_id: nominee.id,
        category: nominee.category.clone(),
        nominee_name: nominee.nominee_name.clone(),
        voter_email: created.voter_email.clone(),
        voter_first_name: created.voter_first_name.clone(),
        voter_last_name: created.voter_last_name.clone(),
        voter_linkedin: created.voter_linkedin_url.clone(),
    };
    sync::enqueue(&txn, &event).await?;
    txn.commit().await?;

    state.cache.invalidate_vote_counts();

    let total_votes = vote::Entity::find()
        .filter(vote::Column::NominationId.eq(nominee.id))
        .count(&state.database)
        .await?;
    let total_votes = i64::try_from(total_votes).map_err(HttpError::internal)?;

    info!("Vote {} cast for nomination {}", created.id, nominee.id);

    Ok(Json(VoteCastResponse {
        id: created.id,
        nomination_id: nominee.id,
        category: nominee.category,
        total_votes,
    }))
}

async fn vote_counts(
    Query(query): Query<VoteCountsQuery>,
    State(state): State<AppState>,
) -> Result<Json<VoteCountsView>, HttpError> {
    let category = query
        .category
        .as_deref()
        .filter(|raw| !raw.trim().is_empty())
        .map(str::parse::<Category>)
        .transpose()?;

    let cache_key = ApiCache::vote_counts_key(category.map(Category::slug));
    if let Some(cached) = state.cache.vote_counts.get(&cache_key).await {
        return Ok(Json((*cached).clone()));
    }

    let mut select = nomination::Entity::find()
        .filter(nomination::Column::Status.eq(NominationStatus::Approved.as_str()));
    if let Some(category) = category {
        select = select.filter(nomination::Column::Category.eq(category.slug()));
    }
    let nominees = select.all(&state.database).await?;

    let ids = nominees.iter().map(|model| model.id).collect::<Vec<_>>();
    let totals = vote_totals(&state.database, &ids).await?;

    let mut entries = nominees
        .into_iter()
        .map(|model| VoteCountEntry {
            votes: totals.get(&model.id).copied().unwrap_or(0),
            nomination_id: model.id,
            slug: model.live_slug,
            name: model.nominee_name,
            category: model.category,
        })
        .collect::<Vec<_>>();
    sort_by_votes(&mut entries);

    let view = VoteCountsView {
        category: category.map(|category| category.slug().to_string()),
        total_votes: entries.iter().map(|entry| entry.votes).sum(),
        nominees: entries,
        generated_at: Utc::now(),
    };

    state
        .cache
        .vote_counts
        .insert(cache_key, Arc::new(view.clone()))
        .await;

    Ok(Json(view))
}

async fn check_vote(
    Query(query): Query<VoteCheckQuery>,
    State(state): State<AppState>,
) -> Result<Json<VoteCheckResponse>, HttpError> {
    let mut errors = ValidationErrors::default();
    let email = match normalize_email(query.email.as_deref()) {
        Ok(email) => Some(email),
        Err(message) => {
            errors.add("email", message);
            None
        }
    };
    let category = match query.category.as_deref().map(str::parse::<Category>) {
        Some(Ok(category)) => Some(category),
        Some(Err(err)) => {
            errors.add("category", err.to_string());
            None
        }
        None => {
            errors.add("category", "is required");
            None
        }
    };
    let (Some(email), Some(category)) = (email, category) else {
        return Err(errors.into());
    };

    let existing = vote::Entity::find()
        .filter(vote::Column::VoterEmail.eq(email))
        .filter(vote::Column::Category.eq(category.slug()))
        .one(&state.database)
        .await?;

    Ok(Json(VoteCheckResponse {
        has_voted: existing.is_some(),
        nomination_id: existing.map(|vote| vote.nomination_id),
    }))
}

/// Most votes first; ties broken by name so polling clients see a stable order.
fn sort_by_votes(entries: &mut [VoteCountEntry]) {
    entries.sort_by(|a, b| {
        b.votes
            .cmp(&a.votes)
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.nomination_id.cmp(&b.nomination_id))
    });
}
