use axum::extract::State;
use axum::routing::{get, patch};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use sea_orm::TransactionTrait;
use tracing::info;

use crate::auth::AdminSession;
use crate::models::settings::{SettingsUpdateRequest, SiteSettingsView};
use crate::settings::{
    self as site_settings, KEY_NOMINATIONS_OPEN, KEY_VOTING_CLOSES_AT, KEY_VOTING_OPEN,
    SiteSettings,
};
use crate::state::AppState;
use crate::validation::ValidationErrors;

use super::{ApiJson, HttpError};

pub fn router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings))
}

pub fn admin_router() -> Router<AppState> {
    Router::new().route("/settings", patch(update_settings))
}

/// Effective settings, served from cache when fresh.
pub(super) async fn current_settings(state: &AppState) -> Result<SiteSettings, HttpError> {
    if let Some(cached) = state.cache.settings().await {
        return Ok(cached);
    }
    let loaded = site_settings::load(&state.database, &state.defaults).await?;
    state.cache.store_settings(loaded.clone()).await;
    Ok(loaded)
}

async fn get_settings(State(state): State<AppState>) -> Result<Json<SiteSettingsView>, HttpError> {
    let settings = current_settings(&state).await?;
    Ok(Json(settings.view(Utc::now())))
}

async fn update_settings(
    session: AdminSession,
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SettingsUpdateRequest>,
) -> Result<Json<SiteSettingsView>, HttpError> {
    let closes_at = match request.voting_closes_at.as_deref().map(str::trim) {
        None => None,
        Some("") => Some(None),
        Some(raw) => {
            let parsed = DateTime::parse_from_rfc3339(raw).map_err(|_| {
                ValidationErrors::single("voting_closes_at", "must be an RFC 3339 timestamp")
            })?;
            Some(Some(parsed.with_timezone(&Utc)))
        }
    };

    if request.nominations_open.is_none() && request.voting_open.is_none() && closes_at.is_none() {
        return Err(HttpError::bad_request("No settings to update"));
    }

    let txn = state.database.begin().await?;
    if let Some(open) = request.nominations_open {
        site_settings::store(&txn, KEY_NOMINATIONS_OPEN, open.to_string()).await?;
    }
    if let Some(open) = request.voting_open {
        site_settings::store(&txn, KEY_VOTING_OPEN, open.to_string()).await?;
    }
    if let Some(closes_at) = closes_at {
        let value = closes_at.map(|at| at.to_rfc3339()).unwrap_or_default();
        site_settings::store(&txn, KEY_VOTING_CLOSES_AT, value).await?;
    }
    txn.commit().await?;

    state.cache.invalidate_settings().await;
    info!("Site settings updated by {}", session.email);

    let settings = current_settings(&state).await?;
    Ok(Json(settings.view(Utc::now())))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    use super::super::tests::{json_request, send, test_state};
    use super::super::router;
    use crate::auth::tests::TEST_ADMIN_EMAIL;

    #[tokio::test]
    async fn invalid_closing_time_is_rejected_before_storage() {
        let state = test_state();
        let (token, _) = state.auth.issue_session(TEST_ADMIN_EMAIL).unwrap();
        let mut request = json_request(
            Method::PATCH,
            "/api/admin/settings",
            json!({"voting_closes_at": "next friday"}),
        );
        request.headers_mut().insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let (status, body) = send(router(state, &[]), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["fields"]["voting_closes_at"], "must be an RFC 3339 timestamp");
    }

    #[tokio::test]
    async fn empty_update_is_rejected() {
        let state = test_state();
        let (token, _) = state.auth.issue_session(TEST_ADMIN_EMAIL).unwrap();
        let mut request = json_request(Method::PATCH, "/api/admin/settings", json!({}));
        request.headers_mut().insert(
            axum::http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().unwrap(),
        );
        let (status, _) = send(router(state, &[]), request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
