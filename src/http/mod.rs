use std::collections::BTreeMap;
use std::fmt::Display;
use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request, State};
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::request::Parts;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use sea_orm::{DbErr, SqlErr};
use serde::Serialize;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::{MakeSpan, TraceLayer};
use tracing::{Span, error, info, info_span, warn};

use crate::auth::{AdminSession, AuthError, SESSION_COOKIE};
use crate::awards::{StatusError, UnknownCategory};
use crate::state::AppState;
use crate::sync::SyncError;
use crate::validation::ValidationErrors;

mod admin;
mod export;
mod nominations;
mod settings;
mod votes;

pub fn router(state: AppState, cors_origins: &[String]) -> Router {
    let admin_router = admin::router()
        .merge(settings::admin_router())
        .merge(export::router());

    let api_router = Router::new()
        .merge(nominations::router())
        .merge(votes::router())
        .merge(settings::router())
        .nest("/admin", admin_router);

    Router::new()
        .route("/health", get(health_live))
        .route("/health/ready", get(health_ready))
        .nest("/api", api_router)
        .layer(http_trace_layer())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(cors_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([ACCEPT, AUTHORIZATION, CONTENT_TYPE])
        .max_age(Duration::from_secs(3600));

    let origins = cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin}");
                None
            }
        })
        .collect::<Vec<_>>();

    // Without configured origins the admin cookie cannot cross origins at all.
    if origins.is_empty() {
        return cors.allow_origin(Any);
    }
    cors.allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
}

type HttpTraceLayer = TraceLayer<SharedClassifier<ServerErrorsAsFailures>, HttpMakeSpan>;

fn http_trace_layer() -> HttpTraceLayer {
    TraceLayer::new_for_http().make_span_with(HttpMakeSpan)
}

#[derive(Clone, Debug, Default)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &axum::http::Request<B>) -> Span {
        info_span!(
            "http.request",
            method = %request.method(),
            path = %request.uri().path(),
        )
    }
}

async fn health_live(State(state): State<AppState>) -> Result<Json<HealthResponse>, HttpError> {
    let response = HealthResponse {
        status: "live",
        uptime_seconds: state.start_time.elapsed().as_secs(),
    };
    Ok(Json(response))
}

async fn health_ready(State(state): State<AppState>) -> Result<Json<ReadyResponse>, HttpError> {
    state
        .database
        .ping()
        .await
        .map_err(|err| HttpError::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()))?;

    let hubspot_timeout_ms = state
        .crm_sync
        .request_timeout()
        .map(|timeout| u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));

    let response = ReadyResponse {
        status: "ready",
        hubspot_configured: hubspot_timeout_ms.is_some(),
        hubspot_timeout_ms,
        cache_entries: CacheSummary {
            vote_counts: state.cache.vote_counts.entry_count(),
        },
    };
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ReadyResponse {
    status: &'static str,
    hubspot_configured: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    hubspot_timeout_ms: Option<u64>,
    cache_entries: CacheSummary,
}

#[derive(Debug, Serialize)]
struct CacheSummary {
    vote_counts: u64,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    message: String,
    fields: Option<BTreeMap<String, String>>,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        assert!(status != StatusCode::OK, "Error status cannot be 200");
        assert!(!message.is_empty(), "Error message cannot be empty");
        Self {
            status,
            message,
            fields: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Logs the cause; clients only see a generic message.
    pub fn internal(cause: impl Display) -> Self {
        error!("Internal error: {cause}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }

    pub fn with_fields(mut self, fields: BTreeMap<String, String>) -> Self {
        self.fields = (!fields.is_empty()).then_some(fields);
        self
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            info!("HTTP error {}: {}", self.status.as_u16(), self.message);
        }
        let body = Json(ErrorBody {
            error: self.message,
            fields: self.fields,
        });
        (self.status, body).into_response()
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<BTreeMap<String, String>>,
}

impl From<ValidationErrors> for HttpError {
    fn from(errors: ValidationErrors) -> Self {
        Self::bad_request("Validation failed").with_fields(errors.fields)
    }
}

impl From<UnknownCategory> for HttpError {
    fn from(err: UnknownCategory) -> Self {
        Self::from(ValidationErrors::single("category", err.to_string()))
    }
}

impl From<AuthError> for HttpError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Signing(cause) => Self::internal(cause),
            other => Self::new(StatusCode::UNAUTHORIZED, other.to_string()),
        }
    }
}

impl From<StatusError> for HttpError {
    fn from(err: StatusError) -> Self {
        match err {
            StatusError::Unknown(_) => {
                Self::from(ValidationErrors::single("status", err.to_string()))
            }
            StatusError::InvalidTransition { .. } => Self::conflict(err.to_string()),
        }
    }
}

impl From<SyncError> for HttpError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::NotConfigured => Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            SyncError::AlreadyRunning => Self::conflict(err.to_string()),
            SyncError::Database(cause) => Self::internal(cause),
        }
    }
}

impl From<DbErr> for HttpError {
    fn from(err: DbErr) -> Self {
        Self::internal(err)
    }
}

pub(crate) fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

/// `Json` whose rejections render as `HttpError` bodies.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(request, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(HttpError::new(rejection.status(), rejection.body_text())),
        }
    }
}

impl FromRequestParts<AppState> for AdminSession {
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let token = jar
            .get(SESSION_COOKIE)
            .map(|cookie| cookie.value().to_string())
            .filter(|value| !value.is_empty())
            .or_else(|| bearer_token(parts))
            .ok_or(AuthError::MissingSession)?;

        Ok(state.auth.verify_session(&token)?)
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Page {
    pub limit: u64,
    pub offset: u64,
}

impl Page {
    /// Clamps `limit` to `max_limit`; a zero limit is rejected.
    pub fn from_query(
        limit: Option<u64>,
        offset: Option<u64>,
        default_limit: u64,
        max_limit: u64,
    ) -> Result<Self, HttpError> {
        assert!(default_limit > 0 && default_limit <= max_limit);
        let requested = limit.unwrap_or(default_limit);
        if requested == 0 {
            return Err(HttpError::bad_request("limit must be positive"));
        }
        let offset = offset.unwrap_or(0);
        if offset > i64::MAX as u64 {
            return Err(HttpError::bad_request("offset is out of range"));
        }
        Ok(Self {
            limit: requested.min(max_limit),
            offset,
        })
    }
}
