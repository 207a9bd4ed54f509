use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::HubSpotConfig;

const CONTACT_UPSERT_PATH: &str = "/crm/v3/objects/contacts/batch/upsert";
const MAX_ERROR_BODY_LEN: usize = 512;

#[derive(Debug, Error)]
pub enum HubSpotError {
    #[error("HubSpot request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HubSpot responded with {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("HubSpot rejected {failed} contact(s): {message}")]
    Partial { failed: u64, message: String },
}

/// One contact to create or update, keyed by email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactUpsert {
    pub email: String,
    pub properties: BTreeMap<&'static str, String>,
}

#[derive(Debug, Serialize)]
struct BatchUpsertRequest<'a> {
    inputs: Vec<UpsertInput<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpsertInput<'a> {
    id_property: &'static str,
    id: &'a str,
    properties: &'a BTreeMap<&'static str, String>,
}

/// Error fields of a batch response; 207 Multi-Status carries per-input failures here.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchOutcome {
    #[serde(default)]
    num_errors: u64,
    #[serde(default)]
    errors: Vec<BatchInputError>,
}

#[derive(Debug, Deserialize)]
struct BatchInputError {
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    message: String,
}

impl BatchOutcome {
    fn failed(&self) -> u64 {
        self.num_errors.max(self.errors.len() as u64)
    }

    fn summary(&self) -> String {
        let messages = self
            .errors
            .iter()
            .map(|error| match error.category.as_deref() {
                Some(category) => format!("{category}: {}", error.message),
                None => error.message.clone(),
            })
            .collect::<Vec<_>>();
        if messages.is_empty() {
            "partial batch failure".to_string()
        } else {
            messages.join("; ")
        }
    }
}

#[derive(Clone)]
pub struct HubSpotClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    timeout: Duration,
}

impl HubSpotClient {
    /// `None` when no access token is configured.
    pub fn from_config(config: &HubSpotConfig) -> Result<Option<Self>> {
        let Some(token) = config
            .access_token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
        else {
            return Ok(None);
        };

        let client = Self::new(&config.base_url, token, config.request_timeout())?;
        Ok(Some(client))
    }

    pub fn new(base_url: &str, access_token: &str, timeout: Duration) -> Result<Self> {
        assert!(!base_url.is_empty(), "HubSpot base URL must be provided");
        assert!(
            timeout >= Duration::from_millis(100),
            "Timeout below 100ms is unsafe"
        );

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("wsa-api/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HubSpot HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: access_token.to_string(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub async fn upsert_contacts(&self, contacts: &[ContactUpsert]) -> Result<(), HubSpotError> {
        assert!(
            contacts.len() <= 100,
            "HubSpot batch upsert accepts at most 100 inputs"
        );
        if contacts.is_empty() {
            return Ok(());
        }

        let body = BatchUpsertRequest {
            inputs: contacts
                .iter()
                .map(|contact| UpsertInput {
                    id_property: "email",
                    id: &contact.email,
                    properties: &contact.properties,
                })
                .collect(),
        };

        let url = format!("{}{}", self.base_url, CONTACT_UPSERT_PATH);
        debug!("Upserting {} HubSpot contact(s)", contacts.len());
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let mut body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            truncate_at_char_boundary(&mut body, MAX_ERROR_BODY_LEN);
            return Err(HubSpotError::Status { status, body });
        }

        let outcome: BatchOutcome = serde_json::from_str(&body).unwrap_or_default();
        if status == StatusCode::MULTI_STATUS || outcome.failed() > 0 {
            let mut message = outcome.summary();
            truncate_at_char_boundary(&mut message, MAX_ERROR_BODY_LEN);
            return Err(HubSpotError::Partial {
                failed: outcome.failed().max(1),
                message,
            });
        }

        Ok(())
    }
}

pub(crate) fn truncate_at_char_boundary(value: &mut String, max_len: usize) {
    if value.len() <= max_len {
        return;
    }
    let mut cut = max_len;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
}
