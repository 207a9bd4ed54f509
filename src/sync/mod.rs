use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sea_orm::ActiveValue::{NotSet, Set};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::entities::crm_sync_event;
use crate::hubspot::{ContactUpsert, HubSpotClient, truncate_at_char_boundary};
use crate::models::sync::{SyncItemResult, SyncSummary};

pub const STATUS_PENDING: &str = "pending";
pub const STATUS_SYNCED: &str = "synced";
pub const STATUS_FAILED: &str = "failed";

const MAX_ERROR_LEN: usize = 1000;

/// Payload stored in `crm_sync_events.payload`; the tag doubles as the `kind` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CrmEvent {
    NominationSubmitted {
        nomination_id: i64,
        category: String,
        nominee_type: String,
        nominee_name: String,
        nominee_first_name: Option<String>,
        nominee_last_name: Option<String>,
        nominee_email: Option<String>,
        nominee_linkedin: String,
        nominator_name: String,
        nominator_email: String,
    },
    NominationStatusChanged {
        nomination_id: i64,
        category: String,
        nominee_name: String,
        contact_email: String,
        status: String,
        live_slug: Option<String>,
    },
    VoteCast {
        vote_id: i64,
        nomination_id: i64,
        category: String,
        nominee_name: String,
        voter_email: String,
        voter_first_name: String,
        voter_last_name: String,
        voter_linkedin: Option<String>,
    },
}

impl CrmEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NominationSubmitted { .. } => "nomination_submitted",
            Self::NominationStatusChanged { .. } => "nomination_status_changed",
            Self::VoteCast { .. } => "vote_cast",
        }
    }

    pub fn subject_email(&self) -> &str {
        match self {
            Self::NominationSubmitted {
                nominator_email, ..
            } => nominator_email,
            Self::NominationStatusChanged { contact_email, .. } => contact_email,
            Self::VoteCast { voter_email, .. } => voter_email,
        }
    }

    /// HubSpot contacts touched by this event, in push order.
    pub fn contacts(&self) -> Vec<ContactUpsert> {
        match self {
            Self::NominationSubmitted {
                nomination_id,
                category,
                nominee_type,
                nominee_name,
                nominee_first_name,
                nominee_last_name,
                nominee_email,
                nominee_linkedin,
                nominator_name,
                nominator_email,
            } => {
                let (first, last) = split_full_name(nominator_name);
                let mut nominator = BTreeMap::from([
                    ("firstname", first),
                    ("lastname", last),
                    ("wsa_role", "nominator".to_string()),
                    ("wsa_category", category.clone()),
                    ("wsa_nominated_name", nominee_name.clone()),
                ]);
                nominator.retain(|_, value| !value.is_empty());

                let mut contacts = vec![ContactUpsert {
                    email: nominator_email.clone(),
                    properties: nominator,
                }];

                if let Some(email) = nominee_email.as_ref().filter(|_| nominee_type == "person") {
                    let mut nominee = BTreeMap::from([
                        ("wsa_role", "nominee".to_string()),
                        ("wsa_category", category.clone()),
                        ("wsa_nomination_id", nomination_id.to_string()),
                        ("wsa_nomination_status", "draft".to_string()),
                        ("wsa_linkedin", nominee_linkedin.clone()),
                    ]);
                    if let Some(first) = nominee_first_name {
                        nominee.insert("firstname", first.clone());
                    }
                    if let Some(last) = nominee_last_name {
                        nominee.insert("lastname", last.clone());
                    }
                    if email != nominator_email {
                        contacts.push(ContactUpsert {
                            email: email.clone(),
                            properties: nominee,
                        });
                    }
                }
                contacts
            }
            Self::NominationStatusChanged {
                nomination_id,
                category,
                contact_email,
                status,
                live_slug,
                ..
            } => {
                let mut properties = BTreeMap::from([
                    ("wsa_category", category.clone()),
                    ("wsa_nomination_id", nomination_id.to_string()),
                    ("wsa_nomination_status", status.clone()),
                ]);
                if let Some(slug) = live_slug {
                    properties.insert("wsa_live_slug", slug.clone());
                }
                vec![ContactUpsert {
                    email: contact_email.clone(),
                    properties,
                }]
            }
            Self::VoteCast {
                category,
                nominee_name,
                voter_email,
                voter_first_name,
                voter_last_name,
                voter_linkedin,
                ..
            } => {
                let mut properties = BTreeMap::from([
                    ("firstname", voter_first_name.clone()),
                    ("lastname", voter_last_name.clone()),
                    ("wsa_role", "voter".to_string()),
                    ("wsa_last_voted_category", category.clone()),
                    ("wsa_last_voted_for", nominee_name.clone()),
                ]);
                if let Some(linkedin) = voter_linkedin {
                    properties.insert("wsa_linkedin", linkedin.clone());
                }
                vec![ContactUpsert {
                    email: voter_email.clone(),
                    properties,
                }]
            }
        }
    }
}

/// Records an event in the outbox; callers pass their transaction to keep it atomic with the write.
pub async fn enqueue<C: ConnectionTrait>(db: &C, event: &CrmEvent) -> Result<(), DbErr> {
    let payload = serde_json::to_value(event).map_err(|err| DbErr::Custom(err.to_string()))?;
    let row = crm_sync_event::ActiveModel {
        id: NotSet,
        kind: Set(event.kind().to_string()),
        subject_email: Set(event.subject_email().to_string()),
        payload: Set(payload),
        status: Set(STATUS_PENDING.to_string()),
        attempts: Set(0),
        last_error: Set(None),
        created_at: Set(Utc::now().fixed_offset()),
        processed_at: Set(None),
    };
    crm_sync_event::Entity::insert(row).exec(db).await?;
    Ok(())
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("HubSpot sync is not configured")]
    NotConfigured,
    #[error("A HubSpot sync run is already in progress")]
    AlreadyRunning,
    #[error("database error during HubSpot sync: {0}")]
    Database(#[from] DbErr),
}

pub struct CrmSync {
    database: DatabaseConnection,
    client: Option<HubSpotClient>,
    batch_size: u64,
    running: Mutex<()>,
}

impl CrmSync {
    pub fn new(database: DatabaseConnection, client: Option<HubSpotClient>, batch_size: u64) -> Self {
        assert!(batch_size > 0, "Sync batch size must be positive");
        Self {
            database,
            client,
            batch_size,
            running: Mutex::new(()),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.client.as_ref().map(HubSpotClient::timeout)
    }

    /// Pushes one batch, oldest first. Failures are recorded per event, never retried here.
    pub async fn run_once(
        &self,
        limit: Option<u64>,
        include_failed: bool,
    ) -> Result<SyncSummary, SyncError> {
        self.run_batch(limit, include_failed, None).await
    }

    /// Stops before the next event once `stop` reads `true`.
    async fn run_batch(
        &self,
        limit: Option<u64>,
        include_failed: bool,
        stop: Option<&watch::Receiver<bool>>,
    ) -> Result<SyncSummary, SyncError> {
        let client = self.client.as_ref().ok_or(SyncError::NotConfigured)?;
        let _guard = self
            .running
            .try_lock()
            .map_err(|_| SyncError::AlreadyRunning)?;

        let limit = limit.unwrap_or(self.batch_size).clamp(1, self.batch_size);
        let events = batch_query(limit, include_failed)
            .all(&self.database)
            .await?;

        let mut summary = SyncSummary::default();
        for event in events {
            if stop.is_some_and(|stop| *stop.borrow()) {
                info!("HubSpot sync interrupted by shutdown after {} event(s)", summary.processed);
                break;
            }

            let outcome = push_event(client, &event).await;
            let (active, mut item) = settle(event, outcome);
            if let Err(err) = active.update(&self.database).await {
                error!("Failed to record HubSpot sync outcome of event {}: {err}", item.event_id);
                item.ok = false;
                item.error = Some(format!("outcome not recorded: {err}"));
            }

            summary.processed += 1;
            if item.ok {
                summary.synced += 1;
            } else {
                summary.failed += 1;
            }
            summary.results.push(item);
        }

        if summary.processed > 0 {
            info!(
                "HubSpot sync processed {} event(s): {} synced, {} failed",
                summary.processed, summary.synced, summary.failed
            );
        }
        Ok(summary)
    }

    /// Periodic drain of pending events until shutdown is signalled.
    pub async fn run(
        self: Arc<Self>,
        interval: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> anyhow::Result<()> {
        assert!(
            interval >= Duration::from_secs(10),
            "Sync interval below 10s is unsupported"
        );
        info!("Starting HubSpot sync loop every {}s", interval.as_secs());

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    match changed {
                        Ok(_) => {
                            if *shutdown.borrow() {
                                info!("HubSpot sync shutdown signal received");
                                break;
                            }
                        }
                        Err(_) => {
                            warn!("Shutdown channel closed unexpectedly. Exiting sync loop");
                            break;
                        }
                    }
                }
                _ = sleep(interval) => {
                    match self.run_batch(None, false, Some(&shutdown)).await {
                        Ok(summary) => debug!("Scheduled HubSpot sync processed {}", summary.processed),
                        Err(SyncError::AlreadyRunning) => debug!("Skipping scheduled sync; a run is in progress"),
                        Err(err) => warn!("Scheduled HubSpot sync failed: {err}"),
                    }
                }
            }
        }

        Ok(())
    }
}

fn batch_query(limit: u64, include_failed: bool) -> Select<crm_sync_event::Entity> {
    let statuses: &[&str] = if include_failed {
        &[STATUS_PENDING, STATUS_FAILED]
    } else {
        &[STATUS_PENDING]
    };
    crm_sync_event::Entity::find()
        .filter(crm_sync_event::Column::Status.is_in(statuses.iter().copied()))
        .order_by_asc(crm_sync_event::Column::Id)
        .limit(limit)
}

/// Applies a push outcome: bumps `attempts`, stamps `processed_at` and sets the status.
fn settle(
    event: crm_sync_event::Model,
    outcome: Result<(), String>,
) -> (crm_sync_event::ActiveModel, SyncItemResult) {
    let event_id = event.id;
    let kind = event.kind.clone();
    let attempts = event.attempts.saturating_add(1);

    let mut active: crm_sync_event::ActiveModel = event.into();
    active.attempts = Set(attempts);
    active.processed_at = Set(Some(Utc::now().fixed_offset()));

    let item = match outcome {
        Ok(()) => {
            active.status = Set(STATUS_SYNCED.to_string());
            active.last_error = Set(None);
            SyncItemResult {
                event_id,
                kind,
                ok: true,
                error: None,
            }
        }
        Err(mut message) => {
            warn!("HubSpot sync of event {event_id} ({kind}) failed: {message}");
            truncate_at_char_boundary(&mut message, MAX_ERROR_LEN);
            active.status = Set(STATUS_FAILED.to_string());
            active.last_error = Set(Some(message.clone()));
            SyncItemResult {
                event_id,
                kind,
                ok: false,
                error: Some(message),
            }
        }
    };
    (active, item)
}

async fn push_event(client: &HubSpotClient, event: &crm_sync_event::Model) -> Result<(), String> {
    let parsed: CrmEvent = serde_json::from_value(event.payload.clone())
        .map_err(|err| format!("unreadable event payload: {err}"))?;
    client
        .upsert_contacts(&parsed.contacts())
        .await
        .map_err(|err| err.to_string())
}

fn split_full_name(name: &str) -> (String, String) {
    match name.trim().split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (name.trim().to_string(), String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use sea_orm::{DbBackend, MockDatabase, QueryTrait};
    use serde_json::json;

    use crate::hubspot::tests::spawn_mock_with;

    fn vote_event() -> CrmEvent {
        CrmEvent::VoteCast {
            vote_id: 3,
            nomination_id: 7,
            category: "top-recruiter".to_string(),
            nominee_name: "Jane Doe".to_string(),
            voter_email: "ann@example.com".to_string(),
            voter_first_name: "Ann".to_string(),
            voter_last_name: "Lee".to_string(),
            voter_linkedin: None,
        }
    }

    fn stored(id: i64, payload: serde_json::Value, status: &str) -> crm_sync_event::Model {
        crm_sync_event::Model {
            id,
            kind: "vote_cast".to_string(),
            subject_email: "ann@example.com".to_string(),
            payload,
            status: status.to_string(),
            attempts: 0,
            last_error: None,
            created_at: Utc::now().fixed_offset(),
            processed_at: None,
        }
    }

    fn stored_vote(id: i64) -> crm_sync_event::Model {
        stored(id, serde_json::to_value(vote_event()).unwrap(), STATUS_PENDING)
    }

    async fn configured_sync(database: DatabaseConnection) -> (CrmSync, crate::hubspot::tests::Captured) {
        let (base_url, captured) = spawn_mock_with(StatusCode::OK, json!({"status": "COMPLETE"})).await;
        let client = HubSpotClient::new(&base_url, "pat-token", Duration::from_secs(5)).unwrap();
        (CrmSync::new(database, Some(client), 10), captured)
    }

    fn submitted(nominee_email: Option<&str>, nominee_type: &str) -> CrmEvent {
        CrmEvent::NominationSubmitted {
            nomination_id: 7,
            category: "top-recruiter".to_string(),
            nominee_type: nominee_type.to_string(),
            nominee_name: "Jane Doe".to_string(),
            nominee_first_name: Some("Jane".to_string()),
            nominee_last_name: Some("Doe".to_string()),
            nominee_email: nominee_email.map(str::to_string),
            nominee_linkedin: "https://www.linkedin.com/in/janedoe".to_string(),
            nominator_name: "John Smith".to_string(),
            nominator_email: "john@example.org".to_string(),
        }
    }

    #[test]
    fn payload_is_tagged_with_kind() {
        let event = submitted(Some("jane@example.com"), "person");
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["kind"], json!(event.kind()));
        assert_eq!(serde_json::from_value::<CrmEvent>(value).unwrap(), event);
    }

    #[test]
    fn submission_upserts_nominator_then_nominee() {
        let contacts = submitted(Some("jane@example.com"), "person").contacts();
        assert_eq!(contacts.len(), 2);
        assert_eq!(contacts[0].email, "john@example.org");
        assert_eq!(contacts[0].properties["firstname"], "John");
        assert_eq!(contacts[0].properties["lastname"], "Smith");
        assert_eq!(contacts[0].properties["wsa_role"], "nominator");
        assert_eq!(contacts[1].email, "jane@example.com");
        assert_eq!(contacts[1].properties["wsa_nomination_id"], "7");
    }

    #[test]
    fn self_nomination_and_companies_touch_one_contact() {
        assert_eq!(submitted(Some("john@example.org"), "person").contacts().len(), 1);
        assert_eq!(submitted(Some("info@acme.com"), "company").contacts().len(), 1);
        assert_eq!(submitted(None, "person").contacts().len(), 1);
    }

    #[test]
    fn vote_cast_maps_voter_contact() {
        let event = CrmEvent::VoteCast {
            vote_id: 3,
            nomination_id: 7,
            category: "top-recruiter".to_string(),
            nominee_name: "Jane Doe".to_string(),
            voter_email: "ann@example.com".to_string(),
            voter_first_name: "Ann".to_string(),
            voter_last_name: "Lee".to_string(),
            voter_linkedin: None,
        };
        assert_eq!(event.subject_email(), "ann@example.com");
        let contacts = event.contacts();
        assert_eq!(contacts.len(), 1);
        assert_eq!(contacts[0].properties["wsa_last_voted_for"], "Jane Doe");
        assert!(!contacts[0].properties.contains_key("wsa_linkedin"));
    }

    #[test]
    fn status_change_carries_slug() {
        let event = CrmEvent::NominationStatusChanged {
            nomination_id: 7,
            category: "top-recruiter".to_string(),
            nominee_name: "Jane Doe".to_string(),
            contact_email: "jane@example.com".to_string(),
            status: "approved".to_string(),
            live_slug: Some("jane-doe-top-recruiter-7".to_string()),
        };
        let contacts = event.contacts();
        assert_eq!(contacts[0].properties["wsa_nomination_status"], "approved");
        assert_eq!(
            contacts[0].properties["wsa_live_slug"],
            "jane-doe-top-recruiter-7"
        );
    }

    #[test]
    fn single_word_names_have_empty_last_name() {
        assert_eq!(split_full_name("Cher"), ("Cher".to_string(), String::new()));
        assert_eq!(
            split_full_name(" Mary Ann  Lee "),
            ("Mary".to_string(), "Ann  Lee".to_string())
        );
    }

    #[tokio::test]
    async fn unconfigured_sync_is_refused() {
        let sync = CrmSync::new(DatabaseConnection::default(), None, 10);
        assert!(!sync.is_configured());
        assert!(matches!(
            sync.run_once(None, false).await,
            Err(SyncError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn overlapping_runs_are_refused() {
        let client =
            HubSpotClient::new("http://127.0.0.1:9", "pat-token", Duration::from_secs(1)).unwrap();
        let sync = CrmSync::new(DatabaseConnection::default(), Some(client), 10);
        let _held = sync.running.try_lock().unwrap();
        assert!(matches!(
            sync.run_once(None, false).await,
            Err(SyncError::AlreadyRunning)
        ));
    }

    #[test]
    fn failed_events_are_selected_only_on_request() {
        let pending = batch_query(5, false).build(DbBackend::Postgres).to_string();
        assert!(pending.contains(r#""status" IN ('pending')"#), "{pending}");
        assert!(pending.contains(r#"ORDER BY "crm_sync_events"."id" ASC"#), "{pending}");
        assert!(pending.contains("LIMIT 5"), "{pending}");

        let retry = batch_query(5, true).build(DbBackend::Postgres).to_string();
        assert!(retry.contains(r#""status" IN ('pending', 'failed')"#), "{retry}");
    }

    #[test]
    fn failure_bumps_attempts_and_keeps_a_bounded_error() {
        let mut event = stored_vote(4);
        event.status = STATUS_FAILED.to_string();
        event.attempts = 2;

        let (active, item) = settle(event, Err("x".repeat(MAX_ERROR_LEN + 50)));
        assert_eq!(active.attempts.clone().unwrap(), 3);
        assert_eq!(active.status.clone().unwrap(), STATUS_FAILED);
        assert_eq!(
            active.last_error.clone().unwrap().map(|error| error.len()),
            Some(MAX_ERROR_LEN)
        );
        assert!(active.processed_at.clone().unwrap().is_some());
        assert!(!item.ok);
        assert_eq!(item.event_id, 4);

        let (active, item) = settle(stored_vote(5), Ok(()));
        assert_eq!(active.status.clone().unwrap(), STATUS_SYNCED);
        assert_eq!(active.attempts.clone().unwrap(), 1);
        assert_eq!(active.last_error.clone().unwrap(), None);
        assert!(item.ok && item.error.is_none());
    }

    #[tokio::test]
    async fn run_once_records_each_outcome() {
        let good = stored_vote(1);
        let unreadable = stored(2, json!({"kind": "mystery"}), STATUS_PENDING);
        let database = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![good.clone(), unreadable.clone()]])
            .append_query_results([vec![good], vec![unreadable]])
            .into_connection();
        let (sync, captured) = configured_sync(database).await;

        let summary = sync.run_once(None, false).await.unwrap();
        assert_eq!((summary.processed, summary.synced, summary.failed), (2, 1, 1));
        assert!(summary.results[0].ok);
        assert_eq!(summary.results[1].event_id, 2);
        assert!(
            summary.results[1]
                .error
                .as_deref()
                .is_some_and(|error| error.starts_with("unreadable event payload"))
        );
        assert_eq!(captured.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unrecorded_outcome_does_not_abort_the_batch() {
        let first = stored_vote(1);
        let second = stored_vote(2);
        let database = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![first.clone(), second.clone()]])
            .append_query_results([Vec::<crm_sync_event::Model>::new(), vec![second]])
            .into_connection();
        let (sync, captured) = configured_sync(database).await;

        let summary = sync.run_once(None, false).await.unwrap();
        assert_eq!((summary.processed, summary.synced, summary.failed), (2, 1, 1));
        assert!(
            summary.results[0]
                .error
                .as_deref()
                .is_some_and(|error| error.starts_with("outcome not recorded"))
        );
        assert!(summary.results[1].ok);
        assert_eq!(captured.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_stops_a_scheduled_batch_before_the_next_event() {
        let database = MockDatabase::new(DbBackend::Postgres)
            .append_query_results([vec![stored_vote(1), stored_vote(2)]])
            .into_connection();
        let (sync, captured) = configured_sync(database).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        let summary = sync.run_batch(None, false, Some(&shutdown_rx)).await.unwrap();
        assert_eq!(summary.processed, 0);
        assert!(captured.lock().unwrap().is_empty());
    }
}
