use std::sync::Arc;
use std::time::{Duration, Instant};

use moka::future::Cache;
use sea_orm::DatabaseConnection;

use crate::auth::AdminAuthenticator;
use crate::config::{CacheConfig, SiteDefaults};
use crate::models::vote::VoteCountsView;
use crate::settings::SiteSettings;
use crate::sync::CrmSync;

const SETTINGS_KEY: &str = "site";
/// Vote counts are cached per category plus one entry for the unfiltered view.
const VOTE_COUNTS_CAPACITY: u64 = 32;

#[derive(Clone)]
pub struct AppState {
    pub database: DatabaseConnection,
    pub cache: Arc<ApiCache>,
    pub auth: Arc<AdminAuthenticator>,
    pub crm_sync: Arc<CrmSync>,
    pub defaults: SiteDefaults,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(
        database: DatabaseConnection,
        cache: Arc<ApiCache>,
        auth: Arc<AdminAuthenticator>,
        crm_sync: Arc<CrmSync>,
        defaults: SiteDefaults,
    ) -> Self {
        Self {
            database,
            cache,
            auth,
            crm_sync,
            defaults,
            start_time: Instant::now(),
        }
    }
}

pub struct ApiCache {
    settings: Cache<&'static str, SiteSettings>,
    pub vote_counts: Cache<String, Arc<VoteCountsView>>,
}

impl ApiCache {
    pub fn new(config: &CacheConfig) -> Self {
        assert!(config.settings_ttl_secs > 0, "Settings cache TTL must be positive");
        assert!(
            config.vote_counts_ttl_secs > 0,
            "Vote count cache TTL must be positive"
        );

        let settings = Cache::builder()
            .max_capacity(1)
            .time_to_live(Duration::from_secs(config.settings_ttl_secs))
            .build();

        let vote_counts = Cache::builder()
            .max_capacity(VOTE_COUNTS_CAPACITY)
            .time_to_live(Duration::from_secs(config.vote_counts_ttl_secs))
            .build();

        Self {
            settings,
            vote_counts,
        }
    }

    pub async fn settings(&self) -> Option<SiteSettings> {
        self.settings.get(SETTINGS_KEY).await
    }

    pub async fn store_settings(&self, settings: SiteSettings) {
        self.settings.insert(SETTINGS_KEY, settings).await;
    }

    pub async fn invalidate_settings(&self) {
        self.settings.invalidate(SETTINGS_KEY).await;
    }

    /// Key for the counts view of one category, or all of them.
    pub fn vote_counts_key(category: Option<&str>) -> String {
        category.unwrap_or("*").to_string()
    }

    pub fn invalidate_vote_counts(&self) {
        self.vote_counts.invalidate_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn settings_round_trip_and_invalidate() {
        let cache = ApiCache::new(&CacheConfig::default());
        assert_eq!(cache.settings().await, None);

        let settings = SiteSettings {
            nominations_open: true,
            voting_open: false,
            voting_closes_at: None,
        };
        cache.store_settings(settings.clone()).await;
        assert_eq!(cache.settings().await, Some(settings));

        cache.invalidate_settings().await;
        assert_eq!(cache.settings().await, None);
    }

    #[test]
    fn vote_count_keys_distinguish_all_categories() {
        assert_eq!(ApiCache::vote_counts_key(None), "*");
        assert_eq!(ApiCache::vote_counts_key(Some("top-recruiter")), "top-recruiter");
    }
}
