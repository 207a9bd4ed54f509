use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::Deserialize;

const DEFAULT_CONFIG_PATH: &str = "config/api.toml";
const MIN_SESSION_SECRET_LEN: usize = 32;

/// Conventional deployment variables, applied after the file and `WSA__*` layers.
const ENV_OVERRIDES: [(&str, &str); 5] = [
    ("DATABASE_URL", "database.url"),
    ("ADMIN_EMAILS", "admin.emails"),
    ("ADMIN_PASSWORD_HASHES", "admin.password_hashes"),
    ("ADMIN_SESSION_SECRET", "admin.session_secret"),
    ("HUBSPOT_TOKEN", "hubspot.access_token"),
];

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub admin: AdminConfig,
    #[serde(default)]
    pub hubspot: HubSpotConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub defaults: SiteDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ApiConfig {
    pub fn load() -> Result<Self> {
        let configured_path =
            std::env::var("WSA_API_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        assert!(
            configured_path.len() < 4096,
            "Configuration path length exceeds hard limit"
        );

        let mut builder = Config::builder()
            .add_source(File::new(&configured_path, FileFormat::Toml).required(false));

        if let Ok(env_override) = std::env::var("WSA_API_ENV") {
            if !env_override.is_empty() {
                let env_file = format!("config/api.{}.toml", env_override);
                if Path::new(&env_file).exists() {
                    builder = builder.add_source(File::new(&env_file, FileFormat::Toml));
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("WSA")
                .prefix_separator("__")
                .separator("__"),
        );

        for (variable, key) in ENV_OVERRIDES {
            let value = std::env::var(variable).ok().filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(key, value)
                .with_context(|| format!("Failed to apply {variable}"))?;
        }

        let settings = builder
            .build()
            .map_err(|err| map_config_error(err, &configured_path))?;
        let config: Self = settings
            .try_deserialize()
            .context("Failed to deserialize API configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.database.url.trim().is_empty() {
            bail!("database.url (DATABASE_URL) must be specified");
        }
        if self.server.port == 0 {
            bail!("server.port must be greater than zero");
        }
        if self.database.max_connections == 0 || self.database.max_connections > 128 {
            bail!("database.max_connections must be within 1..=128");
        }
        if let Some(min) = self.database.min_connections {
            if min > self.database.max_connections {
                bail!("database.min_connections must not exceed max_connections");
            }
        }
        self.admin.ensure_bounds()?;
        self.hubspot.ensure_bounds()?;
        self.cache.ensure_bounds()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: Option<IpAddr>,
    #[serde(default = "ServerConfig::default_port")]
    pub port: u16,
    /// Front-end origins allowed to call the API with credentials
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: Self::default_port(),
            cors_origins: Vec::new(),
        }
    }
}

impl ServerConfig {
    pub fn address(&self) -> SocketAddr {
        let host = self.host.unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(self.port != 0, "HTTP port cannot be zero");
        SocketAddr::new(host, self.port)
    }

    const fn default_port() -> u16 {
        8080
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "DatabaseConfig::default_max_connections")]
    pub max_connections: u32,
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    const fn default_max_connections() -> u32 {
        10
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AdminConfig {
    /// Comma separated, same order as `password_hashes`
    pub emails: String,
    /// Comma separated bcrypt hashes
    pub password_hashes: String,
    pub session_secret: String,
    #[serde(default = "AdminConfig::default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    #[serde(default = "AdminConfig::default_secure_cookie")]
    pub secure_cookie: bool,
}

impl AdminConfig {
    /// Pairs each configured admin email (lowercased) with its bcrypt hash.
    pub fn credentials(&self) -> Result<Vec<(String, String)>> {
        let emails = split_list(&self.emails);
        let hashes = split_list(&self.password_hashes);
        if emails.is_empty() {
            bail!("admin.emails (ADMIN_EMAILS) must list at least one admin");
        }
        if emails.len() != hashes.len() {
            bail!(
                "admin.emails lists {} entries but admin.password_hashes lists {}",
                emails.len(),
                hashes.len()
            );
        }
        Ok(emails
            .into_iter()
            .map(|email| email.to_ascii_lowercase())
            .zip(hashes)
            .collect())
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    fn ensure_bounds(&self) -> Result<()> {
        self.credentials()?;
        if self.session_secret.len() < MIN_SESSION_SECRET_LEN {
            bail!("admin.session_secret must be at least {MIN_SESSION_SECRET_LEN} bytes");
        }
        if self.session_ttl_secs < 60 || self.session_ttl_secs > 30 * 86_400 {
            bail!("admin.session_ttl_secs must be between one minute and 30 days");
        }
        Ok(())
    }

    const fn default_session_ttl_secs() -> u64 {
        8 * 3600
    }

    const fn default_secure_cookie() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HubSpotConfig {
    #[serde(default = "HubSpotConfig::default_base_url")]
    pub base_url: String,
    pub access_token: Option<String>,
    #[serde(default = "HubSpotConfig::default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "HubSpotConfig::default_batch_size")]
    pub batch_size: u64,
    /// Background sync period; the loop is disabled when unset
    pub sync_interval_secs: Option<u64>,
}

impl Default for HubSpotConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            access_token: None,
            timeout_ms: Self::default_timeout_ms(),
            batch_size: Self::default_batch_size(),
            sync_interval_secs: None,
        }
    }
}

impl HubSpotConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn sync_interval(&self) -> Option<Duration> {
        self.sync_interval_secs.map(Duration::from_secs)
    }

    fn ensure_bounds(&self) -> Result<()> {
        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            bail!("hubspot.base_url must be an http(s) URL");
        }
        if self.timeout_ms < 100 || self.timeout_ms > 60_000 {
            bail!("hubspot.timeout_ms must be within 100..=60000");
        }
        if self.batch_size == 0 || self.batch_size > 500 {
            bail!("hubspot.batch_size must be within 1..=500");
        }
        if let Some(interval) = self.sync_interval_secs {
            if interval < 10 {
                bail!("hubspot.sync_interval_secs must be at least 10");
            }
        }
        Ok(())
    }

    fn default_base_url() -> String {
        "https://api.hubapi.com".to_string()
    }

    const fn default_timeout_ms() -> u64 {
        10_000
    }

    const fn default_batch_size() -> u64 {
        50
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "CacheConfig::default_settings_ttl_secs")]
    pub settings_ttl_secs: u64,
    #[serde(default = "CacheConfig::default_vote_counts_ttl_secs")]
    pub vote_counts_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            settings_ttl_secs: Self::default_settings_ttl_secs(),
            vote_counts_ttl_secs: Self::default_vote_counts_ttl_secs(),
        }
    }
}

impl CacheConfig {
    fn ensure_bounds(&self) -> Result<()> {
        if self.settings_ttl_secs == 0 || self.settings_ttl_secs > 3600 {
            bail!("cache.settings_ttl_secs must be within 1..=3600");
        }
        if self.vote_counts_ttl_secs == 0 || self.vote_counts_ttl_secs > 300 {
            bail!("cache.vote_counts_ttl_secs must be within 1..=300");
        }
        Ok(())
    }

    const fn default_settings_ttl_secs() -> u64 {
        30
    }

    const fn default_vote_counts_ttl_secs() -> u64 {
        5
    }
}

/// Fallbacks for settings rows that have never been written.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteDefaults {
    #[serde(default)]
    pub nominations_open: bool,
    #[serde(default)]
    pub voting_open: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn map_config_error(err: ConfigError, path: &str) -> ConfigError {
    match err {
        ConfigError::NotFound(_) => ConfigError::NotFound(path.to_string()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn admin_config(emails: &str, hashes: &str) -> AdminConfig {
        AdminConfig {
            emails: emails.to_string(),
            password_hashes: hashes.to_string(),
            session_secret: "s".repeat(MIN_SESSION_SECRET_LEN),
            session_ttl_secs: 3600,
            secure_cookie: true,
        }
    }

    #[test]
    fn credentials_pair_emails_with_hashes() {
        let config = admin_config(" Admin@WSA.com , ops@wsa.com", "$2b$04$aaa,$2b$04$bbb");
        let credentials = config.credentials().unwrap();
        assert_eq!(
            credentials,
            vec![
                ("admin@wsa.com".to_string(), "$2b$04$aaa".to_string()),
                ("ops@wsa.com".to_string(), "$2b$04$bbb".to_string()),
            ]
        );
    }

    #[test]
    fn mismatched_credentials_are_rejected() {
        let config = admin_config("a@wsa.com,b@wsa.com", "$2b$04$aaa");
        assert!(config.credentials().is_err());
        assert!(admin_config("", "").credentials().is_err());
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let mut config = admin_config("a@wsa.com", "$2b$04$aaa");
        config.session_secret = "short".to_string();
        assert!(config.ensure_bounds().is_err());
    }

    #[test]
    fn hubspot_defaults_are_valid() {
        let config = HubSpotConfig::default();
        assert!(config.ensure_bounds().is_ok());
        assert_eq!(config.sync_interval(), None);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn cache_bounds() {
        let mut config = CacheConfig::default();
        assert!(config.ensure_bounds().is_ok());
        config.vote_counts_ttl_secs = 0;
        assert!(config.ensure_bounds().is_err());
    }
}
