use std::time::Duration;

use anyhow::{Context, Result};
use axum_extra::extract::cookie::{Cookie, SameSite};
use bcrypt::DEFAULT_COST;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::AdminConfig;

pub const SESSION_COOKIE: &str = "wsa_admin_session";
const SESSION_ISSUER: &str = "wsa-api";
const DUMMY_PASSWORD: &str = "wsa-unknown-admin";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Authentication required")]
    MissingSession,
    #[error("Session is invalid or expired")]
    InvalidSession,
    #[error("Failed to issue session: {0}")]
    Signing(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    iat: i64,
    exp: i64,
    iss: String,
}

/// A verified admin, obtained from a successful login or a valid session token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminSession {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

pub struct AdminAuthenticator {
    admins: Vec<(String, String)>,
    dummy_hash: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    session_ttl: Duration,
    secure_cookie: bool,
}

impl AdminAuthenticator {
    pub fn new(config: &AdminConfig) -> Result<Self> {
        let admins = config.credentials()?;
        assert!(!admins.is_empty(), "At least one admin must be configured");

        // Unknown emails are checked against this hash so both failure paths cost one bcrypt run.
        let cost = admins
            .first()
            .and_then(|(_, hash)| bcrypt_cost(hash))
            .unwrap_or(DEFAULT_COST);
        let dummy_hash =
            bcrypt::hash(DUMMY_PASSWORD, cost).context("Failed to prepare dummy password hash")?;

        Ok(Self::with_dummy_hash(config, admins, dummy_hash))
    }

    fn with_dummy_hash(
        config: &AdminConfig,
        admins: Vec<(String, String)>,
        dummy_hash: String,
    ) -> Self {
        let secret = config.session_secret.as_bytes();
        Self {
            admins,
            dummy_hash,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            session_ttl: config.session_ttl(),
            secure_cookie: config.secure_cookie,
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }

    /// Blocking: runs exactly one bcrypt verification whatever the outcome.
    pub fn verify_credentials(&self, email: &str, password: &str) -> Result<String, AuthError> {
        let email = email.trim().to_ascii_lowercase();
        let stored = self
            .admins
            .iter()
            .find(|(admin_email, _)| *admin_email == email);

        let (hash, known) = match stored {
            Some((_, hash)) => (hash.as_str(), true),
            None => (self.dummy_hash.as_str(), false),
        };

        let matches = match bcrypt::verify(password, hash) {
            Ok(matches) => matches,
            Err(err) => {
                warn!("Configured password hash for {email} is unusable: {err}");
                false
            }
        };

        if known && matches {
            Ok(email)
        } else {
            Err(AuthError::InvalidCredentials)
        }
    }

    pub fn issue_session(&self, email: &str) -> Result<(String, AdminSession), AuthError> {
        let now = Utc::now();
        let ttl = chrono::Duration::from_std(self.session_ttl)
            .map_err(|err| AuthError::Signing(err.to_string()))?;
        let expires_at = now + ttl;

        let claims = SessionClaims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
            iss: SESSION_ISSUER.to_string(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|err| AuthError::Signing(err.to_string()))?;

        let session = AdminSession {
            email: email.to_string(),
            expires_at: DateTime::from_timestamp(claims.exp, 0).unwrap_or(expires_at),
        };
        Ok((token, session))
    }

    pub fn verify_session(&self, token: &str) -> Result<AdminSession, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[SESSION_ISSUER]);
        validation.leeway = 5;

        let data = decode::<SessionClaims>(token, &self.decoding_key, &validation)
            .map_err(|_| AuthError::InvalidSession)?;
        let claims = data.claims;

        // Sessions of admins removed from configuration stop working immediately.
        if !self.admins.iter().any(|(email, _)| *email == claims.sub) {
            return Err(AuthError::InvalidSession);
        }

        let expires_at =
            DateTime::from_timestamp(claims.exp, 0).ok_or(AuthError::InvalidSession)?;
        Ok(AdminSession {
            email: claims.sub,
            expires_at,
        })
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        let max_age = i64::try_from(self.session_ttl.as_secs()).unwrap_or(i64::MAX);
        Cookie::build((SESSION_COOKIE, token))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .max_age(time::Duration::seconds(max_age))
            .build()
    }

    pub fn removal_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build((SESSION_COOKIE, ""))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .build();
        cookie.make_removal();
        cookie
    }
}

/// Cost field of a `$2b$<cost>$...` hash.
fn bcrypt_cost(hash: &str) -> Option<u32> {
    hash.split('$')
        .nth(2)
        .and_then(|cost| cost.parse::<u32>().ok())
        .filter(|cost| (4..=31).contains(cost))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const TEST_ADMIN_EMAIL: &str = "admin@worldstaffingawards.com";
    pub(crate) const TEST_ADMIN_PASSWORD: &str = "correct horse battery staple";

    pub(crate) fn test_config(hash: &str) -> AdminConfig {
        AdminConfig {
            emails: TEST_ADMIN_EMAIL.to_string(),
            password_hashes: hash.to_string(),
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
            session_ttl_secs: 3600,
            secure_cookie: false,
        }
    }

    pub(crate) fn test_authenticator() -> AdminAuthenticator {
        let hash = bcrypt::hash(TEST_ADMIN_PASSWORD, 4).unwrap();
        AdminAuthenticator::new(&test_config(&hash)).unwrap()
    }

    #[test]
    fn correct_password_is_accepted_case_insensitively() {
        let auth = test_authenticator();
        let email = auth
            .verify_credentials("  Admin@WorldStaffingAwards.com ", TEST_ADMIN_PASSWORD)
            .unwrap();
        assert_eq!(email, TEST_ADMIN_EMAIL);
    }

    #[test]
    fn failures_are_undifferentiated() {
        let auth = test_authenticator();
        let wrong_password = auth
            .verify_credentials(TEST_ADMIN_EMAIL, "nope")
            .unwrap_err();
        let unknown_email = auth
            .verify_credentials("someone@else.com", TEST_ADMIN_PASSWORD)
            .unwrap_err();
        assert_eq!(wrong_password.to_string(), unknown_email.to_string());
        assert!(matches!(unknown_email, AuthError::InvalidCredentials));
    }

    #[test]
    fn dummy_password_never_logs_in() {
        let auth = test_authenticator();
        assert!(auth.verify_credentials("ghost@wsa.com", DUMMY_PASSWORD).is_err());
    }

    #[test]
    fn malformed_hash_is_a_mismatch() {
        let config = test_config("not-a-bcrypt-hash");
        let admins = config.credentials().unwrap();
        let auth = AdminAuthenticator::with_dummy_hash(
            &config,
            admins,
            bcrypt::hash(DUMMY_PASSWORD, 4).unwrap(),
        );
        assert!(
            auth.verify_credentials(TEST_ADMIN_EMAIL, TEST_ADMIN_PASSWORD)
                .is_err()
        );
    }

    #[test]
    fn session_round_trip() {
        let auth = test_authenticator();
        let (token, issued) = auth.issue_session(TEST_ADMIN_EMAIL).unwrap();
        let verified = auth.verify_session(&token).unwrap();
        assert_eq!(verified, issued);
        assert!(verified.expires_at > Utc::now());
    }

    #[test]
    fn tampered_and_expired_sessions_are_rejected() {
        let auth = test_authenticator();
        let (token, _) = auth.issue_session(TEST_ADMIN_EMAIL).unwrap();
        let mut tampered = token.clone();
        tampered.push('x');
        assert!(auth.verify_session(&tampered).is_err());

        let past = Utc::now() - chrono::Duration::hours(2);
        let expired = SessionClaims {
            sub: TEST_ADMIN_EMAIL.to_string(),
            iat: past.timestamp(),
            exp: past.timestamp() + 60,
            iss: SESSION_ISSUER.to_string(),
        };
        let expired_token =
            encode(&Header::new(Algorithm::HS256), &expired, &auth.encoding_key).unwrap();
        assert!(matches!(
            auth.verify_session(&expired_token),
            Err(AuthError::InvalidSession)
        ));
    }

    #[test]
    fn session_for_unconfigured_admin_is_rejected() {
        let auth = test_authenticator();
        let (token, _) = auth.issue_session("former@wsa.com").unwrap();
        assert!(auth.verify_session(&token).is_err());
    }

    #[test]
    fn session_cookie_is_http_only() {
        let auth = test_authenticator();
        let cookie = auth.session_cookie("token".to_string());
        assert_eq!(cookie.name(), SESSION_COOKIE);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::seconds(3600)));

        let removal = auth.removal_cookie();
        assert_eq!(removal.value(), "");
        assert_eq!(removal.max_age(), Some(time::Duration::ZERO));
    }

    #[test]
    fn cost_is_read_from_hash() {
        assert_eq!(bcrypt_cost("$2b$12$abcdefghijklmnopqrstuv"), Some(12));
        assert_eq!(bcrypt_cost("plain"), None);
    }
}
