//! Admin session store and credential verification.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AdminSettings;

const SOURCE: &str = "application::admin::session";

pub const SESSION_COOKIE: &str = "vetrina_session";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("admin login is disabled")]
    Disabled,
}

#[derive(Debug, Clone)]
struct Session {
    expires_at: Instant,
}

/// In-process session store. Tokens are random uuids handed to the client;
/// only their sha256 digests are retained here.
pub struct SessionStore {
    settings: AdminSettings,
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new(settings: AdminSettings) -> Arc<Self> {
        Arc::new(Self {
            settings,
            sessions: DashMap::new(),
        })
    }

    /// Verify credentials and mint a session token on success.
    pub fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let Some(expected_password) = self.settings.password.as_deref() else {
            warn!(target: SOURCE, "login attempt while admin password is unset");
            return Err(AuthError::Disabled);
        };

        let username_ok = constant_time_str_eq(username, &self.settings.username);
        let password_ok = constant_time_str_eq(password, expected_password);
        if !(username_ok && password_ok) {
            return Err(AuthError::InvalidCredentials);
        }

        self.sweep_expired();

        let token = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.sessions.insert(
            digest(&token),
            Session {
                expires_at: Instant::now() + self.settings.session_ttl,
            },
        );

        info!(target: SOURCE, username = %self.settings.username, "admin session opened");
        Ok(token)
    }

    /// Whether this token maps to a live session. Expired entries are
    /// removed on sight.
    pub fn validate(&self, token: &str) -> bool {
        let key = digest(token);
        let Some(session) = self.sessions.get(&key) else {
            return false;
        };

        if session.expires_at <= Instant::now() {
            drop(session);
            self.sessions.remove(&key);
            return false;
        }

        true
    }

    pub fn logout(&self, token: &str) {
        if self.sessions.remove(&digest(token)).is_some() {
            info!(target: SOURCE, "admin session closed");
        }
    }

    pub fn session_ttl(&self) -> Duration {
        self.settings.session_ttl
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    fn sweep_expired(&self) {
        let now = Instant::now();
        self.sessions.retain(|_, session| session.expires_at > now);
    }
}

fn digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn constant_time_str_eq(candidate: &str, expected: &str) -> bool {
    // Hash both sides so the comparison length never depends on input size.
    let candidate = Sha256::digest(candidate.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    candidate.ct_eq(&expected).unwrap_u8() == 1
}
