//! Password hashing and in-memory session management.
//!
//! Passwords hash to unsalted SHA-256 hex digests. That is deliberately
//! simple and cryptographically weak; a salted, memory-hard KDF would be a
//! drop-in replacement behind [`Authenticator::hash_password`]. Sessions
//! are opaque UUID-v4 tokens held in a process-lifetime map; expiry is
//! evaluated lazily on validate and expired tokens are evicted there.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use data_encoding::HEXLOWER;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::error::{Result, TabletError};

pub const DEFAULT_SESSION_TTL_HOURS: i64 = 24;

/// A live login session.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub expiry: DateTime<Utc>,
}

pub struct Authenticator {
    sessions: HashMap<String, Session>,
    ttl: Duration,
}

impl Authenticator {
    pub fn new(ttl_hours: i64) -> Self {
        Self { sessions: HashMap::new(), ttl: Duration::hours(ttl_hours) }
    }

    /// Hex-encoded SHA-256 digest of the UTF-8 password. Deterministic and
    /// unsalted.
    pub fn hash_password(password: &str) -> String {
        HEXLOWER.encode(&Sha256::digest(password.as_bytes()))
    }

    /// Issue a fresh session token for a user.
    pub fn create_session(&mut self, user_id: i64, username: &str) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            user_id,
            username: username.to_string(),
            expiry: Utc::now() + self.ttl,
        };
        self.sessions.insert(token.clone(), session);
        info!(username, user_id, "session created");
        token
    }

    /// Resolve a token to its session. Missing and unknown tokens fail;
    /// a token at or past its expiry fails and is evicted.
    pub fn validate(&mut self, token: Option<&str>) -> Result<Session> {
        let token = token.ok_or_else(|| TabletError::Auth("invalid session".into()))?;
        let session = self
            .sessions
            .get(token)
            .cloned()
            .ok_or_else(|| TabletError::Auth("invalid session".into()))?;
        if Utc::now() >= session.expiry {
            self.sessions.remove(token);
            info!(username = %session.username, "session expired");
            return Err(TabletError::Auth("session expired".into()));
        }
        Ok(session)
    }

    /// Remove a session if present. A missing token is a no-op.
    pub fn logout(&mut self, token: Option<&str>) {
        if let Some(token) = token {
            self.sessions.remove(token);
        }
    }

    #[cfg(test)]
    fn contains(&self, token: &str) -> bool {
        self.sessions.contains_key(token)
    }
}
