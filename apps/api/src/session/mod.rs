//! Per-browser session state: the resume text a user uploaded.
//!
//! Sessions are identified by an opaque cookie and held in memory only. A
//! re-upload overwrites the previous context; idle entries expire after the
//! configured TTL and are purged by a background sweeper.

use std::sync::Arc;
use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "resume_chat_session";

/// Extracted resume text plus what the upload endpoint reported about it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResumeContext {
    #[serde(skip)]
    pub text: String,
    pub file_type: String,
    pub content_length: usize,
    pub truncated: bool,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SessionEntry {
    context: ResumeContext,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    entries: Arc<DashMap<Uuid, SessionEntry>>,
    ttl: chrono::Duration,
}

impl SessionStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            ttl: chrono::Duration::seconds(ttl_secs),
        }
    }

    /// Stores `context` for the session, returning whatever it replaced.
    pub fn put(&self, id: Uuid, context: ResumeContext) -> Option<ResumeContext> {
        let entry = SessionEntry {
            context,
            expires_at: Utc::now() + self.ttl,
        };
        self.entries.insert(id, entry).map(|old| old.context)
    }

    /// Returns a copy of the session's context and slides its expiry forward.
    pub fn get(&self, id: Uuid) -> Option<ResumeContext> {
        self.get_at(id, Utc::now())
    }

    fn get_at(&self, id: Uuid, now: DateTime<Utc>) -> Option<ResumeContext> {
        self.entries.remove_if(&id, |_, entry| entry.expires_at <= now);
        let mut entry = self.entries.get_mut(&id)?;
        entry.expires_at = now + self.ttl;
        Some(entry.context.clone())
    }

    pub fn remove(&self, id: Uuid) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub fn purge_expired(&self) -> usize {
        self.purge_expired_at(Utc::now())
    }

    fn purge_expired_at(&self, now: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Spawns the task that periodically drops expired sessions.
pub fn spawn_sweeper(store: SessionStore, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                debug!("Purged {purged} expired sessions ({} live)", store.len());
            }
        }
    })
}

/// Reads the session id from the request cookies, if it is a valid one.
pub fn session_id(jar: &CookieJar) -> Option<Uuid> {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| Uuid::parse_str(cookie.value()).ok())
}

/// Returns the existing session id, or mints one and adds its cookie to the jar.
pub fn ensure_session(jar: CookieJar) -> (CookieJar, Uuid) {
    if let Some(id) = session_id(&jar) {
        return (jar, id);
    }

    let id = Uuid::new_v4();
    let cookie = Cookie::build((SESSION_COOKIE, id.to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build();
    (jar.add(cookie), id)
}
