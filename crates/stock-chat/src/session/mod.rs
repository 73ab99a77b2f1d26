//! Per-conversation state passed explicitly through every call

pub mod conversation;

use crate::auth::AuthSession;
use crate::config::AssistantConfig;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

pub use conversation::{ConversationHistory, ConversationTurn, ResolvedInput};

/// Everything one conversation owns
#[derive(Debug)]
pub struct SessionContext {
    id: String,
    /// Only shared mutable state; login holds the write guard while it runs
    pub auth: RwLock<AuthSession>,
    pub conversation: Mutex<ConversationHistory>,
    created_at: DateTime<Utc>,
    last_active_ms: AtomicI64,
}

impl SessionContext {
    pub fn new(id: impl Into<String>, login_timeout: Duration, max_history: usize) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            auth: RwLock::new(AuthSession::new(login_timeout)),
            conversation: Mutex::new(ConversationHistory::new(max_history)),
            created_at: now,
            last_active_ms: AtomicI64::new(now.timestamp_millis()),
        }
    }

    /// Session with the assistant's login timeout and history size
    pub fn from_config(id: impl Into<String>, config: &AssistantConfig) -> Self {
        Self::new(id, config.auth_timeout, config.max_history)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn touch(&self) {
        self.last_active_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.last_active_ms.load(Ordering::Relaxed))
            .single()
            .unwrap_or(self.created_at)
    }

    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        (now - self.last_active())
            .to_std()
            .is_ok_and(|idle| idle > ttl)
    }
}

/// Sessions keyed by conversation id, dropped after an idle TTL
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<SessionContext>>>,
    ttl: Duration,
    login_timeout: Duration,
    max_history: usize,
}

impl SessionManager {
    pub fn new(config: &AssistantConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl: config.session_ttl,
            login_timeout: config.auth_timeout,
            max_history: config.max_history,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Start a conversation with a fresh id
    pub async fn create(&self) -> Arc<SessionContext> {
        self.get_or_create(&Uuid::new_v4().to_string()).await
    }

    /// Existing live session for `id`, or a new one replacing an expired entry
    pub async fn get_or_create(&self, id: &str) -> Arc<SessionContext> {
        let now = Utc::now();
        let existing = self.get(id).await;
        if let Some(session) = existing.filter(|s| !s.is_expired(self.ttl, now)) {
            session.touch();
            return session;
        }

        let session = Arc::new(SessionContext::new(id, self.login_timeout, self.max_history));
        self.sessions
            .write()
            .await
            .insert(id.to_string(), Arc::clone(&session));
        debug!(session = id, "session created");
        session
    }

    pub async fn get(&self, id: &str) -> Option<Arc<SessionContext>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Drop idle sessions; returns how many were removed
    pub async fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(self.ttl, now));
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "expired sessions removed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}
