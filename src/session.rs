use crate::errors::{AppError, AppResult};
use crate::models::{ChatMessage, ChatRole, Role, SessionView};
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Identity and chat history of one interactive session.
#[derive(Debug, Clone, Default)]
pub struct Session {
    pub logged_in: bool,
    pub username: Option<String>,
    pub role: Option<Role>,
    pub messages: Vec<ChatMessage>,
    pub last_seen: DateTime<Utc>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            last_seen: Utc::now(),
            ..Self::default()
        }
    }

    pub fn login(&mut self, username: &str, role: Role) {
        self.logged_in = true;
        self.username = Some(username.to_string());
        self.role = Some(role);
    }

    /// Logout: identity and history both go.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    pub fn is_admin(&self) -> bool {
        self.logged_in && self.role == Some(Role::Admin)
    }

    pub fn push_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
            created_at: Utc::now(),
        });
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            logged_in: self.logged_in,
            username: self.username.clone(),
            role: self.role,
        }
    }
}

pub const DEFAULT_SESSION_TTL_MINUTES: u64 = 8 * 60;

/// Sessions addressed by opaque random tokens. A session idle for longer
/// than the TTL is evicted on the next access to the map.
#[derive(Clone)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Session>>>,
    ttl: TimeDelta,
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::with_ttl_minutes(DEFAULT_SESSION_TTL_MINUTES)
    }
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl_minutes(minutes: u64) -> Self {
        let ttl = i64::try_from(minutes)
            .ok()
            .and_then(TimeDelta::try_minutes)
            .unwrap_or(TimeDelta::MAX);
        Self {
            sessions: Arc::new(Mutex::new(HashMap::new())),
            ttl,
        }
    }

    fn evict_expired(&self, sessions: &mut HashMap<String, Session>, now: DateTime<Utc>) {
        let before = sessions.len();
        sessions.retain(|_, session| now.signed_duration_since(session.last_seen) <= self.ttl);
        let evicted = before - sessions.len();
        if evicted > 0 {
            tracing::debug!(evicted, remaining = sessions.len(), "idle sessions evicted");
        }
    }

    pub async fn open_session(&self, session: Session) -> String {
        self.open_session_at(session, Utc::now()).await
    }

    pub(crate) async fn open_session_at(&self, mut session: Session, now: DateTime<Utc>) -> String {
        let token = Uuid::new_v4().to_string();
        session.last_seen = now;
        let mut sessions = self.sessions.lock().await;
        self.evict_expired(&mut sessions, now);
        sessions.insert(token.clone(), session);
        token
    }

    /// Snapshot of the session behind `token`; unknown or expired tokens read as logged out.
    pub async fn get(&self, token: &str) -> Session {
        self.get_at(token, Utc::now()).await
    }

    pub(crate) async fn get_at(&self, token: &str, now: DateTime<Utc>) -> Session {
        let mut sessions = self.sessions.lock().await;
        self.evict_expired(&mut sessions, now);
        match sessions.get_mut(token) {
            Some(session) => {
                session.last_seen = now;
                session.clone()
            }
            None => Session::new(),
        }
    }

    /// Apply `change` to a live session and return what it produced.
    pub async fn update<T>(&self, token: &str, change: impl FnOnce(&mut Session) -> T) -> AppResult<T> {
        let now = Utc::now();
        let mut sessions = self.sessions.lock().await;
        self.evict_expired(&mut sessions, now);
        let Some(session) = sessions.get_mut(token) else {
            return Err(AppError::Unauthenticated("session expired or unknown".to_string()));
        };
        session.last_seen = now;
        Ok(change(session))
    }

    /// New role for every live session of `username`; returns how many changed.
    pub async fn set_role_for(&self, username: &str, role: Role) -> usize {
        let mut sessions = self.sessions.lock().await;
        let mut changed = 0;
        for session in sessions
            .values_mut()
            .filter(|session| session.logged_in && session.username.as_deref() == Some(username))
        {
            session.role = Some(role);
            changed += 1;
        }
        changed
    }

    pub async fn close_session(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().await;
        sessions.remove(token).is_some()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::{Session, SessionManager};
    use crate::errors::AppError;
    use crate::models::{ChatRole, Role};
    use chrono::{TimeDelta, Utc};

    #[test]
    fn clear_drops_identity_and_history() {
        let mut session = Session::new();
        session.login("ana", Role::Admin);
        session.push_message(ChatRole::User, "Find phishing incidents");
        assert!(session.is_admin());

        session.clear();
        assert!(!session.logged_in);
        assert!(session.username.is_none());
        assert!(session.role.is_none());
        assert!(session.messages.is_empty());
        assert!(!session.is_admin());
    }

    #[tokio::test]
    async fn sessions_are_isolated_by_token() {
        let manager = SessionManager::new();
        let mut admin = Session::new();
        admin.login("root", Role::Admin);
        let admin_token = manager.open_session(admin).await;
        let mut viewer = Session::new();
        viewer.login("viewer", Role::User);
        let viewer_token = manager.open_session(viewer).await;
        assert_ne!(admin_token, viewer_token);

        manager
            .update(&viewer_token, |session| session.push_message(ChatRole::User, "hi"))
            .await
            .expect("update");
        assert!(manager.get(&admin_token).await.messages.is_empty());
        assert_eq!(manager.get(&viewer_token).await.messages.len(), 1);

        assert!(manager.close_session(&viewer_token).await);
        assert!(!manager.get(&viewer_token).await.logged_in);
        assert!(manager.get(&admin_token).await.is_admin());
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn updating_unknown_token_is_unauthenticated() {
        let manager = SessionManager::new();
        let result = manager.update("missing", |session| session.clear()).await;
        assert!(matches!(result, Err(AppError::Unauthenticated(_))));
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_after_the_ttl() {
        let manager = SessionManager::with_ttl_minutes(30);
        let start = Utc::now();
        let mut idle = Session::new();
        idle.login("idle", Role::User);
        let idle_token = manager.open_session_at(idle, start).await;
        let mut busy = Session::new();
        busy.login("busy", Role::User);
        let busy_token = manager.open_session_at(busy, start).await;

        let later = start + TimeDelta::minutes(20);
        assert!(manager.get_at(&busy_token, later).await.logged_in);

        let after_ttl = start + TimeDelta::minutes(45);
        assert!(!manager.get_at(&idle_token, after_ttl).await.logged_in);
        assert!(manager.get_at(&busy_token, after_ttl).await.logged_in);
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn repeated_logins_do_not_outlive_the_ttl() {
        let manager = SessionManager::with_ttl_minutes(5);
        let start = Utc::now();
        for _ in 0..51 {
            let mut session = Session::new();
            session.login("ana", Role::User);
            manager.open_session_at(session, start).await;
        }
        assert_eq!(manager.len().await, 51);

        let mut fresh = Session::new();
        fresh.login("ana", Role::User);
        manager.open_session_at(fresh, start + TimeDelta::minutes(10)).await;
        assert_eq!(manager.len().await, 1);
    }

    #[tokio::test]
    async fn role_changes_reach_every_live_session_of_the_user() {
        let manager = SessionManager::new();
        let mut first = Session::new();
        first.login("rogue", Role::Admin);
        let first = manager.open_session(first).await;
        let mut second = Session::new();
        second.login("rogue", Role::Admin);
        let second = manager.open_session(second).await;
        let mut other = Session::new();
        other.login("lead", Role::Admin);
        let other = manager.open_session(other).await;

        assert_eq!(manager.set_role_for("rogue", Role::User).await, 2);
        assert!(!manager.get(&first).await.is_admin());
        assert!(!manager.get(&second).await.is_admin());
        assert!(manager.get(&other).await.is_admin());
    }
}
