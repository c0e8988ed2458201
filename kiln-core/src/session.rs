//! Session contract and the built-in stores

use crate::cookies::SetCookie;
use crate::error::Result;
use crate::request::Request;
use async_trait::async_trait;
use kiln_cache::{CacheConfig, TtlCache};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Cookie carrying the session token
pub const SESSION_COOKIE: &str = "kiln_session";

/// A client session.
///
/// Clones share their values, so changes made while handling a request are
/// visible to the store that handed the session out.
#[derive(Debug, Clone)]
pub struct Session {
    token: String,
    backing_id: Option<String>,
    values: Arc<RwLock<HashMap<String, String>>>,
}

impl Session {
    pub fn new(token: impl Into<String>, backing_id: Option<String>) -> Self {
        Self {
            token: token.into(),
            backing_id,
            values: Arc::default(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Identifier of the account or record behind this session, if any
    pub fn backing_id(&self) -> Option<&str> {
        self.backing_id.as_deref()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.values.read().get(key).cloned()
    }

    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.values.write().insert(key.into(), value.into());
    }

    pub fn remove(&self, key: &str) -> Option<String> {
        self.values.write().remove(key)
    }
}

/// Where sessions live.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Start a session with a fresh token
    async fn create(&self, backing_id: Option<String>) -> Result<Session>;

    async fn lookup(&self, token: &str) -> Result<Option<Session>>;

    /// End a session; returns whether it existed
    async fn invalidate(&self, token: &str) -> Result<bool>;
}

/// In-process store; sessions expire a fixed time after creation.
#[derive(Debug)]
pub struct MemorySessionStore {
    sessions: TtlCache<String, Session>,
}

impl MemorySessionStore {
    pub fn new(config: CacheConfig) -> Result<Self> {
        Ok(Self {
            sessions: TtlCache::new("sessions", config)?,
        })
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, backing_id: Option<String>) -> Result<Session> {
        let session = Session::new(uuid::Uuid::new_v4().simple().to_string(), backing_id);
        self.sessions.insert(session.token.clone(), session.clone());
        Ok(session)
    }

    async fn lookup(&self, token: &str) -> Result<Option<Session>> {
        Ok(self.sessions.get(token))
    }

    async fn invalidate(&self, token: &str) -> Result<bool> {
        Ok(self.sessions.invalidate(token))
    }
}

/// Store that remembers nothing: every request gets a new session
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSessionStore;

#[async_trait]
impl SessionStore for NoopSessionStore {
    async fn create(&self, backing_id: Option<String>) -> Result<Session> {
        Ok(Session::new(uuid::Uuid::new_v4().simple().to_string(), backing_id))
    }

    async fn lookup(&self, _token: &str) -> Result<Option<Session>> {
        Ok(None)
    }

    async fn invalidate(&self, _token: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Attach the caller's session to `request`, starting one if needed.
///
/// A new session's token is queued as an `HttpOnly` cookie for the response.
pub(crate) async fn resolve(store: &dyn SessionStore, request: &mut Request) -> Result<()> {
    if request.session().is_some() {
        return Ok(());
    }

    if let Some(token) = request.cookie(SESSION_COOKIE)
        && let Some(session) = store.lookup(token).await?
    {
        request.set_session(session);
        return Ok(());
    }

    let session = store.create(None).await?;
    debug!(path = %request.path(), "session started");
    request.postpone_cookie(SetCookie::new(SESSION_COOKIE, session.token()).http_only());
    request.set_session(session);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Method;
    use std::time::Duration;

    fn store() -> MemorySessionStore {
        MemorySessionStore::new(CacheConfig::new(Duration::from_secs(60), 16)).unwrap()
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = store();
        let session = store.create(Some("user-1".into())).await.unwrap();
        session.set("theme", "dark");

        let found = store.lookup(session.token()).await.unwrap().unwrap();
        assert_eq!(found.backing_id(), Some("user-1"));
        assert_eq!(found.get("theme").as_deref(), Some("dark"));

        assert!(store.invalidate(session.token()).await.unwrap());
        assert!(store.lookup(session.token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_creates_and_reuses() {
        let store = store();

        let mut first = Request::new(Method::Get, "/");
        resolve(&store, &mut first).await.unwrap();
        let token = first.session().unwrap().token().to_string();
        assert_eq!(first.postponed_cookies().len(), 1);
        assert!(first.postponed_cookies()[0].http_only);

        let mut second = Request::new(Method::Get, "/")
            .with_header("Cookie", format!("{}={}", SESSION_COOKIE, token));
        resolve(&store, &mut second).await.unwrap();
        assert_eq!(second.session().unwrap().token(), token);
        assert!(second.postponed_cookies().is_empty());
    }

    #[tokio::test]
    async fn test_noop_store() {
        let mut request = Request::new(Method::Get, "/").with_header("Cookie", "kiln_session=stale");
        resolve(&NoopSessionStore, &mut request).await.unwrap();
        assert_ne!(request.session().unwrap().token(), "stale");
    }
}
