//! Session store: the single source of truth for who is logged in.
//!
//! The whole [`Session`] is swapped under one write lock, so `user`, `token`
//! and `is_authenticated` always change together. Every mutation is written
//! through to storage: the full record under [`SESSION_KEY`] and the raw token
//! under [`TOKEN_KEY`], where [`ApiClient`] picks it up for the bearer header.
//!
//! Two overlapping `login` calls are not ordered: whichever response arrives
//! last wins.

use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use thiserror::Error;

use crate::http::{ApiClient, ApiError};
use crate::models::{LoginRequest, LoginResponse, PersistedSession, Role, Session, User};
use crate::scope::RequestScope;
use crate::storage::{KeyValueStorage, StorageError, SESSION_KEY, TOKEN_KEY};

const LOGIN_PATH: &str = "/auth/login";
const LOGIN_FAILED: &str = "Login failed";
const SESSION_RECORD_VERSION: u32 = 0;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    LoginFailed(String),

    #[error("not authenticated: log in first")]
    NotAuthenticated,

    #[error("session storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("login cancelled")]
    Cancelled,
}

/// Read access to the current session, for components that only need to know
/// who is logged in (e.g. the access guard).
pub trait SessionSource {
    fn snapshot(&self) -> Session;

    fn is_authenticated(&self) -> bool {
        self.snapshot().is_authenticated
    }

    fn token(&self) -> Option<String> {
        self.snapshot().token
    }

    fn role(&self) -> Option<Role> {
        self.snapshot().role().cloned()
    }
}

/// Message shown for a failed login: the backend's own message if it sent
/// one, else the transport failure, else a generic fallback.
pub fn login_failure_message(error: &ApiError) -> String {
    if let Some(msg) = error.server_message() {
        return msg;
    }
    if let ApiError::Transport(e) = error {
        let description = e.to_string();
        if !description.trim().is_empty() {
            return description;
        }
    }
    LOGIN_FAILED.to_string()
}

pub struct SessionStore {
    state: RwLock<Session>,
    storage: Arc<dyn KeyValueStorage>,
    api: ApiClient,
}

impl SessionStore {
    /// Rehydrate from the persisted record in the client's storage, or start
    /// unauthenticated.
    pub fn open(api: ApiClient) -> Self {
        let storage = api.storage().clone();
        let session = load_persisted(storage.as_ref());

        if let Some(token) = session.token.as_deref() {
            // Re-mirror in case the token slot was removed underneath us
            match storage.get(TOKEN_KEY) {
                Ok(Some(mirrored)) if mirrored == token => {}
                _ => {
                    if let Err(e) = storage.set(TOKEN_KEY, token) {
                        tracing::warn!(error = %e, "Failed to restore mirrored token slot");
                    }
                }
            }
        }

        tracing::debug!(
            authenticated = session.is_authenticated,
            "Session store opened"
        );

        Self {
            state: RwLock::new(session),
            storage,
            api,
        }
    }

    pub fn user(&self) -> Option<User> {
        self.read().user.clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        self.login_within(&RequestScope::new(), email, password)
            .await
    }

    /// Log in under `scope`. If the scope is cancelled before the response is
    /// applied, the session is left untouched.
    pub async fn login_within(
        &self,
        scope: &RequestScope,
        email: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let request = LoginRequest { email, password };
        let call = self
            .api
            .post_json::<_, LoginResponse>(LOGIN_PATH, &request);

        let response = match scope.run(call).await {
            Ok(Ok(r)) => r,
            Ok(Err(e)) => {
                let message = login_failure_message(&e);
                tracing::warn!(status = ?e.status(), %message, "Login rejected");
                return Err(AuthError::LoginFailed(message));
            }
            Err(_) => return Err(AuthError::Cancelled),
        };

        if scope.is_cancelled() {
            return Err(AuthError::Cancelled);
        }

        if response.token.trim().is_empty() {
            tracing::warn!(user_id = %response.user.id, "Login response carried a blank token");
            return Err(AuthError::LoginFailed(LOGIN_FAILED.to_string()));
        }

        let user = response.user;
        let next = Session::authenticated(user.clone(), response.token);

        {
            let mut state = self.write();
            if let Err(e) = self.write_through(&next) {
                // Put storage back the way it was; in-memory state was never touched
                let restored = if *state == Session::default() {
                    self.clear_storage()
                } else {
                    self.write_through(&state)
                };
                if let Err(restore) = restored {
                    tracing::error!(error = %restore, "Failed to restore session storage after login");
                }
                return Err(e.into());
            }
            *state = next;
        }

        tracing::info!(user_id = %user.id, role = %user.role, "Login succeeded");
        Ok(user)
    }

    /// Clear the session and both storage slots. Always clears storage, even
    /// when already logged out.
    pub fn logout(&self) -> Result<(), AuthError> {
        let mut state = self.write();
        let was_authenticated = state.is_authenticated;
        *state = Session::default();
        self.clear_storage()?;
        drop(state);

        if was_authenticated {
            tracing::info!("Logged out");
        }
        Ok(())
    }

    /// Refresh the identity of the current session (e.g. after a profile edit).
    pub fn set_user(&self, user: User) -> Result<(), AuthError> {
        self.update_authenticated(|next| next.user = Some(user))
    }

    /// Rotate the bearer token of the current session.
    pub fn set_token(&self, token: impl Into<String>) -> Result<(), AuthError> {
        let token = token.into();
        self.update_authenticated(|next| next.token = Some(token))?;
        tracing::debug!("Session token rotated");
        Ok(())
    }

    /// Check, persist and swap under one write lock so a concurrent logout
    /// cannot be undone.
    fn update_authenticated(&self, apply: impl FnOnce(&mut Session)) -> Result<(), AuthError> {
        let mut state = self.write();
        if !state.is_authenticated {
            return Err(AuthError::NotAuthenticated);
        }
        let mut next = state.clone();
        apply(&mut next);
        self.write_through(&next)?;
        *state = next;
        Ok(())
    }

    fn write_through(&self, session: &Session) -> Result<(), StorageError> {
        let record = PersistedSession {
            state: session.clone(),
            version: SESSION_RECORD_VERSION,
        };
        let raw = serde_json::to_string(&record)?;
        self.storage.set(SESSION_KEY, &raw)?;

        match session.token.as_deref() {
            Some(token) => self.storage.set(TOKEN_KEY, token),
            None => self.storage.remove(TOKEN_KEY),
        }
    }

    fn clear_storage(&self) -> Result<(), StorageError> {
        self.storage.remove(SESSION_KEY)?;
        self.storage.remove(TOKEN_KEY)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Held across storage writes; never across an `.await`.
    fn write(&self) -> RwLockWriteGuard<'_, Session> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionSource for SessionStore {
    fn snapshot(&self) -> Session {
        self.read().clone()
    }
}

fn load_persisted(storage: &dyn KeyValueStorage) -> Session {
    let raw = match storage.get(SESSION_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return Session::default(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read persisted session; starting logged out");
            return Session::default();
        }
    };

    let record: PersistedSession = match serde_json::from_str(&raw) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(error = %e, "Corrupt persisted session; starting logged out");
            return Session::default();
        }
    };

    if !record.state.is_consistent() {
        tracing::warn!("Persisted session is authenticated without a token; starting logged out");
        return Session::default();
    }
    record.state
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn login_response() -> serde_json::Value {
        json!({
            "user": {
                "id": "u-1",
                "email": "admin@archzero.local",
                "name": "Admin",
                "role": "admin"
            },
            "token": "jwt-abc"
        })
    }

    fn make_user(role: Role) -> User {
        User {
            id: "u-1".to_string(),
            email: "admin@archzero.local".to_string(),
            name: None,
            role,
        }
    }

    fn make_store(base_url: &str) -> (SessionStore, Arc<dyn KeyValueStorage>) {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let api = ApiClient::with_base_url(base_url, storage.clone()).unwrap();
        (SessionStore::open(api), storage)
    }

    #[tokio::test]
    async fn test_login_sets_session_and_both_slots() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_json(json!({
                "email": "admin@archzero.local",
                "password": "changeme123"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        let user = store
            .login("admin@archzero.local", "changeme123")
            .await
            .unwrap();

        assert_eq!(user.role, Role::Admin);
        let session = store.snapshot();
        assert!(session.is_authenticated);
        assert_eq!(session.token.as_deref(), Some("jwt-abc"));
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("jwt-abc"));

        let record: PersistedSession =
            serde_json::from_str(&storage.get(SESSION_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(record.state, session);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_state_untouched() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "message": "Invalid email or password"
            })))
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        let before = store.snapshot();

        let err = store.login("admin@archzero.local", "wrong").await.unwrap_err();

        assert_eq!(err.to_string(), "Invalid email or password");
        assert_eq!(store.snapshot(), before);
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_failed_login_keeps_existing_session() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response()))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        store.login("admin@archzero.local", "changeme123").await.unwrap();
        let before = store.snapshot();

        let err = store.login("other@archzero.local", "x").await.unwrap_err();

        assert_eq!(err.to_string(), "Login failed");
        assert_eq!(store.snapshot(), before);
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("jwt-abc"));
    }

    #[tokio::test]
    async fn test_login_transport_failure_uses_transport_description() {
        let (store, _storage) = make_store("http://127.0.0.1:9");

        let err = store.login("a@b.c", "pw").await.unwrap_err();

        match err {
            AuthError::LoginFailed(msg) => {
                assert!(!msg.is_empty());
                assert_ne!(msg, "Login failed");
            }
            other => panic!("Expected LoginFailed, got {other:?}"),
        }
        assert!(!store.is_authenticated());
    }

    #[tokio::test]
    async fn test_login_then_logout_restores_initial_state() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response()))
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        let initial = store.snapshot();
        store.login("admin@archzero.local", "changeme123").await.unwrap();

        store.logout().unwrap();

        assert_eq!(store.snapshot(), initial);
        assert_eq!(store.snapshot(), Session::default());
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);

        // Idempotent, and still clears stray storage
        storage.set(TOKEN_KEY, "stale").unwrap();
        store.logout().unwrap();
        assert_eq!(store.snapshot(), Session::default());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_store_rehydrates_from_persisted_record() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        store.login("admin@archzero.local", "changeme123").await.unwrap();
        let logged_in = store.snapshot();

        // Simulate a reload: new store over the same storage, no network call
        let api = ApiClient::with_base_url(mock_server.uri(), storage.clone()).unwrap();
        let reloaded = SessionStore::open(api);
        assert_eq!(reloaded.snapshot(), logged_in);
    }

    #[test]
    fn test_open_restores_missing_token_slot() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        let record = PersistedSession {
            state: Session::authenticated(make_user(Role::Viewer), "tok".to_string()),
            version: 0,
        };
        storage
            .set(SESSION_KEY, &serde_json::to_string(&record).unwrap())
            .unwrap();

        let api = ApiClient::with_base_url("http://127.0.0.1:9", storage.clone()).unwrap();
        let store = SessionStore::open(api);

        assert!(store.is_authenticated());
        assert_eq!(storage.get(TOKEN_KEY).unwrap().as_deref(), Some("tok"));
    }

    #[test]
    fn test_open_discards_corrupt_or_inconsistent_records() {
        let storage: Arc<dyn KeyValueStorage> = Arc::new(MemoryStorage::new());
        storage.set(SESSION_KEY, "{not json").unwrap();
        let api = ApiClient::with_base_url("http://127.0.0.1:9", storage.clone()).unwrap();
        assert_eq!(SessionStore::open(api).snapshot(), Session::default());

        storage
            .set(
                SESSION_KEY,
                r#"{"state":{"user":null,"token":null,"isAuthenticated":true},"version":0}"#,
            )
            .unwrap();
        let api = ApiClient::with_base_url("http://127.0.0.1:9", storage.clone()).unwrap();
        let store = SessionStore::open(api);
        assert!(!store.is_authenticated());
        assert!(store.snapshot().is_consistent());
    }

    #[test]
    fn test_setters_require_authenticated_session() {
        let (store, storage) = make_store("http://127.0.0.1:9");

        assert!(matches!(
            store.set_token("tok"),
            Err(AuthError::NotAuthenticated)
        ));
        assert!(matches!(
            store.set_user(make_user(Role::Viewer)),
            Err(AuthError::NotAuthenticated)
        ));
        assert_eq!(store.snapshot(), Session::default());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_setters_do_not_toggle_authentication() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(login_response()))
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        store.login("admin@archzero.local", "changeme123").await.unwrap();

        store.set_token("jwt-rotated").unwrap();
        store.set_user(make_user(Role::Architect)).unwrap();

        let session = store.snapshot();
        assert!(session.is_authenticated);
        assert_eq!(session.token.as_deref(), Some("jwt-rotated"));
        assert_eq!(session.role(), Some(&Role::Architect));
        assert_eq!(
            storage.get(TOKEN_KEY).unwrap().as_deref(),
            Some("jwt-rotated")
        );
    }

    #[tokio::test]
    async fn test_cancelled_login_does_not_mutate_session() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(login_response())
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        let scope = RequestScope::new();
        let canceller = scope.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });

        let result = store
            .login_within(&scope, "admin@archzero.local", "changeme123")
            .await;

        assert!(matches!(result, Err(AuthError::Cancelled)));
        assert_eq!(store.snapshot(), Session::default());
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_blank_token_in_login_response_is_rejected() {
        let mock_server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "user": { "id": "u-1", "email": "admin@archzero.local", "role": "admin" },
                "token": "  "
            })))
            .mount(&mock_server)
            .await;

        let (store, storage) = make_store(&mock_server.uri());
        let err = store
            .login("admin@archzero.local", "changeme123")
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::LoginFailed(ref msg) if msg == "Login failed"));
        assert_eq!(store.snapshot(), Session::default());
        assert_eq!(storage.get(SESSION_KEY).unwrap(), None);
        assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
    }

    #[test]
    fn test_set_token_racing_logout_never_resurrects_session() {
        use crate::storage::FileStorage;
        use std::sync::Barrier;

        let tmp = tempfile::TempDir::new().unwrap();
        let storage: Arc<dyn KeyValueStorage> = Arc::new(FileStorage::new(tmp.path()));
        let record = PersistedSession {
            state: Session::authenticated(make_user(Role::Editor), "jwt-abc".to_string()),
            version: 0,
        };
        let raw = serde_json::to_string(&record).unwrap();

        for _ in 0..300 {
            storage.set(SESSION_KEY, &raw).unwrap();
            storage.set(TOKEN_KEY, "jwt-abc").unwrap();
            let api = ApiClient::with_base_url("http://127.0.0.1:9", storage.clone()).unwrap();
            let store = Arc::new(SessionStore::open(api));
            assert!(store.is_authenticated());

            let barrier = Arc::new(Barrier::new(2));
            let rotator = {
                let store = store.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    store.set_token("rotated")
                })
            };
            barrier.wait();
            store.logout().unwrap();
            let rotated = rotator.join().unwrap();

            let on_disk = {
                let api = ApiClient::with_base_url("http://127.0.0.1:9", storage.clone()).unwrap();
                SessionStore::open(api).snapshot()
            };
            let in_memory = store.snapshot();
            assert_eq!(in_memory, on_disk);

            // Either rotation landed before logout or was refused after it
            assert!(matches!(rotated, Ok(()) | Err(AuthError::NotAuthenticated)));
            assert_eq!(in_memory, Session::default());
            assert_eq!(storage.get(TOKEN_KEY).unwrap(), None);
        }
    }
}
