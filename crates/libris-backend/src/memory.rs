//! In-process backend for tests and demos.
//!
//! [`MemoryBackend`] implements all three backend traits against plain
//! hash maps, and adds a few knobs the real backend doesn't have: failing
//! or slowing down profile lookups for a given user, restoring a session
//! silently (as if the page had been reloaded), and emitting arbitrary
//! session-change events.
//!
//! Passwords are kept in plain text. Development and tests only: never
//! point a real application at this.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use libris_protocol::{
    AuthSession, AuthUser, ProfileRecord, Role, SessionChange, UserId,
    UserMetadata,
};
use tokio::sync::broadcast;

use crate::{
    AdminDirectory, BackendError, DEFAULT_EVENT_CAPACITY, ProfileStore,
    SessionSource, generate_token,
};

/// Lifetime reported for issued access tokens, in seconds.
const TOKEN_LIFETIME_SECS: u64 = 3600;

struct Account {
    user: AuthUser,
    password: String,
}

#[derive(Default)]
struct Inner {
    /// Accounts keyed by email. Emails are unique, like the real backend.
    accounts: HashMap<String, Account>,
    profiles: HashMap<UserId, ProfileRecord>,
    session: Option<AuthSession>,
    failing_profiles: HashSet<UserId>,
    profile_delays: HashMap<UserId, Duration>,
    next_user: u64,
    sign_in_attempts: usize,
}

impl Inner {
    fn account_by_id(&self, id: &UserId) -> Option<&Account> {
        self.accounts.values().find(|a| &a.user.id == id)
    }

    fn insert_account(&mut self, email: &str, password: &str, metadata: UserMetadata) -> UserId {
        self.next_user += 1;
        let id = UserId::new(format!("user-{}", self.next_user));
        let user = AuthUser {
            id: id.clone(),
            email: Some(email.to_string()),
            user_metadata: metadata,
        };
        self.accounts.insert(
            email.to_string(),
            Account {
                user,
                password: password.to_string(),
            },
        );
        id
    }

    fn issue_session(&self, user: &AuthUser) -> AuthSession {
        AuthSession {
            access_token: generate_token(),
            refresh_token: Some(generate_token()),
            expires_in: Some(TOKEN_LIFETIME_SECS),
            token_type: Some("bearer".into()),
            user: user.clone(),
        }
    }
}

/// An in-memory [`SessionSource`], [`ProfileStore`] and [`AdminDirectory`].
///
/// # Example
///
/// ```rust
/// use libris_backend::{MemoryBackend, SessionSource};
/// use libris_protocol::{ProfileRecord, UserMetadata};
///
/// # tokio_test_block(async {
/// let backend = MemoryBackend::new();
/// let id = backend.add_account("ada@library.test", "hunter2", UserMetadata::default());
/// backend.put_profile(ProfileRecord {
///     id: id.clone(),
///     email: Some("ada@library.test".into()),
///     role: Some("admin".into()),
///     name: Some("Ada".into()),
///     student_id: None,
/// });
///
/// let mut events = backend.subscribe();
/// let session = backend.sign_in_with_password("ada@library.test", "hunter2").await.unwrap();
/// assert_eq!(session.user_id(), &id);
/// assert!(events.recv().await.unwrap().session.is_some());
/// # });
/// # fn tokio_test_block<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f);
/// # }
/// ```
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    events: broadcast::Sender<SessionChange>,
    /// Whether sign-up also inserts a `student` profile row, the way a
    /// database trigger on the auth users table usually does.
    create_profiles_on_sign_up: bool,
}

impl MemoryBackend {
    /// Creates an empty backend. Sign-ups create student profiles.
    pub fn new() -> Self {
        Self::with_event_capacity(DEFAULT_EVENT_CAPACITY)
    }

    /// Creates an empty backend with a custom broadcast buffer size.
    pub fn with_event_capacity(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Mutex::new(Inner::default()),
            events,
            create_profiles_on_sign_up: true,
        }
    }

    /// Turns the sign-up profile trigger on or off.
    pub fn create_profiles_on_sign_up(mut self, enabled: bool) -> Self {
        self.create_profiles_on_sign_up = enabled;
        self
    }

    /// Locks the shared state.
    ///
    /// A panic while the lock was held can't leave `Inner` half-updated in
    /// a way that matters for a test double, so poisoning is ignored.
    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an account directly, bypassing sign-up. No profile row
    /// is created. Returns the new user's id.
    pub fn add_account(
        &self,
        email: &str,
        password: &str,
        metadata: UserMetadata,
    ) -> UserId {
        self.inner().insert_account(email, password, metadata)
    }

    /// Inserts or replaces a profile row.
    pub fn put_profile(&self, record: ProfileRecord) {
        self.inner().profiles.insert(record.id.clone(), record);
    }

    /// Deletes a profile row.
    pub fn remove_profile(&self, id: &UserId) {
        self.inner().profiles.remove(id);
    }

    /// Makes every profile lookup for `id` fail with
    /// [`BackendError::Unavailable`].
    pub fn fail_profile_lookups(&self, id: &UserId) {
        self.inner().failing_profiles.insert(id.clone());
    }

    /// Makes every profile lookup for `id` take `delay` before answering.
    pub fn delay_profile_lookups(&self, id: &UserId, delay: Duration) {
        self.inner().profile_delays.insert(id.clone(), delay);
    }

    /// Installs a session for `email` without emitting anything, as if a
    /// persisted token had been picked up on page load.
    ///
    /// Returns `None` if there is no such account.
    pub fn restore_session(&self, email: &str) -> Option<AuthSession> {
        let mut inner = self.inner();
        let user = inner.accounts.get(email)?.user.clone();
        let session = inner.issue_session(&user);
        inner.session = Some(session.clone());
        Some(session)
    }

    /// Broadcasts an arbitrary change. Does not touch the stored session.
    pub fn emit(&self, change: SessionChange) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.events.send(change);
    }

    /// Number of password sign-in attempts seen so far.
    pub fn sign_in_attempts(&self) -> usize {
        self.inner().sign_in_attempts
    }

    /// Number of live subscriptions to the change stream.
    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionSource for MemoryBackend {
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Ok(self.inner().session.clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let session = {
            let mut inner = self.inner();
            inner.sign_in_attempts += 1;
            let user = match inner.accounts.get(email) {
                Some(account) if account.password == password => account.user.clone(),
                _ => {
                    return Err(BackendError::Rejected {
                        status: 400,
                        message: "Invalid login credentials".into(),
                    });
                }
            };
            let session = inner.issue_session(&user);
            inner.session = Some(session.clone());
            session
        };

        tracing::debug!(user_id = %session.user_id(), "memory backend: signed in");
        self.emit(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<(), BackendError> {
        // Check and insert under one lock so concurrent sign-ups with the
        // same email can't both succeed.
        let id = {
            let mut inner = self.inner();
            if inner.accounts.contains_key(email) {
                return Err(BackendError::Rejected {
                    status: 422,
                    message: "User already registered".into(),
                });
            }
            let id = inner.insert_account(email, password, metadata.clone());
            if self.create_profiles_on_sign_up {
                inner.profiles.insert(
                    id.clone(),
                    ProfileRecord {
                        id: id.clone(),
                        email: Some(email.to_string()),
                        role: Some(Role::Student.as_str().to_string()),
                        name: metadata.name.clone(),
                        student_id: metadata.student_id.clone(),
                    },
                );
            }
            id
        };
        tracing::debug!(user_id = %id, "memory backend: signed up");
        Ok(())
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        self.inner().session = None;
        self.emit(SessionChange::signed_out());
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

impl ProfileStore for MemoryBackend {
    async fn profile_by_id(
        &self,
        id: &UserId,
    ) -> Result<Option<ProfileRecord>, BackendError> {
        let delay = self.inner().profile_delays.get(id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let inner = self.inner();
        if inner.failing_profiles.contains(id) {
            return Err(BackendError::Unavailable(format!(
                "profile lookup for {id} failed"
            )));
        }
        Ok(inner.profiles.get(id).cloned())
    }
}

impl AdminDirectory for MemoryBackend {
    async fn user_by_id(&self, id: &UserId) -> Result<Option<AuthUser>, BackendError> {
        Ok(self.inner().account_by_id(id).map(|a| a.user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_protocol::SessionEventKind;

    fn backend_with_ada() -> (MemoryBackend, UserId) {
        let backend = MemoryBackend::new();
        let id = backend.add_account("ada@library.test", "hunter2", UserMetadata::default());
        (backend, id)
    }

    #[tokio::test]
    async fn test_sign_in_valid_credentials_stores_session_and_emits() {
        let (backend, id) = backend_with_ada();
        let mut events = backend.subscribe();

        let session = backend
            .sign_in_with_password("ada@library.test", "hunter2")
            .await
            .expect("should sign in");

        assert_eq!(session.user_id(), &id);
        let current = backend.current_session().await.unwrap();
        assert_eq!(current.as_ref().map(|s| s.user_id()), Some(&id));

        let change = events.recv().await.unwrap();
        assert_eq!(change.kind, SessionEventKind::SignedIn);
        assert_eq!(change.session.unwrap().user_id(), &id);
    }

    #[tokio::test]
    async fn test_sign_in_wrong_password_is_rejected_without_event() {
        let (backend, _) = backend_with_ada();
        let mut events = backend.subscribe();

        let result = backend.sign_in_with_password("ada@library.test", "nope").await;

        assert!(matches!(result, Err(BackendError::Rejected { status: 400, .. })));
        assert!(backend.current_session().await.unwrap().is_none());
        assert!(events.try_recv().is_err(), "no event on failed sign-in");
        assert_eq!(backend.sign_in_attempts(), 1);
    }

    #[tokio::test]
    async fn test_sign_up_creates_account_and_student_profile() {
        let backend = MemoryBackend::new();
        let meta = UserMetadata {
            name: Some("Sam".into()),
            student_id: Some("S-7".into()),
        };

        backend.sign_up("sam@x.com", "pw", &meta).await.unwrap();
        let session = backend.sign_in_with_password("sam@x.com", "pw").await.unwrap();
        let profile = backend.profile_by_id(session.user_id()).await.unwrap().unwrap();

        assert_eq!(profile.role.as_deref(), Some("student"));
        assert_eq!(profile.student_id.as_deref(), Some("S-7"));
        assert_eq!(session.user.user_metadata, meta);
    }

    #[tokio::test]
    async fn test_sign_up_without_trigger_leaves_no_profile() {
        let backend = MemoryBackend::new().create_profiles_on_sign_up(false);
        backend.sign_up("sam@x.com", "pw", &UserMetadata::default()).await.unwrap();
        let session = backend.sign_in_with_password("sam@x.com", "pw").await.unwrap();

        assert!(backend.profile_by_id(session.user_id()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sign_up_duplicate_email_is_rejected() {
        let (backend, _) = backend_with_ada();
        let result = backend
            .sign_up("ada@library.test", "other", &UserMetadata::default())
            .await;
        assert!(matches!(result, Err(BackendError::Rejected { status: 422, .. })));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sign_up_concurrent_same_email_only_one_succeeds() {
        let backend = std::sync::Arc::new(MemoryBackend::new());

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let backend = std::sync::Arc::clone(&backend);
                tokio::spawn(async move {
                    backend
                        .sign_up("race@x.com", &format!("pw-{i}"), &UserMetadata::default())
                        .await
                })
            })
            .collect();
        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }

        assert_eq!(succeeded, 1);
        assert_eq!(backend.inner().next_user, 1, "no account was overwritten");
    }

    #[tokio::test]
    async fn test_sign_out_clears_session_and_emits() {
        let (backend, _) = backend_with_ada();
        backend.sign_in_with_password("ada@library.test", "hunter2").await.unwrap();
        let mut events = backend.subscribe();

        backend.sign_out().await.unwrap();

        assert!(backend.current_session().await.unwrap().is_none());
        assert_eq!(events.recv().await.unwrap().kind, SessionEventKind::SignedOut);
    }

    #[tokio::test]
    async fn test_restore_session_is_silent() {
        let (backend, id) = backend_with_ada();
        let mut events = backend.subscribe();

        let restored = backend.restore_session("ada@library.test").unwrap();

        assert_eq!(restored.user_id(), &id);
        assert!(backend.current_session().await.unwrap().is_some());
        assert!(events.try_recv().is_err());
        assert!(backend.restore_session("ghost@x.com").is_none());
    }

    #[tokio::test]
    async fn test_failing_profile_lookup_returns_error() {
        let (backend, id) = backend_with_ada();
        backend.fail_profile_lookups(&id);

        let result = backend.profile_by_id(&id).await;
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_profile_lookup_waits() {
        let (backend, id) = backend_with_ada();
        backend.delay_profile_lookups(&id, Duration::from_secs(5));
        let start = tokio::time::Instant::now();

        let _ = backend.profile_by_id(&id).await;

        assert!(start.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_admin_directory_finds_account_by_id() {
        let (backend, id) = backend_with_ada();
        let user = backend.user_by_id(&id).await.unwrap().unwrap();
        assert_eq!(user.email.as_deref(), Some("ada@library.test"));
        assert!(backend.user_by_id(&UserId::new("nobody")).await.unwrap().is_none());
    }

    #[test]
    fn test_subscriber_count_tracks_receivers() {
        let backend = MemoryBackend::new();
        let rx = backend.subscribe();
        assert_eq!(backend.subscriber_count(), 1);
        drop(rx);
        assert_eq!(backend.subscriber_count(), 0);
    }
}
