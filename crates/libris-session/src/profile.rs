//! Turning a user id into a [`CurrentUser`].
//!
//! Authentication and authorization live in different places: the auth
//! backend knows *who* someone is, the `profiles` table knows *what they
//! may do*. [`ProfileResolver`] joins the two.
//!
//! # Missing profiles
//!
//! When there is no profile row (or the lookup fails) there are two ways
//! to go, selected by how the resolver is built:
//!
//! - [`FallbackPolicy::None`] (the default, [`ProfileResolver::new`]):
//!   resolve to no user at all.
//! - [`FallbackPolicy::AdminDirectory`]
//!   ([`ProfileResolver::with_admin_fallback`]): ask the privileged auth
//!   admin API for the account and build a `student` from its metadata.
//!   This needs a service-role credential, so it is only for trusted
//!   processes.

use libris_backend::{AdminDirectory, BackendError, ProfileStore};
use libris_protocol::{AuthSession, AuthUser, CurrentUser, ProfileRecord, Role, UserId};

/// Which fallback a resolver uses for users without a profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackPolicy {
    /// No profile, no user.
    None,
    /// Synthesize a `student` from the auth account's metadata.
    AdminDirectory,
}

/// Placeholder directory type for resolvers without an admin fallback.
///
/// Uninhabited: a `ProfileResolver<P, NoDirectory>` provably never calls
/// an admin API.
#[derive(Debug)]
pub enum NoDirectory {}

impl AdminDirectory for NoDirectory {
    async fn user_by_id(&self, _id: &UserId) -> Result<Option<AuthUser>, BackendError> {
        match *self {}
    }
}

/// Resolves user ids to [`CurrentUser`]s.
///
/// Read-only and stateless apart from its collaborators, so one resolver
/// can serve any number of concurrent lookups.
pub struct ProfileResolver<P, D = NoDirectory> {
    store: P,
    directory: Option<D>,
}

impl<P: ProfileStore> ProfileResolver<P> {
    /// A resolver with no fallback ([`FallbackPolicy::None`]).
    pub fn new(store: P) -> Self {
        Self {
            store,
            directory: None,
        }
    }
}

impl<P: ProfileStore, D: AdminDirectory> ProfileResolver<P, D> {
    /// Switches to [`FallbackPolicy::AdminDirectory`] using `directory`.
    pub fn with_admin_fallback<D2: AdminDirectory>(self, directory: D2) -> ProfileResolver<P, D2> {
        tracing::warn!("profile resolver: admin directory fallback enabled");
        ProfileResolver {
            store: self.store,
            directory: Some(directory),
        }
    }

    pub fn policy(&self) -> FallbackPolicy {
        if self.directory.is_some() {
            FallbackPolicy::AdminDirectory
        } else {
            FallbackPolicy::None
        }
    }

    /// Looks up `id` and builds the user, or returns `None`.
    ///
    /// `session`, when given, supplies the email for profile rows that
    /// don't carry one. Never fails: lookup errors are logged and treated
    /// like a missing row.
    pub async fn resolve(&self, id: &UserId, session: Option<&AuthSession>) -> Option<CurrentUser> {
        match self.store.profile_by_id(id).await {
            Ok(Some(record)) => {
                let user = user_from_profile(id, record, session);
                tracing::debug!(user_id = %id, role = %user.role, "profile resolved");
                return Some(user);
            }
            Ok(None) => {
                tracing::warn!(user_id = %id, "no profile row for user");
            }
            Err(e) => {
                tracing::warn!(user_id = %id, error = %e, "profile lookup failed");
            }
        }

        let directory = self.directory.as_ref()?;
        match directory.user_by_id(id).await {
            Ok(Some(account)) => {
                tracing::info!(user_id = %id, "profile synthesized from auth account");
                Some(user_from_account(id, account))
            }
            Ok(None) => {
                tracing::warn!(user_id = %id, "auth account not found");
                None
            }
            Err(e) => {
                tracing::warn!(user_id = %id, error = %e, "admin user lookup failed");
                None
            }
        }
    }
}

/// Maps a profile row. The row's own `id` is ignored in favour of the id
/// that was asked for.
fn user_from_profile(id: &UserId, record: ProfileRecord, session: Option<&AuthSession>) -> CurrentUser {
    let email = record
        .email
        .filter(|e| !e.is_empty())
        .or_else(|| session.and_then(AuthSession::email).map(str::to_string))
        .unwrap_or_default();

    CurrentUser::new(id.clone(), email, Role::from_profile(record.role.as_deref()))
        .with_name(record.name)
        .with_student_id(record.student_id)
}

fn user_from_account(id: &UserId, account: AuthUser) -> CurrentUser {
    CurrentUser::new(id.clone(), account.email.unwrap_or_default(), Role::Student)
        .with_name(account.user_metadata.name)
        .with_student_id(account.user_metadata.student_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    use libris_backend::MemoryBackend;
    use libris_protocol::UserMetadata;
    use std::sync::Arc;

    fn profile(id: &UserId, role: Option<&str>, name: Option<&str>) -> ProfileRecord {
        ProfileRecord {
            id: id.clone(),
            email: None,
            role: role.map(str::to_string),
            name: name.map(str::to_string),
            student_id: None,
        }
    }

    fn backend_with(email: &str, metadata: UserMetadata) -> (Arc<MemoryBackend>, UserId) {
        let backend = Arc::new(MemoryBackend::new());
        let id = backend.add_account(email, "pw", metadata);
        (backend, id)
    }

    // =====================================================================
    // Profile found
    // =====================================================================

    #[tokio::test]
    async fn test_resolve_admin_profile() {
        let (backend, id) = backend_with("ada@library.test", UserMetadata::default());
        backend.put_profile(profile(&id, Some("admin"), Some("Ada")));
        let session = backend.restore_session("ada@library.test");
        let resolver = ProfileResolver::new(Arc::clone(&backend));

        let user = resolver.resolve(&id, session.as_ref()).await.unwrap();

        assert_eq!(user.id, id);
        assert_eq!(user.role, Role::Admin);
        assert_eq!(user.name.as_deref(), Some("Ada"));
        assert_eq!(user.student_id, None);
        // The row has no email, so it comes from the session.
        assert_eq!(user.email, "ada@library.test");
    }

    #[tokio::test]
    async fn test_resolve_unrecognized_role_defaults_to_student() {
        let (backend, id) = backend_with("x@x.com", UserMetadata::default());
        backend.put_profile(profile(&id, Some("superuser"), None));
        let resolver = ProfileResolver::new(Arc::clone(&backend));

        let user = resolver.resolve(&id, None).await.unwrap();

        assert_eq!(user.role, Role::Student);
    }

    #[tokio::test]
    async fn test_resolve_missing_role_defaults_to_student() {
        let (backend, id) = backend_with("x@x.com", UserMetadata::default());
        backend.put_profile(profile(&id, None, None));
        let resolver = ProfileResolver::new(Arc::clone(&backend));

        let user = resolver.resolve(&id, None).await.unwrap();

        assert_eq!(user.role, Role::Student);
        assert_eq!(user.email, "", "no row email and no session means empty");
    }

    #[tokio::test]
    async fn test_resolve_prefers_profile_email_over_session() {
        let (backend, id) = backend_with("login@x.com", UserMetadata::default());
        backend.put_profile(ProfileRecord {
            email: Some("contact@x.com".into()),
            student_id: Some("S-9".into()),
            ..profile(&id, Some("student"), None)
        });
        let session = backend.restore_session("login@x.com");
        let resolver = ProfileResolver::new(Arc::clone(&backend));

        let user = resolver.resolve(&id, session.as_ref()).await.unwrap();

        assert_eq!(user.email, "contact@x.com");
        assert_eq!(user.student_id.as_deref(), Some("S-9"));
    }

    // =====================================================================
    // Fallback policy None
    // =====================================================================

    #[tokio::test]
    async fn test_resolve_missing_profile_without_fallback_is_none() {
        let (backend, id) = backend_with("u2@x.com", UserMetadata::default());
        let resolver = ProfileResolver::new(Arc::clone(&backend));

        assert_eq!(resolver.policy(), FallbackPolicy::None);
        assert!(resolver.resolve(&id, None).await.is_none());
    }

    #[tokio::test]
    async fn test_resolve_failed_lookup_without_fallback_is_none() {
        let (backend, id) = backend_with("u2@x.com", UserMetadata::default());
        backend.put_profile(profile(&id, Some("admin"), None));
        backend.fail_profile_lookups(&id);
        let resolver = ProfileResolver::new(Arc::clone(&backend));

        assert!(resolver.resolve(&id, None).await.is_none());
    }

    // =====================================================================
    // Fallback policy AdminDirectory
    // =====================================================================

    #[tokio::test]
    async fn test_resolve_missing_profile_with_fallback_synthesizes_student() {
        let meta = UserMetadata {
            name: Some("Bea".into()),
            student_id: Some("S-1".into()),
        };
        let (backend, id) = backend_with("bea@x.com", meta);
        let resolver =
            ProfileResolver::new(Arc::clone(&backend)).with_admin_fallback(Arc::clone(&backend));

        let user = resolver.resolve(&id, None).await.unwrap();

        assert_eq!(resolver.policy(), FallbackPolicy::AdminDirectory);
        assert_eq!(user.role, Role::Student);
        assert_eq!(user.email, "bea@x.com");
        assert_eq!(user.name.as_deref(), Some("Bea"));
        assert_eq!(user.student_id.as_deref(), Some("S-1"));
    }

    #[tokio::test]
    async fn test_resolve_fallback_never_grants_admin() {
        // Even if the failing row said admin, the synthesized user is a student.
        let (backend, id) = backend_with("a@x.com", UserMetadata::default());
        backend.put_profile(profile(&id, Some("admin"), None));
        backend.fail_profile_lookups(&id);
        let resolver =
            ProfileResolver::new(Arc::clone(&backend)).with_admin_fallback(Arc::clone(&backend));

        let user = resolver.resolve(&id, None).await.unwrap();

        assert_eq!(user.role, Role::Student);
    }

    #[tokio::test]
    async fn test_resolve_fallback_unknown_account_is_none() {
        let backend = Arc::new(MemoryBackend::new());
        let resolver =
            ProfileResolver::new(Arc::clone(&backend)).with_admin_fallback(Arc::clone(&backend));

        assert!(resolver.resolve(&UserId::new("ghost"), None).await.is_none());
    }
}
