//! Backend abstraction layer for Libris.
//!
//! Libris doesn't store passwords, issue tokens or keep profile rows:
//! a hosted backend-as-a-service does. This crate describes the narrow
//! slice of that backend the reconciler needs, as three traits:
//!
//! - [`SessionSource`]: the auth side (current session, sign-in/up/out,
//!   and a stream of [`SessionChange`] notifications).
//! - [`ProfileStore`]: the `profiles` table, keyed by user id.
//! - [`AdminDirectory`]: privileged user lookup. Only needed for the
//!   administrative profile fallback, and deliberately a separate trait so
//!   an unprivileged client never gets one by accident.
//!
//! Two implementations ship with the crate:
//!
//! - [`MemoryBackend`]: in-process, for tests and demos.
//! - [`RestBackend`] / [`ServiceRoleDirectory`] (feature `rest`, default):
//!   talks to the hosted backend over HTTPS.
//!
//! # Feature Flags
//!
//! - `rest` (default): HTTP implementation via `reqwest`

#![allow(async_fn_in_trait)]

mod config;
mod error;
mod memory;
#[cfg(feature = "rest")]
mod rest;

pub use config::BackendConfig;
pub use error::BackendError;
pub use memory::MemoryBackend;
#[cfg(feature = "rest")]
pub use rest::{RestBackend, ServiceRoleDirectory};

use std::sync::Arc;

use libris_protocol::{
    AuthSession, AuthUser, ProfileRecord, SessionChange, UserId, UserMetadata,
};
use tokio::sync::broadcast;

/// Default capacity of the session-change broadcast channel.
///
/// Session changes are rare (a handful per user action), so a small buffer
/// is plenty; a subscriber that falls this far behind gets a `Lagged`
/// error and skips ahead.
pub const DEFAULT_EVENT_CAPACITY: usize = 16;

/// The authentication side of the backend.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one source is shared by the reconciler
///   task and every auth action task for the lifetime of the mount.
/// - Returned futures are `Send` so they can run inside `tokio::spawn`.
pub trait SessionSource: Send + Sync + 'static {
    /// Returns the session the backend currently holds, if any.
    ///
    /// Does not emit a [`SessionChange`].
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthSession>, BackendError>> + Send;

    /// Exchanges credentials for a session.
    ///
    /// On success the source stores the session and broadcasts a
    /// `SIGNED_IN` change to every subscriber before returning.
    ///
    /// # Errors
    /// [`BackendError::Rejected`] for bad credentials; other variants for
    /// transport or decoding failures.
    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, BackendError>> + Send;

    /// Registers a new account with `metadata` attached.
    ///
    /// Does not sign the caller in and emits nothing.
    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Ends the current session and broadcasts `SIGNED_OUT`.
    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send;

    /// Subscribes to session-change notifications.
    ///
    /// The subscription lasts as long as the returned receiver: dropping
    /// it unsubscribes.
    fn subscribe(&self) -> broadcast::Receiver<SessionChange>;
}

/// The `profiles` table.
pub trait ProfileStore: Send + Sync + 'static {
    /// Fetches the profile row for `id`.
    ///
    /// `Ok(None)` means "no such row"; `Err` means the lookup itself
    /// failed. Callers in this workspace treat both the same way, but the
    /// distinction is kept for logging.
    fn profile_by_id(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<ProfileRecord>, BackendError>> + Send;
}

/// Privileged lookup of auth accounts by id.
///
/// Requires credentials a browser client must never hold. Nothing in the
/// default wiring constructs one.
pub trait AdminDirectory: Send + Sync + 'static {
    /// Fetches the auth account for `id`, `Ok(None)` if it doesn't exist.
    fn user_by_id(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<AuthUser>, BackendError>> + Send;
}

// ---------------------------------------------------------------------------
// Shared backends
// ---------------------------------------------------------------------------

// One backend object usually plays several roles at once (the hosted
// backend is both the session source and the profile store), so the
// traits are forwarded through `Arc`.

impl<T: SessionSource> SessionSource for Arc<T> {
    fn current_session(
        &self,
    ) -> impl Future<Output = Result<Option<AuthSession>, BackendError>> + Send {
        T::current_session(self)
    }

    fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> impl Future<Output = Result<AuthSession, BackendError>> + Send {
        T::sign_in_with_password(self, email, password)
    }

    fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> impl Future<Output = Result<(), BackendError>> + Send {
        T::sign_up(self, email, password, metadata)
    }

    fn sign_out(&self) -> impl Future<Output = Result<(), BackendError>> + Send {
        T::sign_out(self)
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        T::subscribe(self)
    }
}

impl<T: ProfileStore> ProfileStore for Arc<T> {
    fn profile_by_id(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<ProfileRecord>, BackendError>> + Send {
        T::profile_by_id(self, id)
    }
}

impl<T: AdminDirectory> AdminDirectory for Arc<T> {
    fn user_by_id(
        &self,
        id: &UserId,
    ) -> impl Future<Output = Result<Option<AuthUser>, BackendError>> + Send {
        T::user_by_id(self, id)
    }
}

/// Generates a random 64-character hex string (256 bits of entropy).
///
/// Used for the access and refresh tokens the in-memory backend issues.
pub(crate) fn generate_token() -> String {
    use rand::Rng;

    let bytes: [u8; 32] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
