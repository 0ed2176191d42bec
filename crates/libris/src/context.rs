//! The consumer-facing auth context.

use libris_protocol::CurrentUser;
use libris_session::{ReconcilerHandle, ReconcilerState};
use tokio::sync::watch;

use crate::LibrisError;

/// What the rest of the application sees of auth: the current user, a
/// loading flag, the admin check and the three auth actions.
///
/// Cheap to clone; every clone talks to the same provider.
#[derive(Clone)]
pub struct AuthContext {
    handle: ReconcilerHandle,
}

impl AuthContext {
    pub(crate) fn new(handle: ReconcilerHandle) -> Self {
        Self { handle }
    }

    pub fn user(&self) -> Option<CurrentUser> {
        self.handle.user()
    }

    pub fn loading(&self) -> bool {
        self.handle.loading()
    }

    /// `true` iff someone is signed in and their role is `admin`.
    pub fn is_admin(&self) -> bool {
        self.handle.is_admin()
    }

    pub fn state(&self) -> ReconcilerState {
        self.handle.state()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.handle.subscribe()
    }

    /// Waits until nothing is loading.
    pub async fn wait_until_ready(&self) -> Result<ReconcilerState, LibrisError> {
        Ok(self.handle.wait_until_ready().await?)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), LibrisError> {
        Ok(self.handle.sign_in(email, password).await?)
    }

    /// Registers an account with optional display name and student id.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        student_id: Option<&str>,
    ) -> Result<(), LibrisError> {
        Ok(self.handle.sign_up(email, password, name, student_id).await?)
    }

    pub async fn sign_out(&self) -> Result<(), LibrisError> {
        Ok(self.handle.sign_out().await?)
    }

    /// Re-runs the session check, e.g. when the window regains focus.
    pub async fn recheck(&self) -> Result<ReconcilerState, LibrisError> {
        Ok(self.handle.recheck().await?)
    }
}
