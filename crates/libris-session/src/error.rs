//! Error types for the session layer.

use libris_backend::BackendError;

/// Errors surfaced to callers of the auth actions.
///
/// Profile lookup problems never show up here: they are recovered inside
/// the reconciler and only visible as a missing user or a `student` role.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The backend rejected the credentials (or couldn't check them).
    /// The message is suitable for showing to the user.
    #[error("sign-in failed: {0}")]
    AuthFailed(String),

    /// Registration was refused, e.g. the email is already taken.
    #[error("sign-up failed: {0}")]
    SignUpFailed(String),

    /// The backend couldn't end the session.
    #[error("sign-out failed: {0}")]
    SignOutFailed(String),

    /// The request was rejected locally before reaching the backend.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The reconciler has been unmounted.
    #[error("auth context is no longer mounted")]
    Unavailable,
}

impl SessionError {
    pub(crate) fn sign_in(err: &BackendError) -> Self {
        Self::AuthFailed(err.user_message())
    }

    pub(crate) fn sign_up(err: &BackendError) -> Self {
        Self::SignUpFailed(err.user_message())
    }

    pub(crate) fn sign_out(err: &BackendError) -> Self {
        Self::SignOutFailed(err.user_message())
    }

    /// The user-facing part of the message, without the prefix.
    pub fn user_message(&self) -> String {
        match self {
            Self::AuthFailed(m)
            | Self::SignUpFailed(m)
            | Self::SignOutFailed(m)
            | Self::InvalidInput(m) => m.clone(),
            Self::Unavailable => self.to_string(),
        }
    }
}
