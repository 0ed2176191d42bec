//! Unified error type for Libris.

use libris_backend::BackendError;
use libris_protocol::ProtocolError;
use libris_session::SessionError;

/// Top-level error that wraps all crate-specific errors.
///
/// Through the `libris` meta-crate you deal with this one type; `?`
/// converts the sub-crate errors via the generated `From` impls.
#[derive(Debug, thiserror::Error)]
pub enum LibrisError {
    /// Encoding or decoding a wire type failed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The backend was misconfigured, unreachable or said no.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// An auth action failed or the context is gone.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl LibrisError {
    /// The text to show a user for this error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Protocol(e) => e.to_string(),
            Self::Backend(e) => e.user_message(),
            Self::Session(e) => e.user_message(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let libris_err: LibrisError = err.into();
        assert!(matches!(libris_err, LibrisError::Protocol(_)));
        assert!(libris_err.to_string().contains("bad"));
    }

    #[test]
    fn test_from_backend_error() {
        let err = BackendError::Misconfigured("no url".into());
        let libris_err: LibrisError = err.into();
        assert!(matches!(libris_err, LibrisError::Backend(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("Invalid login credentials".into());
        let libris_err: LibrisError = err.into();
        assert!(matches!(libris_err, LibrisError::Session(_)));
        assert_eq!(libris_err.user_message(), "Invalid login credentials");
    }

    #[test]
    fn test_backend_rejection_user_message_is_backend_text() {
        let libris_err: LibrisError = BackendError::Rejected {
            status: 422,
            message: "User already registered".into(),
        }
        .into();
        assert_eq!(libris_err.user_message(), "User already registered");
    }
}
