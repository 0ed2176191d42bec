use libris_protocol::ProtocolError;

/// Errors that can occur while talking to the backend.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The backend understood the request and said no: wrong password,
    /// email already registered, expired token, and so on.
    ///
    /// `message` is the backend's own human-readable explanation.
    #[error("request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// The HTTP exchange itself failed (DNS, TLS, timeout, reset).
    #[cfg(feature = "rest")]
    #[error("http request failed: {0}")]
    Http(#[source] reqwest::Error),

    /// The backend couldn't be reached or answered with a server error.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A response body didn't have the expected shape.
    #[error(transparent)]
    Decode(#[from] ProtocolError),

    /// The client configuration is unusable (missing URL, empty key).
    #[error("backend misconfigured: {0}")]
    Misconfigured(String),
}

impl BackendError {
    /// The text to show a user for this error.
    ///
    /// For rejections that's the backend's message verbatim ("Invalid
    /// login credentials"); for everything else it's the full error.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// `true` for errors caused by the request rather than the backend.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::Rejected { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_for_rejection_is_backend_text() {
        let err = BackendError::Rejected {
            status: 400,
            message: "Invalid login credentials".into(),
        };
        assert_eq!(err.user_message(), "Invalid login credentials");
        assert!(err.is_rejection());
    }

    #[test]
    fn test_user_message_for_other_errors_is_display() {
        let err = BackendError::Unavailable("503".into());
        assert_eq!(err.user_message(), "backend unavailable: 503");
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_from_protocol_error() {
        let err: BackendError = ProtocolError::InvalidMessage("no user".into()).into();
        assert!(matches!(err, BackendError::Decode(_)));
        assert!(err.to_string().contains("no user"));
    }
}
