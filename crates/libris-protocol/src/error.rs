//! Error types for the protocol layer.
//!
//! Each Libris crate defines its own error enum. A `ProtocolError` always
//! means a payload didn't have the shape we expected, never that the
//! network or the backend misbehaved.

/// Errors that can occur while encoding or decoding payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust value into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed. Usually a backend response whose shape
    /// changed, or an error page where JSON was expected.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The payload parsed but makes no sense, e.g. a sign-in response
    /// without a user.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
