//! Codec trait and implementations for backend payloads.
//!
//! The backend speaks JSON today, but nothing above this module needs to
//! know that: the REST backend asks a [`Codec`] to turn request bodies into
//! bytes and response bytes into typed values.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes Rust values to bytes and decodes bytes back.
///
/// `Send + Sync + 'static` because the codec lives inside a backend that
/// is shared across Tokio tasks for the lifetime of the application.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// Behind the `json` feature flag (enabled by default).
///
/// ```rust
/// use libris_protocol::{Codec, JsonCodec, ProfileRecord};
///
/// let codec = JsonCodec;
/// let record: ProfileRecord = codec
///     .decode(br#"{"id":"u1","role":"admin","name":"Ada"}"#)
///     .unwrap();
/// assert_eq!(record.role.as_deref(), Some("admin"));
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use super::*;
    use crate::{AuthSession, ProfileRecord, UserMetadata};

    #[test]
    fn test_decode_sign_in_response() {
        // Trimmed-down body of a password-grant token response.
        let body = br#"{
            "access_token": "eyJhbGciOi",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "r-1",
            "user": {
                "id": "8d0f",
                "email": "ada@library.test",
                "user_metadata": {"name": "Ada"},
                "aud": "authenticated"
            }
        }"#;
        let session: AuthSession = JsonCodec.decode(body).unwrap();

        assert_eq!(session.user_id().as_str(), "8d0f");
        assert_eq!(session.expires_in, Some(3600));
        assert_eq!(session.user.user_metadata.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_decode_profile_rows() {
        let body = br#"[{"id":"u1","email":"a@x.com","role":"admin","name":"Ada","student_id":null}]"#;
        let rows: Vec<ProfileRecord> = JsonCodec.decode(body).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].role.as_deref(), Some("admin"));
    }

    #[test]
    fn test_encode_metadata_skips_absent_fields() {
        let meta = UserMetadata {
            name: Some("Sam".into()),
            student_id: None,
        };
        let bytes = JsonCodec.encode(&meta).unwrap();
        assert_eq!(bytes, br#"{"name":"Sam"}"#);
    }

    #[test]
    fn test_decode_garbage_returns_decode_error() {
        let result: Result<ProfileRecord, _> = JsonCodec.decode(b"<html>502</html>");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
