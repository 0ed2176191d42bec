//! Connection settings for the hosted backend.

use std::time::Duration;

use crate::BackendError;

/// Environment variable holding the backend's base URL.
pub const URL_ENV: &str = "LIBRIS_BACKEND_URL";

/// Environment variable holding the public (anon) API key.
pub const ANON_KEY_ENV: &str = "LIBRIS_ANON_KEY";

/// Where the backend lives and how to identify ourselves to it.
///
/// The anon key is the *public* key a browser bundle ships with. The
/// service-role key is never part of this struct; see
/// [`ServiceRoleDirectory`](crate::ServiceRoleDirectory).
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://abcd.supabase.co`. No trailing slash.
    pub url: String,

    /// Public API key sent as the `apikey` header on every request.
    pub anon_key: String,

    /// Per-request timeout. Default: 10 seconds.
    pub request_timeout: Duration,
}

impl BackendConfig {
    /// Creates a config with the default timeout.
    pub fn new(url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            anon_key: anon_key.into(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Loads from `LIBRIS_BACKEND_URL` and `LIBRIS_ANON_KEY`.
    ///
    /// Returns `None` if either is missing; callers fall back to the
    /// in-memory backend.
    #[must_use]
    pub fn from_env() -> Option<Self> {
        let url = std::env::var(URL_ENV).ok()?;
        let anon_key = std::env::var(ANON_KEY_ENV).ok()?;
        Some(Self::new(url, anon_key))
    }

    /// Sets the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Checks the config and normalizes the URL.
    ///
    /// Rules:
    /// - `url` must start with `http://` or `https://`.
    /// - trailing slashes are stripped from `url`.
    /// - `anon_key` must not be blank.
    ///
    /// # Errors
    /// [`BackendError::Misconfigured`] naming the first rule broken.
    pub fn validated(mut self) -> Result<Self, BackendError> {
        let url = self.url.trim().trim_end_matches('/');
        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(BackendError::Misconfigured(format!(
                "backend url must be http(s), got {:?}",
                self.url
            )));
        }
        if self.anon_key.trim().is_empty() {
            return Err(BackendError::Misconfigured("anon key is empty".into()));
        }
        if !url.starts_with("https://") {
            tracing::warn!(url, "backend url is not https");
        }
        self.url = url.to_string();
        Ok(self)
    }

    /// Joins `path` (which must start with `/`) onto the base URL.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validated_strips_trailing_slash() {
        let cfg = BackendConfig::new("https://lib.example.co/", "anon")
            .validated()
            .unwrap();
        assert_eq!(cfg.url, "https://lib.example.co");
        assert_eq!(cfg.endpoint("/auth/v1/signup"), "https://lib.example.co/auth/v1/signup");
    }

    #[test]
    fn test_validated_rejects_non_http_url() {
        let result = BackendConfig::new("lib.example.co", "anon").validated();
        assert!(matches!(result, Err(BackendError::Misconfigured(_))));
    }

    #[test]
    fn test_validated_rejects_blank_key() {
        let result = BackendConfig::new("https://lib.example.co", "  ").validated();
        assert!(matches!(result, Err(BackendError::Misconfigured(_))));
    }

    #[test]
    fn test_default_timeout_and_override() {
        let cfg = BackendConfig::new("https://x", "k");
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));

        let cfg = cfg.with_timeout(Duration::from_secs(2));
        assert_eq!(cfg.request_timeout, Duration::from_secs(2));
    }
}
