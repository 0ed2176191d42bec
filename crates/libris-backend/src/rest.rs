//! HTTP implementation of the backend traits.
//!
//! Speaks the hosted backend's REST dialect: the auth service under
//! `/auth/v1` and the auto-generated table API under `/rest/v1`. Every
//! request carries the public `apikey` header; requests made on behalf of a
//! signed-in user also carry `Authorization: Bearer <access token>`.
//!
//! Token persistence and refresh are out of scope: the session lives in
//! memory for as long as the [`RestBackend`] does.

use std::sync::{Mutex, MutexGuard, PoisonError};

use libris_protocol::{
    AuthSession, AuthUser, Codec, JsonCodec, ProfileRecord, ProtocolError,
    SessionChange, UserId, UserMetadata,
};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tokio::sync::broadcast;

use crate::{
    AdminDirectory, BackendConfig, BackendError, DEFAULT_EVENT_CAPACITY,
    ProfileStore, SessionSource,
};

const SIGN_IN_PATH: &str = "/auth/v1/token?grant_type=password";
const SIGN_UP_PATH: &str = "/auth/v1/signup";
const SIGN_OUT_PATH: &str = "/auth/v1/logout";
const PROFILES_PATH: &str = "/rest/v1/profiles";
const ADMIN_USERS_PATH: &str = "/auth/v1/admin/users";

#[derive(Serialize)]
struct PasswordCredentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct SignUpRequest<'a> {
    email: &'a str,
    password: &'a str,
    data: &'a UserMetadata,
}

/// The backend isn't consistent about where it puts the message: the
/// token endpoint uses `error_description`, the auth service `msg`, the
/// table API `message`.
#[derive(Deserialize, Default)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

/// Picks the most specific human-readable message out of an error body.
fn error_message(codec: &impl Codec, status: StatusCode, body: &[u8]) -> String {
    let parsed: ErrorBody = codec.decode(body).unwrap_or_default();
    parsed
        .error_description
        .or(parsed.msg)
        .or(parsed.message)
        .or(parsed.error)
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

/// Maps a non-success status to a [`BackendError`].
///
/// 4xx are the caller's fault and become `Rejected`; 5xx mean the backend
/// is in trouble and become `Unavailable`.
fn status_error(codec: &impl Codec, status: StatusCode, body: &[u8]) -> BackendError {
    let message = error_message(codec, status, body);
    if status.is_server_error() {
        BackendError::Unavailable(format!("{status}: {message}"))
    } else {
        BackendError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

fn build_client(config: &BackendConfig) -> Result<reqwest::Client, BackendError> {
    reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .map_err(BackendError::Http)
}

/// Sends `request` and returns the status and raw body.
async fn execute(request: RequestBuilder) -> Result<(StatusCode, Vec<u8>), BackendError> {
    let response = request.send().await.map_err(BackendError::Http)?;
    let status = response.status();
    let body = response.bytes().await.map_err(BackendError::Http)?;
    Ok((status, body.to_vec()))
}

// ---------------------------------------------------------------------------
// RestBackend
// ---------------------------------------------------------------------------

/// [`SessionSource`] and [`ProfileStore`] over HTTPS.
///
/// Holds the current session in memory and broadcasts changes to
/// subscribers exactly like the hosted client SDK does: `SIGNED_IN` after a
/// successful password grant, `SIGNED_OUT` whenever the local session is
/// cleared.
pub struct RestBackend {
    config: BackendConfig,
    http: reqwest::Client,
    codec: JsonCodec,
    session: Mutex<Option<AuthSession>>,
    events: broadcast::Sender<SessionChange>,
}

impl RestBackend {
    /// Validates `config` and builds the HTTP client.
    ///
    /// # Errors
    /// [`BackendError::Misconfigured`] for a bad URL or key,
    /// [`BackendError::Http`] if the TLS backend can't be initialized.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let config = config.validated()?;
        let http = build_client(&config)?;
        let (events, _) = broadcast::channel(DEFAULT_EVENT_CAPACITY);
        tracing::info!(url = %config.url, "rest backend configured");
        Ok(Self {
            config,
            http,
            codec: JsonCodec,
            session: Mutex::new(None),
            events,
        })
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn session(&self) -> MutexGuard<'_, Option<AuthSession>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A request to `path` with the `apikey` header set.
    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.config.endpoint(path))
            .header("apikey", &self.config.anon_key)
    }

    /// Bearer token for table reads: the user's access token when signed
    /// in, the anon key otherwise.
    fn bearer(&self) -> String {
        let token = self
            .session()
            .as_ref()
            .map(|s| s.access_token.clone())
            .unwrap_or_else(|| self.config.anon_key.clone());
        format!("Bearer {token}")
    }

    fn json_body<T: Serialize>(
        &self,
        request: RequestBuilder,
        body: &T,
    ) -> Result<RequestBuilder, BackendError> {
        let bytes = self.codec.encode(body)?;
        Ok(request.header(CONTENT_TYPE, "application/json").body(bytes))
    }

    async fn send_expecting<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, BackendError> {
        let (status, body) = execute(request).await?;
        if !status.is_success() {
            return Err(status_error(&self.codec, status, &body));
        }
        Ok(self.codec.decode(&body)?)
    }

    fn set_session(&self, session: Option<AuthSession>) {
        *self.session() = session;
    }
}

impl SessionSource for RestBackend {
    async fn current_session(&self) -> Result<Option<AuthSession>, BackendError> {
        Ok(self.session().clone())
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<AuthSession, BackendError> {
        let request = self.json_body(
            self.request(Method::POST, SIGN_IN_PATH),
            &PasswordCredentials { email, password },
        )?;
        let session: AuthSession = self.send_expecting(request).await?;
        if session.access_token.is_empty() {
            return Err(ProtocolError::InvalidMessage(
                "token response without access_token".into(),
            )
            .into());
        }

        tracing::info!(user_id = %session.user_id(), "signed in");
        self.set_session(Some(session.clone()));
        let _ = self.events.send(SessionChange::signed_in(session.clone()));
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: &UserMetadata,
    ) -> Result<(), BackendError> {
        let request = self.json_body(
            self.request(Method::POST, SIGN_UP_PATH),
            &SignUpRequest {
                email,
                password,
                data: metadata,
            },
        )?;
        let (status, body) = execute(request).await?;
        if !status.is_success() {
            return Err(status_error(&self.codec, status, &body));
        }
        tracing::info!(email, "sign-up accepted");
        Ok(())
    }

    /// Clears the local session first, so the user is signed out locally
    /// even when the revoke call fails. The remote error is still returned.
    async fn sign_out(&self) -> Result<(), BackendError> {
        let previous = self.session().take();
        let _ = self.events.send(SessionChange::signed_out());

        let Some(session) = previous else {
            return Ok(());
        };
        let request = self
            .request(Method::POST, SIGN_OUT_PATH)
            .header(AUTHORIZATION, format!("Bearer {}", session.access_token));
        let (status, body) = execute(request).await?;
        // An already-expired token can't be revoked, which is fine.
        if !status.is_success() && status != StatusCode::UNAUTHORIZED {
            return Err(status_error(&self.codec, status, &body));
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionChange> {
        self.events.subscribe()
    }
}

impl ProfileStore for RestBackend {
    async fn profile_by_id(
        &self,
        id: &UserId,
    ) -> Result<Option<ProfileRecord>, BackendError> {
        let request = self
            .request(Method::GET, PROFILES_PATH)
            .header(AUTHORIZATION, self.bearer())
            .query(&[("id", format!("eq.{id}")), ("select", "*".to_string())]);
        let rows: Vec<ProfileRecord> = self.send_expecting(request).await?;
        Ok(rows.into_iter().next())
    }
}

// ---------------------------------------------------------------------------
// ServiceRoleDirectory
// ---------------------------------------------------------------------------

/// [`AdminDirectory`] backed by the auth admin API.
///
/// Needs the backend's service-role key, which bypasses every row-level
/// security policy. Only build one in a trusted process (a server, a CLI
/// run by staff); the key is never read from [`BackendConfig`] or the
/// environment.
pub struct ServiceRoleDirectory {
    config: BackendConfig,
    service_key: String,
    http: reqwest::Client,
    codec: JsonCodec,
}

impl ServiceRoleDirectory {
    /// # Errors
    /// [`BackendError::Misconfigured`] for a bad config or a blank key.
    pub fn new(config: BackendConfig, service_key: impl Into<String>) -> Result<Self, BackendError> {
        let config = config.validated()?;
        let service_key = service_key.into();
        if service_key.trim().is_empty() {
            return Err(BackendError::Misconfigured("service key is empty".into()));
        }
        let http = build_client(&config)?;
        tracing::warn!("service-role directory enabled; keep this process trusted");
        Ok(Self {
            config,
            service_key,
            http,
            codec: JsonCodec,
        })
    }
}

impl AdminDirectory for ServiceRoleDirectory {
    async fn user_by_id(&self, id: &UserId) -> Result<Option<AuthUser>, BackendError> {
        let url = self.config.endpoint(&format!("{ADMIN_USERS_PATH}/{id}"));
        let request = self
            .http
            .get(url)
            .header("apikey", &self.service_key)
            .header(AUTHORIZATION, format!("Bearer {}", self.service_key));
        let (status, body) = execute(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(status_error(&self.codec, status, &body));
        }
        Ok(Some(self.codec.decode(&body)?))
    }
}
