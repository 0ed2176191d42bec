//! Core data model shared by every Libris layer.
//!
//! These are the structures that cross a boundary: they come back from the
//! hosted auth backend (sessions, users), from the `profiles` table
//! (profile records), or go out to the UI (the current user, navigation
//! routes, notices).
//!
//! Everything here is plain data. No type in this module talks to the
//! network or holds a lock.

use serde::{Deserialize, Serialize};

use std::fmt;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// The backend's identifier for an account.
///
/// This is a "newtype wrapper" around the opaque string the auth backend
/// hands out (a UUID in practice, but we never parse it). Wrapping it means
/// a user id can't be confused with an email or an access token even
/// though all three are strings underneath.
///
/// `#[serde(transparent)]` serializes `UserId("u1")` as just `"u1"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    /// Creates a `UserId` from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrows the raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UserId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for UserId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ---------------------------------------------------------------------------
// Role
// ---------------------------------------------------------------------------

/// Authorization classification of a user.
///
/// A closed two-value enum on purpose: the profile table stores the role
/// as free text, and anything that isn't exactly `"admin"` or `"student"`
/// must collapse to [`Role::Student`] before it can reach an authorization
/// check. See [`Role::from_profile`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Library staff. Lands on the admin dashboard.
    Admin,

    /// Everyone else. Also the role for missing or unrecognized profiles.
    #[default]
    Student,
}

impl Role {
    /// Narrows the raw `role` column of a profile row to a `Role`.
    ///
    /// Matching is exact and case-sensitive. `None`, `""`, `"Admin"`,
    /// `"librarian"` and every other value become `Student`.
    pub fn from_profile(raw: Option<&str>) -> Self {
        match raw {
            Some("admin") => Self::Admin,
            Some("student") => Self::Student,
            _ => Self::Student,
        }
    }

    /// The wire spelling of this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Student => "student",
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// CurrentUser
// ---------------------------------------------------------------------------

/// The signed-in user as the rest of the application sees it.
///
/// There is no "half-built" user: the only way to get one is with all of
/// `id`, `email` and `role` in hand, and the optional fields are genuinely
/// optional. The application holds an `Option<CurrentUser>`, where `None`
/// means "no authenticated session".
///
/// Serialized in camelCase (`studentId`) because that's what the UI layer
/// consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: UserId,
    /// Empty when the backend omitted it.
    pub email: String,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Always `None` for admins in practice; nothing enforces it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

impl CurrentUser {
    /// Creates a user with no name or student id.
    pub fn new(id: UserId, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            email: email.into(),
            role,
            name: None,
            student_id: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.name = name;
        self
    }

    /// Sets the student identifier.
    pub fn with_student_id(mut self, student_id: Option<String>) -> Self {
        self.student_id = student_id;
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

// ---------------------------------------------------------------------------
// Backend payloads
// ---------------------------------------------------------------------------

/// One row of the `profiles` table.
///
/// `role` stays a raw string here. The row is the backend's shape, not
/// ours; narrowing happens in the resolver via [`Role::from_profile`].
/// Every column except `id` is nullable in the table, hence the
/// `#[serde(default)]`s.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
}

/// Free-form metadata attached to an auth account at sign-up.
///
/// The backend stores this as an opaque JSON object; we only read and
/// write the two keys the library app cares about. Unknown keys are
/// ignored on the way in.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
}

/// An account as the auth backend describes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: UserId,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

/// A backend-issued proof of authentication.
///
/// `Debug` is implemented by hand so access and refresh tokens never end
/// up in a log line.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Seconds until `access_token` expires, as reported at issue time.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub token_type: Option<String>,
    pub user: AuthUser,
}

impl AuthSession {
    /// The id of the user this session belongs to.
    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }

    /// The account email, if the backend included one.
    pub fn email(&self) -> Option<&str> {
        self.user.email.as_deref()
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("expires_in", &self.expires_in)
            .field("user", &self.user)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Session-change events
// ---------------------------------------------------------------------------

/// What kind of change the auth backend is announcing.
///
/// Spelled the way the backend spells them (`SIGNED_IN`, ...). Kinds we
/// don't know about deserialize to [`SessionEventKind::Other`] instead of
/// failing, since the reconciler treats every unknown kind the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionEventKind {
    InitialSession,
    SignedIn,
    SignedOut,
    TokenRefreshed,
    UserUpdated,
    PasswordRecovery,
    #[serde(other)]
    Other,
}

impl fmt::Display for SessionEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InitialSession => "INITIAL_SESSION",
            Self::SignedIn => "SIGNED_IN",
            Self::SignedOut => "SIGNED_OUT",
            Self::TokenRefreshed => "TOKEN_REFRESHED",
            Self::UserUpdated => "USER_UPDATED",
            Self::PasswordRecovery => "PASSWORD_RECOVERY",
            Self::Other => "OTHER",
        };
        f.write_str(s)
    }
}

/// One notification on the session-change stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionChange {
    pub kind: SessionEventKind,
    /// The session after the change. `None` for sign-out.
    #[serde(default)]
    pub session: Option<AuthSession>,
}

impl SessionChange {
    pub fn new(kind: SessionEventKind, session: Option<AuthSession>) -> Self {
        Self { kind, session }
    }

    pub fn signed_in(session: AuthSession) -> Self {
        Self::new(SessionEventKind::SignedIn, Some(session))
    }

    pub fn signed_out() -> Self {
        Self::new(SessionEventKind::SignedOut, None)
    }
}

// ---------------------------------------------------------------------------
// UI-facing side effects
// ---------------------------------------------------------------------------

/// A named place in the application the user can be sent to.
///
/// The actual paths live in the route table of the reconciler config so
/// the host application can mount the pages wherever it likes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    AdminHome,
    StudentHome,
    Login,
}

impl Route {
    /// The landing route for a freshly signed-in user.
    pub fn landing_for(role: Role) -> Self {
        match role {
            Role::Admin => Self::AdminHome,
            Role::Student => Self::StudentHome,
        }
    }
}

/// Severity of a transient notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient notification ("toast") for the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn success(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: title.into(),
            message: message.into(),
        }
    }

    pub fn error(title: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: title.into(),
            message: message.into(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    //! The backend and the UI both parse these shapes, so the tests pin
    //! the JSON produced by our serde attributes.

    use super::*;

    fn sample_session() -> AuthSession {
        AuthSession {
            access_token: "secret-token".into(),
            refresh_token: Some("refresh-secret".into()),
            expires_in: Some(3600),
            token_type: Some("bearer".into()),
            user: AuthUser {
                id: UserId::new("u1"),
                email: Some("ada@library.test".into()),
                user_metadata: UserMetadata::default(),
            },
        }
    }

    // =====================================================================
    // UserId
    // =====================================================================

    #[test]
    fn test_user_id_serializes_as_plain_string() {
        let json = serde_json::to_string(&UserId::new("u1")).unwrap();
        assert_eq!(json, "\"u1\"");
    }

    #[test]
    fn test_user_id_display_is_raw_id() {
        assert_eq!(UserId::from("abc-123").to_string(), "abc-123");
    }

    // =====================================================================
    // Role
    // =====================================================================

    #[test]
    fn test_role_from_profile_exact_values() {
        assert_eq!(Role::from_profile(Some("admin")), Role::Admin);
        assert_eq!(Role::from_profile(Some("student")), Role::Student);
    }

    #[test]
    fn test_role_from_profile_missing_defaults_to_student() {
        assert_eq!(Role::from_profile(None), Role::Student);
        assert_eq!(Role::from_profile(Some("")), Role::Student);
    }

    #[test]
    fn test_role_from_profile_unrecognized_defaults_to_student() {
        // Near misses must not be promoted to admin.
        assert_eq!(Role::from_profile(Some("Admin")), Role::Student);
        assert_eq!(Role::from_profile(Some(" admin")), Role::Student);
        assert_eq!(Role::from_profile(Some("librarian")), Role::Student);
    }

    #[test]
    fn test_role_default_is_student() {
        assert_eq!(Role::default(), Role::Student);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(Role::Student.to_string(), "student");
    }

    #[test]
    fn test_role_deserialize_rejects_unknown() {
        let result: Result<Role, _> = serde_json::from_str("\"superuser\"");
        assert!(result.is_err());
    }

    // =====================================================================
    // CurrentUser
    // =====================================================================

    #[test]
    fn test_current_user_json_uses_camel_case() {
        let user = CurrentUser::new(UserId::new("u3"), "s@x.com", Role::Student)
            .with_name(Some("Sam".into()))
            .with_student_id(Some("S-42".into()));
        let json = serde_json::to_value(&user).unwrap();

        assert_eq!(json["id"], "u3");
        assert_eq!(json["role"], "student");
        assert_eq!(json["studentId"], "S-42");
        assert!(json.get("student_id").is_none());
    }

    #[test]
    fn test_current_user_omits_absent_optionals() {
        let user = CurrentUser::new(UserId::new("u1"), "", Role::Admin);
        let json = serde_json::to_value(&user).unwrap();

        assert!(json.get("name").is_none());
        assert!(json.get("studentId").is_none());
        assert!(user.is_admin());
    }

    // =====================================================================
    // ProfileRecord / AuthSession
    // =====================================================================

    #[test]
    fn test_profile_record_tolerates_null_columns() {
        let json = r#"{"id":"u1","email":null,"role":null,"name":"Ada","student_id":null}"#;
        let record: ProfileRecord = serde_json::from_str(json).unwrap();

        assert_eq!(record.id, UserId::new("u1"));
        assert_eq!(record.role, None);
        assert_eq!(record.name.as_deref(), Some("Ada"));
    }

    #[test]
    fn test_profile_record_tolerates_missing_columns() {
        let record: ProfileRecord = serde_json::from_str(r#"{"id":"u9"}"#).unwrap();
        assert_eq!(record.email, None);
        assert_eq!(record.student_id, None);
    }

    #[test]
    fn test_auth_user_ignores_unknown_metadata_keys() {
        let json = r#"{
            "id": "u2",
            "email": "b@x.com",
            "user_metadata": {"name": "Bea", "student_id": "S-1", "avatar": "x.png"}
        }"#;
        let user: AuthUser = serde_json::from_str(json).unwrap();

        assert_eq!(user.user_metadata.name.as_deref(), Some("Bea"));
        assert_eq!(user.user_metadata.student_id.as_deref(), Some("S-1"));
    }

    #[test]
    fn test_auth_session_debug_redacts_tokens() {
        let debug = format!("{:?}", sample_session());
        assert!(!debug.contains("secret-token"));
        assert!(!debug.contains("refresh-secret"));
        assert!(debug.contains("u1"));
    }

    #[test]
    fn test_auth_session_accessors() {
        let session = sample_session();
        assert_eq!(session.user_id(), &UserId::new("u1"));
        assert_eq!(session.email(), Some("ada@library.test"));
    }

    // =====================================================================
    // SessionChange
    // =====================================================================

    #[test]
    fn test_session_event_kind_uses_backend_spelling() {
        let json = serde_json::to_string(&SessionEventKind::SignedIn).unwrap();
        assert_eq!(json, "\"SIGNED_IN\"");
        assert_eq!(SessionEventKind::TokenRefreshed.to_string(), "TOKEN_REFRESHED");
    }

    #[test]
    fn test_session_event_kind_unknown_maps_to_other() {
        let kind: SessionEventKind = serde_json::from_str("\"MFA_CHALLENGE_VERIFIED\"").unwrap();
        assert_eq!(kind, SessionEventKind::Other);
    }

    #[test]
    fn test_session_change_signed_out_has_no_session() {
        let change = SessionChange::signed_out();
        assert_eq!(change.kind, SessionEventKind::SignedOut);
        assert!(change.session.is_none());
    }

    // =====================================================================
    // Route / Notice
    // =====================================================================

    #[test]
    fn test_route_landing_for_role() {
        assert_eq!(Route::landing_for(Role::Admin), Route::AdminHome);
        assert_eq!(Route::landing_for(Role::Student), Route::StudentHome);
    }

    #[test]
    fn test_notice_constructors_set_level() {
        assert_eq!(Notice::success("Signed in", "").level, NoticeLevel::Success);
        let err = Notice::error("Sign in failed", "Invalid login credentials");
        assert_eq!(err.level, NoticeLevel::Error);
        assert_eq!(err.message, "Invalid login credentials");
    }
}
