//! The reconciliation state machine.
//!
//! Everything the reconciler *decides* lives here, as a plain struct with
//! no channels, tasks or clocks. The actor in [`crate::reconciler`] only
//! feeds [`Input`]s in and carries [`Output`]s out, so every transition
//! rule can be tested synchronously.
//!
//! ```text
//!             ┌──────── check: no session / no user / failure ───────┐
//!             │                                                      ▼
//!         Unknown ── check: user resolved ──→ Authenticated(role)  Anonymous
//!                                                 ▲     │             │
//!                       SIGNED_IN + user resolved │     │ SIGNED_OUT  │
//!                                                 │     ▼             │
//!                                             Anonymous ◄─────────────┘
//! ```
//!
//! # Stale resolutions
//!
//! Inputs that start a profile lookup (the session check, `SIGNED_IN`) and
//! `SIGNED_OUT` each take a fresh sequence number. A lookup result carries
//! the number it was started with and is stale (by default, dropped) when
//! something newer supersedes it:
//!
//! - a check result, by a later check or a later `SIGNED_IN`/`SIGNED_OUT`;
//! - a sign-in resolution, by a later `SIGNED_IN`/`SIGNED_OUT` only.
//!
//! The first rule keeps a slow lookup for an earlier sign-in from
//! overwriting a later sign-out. The second keeps a recheck from swallowing
//! the landing navigation of a sign-in that is still resolving.

use libris_protocol::{
    AuthSession, CurrentUser, Role, Route, SessionChange, SessionEventKind,
};

/// Coarse lifecycle of the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// The initial session check hasn't finished.
    Unknown,
    /// Checked, nobody signed in.
    Anonymous,
    /// Someone is signed in with this role.
    Authenticated(Role),
}

/// The state published to consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerState {
    pub user: Option<CurrentUser>,
    /// `true` while the session check, a sign-in resolution or an auth
    /// action is outstanding.
    pub loading: bool,
    pub phase: Phase,
}

impl ReconcilerState {
    /// `user = None, loading = true`, phase `Unknown`.
    pub fn initial() -> Self {
        Self {
            user: None,
            loading: true,
            phase: Phase::Unknown,
        }
    }

    /// `true` iff the current user is an admin.
    pub fn is_admin(&self) -> bool {
        self.user.as_ref().is_some_and(CurrentUser::is_admin)
    }
}

impl Default for ReconcilerState {
    fn default() -> Self {
        Self::initial()
    }
}

/// How a session check ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// The backend holds no session.
    NoSession,
    /// There is a session; this is what profile resolution made of it.
    Resolved(Option<CurrentUser>),
    /// Asking for the session failed.
    Failed(String),
}

/// Everything that can happen to the machine.
#[derive(Debug, Clone)]
pub enum Input {
    /// Start a session check (at mount, or on request).
    CheckRequested,
    /// A session check started with `seq` finished.
    CheckCompleted { seq: u64, outcome: CheckOutcome },
    /// The backend announced a session change.
    SessionChanged(SessionChange),
    /// The lookup started for a `SIGNED_IN` with `seq` finished.
    SignInResolved { seq: u64, user: Option<CurrentUser> },
    /// An auth action (sign-in/up/out) was submitted.
    ActionStarted,
    /// An auth action finished, successfully or not.
    ActionFinished,
}

/// What the machine asks its driver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    /// Send the user to `route`.
    Navigate(Route),
    /// Query the backend for its session and resolve it; report back with
    /// [`Input::CheckCompleted`] carrying `seq`.
    StartCheck { seq: u64 },
    /// Resolve the profile for `session`; report back with
    /// [`Input::SignInResolved`] carrying `seq`.
    StartResolve { seq: u64, session: AuthSession },
}

/// The state machine itself.
#[derive(Debug)]
pub struct Machine {
    user: Option<CurrentUser>,
    phase: Phase,
    /// Sequence number of the outstanding session check.
    pending_check: Option<u64>,
    /// Sequence number of the outstanding sign-in resolution.
    pending_resolve: Option<u64>,
    actions_in_flight: u32,
    /// Last sequence number handed out.
    seq: u64,
    /// Sequence number of the latest session check.
    latest_check: u64,
    /// Sequence number of the latest `SIGNED_IN` or `SIGNED_OUT`.
    latest_session_event: u64,
    discard_stale: bool,
}

impl Machine {
    pub fn new(discard_stale: bool) -> Self {
        Self {
            user: None,
            phase: Phase::Unknown,
            // The first check is requested right after mount; until it
            // has a number, any completion clears this.
            pending_check: Some(0),
            pending_resolve: None,
            actions_in_flight: 0,
            seq: 0,
            latest_check: 0,
            latest_session_event: 0,
            discard_stale,
        }
    }

    /// The state as consumers should see it.
    pub fn snapshot(&self) -> ReconcilerState {
        ReconcilerState {
            user: self.user.clone(),
            loading: self.loading(),
            phase: self.phase,
        }
    }

    pub fn loading(&self) -> bool {
        self.pending_check.is_some() || self.pending_resolve.is_some() || self.actions_in_flight > 0
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The last sequence number handed out.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Applies one input and returns the outputs it produced, in order.
    pub fn apply(&mut self, input: Input) -> Vec<Output> {
        match input {
            Input::CheckRequested => {
                let seq = self.next_seq();
                self.latest_check = seq;
                self.pending_check = Some(seq);
                vec![Output::StartCheck { seq }]
            }
            Input::CheckCompleted { seq, outcome } => {
                if self.pending_check.is_some_and(|p| p <= seq) {
                    self.pending_check = None;
                }
                if self.check_is_stale(seq) {
                    tracing::debug!(seq, latest = self.seq, "discarding stale session check");
                    return Vec::new();
                }
                self.finish_check(outcome);
                Vec::new()
            }
            Input::SessionChanged(change) => self.on_session_change(change),
            Input::SignInResolved { seq, user } => {
                if self.pending_resolve.is_some_and(|p| p <= seq) {
                    self.pending_resolve = None;
                }
                if self.resolution_is_stale(seq) {
                    tracing::debug!(
                        seq,
                        latest = self.latest_session_event,
                        "discarding stale sign-in resolution"
                    );
                    return Vec::new();
                }
                match user {
                    Some(user) => {
                        let route = Route::landing_for(user.role);
                        tracing::info!(user_id = %user.id, role = %user.role, "signed in");
                        self.set_user(Some(user));
                        vec![Output::Navigate(route)]
                    }
                    None => {
                        tracing::warn!("signed in but no user could be resolved");
                        self.set_user(None);
                        Vec::new()
                    }
                }
            }
            Input::ActionStarted => {
                self.actions_in_flight += 1;
                Vec::new()
            }
            Input::ActionFinished => {
                self.actions_in_flight = self.actions_in_flight.saturating_sub(1);
                Vec::new()
            }
        }
    }

    fn on_session_change(&mut self, change: SessionChange) -> Vec<Output> {
        match (change.kind, change.session) {
            (SessionEventKind::SignedIn, Some(session)) => {
                let seq = self.next_seq();
                self.latest_session_event = seq;
                self.pending_resolve = Some(seq);
                tracing::debug!(user_id = %session.user_id(), seq, "resolving signed-in user");
                vec![Output::StartResolve { seq, session }]
            }
            (SessionEventKind::SignedOut, _) => {
                // Invalidates every lookup still in flight.
                self.latest_session_event = self.next_seq();
                self.clear_pending();
                self.set_user(None);
                tracing::info!("signed out");
                vec![Output::Navigate(Route::Login)]
            }
            (kind, _) => {
                tracing::debug!(%kind, "session change ignored");
                self.clear_pending();
                Vec::new()
            }
        }
    }

    fn finish_check(&mut self, outcome: CheckOutcome) {
        match outcome {
            CheckOutcome::NoSession => {
                tracing::debug!("no existing session");
                self.set_user(None);
            }
            CheckOutcome::Resolved(Some(user)) => {
                tracing::info!(user_id = %user.id, role = %user.role, "session restored");
                self.set_user(Some(user));
            }
            CheckOutcome::Resolved(None) => {
                tracing::warn!("existing session has no resolvable user; treating as signed out");
                self.set_user(None);
            }
            CheckOutcome::Failed(reason) => {
                tracing::error!(%reason, "session check failed; treating as signed out");
                self.set_user(None);
            }
        }
    }

    /// Sets the user and keeps `phase` in step with it.
    fn set_user(&mut self, user: Option<CurrentUser>) {
        self.phase = match &user {
            Some(u) => Phase::Authenticated(u.role),
            None => Phase::Anonymous,
        };
        self.user = user;
    }

    fn clear_pending(&mut self) {
        self.pending_check = None;
        self.pending_resolve = None;
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn check_is_stale(&self, seq: u64) -> bool {
        self.discard_stale && (seq < self.latest_check || seq < self.latest_session_event)
    }

    /// A newer check does not supersede a sign-in resolution.
    fn resolution_is_stale(&self, seq: u64) -> bool {
        self.discard_stale && seq < self.latest_session_event
    }
}

// =========================================================================
// Tests
// =========================================================================
