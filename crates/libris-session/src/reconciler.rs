//! Reconciler actor: the task that owns the state machine.
//!
//! One actor runs per mount. It listens to three things at once:
//!
//! - the backend's session-change broadcast,
//! - completions from the lookup and auth-action tasks it spawned,
//! - commands from [`ReconcilerHandle`]s.
//!
//! Everything it learns goes through [`Machine::apply`]; the resulting
//! state is published on a `watch` channel and navigation/notification
//! requests go out as [`UiEffect`]s. Backend calls never run on the actor
//! itself, so a slow profile lookup can't hold up a sign-out.

use std::collections::HashMap;
use std::sync::Arc;

use libris_backend::{AdminDirectory, ProfileStore, SessionSource};
use libris_protocol::{
    AuthSession, CurrentUser, Notice, Route, SessionChange, UserMetadata,
};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::state::{CheckOutcome, Input, Machine, Output, ReconcilerState};
use crate::{ProfileResolver, ReconcilerConfig, RouteTable, SessionError};

/// A side effect the host application should carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UiEffect {
    /// Go to `path`, the configured location of `route`.
    Navigate { route: Route, path: String },
    /// Show a toast.
    Notify(Notice),
}

/// Receiving end of the effect stream.
pub type EffectReceiver = mpsc::UnboundedReceiver<UiEffect>;

type ActionReply = oneshot::Sender<Result<(), SessionError>>;

/// Commands sent from handles to the actor.
enum Command {
    Act { action: Action, reply: ActionReply },
    Recheck { reply: oneshot::Sender<ReconcilerState> },
    Shutdown,
}

/// An auth action, as submitted by a caller.
enum Action {
    SignIn { email: String, password: String },
    SignUp { email: String, password: String, metadata: UserMetadata },
    SignOut,
}

impl Action {
    fn name(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "sign_in",
            Self::SignUp { .. } => "sign_up",
            Self::SignOut => "sign_out",
        }
    }

    /// Rejects obviously incomplete requests before they reach the backend.
    fn validate(&self) -> Result<(), SessionError> {
        match self {
            Self::SignIn { email, password } | Self::SignUp { email, password, .. } => {
                if email.trim().is_empty() {
                    return Err(SessionError::InvalidInput("Email is required".into()));
                }
                if password.is_empty() {
                    return Err(SessionError::InvalidInput("Password is required".into()));
                }
                Ok(())
            }
            Self::SignOut => Ok(()),
        }
    }

    fn success_notice(&self) -> Notice {
        match self {
            Self::SignIn { .. } => Notice::success("Signed in", "Welcome back!"),
            Self::SignUp { .. } => Notice::success(
                "Account created",
                "Check your email to confirm your account.",
            ),
            Self::SignOut => Notice::success("Signed out", "You have been signed out."),
        }
    }

    fn failure_title(&self) -> &'static str {
        match self {
            Self::SignIn { .. } => "Sign in failed",
            Self::SignUp { .. } => "Sign up failed",
            Self::SignOut => "Sign out failed",
        }
    }

    async fn perform<S: SessionSource>(self, source: &S) -> Result<(), SessionError> {
        match self {
            Self::SignIn { email, password } => source
                .sign_in_with_password(&email, &password)
                .await
                .map(|_| ())
                .map_err(|e| SessionError::sign_in(&e)),
            Self::SignUp { email, password, metadata } => source
                .sign_up(&email, &password, &metadata)
                .await
                .map_err(|e| SessionError::sign_up(&e)),
            Self::SignOut => source.sign_out().await.map_err(|e| SessionError::sign_out(&e)),
        }
    }
}

/// Results reported back to the actor by the tasks it spawned.
enum Completion {
    Check { seq: u64, outcome: CheckOutcome },
    Resolved { seq: u64, user: Option<CurrentUser> },
    Action {
        result: Result<(), SessionError>,
        notice: Notice,
        reply: ActionReply,
    },
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Cheap, cloneable access to a mounted reconciler.
///
/// Reads come straight from the `watch` channel and never wait on the
/// actor. Actions go through the actor and fail with
/// [`SessionError::Unavailable`] once it has stopped.
#[derive(Clone)]
pub struct ReconcilerHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<ReconcilerState>,
}

impl ReconcilerHandle {
    /// The latest published state.
    pub fn state(&self) -> ReconcilerState {
        self.state.borrow().clone()
    }

    pub fn user(&self) -> Option<CurrentUser> {
        self.state.borrow().user.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.borrow().loading
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    /// A receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<ReconcilerState> {
        self.state.clone()
    }

    /// Waits until nothing is loading and returns that state.
    pub async fn wait_until_ready(&self) -> Result<ReconcilerState, SessionError> {
        let mut rx = self.state.clone();
        let state = rx
            .wait_for(|s| !s.loading)
            .await
            .map_err(|_| SessionError::Unavailable)?;
        Ok((*state).clone())
    }

    /// Signs in with email and password.
    ///
    /// Returns once the backend has answered. The user itself is set when
    /// the resulting `SIGNED_IN` has been resolved; use
    /// [`wait_until_ready`](Self::wait_until_ready) to wait for that.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(), SessionError> {
        self.act(Action::SignIn {
            email: email.to_string(),
            password: password.to_string(),
        })
        .await
    }

    /// Registers a new account. Does not sign in.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        name: Option<&str>,
        student_id: Option<&str>,
    ) -> Result<(), SessionError> {
        self.act(Action::SignUp {
            email: email.to_string(),
            password: password.to_string(),
            metadata: UserMetadata {
                name: name.map(str::to_string),
                student_id: student_id.map(str::to_string),
            },
        })
        .await
    }

    pub async fn sign_out(&self) -> Result<(), SessionError> {
        self.act(Action::SignOut).await
    }

    /// Re-runs the session check and returns the state it settled on.
    pub async fn recheck(&self) -> Result<ReconcilerState, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Recheck { reply: reply_tx })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)
    }

    async fn act(&self, action: Action) -> Result<(), SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(Command::Act {
                action,
                reply: reply_tx,
            })
            .await
            .map_err(|_| SessionError::Unavailable)?;
        reply_rx.await.map_err(|_| SessionError::Unavailable)?
    }
}

// ---------------------------------------------------------------------------
// Reconciler (owner)
// ---------------------------------------------------------------------------

/// A mounted reconciler.
///
/// Owns the actor task: dropping this stops the actor and releases the
/// backend subscription. Hand out [`ReconcilerHandle`]s for shared access.
pub struct Reconciler {
    handle: ReconcilerHandle,
    task: Option<JoinHandle<()>>,
}

impl Reconciler {
    /// Subscribes to `source`, starts the session check and spawns the
    /// actor.
    ///
    /// Returns the reconciler and the receiving end of its effect stream.
    /// Must be called from within a Tokio runtime.
    pub fn mount<S, P, D>(
        source: S,
        resolver: ProfileResolver<P, D>,
        config: ReconcilerConfig,
    ) -> (Self, EffectReceiver)
    where
        S: SessionSource,
        P: ProfileStore,
        D: AdminDirectory,
    {
        let (command_tx, command_rx) = mpsc::channel(config.command_channel_size.max(1));
        let (state_tx, state_rx) = watch::channel(ReconcilerState::initial());
        let (effect_tx, effect_rx) = mpsc::unbounded_channel();
        let (completion_tx, completion_rx) = mpsc::unbounded_channel();

        // Subscribe before the check starts so no change slips between them.
        let events = source.subscribe();

        let actor = ReconcilerActor {
            machine: Machine::new(config.discard_stale_resolutions),
            source: Arc::new(source),
            resolver: Arc::new(resolver),
            routes: config.routes,
            commands: command_rx,
            events: Some(events),
            completion_tx,
            completions: completion_rx,
            state: state_tx,
            effects: effect_tx,
            pending_rechecks: HashMap::new(),
        };
        let task = tokio::spawn(actor.run());

        let reconciler = Self {
            handle: ReconcilerHandle {
                commands: command_tx,
                state: state_rx,
            },
            task: Some(task),
        };
        (reconciler, effect_rx)
    }

    /// A handle to this reconciler.
    pub fn handle(&self) -> ReconcilerHandle {
        self.handle.clone()
    }

    /// Stops the actor and waits for it to finish.
    pub async fn unmount(mut self) {
        let _ = self.handle.commands.send(Command::Shutdown).await;
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl std::ops::Deref for Reconciler {
    type Target = ReconcilerHandle;

    fn deref(&self) -> &ReconcilerHandle {
        &self.handle
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct ReconcilerActor<S, P, D> {
    machine: Machine,
    source: Arc<S>,
    resolver: Arc<ProfileResolver<P, D>>,
    routes: RouteTable,
    commands: mpsc::Receiver<Command>,
    /// `None` once the backend has closed its change stream.
    events: Option<broadcast::Receiver<SessionChange>>,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completions: mpsc::UnboundedReceiver<Completion>,
    state: watch::Sender<ReconcilerState>,
    effects: mpsc::UnboundedSender<UiEffect>,
    /// Recheck callers waiting on the check with the given sequence number.
    pending_rechecks: HashMap<u64, Vec<oneshot::Sender<ReconcilerState>>>,
}

impl<S, P, D> ReconcilerActor<S, P, D>
where
    S: SessionSource,
    P: ProfileStore,
    D: AdminDirectory,
{
    async fn run(mut self) {
        tracing::info!("reconciler started");
        self.step(Input::CheckRequested);

        loop {
            tokio::select! {
                // Session events first: a backend broadcasts SIGNED_IN
                // before its sign-in call returns, and the action's
                // completion must not be applied ahead of it.
                biased;

                event = recv_event(&mut self.events) => match event {
                    Ok(change) => self.step(Input::SessionChanged(change)),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // A missed SIGNED_OUT would leave the user signed
                        // in, so ask the backend what the session is now.
                        tracing::warn!(skipped, "session change stream lagged; rechecking");
                        self.step(Input::CheckRequested);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::warn!("session change stream closed");
                        self.events = None;
                    }
                },
                Some(completion) = self.completions.recv() => self.on_completion(completion),
                cmd = self.commands.recv() => match cmd {
                    Some(Command::Act { action, reply }) => self.start_action(action, reply),
                    Some(Command::Recheck { reply }) => {
                        self.step(Input::CheckRequested);
                        let seq = self.machine.seq();
                        self.pending_rechecks.entry(seq).or_default().push(reply);
                    }
                    Some(Command::Shutdown) | None => break,
                },
            }
        }

        tracing::info!("reconciler stopped");
    }

    /// Applies one input, carries out its outputs and publishes the state.
    fn step(&mut self, input: Input) {
        for output in self.machine.apply(input) {
            match output {
                Output::Navigate(route) => {
                    let path = self.routes.path(route).to_string();
                    tracing::debug!(?route, %path, "navigating");
                    self.emit(UiEffect::Navigate { route, path });
                }
                Output::StartCheck { seq } => self.spawn_check(seq),
                Output::StartResolve { seq, session } => self.spawn_resolve(seq, session),
            }
        }
        self.publish();
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Check { seq, outcome } => {
                self.step(Input::CheckCompleted { seq, outcome });
                if let Some(waiters) = self.pending_rechecks.remove(&seq) {
                    let state = self.machine.snapshot();
                    for reply in waiters {
                        let _ = reply.send(state.clone());
                    }
                }
            }
            Completion::Resolved { seq, user } => {
                self.step(Input::SignInResolved { seq, user });
            }
            Completion::Action {
                result,
                notice,
                reply,
            } => {
                // State first, so the caller never sees a stale `loading`.
                self.step(Input::ActionFinished);
                self.emit(UiEffect::Notify(notice));
                let _ = reply.send(result);
            }
        }
    }

    fn start_action(&mut self, action: Action, reply: ActionReply) {
        if let Err(e) = action.validate() {
            tracing::debug!(action = action.name(), error = %e, "auth action rejected");
            self.emit(UiEffect::Notify(Notice::error(
                action.failure_title(),
                e.user_message(),
            )));
            let _ = reply.send(Err(e));
            return;
        }

        self.step(Input::ActionStarted);
        let source = Arc::clone(&self.source);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let name = action.name();
            let success = action.success_notice();
            let failure_title = action.failure_title();

            let result = action.perform(source.as_ref()).await;
            let notice = match &result {
                Ok(()) => {
                    tracing::info!(action = name, "auth action succeeded");
                    success
                }
                Err(e) => {
                    tracing::warn!(action = name, error = %e, "auth action failed");
                    Notice::error(failure_title, e.user_message())
                }
            };
            let _ = tx.send(Completion::Action {
                result,
                notice,
                reply,
            });
        });
    }

    fn spawn_check(&self, seq: u64) {
        let source = Arc::clone(&self.source);
        let resolver = Arc::clone(&self.resolver);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let outcome = match source.current_session().await {
                Ok(None) => CheckOutcome::NoSession,
                Ok(Some(session)) => {
                    let user = resolver.resolve(session.user_id(), Some(&session)).await;
                    CheckOutcome::Resolved(user)
                }
                Err(e) => CheckOutcome::Failed(e.to_string()),
            };
            let _ = tx.send(Completion::Check { seq, outcome });
        });
    }

    fn spawn_resolve(&self, seq: u64, session: AuthSession) {
        let resolver = Arc::clone(&self.resolver);
        let tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let user = resolver.resolve(session.user_id(), Some(&session)).await;
            let _ = tx.send(Completion::Resolved { seq, user });
        });
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.state.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    /// Sends an effect. Dropped silently if nobody is listening.
    fn emit(&self, effect: UiEffect) {
        let _ = self.effects.send(effect);
    }
}

/// Receives from the change stream, or waits forever once it has closed.
async fn recv_event(
    events: &mut Option<broadcast::Receiver<SessionChange>>,
) -> Result<SessionChange, broadcast::error::RecvError> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
