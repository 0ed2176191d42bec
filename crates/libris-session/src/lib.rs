//! Session/profile reconciliation for Libris.
//!
//! This crate keeps the application's idea of *who is signed in, and as
//! what* in step with the auth backend:
//!
//! 1. **Resolution**: turning a backend user id into a [`CurrentUser`]
//!    with a role ([`ProfileResolver`])
//! 2. **Reconciliation**: reacting to the startup session check and to
//!    session-change events ([`Machine`], driven by [`Reconciler`])
//! 3. **Auth actions**: sign-in, sign-up and sign-out with notices
//!    ([`ReconcilerHandle`])
//!
//! # How it fits in the stack
//!
//! ```text
//! Application (above)  ← reads state, follows UiEffects
//!     ↕
//! Session Layer (this crate)  ← owns the current user and the role routing
//!     ↕
//! Backend Layer (below)  ← sessions, profile rows, change events
//! ```
//!
//! [`CurrentUser`]: libris_protocol::CurrentUser

mod config;
mod error;
mod profile;
mod reconciler;
mod state;

pub use config::{ReconcilerConfig, RouteTable};
pub use error::SessionError;
pub use profile::{FallbackPolicy, NoDirectory, ProfileResolver};
pub use reconciler::{EffectReceiver, Reconciler, ReconcilerHandle, UiEffect};
pub use state::{CheckOutcome, Input, Machine, Output, Phase, ReconcilerState};
