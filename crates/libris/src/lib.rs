//! # Libris
//!
//! Auth session and role routing for the Libris library app.
//!
//! Libris keeps track of who is signed in and whether they are an `admin`
//! or a `student`, reacting to the hosted auth backend's session events and
//! sending each user to the right landing page. Applications mount an
//! [`AuthProvider`] once and pass [`AuthContext`]s around.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use libris::prelude::*;
//!
//! # async fn run() -> Result<(), LibrisError> {
//! libris::init_tracing();
//!
//! let config = BackendConfig::from_env().expect("LIBRIS_BACKEND_URL and LIBRIS_ANON_KEY");
//! let mut provider = AuthProvider::builder().mount_rest(config)?;
//! let auth = provider.context();
//! let mut effects = provider.take_effects().expect("first call");
//!
//! auth.sign_in("ada@library.test", "hunter2").await?;
//! while let Some(effect) = effects.recv().await {
//!     if let UiEffect::Navigate { path, .. } = effect {
//!         println!("go to {path}");
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

mod context;
mod error;
mod provider;

pub use context::AuthContext;
pub use error::LibrisError;
pub use provider::{AuthProvider, AuthProviderBuilder};

pub use libris_backend as backend;
pub use libris_protocol as protocol;
pub use libris_session as session;

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Installs a `tracing` subscriber that writes to stderr, filtered by
/// `RUST_LOG` (default [`DEFAULT_LOG_FILTER`]).
///
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub mod prelude {
    pub use crate::{AuthContext, AuthProvider, AuthProviderBuilder, LibrisError};

    pub use libris_backend::{
        AdminDirectory, BackendConfig, BackendError, MemoryBackend, ProfileStore,
        SessionSource,
    };
    #[cfg(feature = "rest")]
    pub use libris_backend::{RestBackend, ServiceRoleDirectory};
    pub use libris_protocol::{
        CurrentUser, Notice, NoticeLevel, Role, Route, SessionChange, SessionEventKind, UserId,
    };
    pub use libris_session::{
        FallbackPolicy, Phase, ProfileResolver, ReconcilerConfig, ReconcilerState, RouteTable,
        SessionError, UiEffect,
    };
}
