//! `AuthProvider` builder and mount.
//!
//! This is the entry point for an application: it ties the backend, the
//! profile resolver and the reconciler together and hands back an
//! [`AuthProvider`] to keep alive for as long as auth state is needed.

use std::sync::Arc;

use libris_backend::{AdminDirectory, ProfileStore, SessionSource};
use libris_session::{
    EffectReceiver, ProfileResolver, Reconciler, ReconcilerConfig, RouteTable,
};

use crate::AuthContext;
#[cfg(feature = "rest")]
use crate::LibrisError;

/// Builder for configuring and mounting an [`AuthProvider`].
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use libris::prelude::*;
///
/// # async fn run() -> Result<(), LibrisError> {
/// let backend = Arc::new(MemoryBackend::new());
/// let mut provider = AuthProvider::builder().mount(backend);
/// let auth = provider.context();
/// let effects = provider.take_effects();
///
/// auth.wait_until_ready().await?;
/// # Ok(())
/// # }
/// ```
pub struct AuthProviderBuilder {
    config: ReconcilerConfig,
}

impl AuthProviderBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ReconcilerConfig::default(),
        }
    }

    /// Replaces the whole reconciler configuration.
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets where each route lives.
    pub fn routes(mut self, routes: RouteTable) -> Self {
        self.config.routes = routes;
        self
    }

    /// See [`ReconcilerConfig::discard_stale_resolutions`].
    pub fn discard_stale_resolutions(mut self, discard: bool) -> Self {
        self.config.discard_stale_resolutions = discard;
        self
    }

    /// Sets the command channel capacity.
    pub fn command_channel_size(mut self, size: usize) -> Self {
        self.config.command_channel_size = size;
        self
    }

    /// Mounts against a backend that is both the session source and the
    /// profile store. Users without a profile row resolve to no user.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn mount<B>(self, backend: Arc<B>) -> AuthProvider
    where
        B: SessionSource + ProfileStore,
    {
        let resolver = ProfileResolver::new(Arc::clone(&backend));
        self.mount_with(backend, resolver)
    }

    /// Mounts with an explicit session source and resolver, e.g. one built
    /// with [`ProfileResolver::with_admin_fallback`].
    pub fn mount_with<S, P, D>(self, source: S, resolver: ProfileResolver<P, D>) -> AuthProvider
    where
        S: SessionSource,
        P: ProfileStore,
        D: AdminDirectory,
    {
        tracing::debug!(policy = ?resolver.policy(), "mounting auth provider");
        let (reconciler, effects) = Reconciler::mount(source, resolver, self.config);
        AuthProvider {
            reconciler,
            effects: Some(effects),
        }
    }

    /// Builds a [`RestBackend`](libris_backend::RestBackend) from `config`
    /// and mounts against it.
    ///
    /// # Errors
    /// [`LibrisError::Backend`] if the configuration is unusable.
    #[cfg(feature = "rest")]
    pub fn mount_rest(
        self,
        config: libris_backend::BackendConfig,
    ) -> Result<AuthProvider, LibrisError> {
        let backend = Arc::new(libris_backend::RestBackend::new(config)?);
        Ok(self.mount(backend))
    }
}

impl Default for AuthProviderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A mounted auth provider.
///
/// Dropping it (or calling [`unmount`](Self::unmount)) stops the
/// reconciler and unsubscribes from the backend. Contexts handed out
/// earlier keep their last state but their actions start failing.
pub struct AuthProvider {
    reconciler: Reconciler,
    effects: Option<EffectReceiver>,
}

impl AuthProvider {
    /// Creates a new builder.
    pub fn builder() -> AuthProviderBuilder {
        AuthProviderBuilder::new()
    }

    /// A context for reading auth state and running auth actions.
    pub fn context(&self) -> AuthContext {
        AuthContext::new(self.reconciler.handle())
    }

    /// Takes the effect stream. There is only one; later calls get `None`.
    pub fn take_effects(&mut self) -> Option<EffectReceiver> {
        self.effects.take()
    }

    /// Stops the reconciler and waits for it to finish.
    pub async fn unmount(self) {
        self.reconciler.unmount().await;
        tracing::debug!("auth provider unmounted");
    }
}
