//! Reconciler configuration.

use libris_protocol::Route;

/// Where each named [`Route`] lives in the host application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTable {
    /// Landing page for admins. Default: `/admin`.
    pub admin_home: String,
    /// Landing page for students. Default: `/student`.
    pub student_home: String,
    /// Where signed-out users are sent. Default: `/login`.
    pub login: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            admin_home: "/admin".into(),
            student_home: "/student".into(),
            login: "/login".into(),
        }
    }
}

impl RouteTable {
    /// The path for `route`.
    pub fn path(&self, route: Route) -> &str {
        match route {
            Route::AdminHome => &self.admin_home,
            Route::StudentHome => &self.student_home,
            Route::Login => &self.login,
        }
    }
}

/// Configuration for the reconciler.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub routes: RouteTable,

    /// Drop profile resolutions that were overtaken by a newer session
    /// change before they completed.
    ///
    /// Default: `true`. With `false`, completions are applied in the order
    /// they finish, so a slow lookup for an earlier sign-in can overwrite
    /// the result of a later one.
    pub discard_stale_resolutions: bool,

    /// Capacity of the command channel between handles and the actor.
    /// Default: 32.
    pub command_channel_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            routes: RouteTable::default(),
            discard_stale_resolutions: true,
            command_channel_size: 32,
        }
    }
}

impl ReconcilerConfig {
    /// Sets the route table.
    pub fn with_routes(mut self, routes: RouteTable) -> Self {
        self.routes = routes;
        self
    }

    /// Sets [`discard_stale_resolutions`](Self::discard_stale_resolutions).
    pub fn discard_stale_resolutions(mut self, discard: bool) -> Self {
        self.discard_stale_resolutions = discard;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_table_default_paths() {
        let routes = RouteTable::default();
        assert_eq!(routes.path(Route::AdminHome), "/admin");
        assert_eq!(routes.path(Route::StudentHome), "/student");
        assert_eq!(routes.path(Route::Login), "/login");
    }

    #[test]
    fn test_reconciler_config_default() {
        let config = ReconcilerConfig::default();
        assert!(config.discard_stale_resolutions);
        assert_eq!(config.command_channel_size, 32);
    }

    #[test]
    fn test_reconciler_config_builders() {
        let routes = RouteTable {
            login: "/signin".into(),
            ..RouteTable::default()
        };
        let config = ReconcilerConfig::default()
            .with_routes(routes)
            .discard_stale_resolutions(false);

        assert_eq!(config.routes.path(Route::Login), "/signin");
        assert!(!config.discard_stale_resolutions);
    }
}
