//! Redirect away from the login surface when a session already exists.

use std::sync::Arc;

use crate::navigation::Navigator;
use crate::session::SessionStore;

/// Sends an already-authenticated browser to the application root.
///
/// Runs before any ticket handling, so a stale ticket in a bookmarked URL is
/// never redeemed twice.
pub struct AuthenticatedRedirectGuard {
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    root_route: String,
}

impl AuthenticatedRedirectGuard {
    pub fn new(
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
        root_route: impl Into<String>,
    ) -> Self {
        Self {
            store,
            navigator,
            root_route: root_route.into(),
        }
    }

    /// Redirects if a session exists. Returns whether a session was found.
    ///
    /// Nothing is pushed when the browser already sits on the root route.
    pub fn check(&self) -> bool {
        if !self.store.exists() {
            return false;
        }
        let location = self.navigator.location();
        if location.join(&self.root_route).is_ok_and(|root| root == location) {
            return true;
        }
        tracing::debug!(route = %self.root_route, "Session present; leaving login surface");
        self.navigator.navigate(&self.root_route);
        true
    }
}
