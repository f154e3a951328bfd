//! The login surface for one page load.
//!
//! Every render runs the redirect guard first and only then the ticket
//! exchange, so an authenticated browser never redeems a stale ticket.

use std::sync::Arc;

use crate::coordinator::{ExchangeCoordinator, ExchangeState};
use crate::exchange::TicketExchange;
use crate::guard::AuthenticatedRedirectGuard;
use crate::navigation::Navigator;
use crate::notify::Notifier;
use crate::session::SessionStore;

/// Collaborators shared by everything on the page.
#[derive(Clone)]
pub struct PageContext {
    pub store: Arc<dyn SessionStore>,
    pub navigator: Arc<dyn Navigator>,
    pub notifier: Arc<dyn Notifier>,
    /// Route for both the post-login landing and the already-logged-in redirect.
    pub landing_route: String,
}

/// What a render pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// A session already existed; the guard navigated away.
    AlreadyAuthenticated,
    /// The ticket flow ran (or was a no-op) and is in this state.
    Exchange(ExchangeState),
}

/// Login page state for a single page load.
pub struct LoginPage<E> {
    guard: AuthenticatedRedirectGuard,
    coordinator: ExchangeCoordinator<E>,
}

impl<E: TicketExchange> LoginPage<E> {
    /// Mounts the page. A new page load means a new `LoginPage`.
    pub fn mount(ctx: PageContext, exchange: E) -> Self {
        let guard = AuthenticatedRedirectGuard::new(
            Arc::clone(&ctx.store),
            Arc::clone(&ctx.navigator),
            ctx.landing_route.clone(),
        );
        let coordinator = ExchangeCoordinator::new(
            exchange,
            ctx.store,
            ctx.navigator,
            ctx.notifier,
            ctx.landing_route,
        );
        Self { guard, coordinator }
    }

    /// One render pass. May be called repeatedly and concurrently.
    pub async fn render(&self) -> RenderOutcome {
        if self.guard.check() {
            return RenderOutcome::AlreadyAuthenticated;
        }
        RenderOutcome::Exchange(self.coordinator.on_render().await)
    }

    /// True while the ticket exchange is in flight.
    pub fn is_loading(&self) -> bool {
        self.coordinator.is_loading()
    }

    pub fn exchange_state(&self) -> ExchangeState {
        self.coordinator.state()
    }

    pub fn unmount(&self) {
        self.coordinator.unmount();
    }
}
