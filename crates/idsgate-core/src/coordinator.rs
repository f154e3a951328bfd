//! Single-flight ticket exchange for one page load.
//!
//! ```text
//! Idle -> TicketPending -> Exchanging -> Succeeded
//!                                     \-> Failed
//! ```
//!
//! `Succeeded` and `Failed` are terminal for the page load. The attempt flag is
//! set before the request is issued and never reset, so re-entrant renders can
//! not redeem the same ticket twice. A failed exchange needs a fresh page load.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::exchange::{ExchangeError, ExchangeResult, TicketExchange};
use crate::navigation::Navigator;
use crate::notify::Notifier;
use crate::session::{SessionStore, mask_token};
use crate::ticket::{detect_ticket, strip_ticket};

/// Where the coordinator is in the exchange protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Idle,
    TicketPending,
    Exchanging,
    Succeeded,
    Failed,
}

impl ExchangeState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// Gates ticket redemption to at most once per page load.
pub struct ExchangeCoordinator<E> {
    exchange: E,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    landing_route: String,
    attempted: AtomicBool,
    mounted: AtomicBool,
    state: Mutex<ExchangeState>,
}

impl<E: TicketExchange> ExchangeCoordinator<E> {
    pub fn new(
        exchange: E,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
        notifier: Arc<dyn Notifier>,
        landing_route: impl Into<String>,
    ) -> Self {
        Self {
            exchange,
            store,
            navigator,
            notifier,
            landing_route: landing_route.into(),
            attempted: AtomicBool::new(false),
            mounted: AtomicBool::new(true),
            state: Mutex::new(ExchangeState::Idle),
        }
    }

    pub fn state(&self) -> ExchangeState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True while a redemption is in flight.
    pub fn is_loading(&self) -> bool {
        self.state() == ExchangeState::Exchanging
    }

    /// Whether this page load has already committed to a redemption.
    pub fn has_attempted(&self) -> bool {
        self.attempted.load(Ordering::SeqCst)
    }

    /// Marks the owning view as gone. Late results then skip view updates.
    pub fn unmount(&self) {
        self.mounted.store(false, Ordering::SeqCst);
    }

    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: ExchangeState) {
        if !self.is_mounted() {
            return;
        }
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Runs the exchange logic for one render pass.
    ///
    /// Safe to call any number of times, concurrently or not: only the first
    /// caller that finds a ticket redeems it; the rest return immediately.
    pub async fn on_render(&self) -> ExchangeState {
        let current = self.state();
        if current.is_terminal() || self.has_attempted() {
            return current;
        }

        if self.store.exists() {
            return current;
        }

        let location = self.navigator.location();
        let Some(ticket) = detect_ticket(&location) else {
            return current;
        };

        // Only the caller that wins the flag may move the state forward.
        if self.attempted.swap(true, Ordering::SeqCst) {
            tracing::debug!("Ticket exchange already started for this page load");
            return self.state();
        }

        self.set_state(ExchangeState::TicketPending);
        self.set_state(ExchangeState::Exchanging);
        tracing::info!(page = %strip_ticket(&location), "Exchanging identity provider ticket");

        let result = self.exchange.redeem(&ticket, &location).await;
        self.complete(result)
    }

    fn complete(&self, result: ExchangeResult) -> ExchangeState {
        let mounted = self.is_mounted();
        if !mounted {
            tracing::debug!("Ticket exchange finished after unmount");
        }

        let outcome = result.and_then(|grant| {
            let session = grant.to_session();
            self.store
                .persist(&session)
                .map_err(|e| ExchangeError::Persistence(format!("{e:#}")))?;
            Ok(session)
        });

        match outcome {
            Ok(session) => {
                tracing::info!(
                    token = %mask_token(&session.access_token),
                    user = %session.user_info.email,
                    "Ticket login successful"
                );
                // The ticket is spent either way; never leave it addressable.
                let cleaned = strip_ticket(&self.navigator.location());
                self.navigator.replace(cleaned);
                if mounted {
                    self.set_state(ExchangeState::Succeeded);
                    self.navigator.navigate(&self.landing_route);
                }
                ExchangeState::Succeeded
            }
            Err(e) => {
                tracing::warn!(error = %e, "Ticket login failed");
                if mounted {
                    self.set_state(ExchangeState::Failed);
                    self.notifier.error(e.user_message());
                }
                ExchangeState::Failed
            }
        }
    }
}
