//! Identity-provider ticket login: redeem a one-time ticket into a local session.

pub mod config;
pub mod coordinator;
pub mod exchange;
pub mod guard;
pub mod navigation;
pub mod notify;
pub mod page;
pub mod session;
pub mod ticket;

pub use coordinator::{ExchangeCoordinator, ExchangeState};
pub use exchange::{
    ExchangeError, ExchangeGrant, ExchangeResult, HttpTicketExchange, TicketExchange,
};
pub use guard::AuthenticatedRedirectGuard;
pub use navigation::{BrowserHistory, Navigator};
pub use notify::{Notifier, RecordingNotifier};
pub use page::{LoginPage, PageContext, RenderOutcome};
pub use session::{FileSessionStore, MemorySessionStore, Session, SessionStore, UserInfo};
pub use ticket::{Ticket, detect_ticket, strip_ticket};
