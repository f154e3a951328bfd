//! Ticket detection in the navigation URL.

use std::fmt;

use url::Url;

/// Query parameter the identity provider uses to hand back the ticket.
pub const TICKET_PARAM: &str = "ticket";

/// Opaque, single-use ticket issued by the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Ticket(String);

impl Ticket {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// Tickets are credentials; keep them out of debug output.
impl fmt::Debug for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Ticket(***)")
    }
}

/// Returns the ticket carried by `url`, if any.
///
/// Only the first `ticket` pair is considered. An empty value counts as absent.
pub fn detect_ticket(url: &Url) -> Option<Ticket> {
    url.query_pairs()
        .find(|(key, _)| key == TICKET_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
        .map(Ticket)
}

/// Returns `url` with every `ticket` pair removed.
///
/// Path, fragment and the remaining query pairs are preserved. The `?` is
/// dropped entirely when nothing is left.
pub fn strip_ticket(url: &Url) -> Url {
    let mut cleaned = url.clone();
    let remaining: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != TICKET_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if remaining.is_empty() {
        cleaned.set_query(None);
    } else {
        cleaned.query_pairs_mut().clear().extend_pairs(remaining);
    }
    cleaned
}
