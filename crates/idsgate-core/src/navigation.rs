//! Navigation context of the login surface.

use std::sync::{Mutex, PoisonError};

use url::Url;

/// Current location plus the two ways the login flow moves it.
pub trait Navigator: Send + Sync {
    /// The current location.
    fn location(&self) -> Url;

    /// Rewrites the current entry in place; history does not grow.
    fn replace(&self, url: Url);

    /// Navigates to `route` (resolved against the current location), adding an entry.
    fn navigate(&self, route: &str);
}

#[derive(Debug)]
struct HistoryState {
    entries: Vec<Url>,
    index: usize,
}

/// In-memory browser history.
#[derive(Debug)]
pub struct BrowserHistory {
    state: Mutex<HistoryState>,
}

impl BrowserHistory {
    pub fn new(start: Url) -> Self {
        Self {
            state: Mutex::new(HistoryState {
                entries: vec![start],
                index: 0,
            }),
        }
    }

    /// Number of history entries.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    /// Snapshot of all entries, oldest first.
    pub fn entries(&self) -> Vec<Url> {
        self.lock().entries.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HistoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for BrowserHistory {
    fn location(&self) -> Url {
        let state = self.lock();
        state.entries[state.index].clone()
    }

    fn replace(&self, url: Url) {
        let mut state = self.lock();
        let index = state.index;
        state.entries[index] = url;
    }

    fn navigate(&self, route: &str) {
        let mut state = self.lock();
        let current = &state.entries[state.index];
        let target = match current.join(route) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!(route, error = %e, "Ignoring navigation to invalid route");
                return;
            }
        };
        let keep = state.index + 1;
        state.entries.truncate(keep);
        state.entries.push(target);
        state.index = keep;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history(start: &str) -> BrowserHistory {
        BrowserHistory::new(Url::parse(start).unwrap())
    }

    #[test]
    fn test_replace_keeps_length() {
        let h = history("https://app.example/login?ticket=x");
        h.replace(Url::parse("https://app.example/login").unwrap());
        assert_eq!(h.len(), 1);
        assert_eq!(h.location().as_str(), "https://app.example/login");
    }

    #[test]
    fn test_navigate_resolves_route() {
        let h = history("https://app.example/login?lang=zh");
        h.navigate("/");
        assert_eq!(h.len(), 2);
        assert_eq!(h.location().as_str(), "https://app.example/");
        assert_eq!(h.entries()[0].as_str(), "https://app.example/login?lang=zh");
    }
}
