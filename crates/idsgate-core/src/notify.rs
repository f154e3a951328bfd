//! User-visible notifications raised by the login flow.

use std::sync::{Mutex, PoisonError};

/// Surface that shows a failed login to the user.
pub trait Notifier: Send + Sync {
    fn error(&self, message: &str);
}

/// Notifier that keeps every message; used by tests and headless callers.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    errors: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn error(&self, message: &str) {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.to_string());
    }
}
