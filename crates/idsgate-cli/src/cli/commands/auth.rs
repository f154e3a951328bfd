//! Auth command handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use idsgate_core::config::{Config, paths};
use idsgate_core::session::mask_token;
use idsgate_core::{
    BrowserHistory, ExchangeState, FileSessionStore, HttpTicketExchange, LoginPage, Navigator,
    Notifier, PageContext, RenderOutcome, SessionStore, detect_ticket,
};
use url::Url;

/// Prints login failures the way the web surface toasts them.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn error(&self, message: &str) {
        eprintln!("✗ {message}");
    }
}

fn session_store() -> FileSessionStore {
    FileSessionStore::new(paths::session_path())
}

pub async fn login(page_url: &str, config: &Config) -> Result<()> {
    let start = Url::parse(page_url.trim())
        .with_context(|| format!("Invalid page URL: {page_url}"))?;

    let store = Arc::new(session_store());
    let history = Arc::new(BrowserHistory::new(start.clone()));
    let ctx = PageContext {
        store: Arc::clone(&store) as Arc<dyn SessionStore>,
        navigator: Arc::clone(&history) as Arc<dyn Navigator>,
        notifier: Arc::new(ConsoleNotifier),
        landing_route: config.landing_route.clone(),
    };

    if detect_ticket(&start).is_some() && !store.exists() {
        println!("Exchanging ticket...");
    }

    let page = LoginPage::mount(ctx, HttpTicketExchange::new(config.ids.ticket_login_url.clone()));
    let outcome = page.render().await;
    page.unmount();

    match outcome {
        RenderOutcome::AlreadyAuthenticated => {
            println!("Already logged in.");
            println!("  Redirected to: {}", history.location());
            Ok(())
        }
        RenderOutcome::Exchange(ExchangeState::Succeeded) => {
            let session = store
                .read()?
                .context("Session missing right after login")?;
            println!();
            println!(
                "✓ Logged in as {} (token: {})",
                display_user(&session.user_info.name, &session.user_info.email),
                mask_token(&session.access_token)
            );
            println!("  Session saved to: {}", store.path().display());
            println!("  Location: {}", history.location());
            Ok(())
        }
        RenderOutcome::Exchange(ExchangeState::Failed) => {
            anyhow::bail!("Ticket login failed; reload the page URL with a fresh ticket to retry")
        }
        RenderOutcome::Exchange(_) => {
            println!("No ticket in {start}; nothing to exchange.");
            println!("Run `idsgate login-url` to start a login.");
            Ok(())
        }
    }
}

pub fn login_url(config: &Config, open: bool) -> Result<()> {
    let url = config.ids.login_url()?;
    println!("{url}");

    // Best effort, skip in tests
    if open
        && std::env::var("IDSGATE_NO_BROWSER").is_err()
        && let Err(e) = open::that(&url)
    {
        tracing::warn!(error = %e, "Failed to open browser");
    }
    Ok(())
}

pub fn status() -> Result<()> {
    let store = session_store();
    match store.read()? {
        Some(session) => {
            println!(
                "Logged in as {}",
                display_user(&session.user_info.name, &session.user_info.email)
            );
            println!("  Token: {}", mask_token(&session.access_token));
            println!("  Session file: {}", store.path().display());
        }
        None => println!("Not logged in."),
    }
    Ok(())
}

pub fn logout() -> Result<()> {
    let store = session_store();
    if store.clear()? {
        println!("✓ Logged out");
        println!("  Session removed from: {}", store.path().display());
    } else {
        println!("Not logged in (no session found).");
    }
    Ok(())
}

fn display_user(name: &str, email: &str) -> String {
    match (name.is_empty(), email.is_empty()) {
        (true, true) => "unknown user".to_string(),
        (false, true) => name.to_string(),
        (true, false) => email.to_string(),
        (false, false) if name == email => name.to_string(),
        (false, false) => format!("{name} <{email}>"),
    }
}
