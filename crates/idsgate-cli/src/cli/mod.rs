//! CLI entry and dispatch.

use anyhow::{Context, Result};
use clap::Parser;
use idsgate_core::config;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "idsgate")]
#[command(version)]
#[command(about = "Redeem identity-provider login tickets into a local session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Complete a login from the page URL the identity provider redirected to
    Login {
        /// Page URL carrying the `ticket` query parameter
        #[arg(value_name = "PAGE_URL")]
        page_url: String,
    },

    /// Print the identity provider login URL
    LoginUrl {
        /// Also open the URL in a browser
        #[arg(long)]
        open: bool,
    },

    /// Show the current session
    Status,

    /// Log out (clear the saved session)
    Logout,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("IDSGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    // Ignore the error when a subscriber is already installed.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    init_tracing();

    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;

    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Login { page_url } => {
            let config = config::Config::load().context("load config")?;
            commands::auth::login(&page_url, &config).await
        }
        Commands::LoginUrl { open } => {
            let config = config::Config::load().context("load config")?;
            commands::auth::login_url(&config, open)
        }
        Commands::Status => commands::auth::status(),
        Commands::Logout => commands::auth::logout(),
        Commands::Config { command } => match command {
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Init => commands::config::init(),
        },
    }
}
