//! Config command handlers.

use anyhow::Result;
use idsgate_core::config::{self, paths};

pub fn path() -> Result<()> {
    println!("{}", paths::config_path().display());
    Ok(())
}

pub fn init() -> Result<()> {
    let path = paths::config_path();
    config::Config::init(&path)?;
    println!("Created config at {}", path.display());
    Ok(())
}
