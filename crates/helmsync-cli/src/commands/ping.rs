//! Ping command - check the backend is reachable

use console::style;

use crate::config::Settings;
use crate::error::Result;

/// Run the ping command
pub async fn run(settings: &Settings) -> Result<()> {
    let backend = settings.connect().await?;
    let version = backend.ping().await?;

    println!(
        "{} {} backend reachable, server version {}",
        style("✓").green().bold(),
        backend.name(),
        style(&version).bold()
    );

    Ok(())
}
