//! Sync command - apply a plan of release changes

use console::style;
use std::path::Path;

use helmsync_core::SyncDef;

use crate::config::Settings;
use crate::display;
use crate::error::{CliError, Result};

/// Read and parse a plan file
pub fn load_plan(path: &Path) -> Result<SyncDef> {
    let text = std::fs::read_to_string(path).map_err(|e| CliError::io(path, e))?;
    SyncDef::from_yaml(&text).map_err(|e| CliError::plan(format!("{}: {}", path.display(), e)))
}

/// Run the sync command
pub async fn run(settings: &Settings, plan: &Path) -> Result<()> {
    let def = load_plan(plan)?;

    if def.is_empty() {
        println!("Plan {} has no actions", plan.display());
        return Ok(());
    }

    let backend = settings.connect().await?;
    println!(
        "Applying {} action(s) from {} via the {} backend",
        style(def.len()).bold(),
        plan.display(),
        backend.name()
    );

    let report = backend.sync(&def).await?;
    display::print_sync_report(&report);

    Ok(())
}
