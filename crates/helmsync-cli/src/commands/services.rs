//! Services command - list services derived from releases

use console::style;

use helmsync_core::ResourceId;

use crate::config::Settings;
use crate::display;
use crate::error::{CliError, Result};

/// Run the services command
pub async fn run(
    settings: &Settings,
    namespace: Option<&str>,
    ids: &[ResourceId],
    output_json: bool,
) -> Result<()> {
    let backend = settings.connect().await?;

    let mut services = if ids.is_empty() {
        backend.services(namespace).await?
    } else {
        backend.some_services(ids).await?
    };
    services.sort_by(|a, b| a.id.cmp(&b.id));

    if output_json {
        let json = serde_json::to_string_pretty(&services).map_err(|e| CliError::Backend {
            message: format!("failed to encode services: {}", e),
        })?;
        println!("{}", json);
        return Ok(());
    }

    if services.is_empty() {
        match namespace {
            Some(ns) => println!("No services found in namespace {}", ns),
            None => println!("No services found"),
        }
        return Ok(());
    }

    print!("{}", display::services_table(&services));

    let missing: Vec<&ResourceId> = ids
        .iter()
        .filter(|id| !services.iter().any(|s| &s.id == *id))
        .collect();
    for id in missing {
        eprintln!("{} no release backs service {}", style("warning:").yellow().bold(), id);
    }

    Ok(())
}
