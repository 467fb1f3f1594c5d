//! Export command - dump the deployed configuration

use std::io::Write;
use std::path::Path;

use crate::config::Settings;
use crate::error::{CliError, Result};

/// Run the export command
pub async fn run(settings: &Settings, output: Option<&Path>) -> Result<()> {
    let backend = settings.connect().await?;
    let exported = backend.export().await?;

    match output {
        Some(path) => {
            std::fs::write(path, &exported).map_err(|e| CliError::io(path, e))?;
            eprintln!("Exported {} bytes to {}", exported.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&exported)?;
            if !exported.ends_with(b"\n") && !exported.is_empty() {
                stdout.write_all(b"\n")?;
            }
        }
    }

    Ok(())
}
