// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use diagnostics::*;

/// Write a starting configuration file
pub fn init_command(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        ));
    }

    if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    std::fs::write(config_path, fluxport::config::create_example_config())
        .with_context(|| format!("Failed to write {}", config_path.display()))?;

    let path = config_path.display().to_string();
    info!("Wrote example configuration to {path}");

    let mut out = std::io::stdout().lock();
    writeln!(out, "Created {}", config_path.display())?;
    writeln!(out, "Set store.token (or FLUXPORT_TOKEN) before exporting")?;
    Ok(())
}
