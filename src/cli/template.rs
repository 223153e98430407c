//! Template command - writes a starter config file.

use std::path::Path;

use anyhow::{Context, Result};

use crate::config::template;

/// Write the template next to `config_path` without replacing anything.
pub fn run(config_path: &Path) -> Result<()> {
    let dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    let written = template::write_template(dir)
        .with_context(|| format!("Failed to write template config in {}", dir.display()))?;

    println!("Created template config file: {}", written.display());
    Ok(())
}
