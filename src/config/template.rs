//! Embedded template settings file.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use super::paths::CONFIG_FILE_NAME;

/// Template written when no config exists or the user asks for one.
pub const TEMPLATE: &str = include_str!("../../assets/appsettings_template.json");

/// Write the template into `dir` without overwriting anything: the first free
/// name of `appsettings.json`, `appsettings_2.json`, `appsettings_3.json`, ...
pub fn write_template(dir: &Path) -> io::Result<PathBuf> {
    let stem = Path::new(CONFIG_FILE_NAME)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("appsettings");

    let mut number = 1u32;
    loop {
        let name = if number == 1 {
            CONFIG_FILE_NAME.to_string()
        } else {
            format!("{stem}_{number}.json")
        };
        let path = dir.join(name);

        match write_new(&path) {
            Ok(()) => {
                info!(path = ?path, "Wrote template config file");
                return Ok(path);
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => number += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Write the template to `path` if nothing is there yet. Returns whether a
/// file was created.
pub fn ensure_config(path: &Path) -> io::Result<bool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    match write_new(path) {
        Ok(()) => {
            info!(path = ?path, "Config file not found, created one from the template");
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

fn write_new(path: &Path) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(TEMPLATE.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn test_template_is_a_valid_config() {
        let config = Config::from_json(TEMPLATE).unwrap();
        assert_eq!(config.port(), Some(9999));
        assert_eq!(config.url_path(), "/rainmeter");
        assert!(!config.commands().is_empty());
    }

    #[test]
    fn test_write_template_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "mine").unwrap();

        let second = write_template(dir.path()).unwrap();
        let third = write_template(dir.path()).unwrap();

        assert_eq!(second, dir.path().join("appsettings_2.json"));
        assert_eq!(third, dir.path().join("appsettings_3.json"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join(CONFIG_FILE_NAME)).unwrap(),
            "mine"
        );
    }

    #[test]
    fn test_ensure_config_creates_only_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE_NAME);

        assert!(ensure_config(&path).unwrap());
        std::fs::write(&path, "edited").unwrap();
        assert!(!ensure_config(&path).unwrap());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "edited");
    }
}
