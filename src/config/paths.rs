//! Path utilities for the Rainmeter Webhook Monitor.
//!
//! The config file and debug logs live next to the executable, so the app can
//! be run from any folder without installation.

use std::io;
use std::path::{Path, PathBuf};

/// Name of the settings file.
pub const CONFIG_FILE_NAME: &str = "appsettings.json";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "RWMON_CONFIG";

/// Folder name for debug and crash logs.
pub const LOG_DIR_NAME: &str = "RainmeterWebhookMonitor_DebugLogs";

/// Directory containing the running executable.
pub fn app_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Configuration file path: explicit override, then `RWMON_CONFIG`, then
/// `appsettings.json` next to the executable.
pub fn config_file(override_path: Option<&Path>) -> PathBuf {
    if let Some(path) = override_path {
        return path.to_path_buf();
    }

    // Check environment variable first
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    app_dir().join(CONFIG_FILE_NAME)
}

/// Log directory, created on demand.
///
/// Next to the executable when writable, otherwise the per-user data
/// directory, otherwise the system temp directory.
pub fn log_dir() -> io::Result<PathBuf> {
    let mut candidates = vec![app_dir().join(LOG_DIR_NAME)];
    if let Some(dirs) = directories::ProjectDirs::from("com", "ThioJoe", "RainmeterWebhookMonitor") {
        candidates.push(dirs.data_dir().join("logs"));
    }
    candidates.push(std::env::temp_dir().join(LOG_DIR_NAME));

    first_creatable(&candidates)
}

fn first_creatable(candidates: &[PathBuf]) -> io::Result<PathBuf> {
    let mut last_err = io::Error::new(io::ErrorKind::NotFound, "no log directory candidates");
    for dir in candidates {
        match std::fs::create_dir_all(dir) {
            Ok(()) => return Ok(dir.clone()),
            Err(e) => last_err = e,
        }
    }
    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_config_path_wins() {
        let path = Path::new("custom/settings.json");
        assert_eq!(config_file(Some(path)), path);
    }

    #[test]
    fn test_first_creatable_skips_unusable_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        let fallback = tmp.path().join("logs");
        let chosen = first_creatable(&[blocker.join("logs"), fallback.clone()]).unwrap();

        assert_eq!(chosen, fallback);
        assert!(fallback.is_dir());
    }

    #[test]
    fn test_first_creatable_reports_last_error() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("file");
        std::fs::write(&blocker, "").unwrap();

        assert!(first_creatable(&[blocker.join("a")]).is_err());
        assert!(first_creatable(&[]).is_err());
    }
}
