//! Configuration management for the Rainmeter Webhook Monitor.
//!
//! Settings come from `appsettings.json` next to the executable. Values are
//! read leniently: booleans and numbers may also be written as strings, and
//! optional settings fall back to their defaults with a warning.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::error::ConfigError;

pub mod paths;
pub mod template;

/// URL path used when `URL_Path` is missing or empty.
pub const DEFAULT_URL_PATH: &str = "/rainmeter";

/// Delay used when `Delay_Between_Multiple_Commands_ms` is missing or invalid.
pub const DEFAULT_COMMAND_DELAY_MS: u64 = 5;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Path to the config file (set after loading)
    #[serde(skip)]
    pub path: PathBuf,

    #[serde(default)]
    pub application_settings: ApplicationSettings,

    #[serde(default)]
    pub webhook_settings: WebhookSettings,

    #[serde(default)]
    pub rainmeter_settings: RainmeterSettings,
}

impl Config {
    /// Load configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Invalid(format!("{}: {e}", path.display())))?;

        let mut config = Self::from_json(&content)?;
        config.path = path.to_path_buf();
        Ok(config)
    }

    /// Parse and validate a settings document.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.webhook_settings.port {
            None => return Err(ConfigError::MissingField("WebhookSettings.Port".into())),
            Some(raw) if self.port().is_none() => {
                return Err(ConfigError::Invalid(format!(
                    "WebhookSettings.Port must be a port number, got {raw}"
                )))
            }
            Some(_) => {}
        }

        if self.rainmeter_path().is_none() {
            return Err(ConfigError::MissingField(
                "RainmeterSettings.RainmeterPath".into(),
            ));
        }

        if self.rainmeter_settings.commands.is_empty() {
            return Err(ConfigError::Invalid(
                "RainmeterSettings.Commands is empty".into(),
            ));
        }

        Ok(())
    }

    pub fn show_system_tray_icon(&self) -> bool {
        resolve_flag(
            self.application_settings.show_system_tray_icon.as_ref(),
            "ShowSystemTrayIcon",
            true,
        )
    }

    pub fn debug_mode(&self) -> bool {
        resolve_flag(
            self.application_settings.debug_mode.as_ref(),
            "DebugMode",
            false,
        )
    }

    /// Turn debug mode on regardless of the file's setting.
    pub fn enable_debug_mode(&mut self) {
        self.application_settings.debug_mode = Some(FlagValue::Bool(true));
    }

    pub fn command_delay(&self) -> Duration {
        let ms = match &self.application_settings.command_delay_ms {
            None => DEFAULT_COMMAND_DELAY_MS,
            Some(raw) => raw.as_u64().unwrap_or_else(|| {
                warn!(value = %raw, "Delay_Between_Multiple_Commands_ms is not a number, using default");
                DEFAULT_COMMAND_DELAY_MS
            }),
        };
        Duration::from_millis(ms)
    }

    /// Listening port, if present and in range.
    pub fn port(&self) -> Option<u16> {
        self.webhook_settings
            .port
            .as_ref()
            .and_then(NumberValue::as_u64)
            .and_then(|p| u16::try_from(p).ok())
    }

    /// Normalized webhook path, e.g. `/rainmeter`.
    pub fn url_path(&self) -> String {
        match self.webhook_settings.url_path.as_deref() {
            Some(path) if !path.is_empty() => normalize_url_path(path),
            _ => {
                warn!("Webhook URL path not found in config, using {DEFAULT_URL_PATH}");
                DEFAULT_URL_PATH.to_string()
            }
        }
    }

    pub fn rainmeter_path(&self) -> Option<&str> {
        self.rainmeter_settings
            .rainmeter_path
            .as_deref()
            .filter(|p| !p.trim().is_empty())
    }

    pub fn commands(&self) -> &[CommandDefinition] {
        &self.rainmeter_settings.commands
    }
}

/// `ApplicationSettings` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ApplicationSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_system_tray_icon: Option<FlagValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug_mode: Option<FlagValue>,

    #[serde(
        rename = "Delay_Between_Multiple_Commands_ms",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub command_delay_ms: Option<NumberValue>,
}

/// `WebhookSettings` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WebhookSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<NumberValue>,

    #[serde(rename = "URL_Path", default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
}

/// `RainmeterSettings` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RainmeterSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rainmeter_path: Option<String>,

    #[serde(default)]
    pub commands: Vec<CommandDefinition>,
}

/// One entry of `RainmeterSettings.Commands`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CommandDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bang_command: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub measure_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skin_config_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_parameter_to_use_as_value: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_name: Option<String>,
}

/// A boolean written either as a JSON bool or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Text(String),
}

impl FlagValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FlagValue::Bool(b) => Some(*b),
            FlagValue::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            FlagValue::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            FlagValue::Text(_) => None,
        }
    }
}

/// A non-negative number written either as a JSON number or as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberValue {
    Number(u64),
    Text(String),
}

impl NumberValue {
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            NumberValue::Number(n) => Some(*n),
            NumberValue::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl std::fmt::Display for NumberValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NumberValue::Number(n) => write!(f, "{n}"),
            NumberValue::Text(s) => write!(f, "{s:?}"),
        }
    }
}

fn resolve_flag(value: Option<&FlagValue>, name: &str, default: bool) -> bool {
    match value {
        None => {
            warn!(setting = name, default, "Setting not found in config, using default");
            default
        }
        Some(v) => v.as_bool().unwrap_or_else(|| {
            warn!(setting = name, default, "Setting must be 'true' or 'false', using default");
            default
        }),
    }
}

/// Turn a user-supplied URL path into the `/segment` form the listener matches.
pub fn normalize_url_path(raw: &str) -> String {
    let mut path = raw.replace('\\', "/");
    if path.ends_with('/') {
        path.pop();
    }
    if !path.starts_with('/') {
        path.insert(0, '/');
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "WebhookSettings": { "Port": 9999 },
        "RainmeterSettings": {
            "RainmeterPath": "C:\\Rainmeter\\Rainmeter.exe",
            "Commands": [ { "WebhookParameterToUseAsValue": "text" } ]
        }
    }"#;

    #[test]
    fn test_defaults_apply_to_minimal_config() {
        let config = Config::from_json(MINIMAL).unwrap();
        assert!(config.show_system_tray_icon());
        assert!(!config.debug_mode());
        assert_eq!(config.command_delay(), Duration::from_millis(5));
        assert_eq!(config.port(), Some(9999));
        assert_eq!(config.url_path(), "/rainmeter");
        assert_eq!(config.commands().len(), 1);
    }

    #[test]
    fn test_string_values_are_accepted() {
        let config = Config::from_json(
            r#"{
            "ApplicationSettings": {
                "ShowSystemTrayIcon": "False",
                "DebugMode": "TRUE",
                "Delay_Between_Multiple_Commands_ms": "250"
            },
            "WebhookSettings": { "Port": "8080", "URL_Path": "hooks\\rain\\" },
            "RainmeterSettings": {
                "RainmeterPath": "Rainmeter.exe",
                "Commands": [ {} ]
            }
        }"#,
        )
        .unwrap();

        assert!(!config.show_system_tray_icon());
        assert!(config.debug_mode());
        assert_eq!(config.command_delay(), Duration::from_millis(250));
        assert_eq!(config.port(), Some(8080));
        assert_eq!(config.url_path(), "/hooks/rain");
    }

    #[test]
    fn test_invalid_flag_falls_back_to_default() {
        let flag = FlagValue::Text("yes".into());
        assert_eq!(flag.as_bool(), None);
        assert!(resolve_flag(Some(&flag), "ShowSystemTrayIcon", true));
        assert!(!resolve_flag(Some(&flag), "DebugMode", false));
    }

    #[test]
    fn test_missing_port_is_rejected() {
        let err = Config::from_json(
            r#"{ "RainmeterSettings": { "RainmeterPath": "x", "Commands": [ {} ] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f.contains("Port")));
    }

    #[test]
    fn test_out_of_range_port_is_rejected() {
        let err = Config::from_json(
            r#"{ "WebhookSettings": { "Port": 70000 },
                 "RainmeterSettings": { "RainmeterPath": "x", "Commands": [ {} ] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_blank_rainmeter_path_is_rejected() {
        let err = Config::from_json(
            r#"{ "WebhookSettings": { "Port": 1 },
                 "RainmeterSettings": { "RainmeterPath": "  ", "Commands": [ {} ] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingField(f) if f.contains("RainmeterPath")));
    }

    #[test]
    fn test_empty_command_list_is_rejected() {
        let err = Config::from_json(
            r#"{ "WebhookSettings": { "Port": 1 },
                 "RainmeterSettings": { "RainmeterPath": "x", "Commands": [] } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_malformed_json_is_a_parse_error() {
        assert!(matches!(
            Config::from_json("{ not json"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_from(&dir.path().join("appsettings.json")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_load_from_records_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("appsettings.json");
        std::fs::write(&path, MINIMAL).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.path, path);
    }

    #[test]
    fn test_normalize_url_path() {
        assert_eq!(normalize_url_path("rainmeter"), "/rainmeter");
        assert_eq!(normalize_url_path("/rainmeter/"), "/rainmeter");
        assert_eq!(normalize_url_path("\\a\\b"), "/a/b");
        assert_eq!(normalize_url_path("/"), "/");
    }
}
