//! Error types for the Rainmeter Webhook Monitor.

use thiserror::Error;

use crate::tray::Hwnd;

/// Main error type for the monitor.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Relay error: {0}")]
    Relay(#[from] RelayError),

    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    #[error("Tray error: {0}")]
    Tray(#[from] TrayError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("A query parameter to use was not found in a command section of the config file")]
    MissingQueryParameterSetting,

    #[error("Required settings are missing for command set {index}: {missing}")]
    MissingSettings { index: usize, missing: String },

    #[error("No commands to send to Rainmeter.")]
    NoCommands,

    #[error("Error sending command: {0}")]
    Launch(#[source] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind webhook listener on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A raw Win32 error code as reported by `GetLastError`.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("OS error {code}")]
pub struct OsError {
    pub code: u32,
}

impl OsError {
    pub fn new(code: u32) -> Self {
        Self { code }
    }
}

#[derive(Error, Debug)]
pub enum TrayError {
    #[error("Failed to create tray message window: {0}")]
    WindowCreation(OsError),

    #[error("Failed to install window procedure on window {hwnd}: {source}")]
    SubclassFailed {
        hwnd: Hwnd,
        #[source]
        source: OsError,
    },

    #[error("Context menu failed: {0}")]
    Menu(String),

    #[error("Panic while dispatching window message {0:#06x}")]
    DispatchPanic(u32),

    #[error("System tray stopped: {0}")]
    Faulted(String),

    #[error("Tray message loop failed: {0}")]
    MessageLoop(OsError),

    #[error("Tray thread terminated unexpectedly")]
    ThreadLost,

    #[error("System tray is only supported on Windows")]
    Unsupported,
}

/// Result type alias for monitor operations.
pub type AppResult<T> = Result<T, AppError>;
