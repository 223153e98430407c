//! CLI command definitions and handlers.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

pub mod config;
pub mod run;
pub mod template;

/// Rainmeter Webhook Monitor - relays webhook requests to Rainmeter.
#[derive(Parser, Debug)]
#[command(name = "rwmon")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Log level
    #[arg(long, default_value = "info", env = "RWMON_LOG_LEVEL")]
    pub log_level: LogLevel,

    /// Path to config file
    #[arg(long, env = "RWMON_CONFIG")]
    pub config_path: Option<PathBuf>,

    /// Show a console window with app activity and log webhook requests
    #[arg(long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Level to use when debug mode is on: never quieter than `debug`.
    pub fn with_debug(self, debug: bool) -> Self {
        if debug {
            self.max(LogLevel::Debug)
        } else {
            self
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Listen for webhooks (default)
    Run,

    /// Write a template config file next to the executable
    Template,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigAction {
    /// Validate configuration file
    Validate,

    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}

/// Accept the older `-debug`, `/debug`, `-template` and `/template` switches.
pub fn normalize_legacy_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .enumerate()
        .map(|(idx, arg)| {
            if idx == 0 {
                return arg;
            }
            match arg.to_str().map(str::to_ascii_lowercase).as_deref() {
                Some("-debug" | "/debug") => OsString::from("--debug"),
                Some("-template" | "/template") => OsString::from("template"),
                _ => arg,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::parse_from(normalize_legacy_args(
            args.iter().map(|a| OsString::from(*a)),
        ))
    }

    #[test]
    fn test_run_is_the_default() {
        let cli = parse(&["rwmon"]);
        assert_eq!(cli.command, None);
        assert!(!cli.debug);
    }

    #[test]
    fn test_legacy_switches() {
        let cli = parse(&["rwmon", "/DEBUG"]);
        assert!(cli.debug);

        let cli = parse(&["rwmon", "-template"]);
        assert_eq!(cli.command, Some(Command::Template));
    }

    #[test]
    fn test_debug_raises_log_level() {
        assert_eq!(LogLevel::Info.with_debug(true), LogLevel::Debug);
        assert_eq!(LogLevel::Trace.with_debug(true), LogLevel::Trace);
        assert_eq!(LogLevel::Warn.with_debug(false), LogLevel::Warn);
    }
}
