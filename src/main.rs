//! Rainmeter Webhook Monitor
//!
//! Listens for webhook requests on localhost and forwards selected query
//! parameters to Rainmeter as bang commands, with a system tray icon for
//! quick access to the config file.

use anyhow::Result;
use clap::Parser;
use tracing::info;

mod cli;
mod config;
mod crash;
mod dialog;
mod error;
mod relay;
mod server;
mod tray;

use cli::{Cli, Command};
use config::Config;
use error::{AppError, TrayError};

fn main() {
    // Wrap everything to catch early errors
    if let Err(e) = real_main() {
        // Try to show error - this catches errors before tokio/logging are initialized
        let (title, message) = fatal_error_text(&e);
        dialog::show_error(&title, &message);
        std::process::exit(1);
    }
}

/// Dialog title and text for an error that ended the process. A tray fault
/// happens after startup, so it does not point at the config file.
fn fatal_error_text(e: &anyhow::Error) -> (String, String) {
    if let Some(AppError::Tray(tray @ TrayError::Faulted(_))) = e.downcast_ref::<AppError>() {
        return (
            "Rainmeter Webhook Monitor - Error".to_string(),
            format!(
                "Rainmeter Webhook Monitor stopped unexpectedly:\n\n{tray}\n\nDetails were written to the crash log."
            ),
        );
    }

    (
        "Rainmeter Webhook Monitor - Startup Error".to_string(),
        format!(
            "Failed to start Rainmeter Webhook Monitor:\n\n{e:#}\n\nRun 'rwmon config validate' to check the config file."
        ),
    )
}

#[tokio::main]
async fn real_main() -> Result<()> {
    // Install crash handler first thing
    crash::install_panic_hook();

    let cli = Cli::parse_from(cli::normalize_legacy_args(std::env::args_os()));
    let config_path = config::paths::config_file(cli.config_path.as_deref());

    match cli.command.clone().unwrap_or(Command::Run) {
        Command::Run => {
            config::template::ensure_config(&config_path)?;
            let mut config = Config::load_from(&config_path)?;
            if cli.debug {
                config.enable_debug_mode();
            }
            let debug_mode = config.debug_mode();

            attach_console(debug_mode, config.show_system_tray_icon());
            let _guard = init_file_logging(&cli, debug_mode)?;

            info!(
                version = env!("CARGO_PKG_VERSION"),
                config_path = ?config.path,
                debug_mode,
                "Rainmeter Webhook Monitor starting"
            );
            cli::run::run(config).await
        }
        Command::Template => {
            let _guard = init_console_logging(&cli)?;
            cli::template::run(&config_path)
        }
        Command::Config { action } => {
            let _guard = init_console_logging(&cli)?;
            cli::config::run(action, &config_path)
        }
        Command::Version => {
            println!("rwmon {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Debug mode gets its own console window; a tray-only run drops the one it
/// was started from.
#[cfg(windows)]
fn attach_console(debug: bool, tray: bool) {
    use windows_sys::Win32::System::Console::{AllocConsole, FreeConsole};

    unsafe {
        if debug {
            AllocConsole();
        } else if tray {
            FreeConsole();
        }
    }
}

#[cfg(not(windows))]
fn attach_console(_debug: bool, _tray: bool) {}

fn init_console_logging(cli: &Cli) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.with_debug(cli.debug).as_str()));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();

    Ok(None)
}

fn init_file_logging(
    cli: &Cli,
    debug: bool,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let log_dir = config::paths::log_dir()?;

    let file_appender = tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("rwmon")
        .filename_suffix("log")
        .max_log_files(10)
        .build(&log_dir)?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_level.with_debug(debug).as_str()));

    let console = debug.then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_target(true)
                .with_ansi(false)
                .json()
                .with_writer(non_blocking),
        )
        .with(console)
        .init();

    info!(log_dir = ?log_dir, "File logging enabled");
    Ok(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tray_fault_is_not_reported_as_startup_error() {
        let err = anyhow::Error::from(AppError::from(TrayError::Faulted(
            "Tray message dispatch panicked".to_string(),
        )));
        let (title, message) = fatal_error_text(&err);
        assert!(!title.contains("Startup"));
        assert!(message.contains("Tray message dispatch panicked"));
        assert!(!message.contains("config validate"));
    }

    #[test]
    fn test_config_error_points_at_validate() {
        let err = anyhow::Error::from(AppError::from(error::ConfigError::NotFound(
            "appsettings.json".to_string(),
        )));
        let (title, message) = fatal_error_text(&err);
        assert!(title.ends_with("Startup Error"));
        assert!(message.contains("rwmon config validate"));
    }
}
