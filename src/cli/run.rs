//! Run command - webhook listener plus system tray.

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::{AppResult, TrayError};
use crate::relay::ProcessLauncher;
use crate::server::WebhookServer;
use crate::tray::{self, TrayEvent, TrayHandle, TrayOptions};

/// Why the run loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exit,
    Restart,
}

/// Serve webhooks until Ctrl+C, a tray request, or a failure.
pub async fn run(config: Config) -> Result<()> {
    match serve(config).await? {
        RunOutcome::Exit => Ok(()),
        RunOutcome::Restart => relaunch(),
    }
}

async fn serve(config: Config) -> AppResult<RunOutcome> {
    let debug = config.debug_mode();
    let log_dir = crate::config::paths::log_dir().ok();

    let server = WebhookServer::new(&config, Arc::new(ProcessLauncher), log_dir.as_deref());
    let listener = server.bind().await?;
    let mut serving = tokio::spawn({
        let server = Arc::clone(&server);
        async move { server.serve(listener).await }
    });

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let tray = if config.show_system_tray_icon() {
        match start_tray(&config, debug, events_tx) {
            Ok(tray) => tray,
            Err(e) => {
                server.shutdown();
                let _ = serving.await;
                return Err(e);
            }
        }
    } else {
        info!("System tray icon disabled in config");
        None
    };

    let outcome: AppResult<RunOutcome> = tokio::select! {
        result = signal::ctrl_c() => {
            if let Err(e) = result {
                error!("Failed to listen for ctrl-c: {}", e);
            }
            info!("Received shutdown signal");
            Ok(RunOutcome::Exit)
        }

        Some(event) = events_rx.recv() => match event {
            TrayEvent::Exit | TrayEvent::Stopped => Ok(RunOutcome::Exit),
            TrayEvent::Restart => Ok(RunOutcome::Restart),
            TrayEvent::Failed(reason) => {
                error!(%reason, "System tray failed");
                Err(TrayError::Faulted(reason).into())
            }
        },

        result = &mut serving => {
            match result {
                Ok(Ok(())) => Ok(RunOutcome::Exit),
                Ok(Err(e)) => Err(e.into()),
                Err(e) => {
                    error!("Webhook listener task failed: {e}");
                    Err(std::io::Error::other(e.to_string()).into())
                }
            }
        }
    };

    server.shutdown();
    if !serving.is_finished() {
        let _ = serving.await;
    }

    if let Some(tray) = tray {
        match tokio::task::spawn_blocking(move || tray.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "System tray did not shut down cleanly"),
            Err(e) => warn!("Tray shutdown task failed: {e}"),
        }
    }

    info!(outcome = ?outcome, "Rainmeter Webhook Monitor stopped");
    outcome
}

fn start_tray(
    config: &Config,
    debug: bool,
    events: mpsc::UnboundedSender<TrayEvent>,
) -> AppResult<Option<TrayHandle>> {
    match tray::spawn(TrayOptions::default(), debug, config.path.clone(), events) {
        Ok(handle) => Ok(Some(handle)),
        Err(TrayError::Unsupported) => {
            warn!("System tray is not available on this platform, continuing without it");
            Ok(None)
        }
        Err(e) => {
            error!(error = %e, "Failed to start system tray");
            Err(e.into())
        }
    }
}

/// Start a fresh copy of this process with the same arguments.
fn relaunch() -> Result<()> {
    let exe = std::env::current_exe()?;
    info!(exe = ?exe, "Restarting to reload config");
    std::process::Command::new(exe)
        .args(std::env::args_os().skip(1))
        .spawn()?;
    Ok(())
}
