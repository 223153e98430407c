//! System tray icon for Windows.
//!
//! The tray lives on its own thread with a Win32 message pump. The icon
//! registry, window procedure interceptor, and shell restart recovery are
//! written against [`shell::ShellApi`] so they can be exercised off-Windows;
//! only `win32` touches the OS.

#![cfg_attr(not(windows), allow(dead_code))]

mod actions;
mod controller;
mod host;
mod interceptor;
mod menu;
mod recovery;
mod registry;
mod shell;
#[cfg(windows)]
mod win32;

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;

pub use controller::{TrayController, TrayOptions, DEFAULT_TOOLTIP};
pub use host::{ContextMenu, Diagnostics};
pub use shell::{Hicon, Hwnd};

use crate::error::TrayError;

/// Requests and notifications sent from the tray thread to the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrayEvent {
    /// User chose Exit.
    Exit,
    /// User chose Reload Config; the host relaunches itself.
    Restart,
    /// Message loop ended without a user request.
    Stopped,
    /// Message loop ended because dispatch failed.
    Failed(String),
}

/// Running tray thread.
pub struct TrayHandle {
    #[cfg_attr(not(windows), allow(dead_code))]
    thread_id: u32,
    join: std::thread::JoinHandle<()>,
}

impl TrayHandle {
    /// Stop the message loop and wait for the icon to be removed.
    pub fn shutdown(self) -> Result<(), TrayError> {
        #[cfg(windows)]
        if let Err(e) = win32::post_quit_to_thread(self.thread_id) {
            // Already gone if the loop ended on its own.
            tracing::debug!(error_code = e.code, "Tray thread did not accept WM_QUIT");
        }

        self.join.join().map_err(|_| TrayError::ThreadLost)
    }
}

/// Start the tray on a dedicated thread. Returns once the icon is
/// registered and the window procedure installed, or with the error that
/// prevented it.
#[cfg(windows)]
pub fn spawn(
    options: TrayOptions,
    verbose: bool,
    config_path: PathBuf,
    events: UnboundedSender<TrayEvent>,
) -> Result<TrayHandle, TrayError> {
    use std::rc::Rc;
    use std::sync::mpsc;

    use tracing::{error, info};

    use crate::crash::CrashLog;

    let (started_tx, started_rx) = mpsc::channel::<Result<u32, TrayError>>();

    let join = std::thread::Builder::new()
        .name("tray".to_string())
        .spawn(move || {
            let menu = menu::TrayMenu::new(actions::MenuActions::new(config_path, events.clone()));
            let tray = match TrayController::start(
                Rc::new(win32::Win32Shell::new()),
                Rc::new(menu),
                Rc::new(CrashLog::new(verbose)),
                options,
            ) {
                Ok(tray) => tray,
                Err(e) => {
                    let _ = started_tx.send(Err(e));
                    return;
                }
            };

            if started_tx.send(Ok(win32::current_thread_id())).is_err() {
                tray.stop();
                return;
            }

            let outcome = win32::run_message_loop(&tray);
            tray.stop();

            let event = match outcome {
                Ok(()) => TrayEvent::Stopped,
                Err(e) => {
                    error!(error = %e, "Tray message loop stopped on a fault");
                    TrayEvent::Failed(e.to_string())
                }
            };
            info!(event = ?event, "Tray thread exiting");
            let _ = events.send(event);
        })
        .map_err(|_| TrayError::ThreadLost)?;

    match started_rx.recv() {
        Ok(Ok(thread_id)) => Ok(TrayHandle { thread_id, join }),
        Ok(Err(e)) => {
            let _ = join.join();
            Err(e)
        }
        Err(_) => {
            let _ = join.join();
            Err(TrayError::ThreadLost)
        }
    }
}

#[cfg(not(windows))]
pub fn spawn(
    _options: TrayOptions,
    _verbose: bool,
    _config_path: PathBuf,
    _events: UnboundedSender<TrayEvent>,
) -> Result<TrayHandle, TrayError> {
    Err(TrayError::Unsupported)
}
