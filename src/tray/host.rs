//! Hooks the tray core calls back into the host application.

use super::shell::Hwnd;
use crate::error::TrayError;

/// Shows the tray context menu and acts on the selection before returning.
#[cfg_attr(test, mockall::automock)]
pub trait ContextMenu {
    fn show_and_handle(&self, owner: Hwnd) -> Result<(), TrayError>;
}

/// Crash logging and user-facing error reporting.
#[cfg_attr(test, mockall::automock)]
pub trait Diagnostics {
    fn write_crash_log(&self, error: &TrayError, context: &str);

    fn is_verbose(&self) -> bool;

    /// Blocking error notification.
    fn show_error(&self, title: &str, message: &str);
}
