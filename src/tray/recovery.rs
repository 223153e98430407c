//! Shell restart recovery.
//!
//! Explorer broadcasts a registered `TaskbarCreated` message whenever the
//! taskbar comes back. Every notification icon is gone at that point, so the
//! registry re-adds ours against the same window.

use std::cell::RefCell;

use tracing::{info, warn};

use super::registry::IconRegistry;
use super::shell::{Hwnd, ShellApi};

/// Name of the message the shell broadcasts after (re)starting.
pub const SHELL_RESTART_MESSAGE: &str = "TaskbarCreated";

/// The shell restart message id, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShellRestartMessage {
    id: Option<u32>,
}

impl ShellRestartMessage {
    /// Resolve the id. Without it the icon will not come back after a shell restart.
    pub fn resolve(shell: &dyn ShellApi) -> Self {
        match shell.register_window_message(SHELL_RESTART_MESSAGE) {
            Ok(id) if id != 0 => Self { id: Some(id) },
            Ok(_) => {
                warn!("Shell restart message resolved to zero, tray will not auto-recover");
                Self { id: None }
            }
            Err(e) => {
                warn!(
                    error_code = e.code,
                    "Failed to resolve shell restart message, tray will not auto-recover"
                );
                Self { id: None }
            }
        }
    }

    pub fn id(&self) -> Option<u32> {
        self.id
    }

    pub fn matches(&self, msg: u32) -> bool {
        self.id == Some(msg)
    }
}

/// Re-add the icon after a shell restart. Best effort: on failure the icon
/// stays absent until the next restart notification.
pub fn recover(registry: &RefCell<IconRegistry>, owner: Hwnd) {
    info!(hwnd = %owner, "Shell restarted, re-adding tray icon");
    match registry.borrow_mut().reinitialize(owner) {
        Ok(()) => info!("Tray icon restored"),
        Err(e) => warn!(
            error_code = e.code,
            "Tray icon recovery failed, icon absent until next shell restart"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OsError;
    use crate::tray::shell::MockShellApi;
    use mockall::predicate::eq;

    #[test]
    fn test_resolves_taskbar_created() {
        let mut shell = MockShellApi::new();
        shell
            .expect_register_window_message()
            .with(eq(SHELL_RESTART_MESSAGE))
            .times(1)
            .returning(|_| Ok(0xC123));

        let restart = ShellRestartMessage::resolve(&shell);
        assert_eq!(restart.id(), Some(0xC123));
        assert!(restart.matches(0xC123));
        assert!(!restart.matches(0xC124));
    }

    #[test]
    fn test_resolution_failure_never_matches() {
        let mut shell = MockShellApi::new();
        shell
            .expect_register_window_message()
            .returning(|_| Err(OsError::new(8)));

        let restart = ShellRestartMessage::resolve(&shell);
        assert_eq!(restart.id(), None);
        assert!(!restart.matches(0));
        assert!(!restart.matches(0xC123));
    }
}
