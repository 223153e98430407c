//! Tray controller: composition root of the tray subsystem.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{error, info};

use super::host::{ContextMenu, Diagnostics};
use super::interceptor::MessageInterceptor;
use super::recovery::ShellRestartMessage;
use super::registry::{IconRegistry, IconRequest};
use super::shell::{Hicon, Hwnd, ShellApi, Tooltip};
use crate::error::TrayError;

/// Tooltip shown when hovering the icon.
pub const DEFAULT_TOOLTIP: &str = "Rainmeter Webhook Monitor";

/// Start parameters supplied by the host.
#[derive(Debug, Clone)]
pub struct TrayOptions {
    pub existing_window: Option<Hwnd>,
    pub icon: Option<Hicon>,
    pub tooltip: String,
}

impl Default for TrayOptions {
    fn default() -> Self {
        Self {
            existing_window: None,
            icon: None,
            tooltip: DEFAULT_TOOLTIP.to_string(),
        }
    }
}

/// Owns the tray for the life of the host. Dropping it leaves the installed
/// window procedure in place.
pub struct TrayController {
    owner: Hwnd,
    interceptor: Rc<MessageInterceptor>,
}

impl TrayController {
    /// Resolve the shell restart id, register the icon, and install the
    /// window procedure.
    ///
    /// Only a failed installation (or no window to install on) is an error,
    /// and an icon already added is removed again before returning. The icon
    /// itself may be absent if the shell refused it.
    pub fn start(
        shell: Rc<dyn ShellApi>,
        menu: Rc<dyn ContextMenu>,
        diagnostics: Rc<dyn Diagnostics>,
        options: TrayOptions,
    ) -> Result<Self, TrayError> {
        let restart = ShellRestartMessage::resolve(shell.as_ref());

        let registry = Rc::new(RefCell::new(IconRegistry::new(Rc::clone(&shell))));
        let owner = registry.borrow_mut().register(IconRequest {
            owner: options.existing_window,
            icon: options.icon,
            tooltip: Tooltip::new(&options.tooltip),
        })?;

        let interceptor = Rc::new(MessageInterceptor::new(
            shell,
            registry,
            menu,
            Rc::clone(&diagnostics),
            restart,
        ));

        if let Err(e) = interceptor.install(owner) {
            error!(hwnd = %owner, error = %e, "Failed to install tray window procedure");
            diagnostics.write_crash_log(&e, "installing tray window procedure");
            interceptor.registry().borrow_mut().unregister();
            return Err(e);
        }

        info!(hwnd = %owner, restart_message = ?restart.id(), "System tray started");
        Ok(Self { owner, interceptor })
    }

    pub fn owner_window(&self) -> Hwnd {
        self.owner
    }

    pub fn is_icon_visible(&self) -> bool {
        self.interceptor.registry().borrow().is_visible()
    }

    /// Remove the icon. Best effort and safe to repeat.
    pub fn stop(&self) {
        self.interceptor.registry().borrow_mut().unregister();
        info!("System tray icon removed");
    }

    /// Fault recorded by the window procedure, if dispatch failed.
    pub fn take_fault(&self) -> Option<TrayError> {
        self.interceptor.take_fault()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OsError;
    use crate::tray::host::{MockContextMenu, MockDiagnostics};
    use crate::tray::shell::{MockShellApi, OsReturn};
    use mockall::predicate::eq;

    fn shell_with_icon() -> MockShellApi {
        let mut shell = MockShellApi::new();
        shell
            .expect_register_window_message()
            .times(1)
            .returning(|_| Ok(0xC100));
        shell.expect_add_icon().returning(|_| Ok(()));
        shell.expect_set_icon_version().returning(|_| Ok(()));
        shell
    }

    #[test]
    fn test_start_with_created_window() {
        let mut shell = shell_with_icon();
        shell
            .expect_create_tray_window()
            .times(1)
            .returning(|_| Ok(Hwnd(0x500)));
        shell.expect_executable_icon().returning(|| Some(Hicon(4)));
        shell.expect_replace_window_proc().times(1).returning(|_, _| OsReturn {
            value: 0x1000,
            last_error: 0,
        });
        // The repeated stop reissues the delete and ignores its result.
        shell.expect_delete_icon().times(2).returning(|_, _| Ok(()));

        let mut diagnostics = MockDiagnostics::new();
        diagnostics.expect_write_crash_log().never();

        let tray = TrayController::start(
            Rc::new(shell),
            Rc::new(MockContextMenu::new()),
            Rc::new(diagnostics),
            TrayOptions::default(),
        )
        .unwrap();

        assert_eq!(tray.owner_window(), Hwnd(0x500));
        assert!(tray.is_icon_visible());

        tray.stop();
        assert!(!tray.is_icon_visible());
        tray.stop();
    }

    #[test]
    fn test_install_failure_is_fatal_and_logged_once() {
        let mut shell = shell_with_icon();
        shell.expect_replace_window_proc().returning(|_, _| OsReturn {
            value: 0,
            last_error: 1413,
        });
        shell
            .expect_delete_icon()
            .with(eq(Hwnd(0x600)), eq(1))
            .times(1)
            .returning(|_, _| Ok(()));

        let mut diagnostics = MockDiagnostics::new();
        diagnostics
            .expect_write_crash_log()
            .withf(|err, _| matches!(err, TrayError::SubclassFailed { source, .. } if source.code == 1413))
            .times(1)
            .return_const(());

        let result = TrayController::start(
            Rc::new(shell),
            Rc::new(MockContextMenu::new()),
            Rc::new(diagnostics),
            TrayOptions {
                existing_window: Some(Hwnd(0x600)),
                icon: Some(Hicon(2)),
                ..TrayOptions::default()
            },
        );

        assert!(matches!(
            result,
            Err(TrayError::SubclassFailed { hwnd: Hwnd(0x600), .. })
        ));
    }

    #[test]
    fn test_zero_previous_without_error_starts() {
        let mut shell = shell_with_icon();
        shell.expect_replace_window_proc().returning(|_, _| OsReturn {
            value: 0,
            last_error: 0,
        });

        let mut diagnostics = MockDiagnostics::new();
        diagnostics.expect_write_crash_log().never();

        let tray = TrayController::start(
            Rc::new(shell),
            Rc::new(MockContextMenu::new()),
            Rc::new(diagnostics),
            TrayOptions {
                existing_window: Some(Hwnd(0x700)),
                icon: Some(Hicon(2)),
                ..TrayOptions::default()
            },
        )
        .unwrap();
        assert_eq!(tray.owner_window(), Hwnd(0x700));
    }

    #[test]
    fn test_shell_failures_degrade_gracefully() {
        let mut shell = MockShellApi::new();
        shell
            .expect_register_window_message()
            .returning(|_| Err(OsError::new(8)));
        shell
            .expect_add_icon()
            .returning(|_| Err(OsError::new(1460)));
        shell.expect_replace_window_proc().returning(|_, _| OsReturn {
            value: 0x1000,
            last_error: 0,
        });

        let mut diagnostics = MockDiagnostics::new();
        diagnostics.expect_write_crash_log().never();

        let tray = TrayController::start(
            Rc::new(shell),
            Rc::new(MockContextMenu::new()),
            Rc::new(diagnostics),
            TrayOptions {
                existing_window: Some(Hwnd(0x800)),
                icon: Some(Hicon(2)),
                ..TrayOptions::default()
            },
        )
        .unwrap();
        assert!(!tray.is_icon_visible());
        assert!(tray.take_fault().is_none());
    }
}
