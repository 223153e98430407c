//! Notification icon registry.
//!
//! Owns the single tray icon: creates the sink window when the host has none,
//! picks an icon image, and adds, removes, or re-adds the icon with the shell.
//! Shell failures are logged and swallowed so the host keeps running without a
//! visible icon.

use std::rc::Rc;

use tracing::{debug, info, warn};

use super::shell::{
    Hicon, Hwnd, ProtocolVersion, ShellApi, Tooltip, TrayIconDescriptor, TRAY_CALLBACK_MESSAGE,
};
use crate::error::{OsError, TrayError};

/// Window class of the hidden tray sink window.
pub const TRAY_WINDOW_CLASS: &str = "RainmeterWebhookMonitor_SystemTray";

/// Only one icon per process.
pub const TRAY_ICON_ID: u32 = 1;

/// Where the registered icon image came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconSource {
    Explicit,
    Executable,
    SystemDefault,
}

/// Parameters for [`IconRegistry::register`].
#[derive(Debug, Clone)]
pub struct IconRequest {
    pub owner: Option<Hwnd>,
    pub icon: Option<Hicon>,
    pub tooltip: Tooltip,
}

pub struct IconRegistry {
    shell: Rc<dyn ShellApi>,
    descriptor: Option<TrayIconDescriptor>,
    visible: bool,
}

impl IconRegistry {
    pub fn new(shell: Rc<dyn ShellApi>) -> Self {
        Self {
            shell,
            descriptor: None,
            visible: false,
        }
    }

    pub fn descriptor(&self) -> Option<&TrayIconDescriptor> {
        self.descriptor.as_ref()
    }

    /// Whether the last add request was accepted by the shell.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Register the icon and return the window that receives its messages.
    ///
    /// Only failing to create a sink window is an error; a rejected add leaves
    /// the icon hidden until the next shell restart.
    pub fn register(&mut self, request: IconRequest) -> Result<Hwnd, TrayError> {
        let owner = match request
            .owner
            .filter(|h| !h.is_null())
            .or_else(|| self.descriptor.as_ref().map(|d| d.owner))
        {
            Some(owner) => owner,
            None => {
                let hwnd = self
                    .shell
                    .create_tray_window(TRAY_WINDOW_CLASS)
                    .map_err(TrayError::WindowCreation)?;
                debug!(hwnd = %hwnd, "Created tray sink window");
                hwnd
            }
        };

        let (icon, source) = self.resolve_icon(request.icon);
        debug!(source = ?source, "Resolved tray icon image");

        self.descriptor = Some(TrayIconDescriptor {
            owner,
            id: TRAY_ICON_ID,
            icon,
            tooltip: request.tooltip,
            callback_message: TRAY_CALLBACK_MESSAGE,
            version: ProtocolVersion::Modern,
        });

        if let Err(e) = self.show() {
            warn!(error_code = e.code, "Failed to add tray icon");
        }

        Ok(owner)
    }

    /// Remove the icon. Safe to call when nothing is registered.
    pub fn unregister(&mut self) {
        if let Some(descriptor) = &self.descriptor {
            if let Err(e) = self.shell.delete_icon(descriptor.owner, descriptor.id) {
                debug!(error_code = e.code, "Tray icon delete ignored");
            }
        }
        self.visible = false;
    }

    /// Delete and re-add the icon with the same tooltip and image.
    pub fn reinitialize(&mut self, owner: Hwnd) -> Result<(), OsError> {
        self.unregister();
        if let Some(descriptor) = self.descriptor.as_mut() {
            descriptor.owner = owner;
        }
        self.show()
    }

    /// Explicit image first, then the executable's icon, then the stock icon.
    pub fn resolve_icon(&self, explicit: Option<Hicon>) -> (Hicon, IconSource) {
        if let Some(icon) = explicit.filter(|i| !i.is_null()) {
            return (icon, IconSource::Explicit);
        }
        if let Some(icon) = self.shell.executable_icon().filter(|i| !i.is_null()) {
            return (icon, IconSource::Executable);
        }
        (self.shell.default_icon(), IconSource::SystemDefault)
    }

    fn show(&mut self) -> Result<(), OsError> {
        let Some(descriptor) = self.descriptor.as_mut() else {
            return Ok(());
        };

        // A second add for the same id is rejected by the shell.
        if self.visible {
            if let Err(e) = self.shell.delete_icon(descriptor.owner, descriptor.id) {
                debug!(error_code = e.code, "Tray icon delete before re-add ignored");
            }
            self.visible = false;
        }

        self.shell.add_icon(descriptor)?;
        self.visible = true;

        // Every add asks for modern mode again; Legacy only records the outcome.
        descriptor.version = ProtocolVersion::Modern;
        if let Err(e) = self.shell.set_icon_version(descriptor) {
            warn!(
                error_code = e.code,
                "Failed to negotiate tray icon version, using legacy messages"
            );
            descriptor.version = ProtocolVersion::Legacy;
        }

        info!(hwnd = %descriptor.owner, "Tray icon registered");
        Ok(())
    }
}
