//! Window message interceptor.
//!
//! Replaces the owner window's procedure with [`tray_window_proc`] and routes
//! tray callbacks and shell restarts, leaving every other message to default
//! processing. The OS keeps only a raw pointer to the installed procedure, so
//! the interceptor it dispatches to is parked in a thread-local table for the
//! rest of the process and never removed.

use std::cell::{OnceCell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use tracing::{debug, error};

use super::host::{ContextMenu, Diagnostics};
use super::recovery::{self, ShellRestartMessage};
use super::registry::IconRegistry;
use super::shell::{
    Hwnd, RawWndProc, ShellApi, WindowMessage, TRAY_CALLBACK_MESSAGE, WM_LBUTTONUP, WM_RBUTTONUP,
};
use crate::crash;
use crate::error::TrayError;

thread_local! {
    static INTERCEPTORS: RefCell<HashMap<Hwnd, Rc<MessageInterceptor>>> =
        RefCell::new(HashMap::new());
    /// Shell of the last install, for windows missing from the table.
    static DEFAULT_SHELL: RefCell<Option<Rc<dyn ShellApi>>> = const { RefCell::new(None) };
}

/// Window procedure installed on the tray owner window.
///
/// # Safety
///
/// Called by the OS on the thread that owns `hwnd`.
pub unsafe extern "system" fn tray_window_proc(
    hwnd: isize,
    msg: u32,
    wparam: usize,
    lparam: isize,
) -> isize {
    let message = WindowMessage::new(Hwnd(hwnd), msg, wparam, lparam);
    match lookup(message.hwnd) {
        Some(interceptor) => interceptor.handle(message),
        None => match DEFAULT_SHELL.with(|shell| shell.borrow().clone()) {
            Some(shell) => shell.default_window_proc(&message),
            None => 0,
        },
    }
}

fn lookup(hwnd: Hwnd) -> Option<Rc<MessageInterceptor>> {
    INTERCEPTORS.with(|table| table.borrow().get(&hwnd).cloned())
}

/// The replaced procedure and the one that was active before it.
pub struct WindowProcedureChain {
    subject: Hwnd,
    installed: RawWndProc,
    previous: Option<isize>,
}

impl WindowProcedureChain {
    /// Swap `handler` in as the window procedure of `subject`.
    pub fn install(
        shell: &dyn ShellApi,
        subject: Hwnd,
        handler: RawWndProc,
    ) -> Result<Self, TrayError> {
        let previous = shell
            .replace_window_proc(subject, handler as usize as isize)
            .into_result()
            .map_err(|source| TrayError::SubclassFailed {
                hwnd: subject,
                source,
            })?;

        Ok(Self {
            subject,
            installed: handler,
            previous: (previous != 0).then_some(previous),
        })
    }

    pub fn subject(&self) -> Hwnd {
        self.subject
    }

    pub fn installed(&self) -> RawWndProc {
        self.installed
    }

    pub fn previous(&self) -> Option<isize> {
        self.previous
    }
}

pub struct MessageInterceptor {
    shell: Rc<dyn ShellApi>,
    registry: Rc<RefCell<IconRegistry>>,
    menu: Rc<dyn ContextMenu>,
    diagnostics: Rc<dyn Diagnostics>,
    restart: ShellRestartMessage,
    chain: OnceCell<WindowProcedureChain>,
    fault: RefCell<Option<TrayError>>,
}

impl MessageInterceptor {
    pub fn new(
        shell: Rc<dyn ShellApi>,
        registry: Rc<RefCell<IconRegistry>>,
        menu: Rc<dyn ContextMenu>,
        diagnostics: Rc<dyn Diagnostics>,
        restart: ShellRestartMessage,
    ) -> Self {
        Self {
            shell,
            registry,
            menu,
            diagnostics,
            restart,
            chain: OnceCell::new(),
            fault: RefCell::new(None),
        }
    }

    /// Install [`tray_window_proc`] on `hwnd`. Happens once per window.
    pub fn install(self: &Rc<Self>, hwnd: Hwnd) -> Result<(), TrayError> {
        if self.chain.get().is_some() {
            return Ok(());
        }

        // Registered first so messages arriving right after the swap find us.
        INTERCEPTORS.with(|table| {
            table.borrow_mut().insert(hwnd, Rc::clone(self));
        });
        DEFAULT_SHELL.with(|shell| *shell.borrow_mut() = Some(Rc::clone(&self.shell)));

        match WindowProcedureChain::install(self.shell.as_ref(), hwnd, tray_window_proc) {
            Ok(chain) => {
                debug!(hwnd = %hwnd, previous = ?chain.previous(), "Tray window procedure installed");
                let _ = self.chain.set(chain);
                Ok(())
            }
            Err(e) => {
                INTERCEPTORS.with(|table| {
                    table.borrow_mut().remove(&hwnd);
                });
                Err(e)
            }
        }
    }

    pub fn chain(&self) -> Option<&WindowProcedureChain> {
        self.chain.get()
    }

    pub fn registry(&self) -> &Rc<RefCell<IconRegistry>> {
        &self.registry
    }

    /// Route one message. Faults are crash-logged and returned to the caller.
    pub fn dispatch(&self, msg: WindowMessage) -> Result<isize, TrayError> {
        self.route(&msg).map_err(|err| {
            self.report(&err, &msg, None);
            err
        })
    }

    /// Entry point from the raw window procedure. A fault, panics included,
    /// stops the message loop and is handed to the host through
    /// [`take_fault`](Self::take_fault).
    pub fn handle(&self, msg: WindowMessage) -> isize {
        let err = match crash::catch_contained(|| self.route(&msg)) {
            Ok(Ok(result)) => return result,
            Ok(Err(err)) => {
                self.report(&err, &msg, None);
                err
            }
            Err(panic) => {
                let err = TrayError::DispatchPanic(msg.id);
                self.report(&err, &msg, Some(panic.as_str()));
                err
            }
        };

        error!(error = %err, msg = msg.id, "Tray message dispatch failed, stopping message loop");
        {
            let mut fault = self.fault.borrow_mut();
            if fault.is_none() {
                *fault = Some(err);
            }
        }
        self.shell.post_quit(1);
        self.shell.default_window_proc(&msg)
    }

    fn report(&self, err: &TrayError, msg: &WindowMessage, panic: Option<&str>) {
        let mut context = format!(
            "dispatching window message {:#06x} (wParam {:#x}, lParam {:#x})",
            msg.id, msg.wparam, msg.lparam
        );
        if let Some(panic) = panic {
            context.push_str(&format!("\npanicked: {panic}"));
        }

        self.diagnostics.write_crash_log(err, &context);
        if self.diagnostics.is_verbose() {
            self.diagnostics.show_error(
                "Rainmeter Webhook Monitor - Error",
                &format!("An unexpected error occurred in the tray icon handler:\n\n{err}"),
            );
        }
    }

    pub fn take_fault(&self) -> Option<TrayError> {
        self.fault.borrow_mut().take()
    }

    fn route(&self, msg: &WindowMessage) -> Result<isize, TrayError> {
        if msg.id == TRAY_CALLBACK_MESSAGE {
            match msg.tray_event() {
                // Reserved for restoring a main window; there is none yet.
                WM_LBUTTONUP => return Ok(0),
                WM_RBUTTONUP => {
                    self.menu.show_and_handle(msg.hwnd)?;
                    return Ok(0);
                }
                _ => {}
            }
        } else if self.restart.matches(msg.id) {
            recovery::recover(&self.registry, msg.hwnd);
            return Ok(self.forward_to_previous(msg));
        }

        Ok(self.shell.default_window_proc(msg))
    }

    fn forward_to_previous(&self, msg: &WindowMessage) -> isize {
        match self.chain.get().and_then(WindowProcedureChain::previous) {
            Some(previous) => self.shell.call_previous_proc(previous, msg),
            None => self.shell.default_window_proc(msg),
        }
    }
}
