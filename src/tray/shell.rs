//! Handles, message wrappers, and the shell seam used by the tray core.
//!
//! Everything the tray does against the OS goes through [`ShellApi`], so the
//! registry, interceptor, and recovery logic run unchanged against a mock.

use std::fmt;

use crate::error::OsError;

/// Mouse message ids carried in the low word of a tray callback's `lParam`.
pub const WM_LBUTTONUP: u32 = 0x0202;
pub const WM_RBUTTONUP: u32 = 0x0205;

/// First message id reserved for application-private messages.
pub const WM_APP: u32 = 0x8000;

/// Callback message the shell uses to report interaction with our icon.
pub const TRAY_CALLBACK_MESSAGE: u32 = WM_APP + 1;

/// Tooltip buffer length in UTF-16 units, including the terminating NUL.
pub const TOOLTIP_CAPACITY: usize = 128;

/// Signature of a Win32 window procedure.
pub type RawWndProc = unsafe extern "system" fn(isize, u32, usize, isize) -> isize;

/// Window handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hwnd(pub isize);

impl Hwnd {
    pub const NULL: Hwnd = Hwnd(0);

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Hwnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Icon handle. Never owned by the tray; the image belongs to the process or the OS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Hicon(pub isize);

impl Hicon {
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

/// One message as delivered to a window procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowMessage {
    pub hwnd: Hwnd,
    pub id: u32,
    pub wparam: usize,
    pub lparam: isize,
}

impl WindowMessage {
    pub fn new(hwnd: Hwnd, id: u32, wparam: usize, lparam: isize) -> Self {
        Self {
            hwnd,
            id,
            wparam,
            lparam,
        }
    }

    /// Mouse or keyboard action of a tray callback message.
    pub fn tray_event(&self) -> u32 {
        (self.lparam as usize & 0xFFFF) as u32
    }
}

/// Outcome of a Win32 call whose zero return is only a failure when
/// `GetLastError` reports a code. Callers reset the last error before the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OsReturn {
    pub value: isize,
    pub last_error: u32,
}

impl OsReturn {
    pub fn into_result(self) -> Result<isize, OsError> {
        if self.value == 0 && self.last_error != 0 {
            Err(OsError::new(self.last_error))
        } else {
            Ok(self.value)
        }
    }
}

/// Notification-area behavior negotiated with the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolVersion {
    /// Pre-Windows 2000 mouse messages.
    Legacy,
    /// `NOTIFYICON_VERSION`: mouse-up messages in the low word of `lParam`.
    Modern,
}

impl ProtocolVersion {
    pub fn as_raw(self) -> u32 {
        match self {
            ProtocolVersion::Legacy => 0,
            ProtocolVersion::Modern => 3,
        }
    }
}

/// Tooltip text, truncated to fit the shell's fixed buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tooltip(String);

impl Tooltip {
    pub fn new(text: &str) -> Self {
        let mut units = 0;
        let mut end = 0;
        for (idx, ch) in text.char_indices() {
            let len = ch.len_utf16();
            if units + len > TOOLTIP_CAPACITY - 1 {
                break;
            }
            units += len;
            end = idx + ch.len_utf8();
        }
        Self(text[..end].to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// NUL-terminated buffer in the layout `NOTIFYICONDATAW::szTip` expects.
    pub fn to_wide(&self) -> [u16; TOOLTIP_CAPACITY] {
        let mut buf = [0u16; TOOLTIP_CAPACITY];
        for (slot, unit) in buf.iter_mut().zip(self.0.encode_utf16()) {
            *slot = unit;
        }
        buf
    }
}

/// Desired state of the single tray icon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrayIconDescriptor {
    pub owner: Hwnd,
    pub id: u32,
    pub icon: Hicon,
    pub tooltip: Tooltip,
    pub callback_message: u32,
    pub version: ProtocolVersion,
}

/// Shell and window-manager calls needed by the tray.
#[cfg_attr(test, mockall::automock)]
pub trait ShellApi {
    /// Create a hidden zero-size window of a private class to receive tray messages.
    fn create_tray_window(&self, class_name: &str) -> Result<Hwnd, OsError>;

    /// `NIM_ADD`.
    fn add_icon(&self, icon: &TrayIconDescriptor) -> Result<(), OsError>;

    /// `NIM_SETVERSION`.
    fn set_icon_version(&self, icon: &TrayIconDescriptor) -> Result<(), OsError>;

    /// `NIM_DELETE`.
    fn delete_icon(&self, owner: Hwnd, id: u32) -> Result<(), OsError>;

    /// Icon associated with the running executable, if it has one.
    fn executable_icon(&self) -> Option<Hicon>;

    /// Stock application icon.
    fn default_icon(&self) -> Hicon;

    fn register_window_message(&self, name: &str) -> Result<u32, OsError>;

    /// Swap the window procedure, returning the previous one. Implementations
    /// clear the last error first so a zero previous procedure can be told apart
    /// from a failure.
    fn replace_window_proc(&self, hwnd: Hwnd, handler: isize) -> OsReturn;

    fn default_window_proc(&self, msg: &WindowMessage) -> isize;

    fn call_previous_proc(&self, previous: isize, msg: &WindowMessage) -> isize;

    /// Post `WM_QUIT` to the calling thread's queue.
    fn post_quit(&self, exit_code: i32);
}
