//! Win32 implementation of the tray's OS seam, plus the message pump and
//! popup menu that only exist on Windows.

use std::path::Path;
use std::ptr;

use tracing::{debug, warn};
use windows_sys::Win32::Foundation::{GetLastError, SetLastError, POINT};
use windows_sys::Win32::System::LibraryLoader::GetModuleHandleW;
use windows_sys::Win32::System::Threading::GetCurrentThreadId;
use windows_sys::Win32::UI::Shell::{
    ExtractIconW, ShellExecuteW, Shell_NotifyIconW, NIF_ICON, NIF_MESSAGE, NIF_TIP, NIM_ADD,
    NIM_DELETE, NIM_SETVERSION, NOTIFYICONDATAW,
};
use windows_sys::Win32::UI::WindowsAndMessaging::{
    AppendMenuW, CallWindowProcW, CreatePopupMenu, CreateWindowExW, DefWindowProcW, DestroyMenu,
    DispatchMessageW, GetCursorPos, GetMessageW, LoadIconW, PostMessageW, PostQuitMessage,
    PostThreadMessageW, RegisterClassW, RegisterWindowMessageW, SetForegroundWindow,
    TrackPopupMenu, TranslateMessage, IDI_APPLICATION, MF_SEPARATOR, MF_STRING, MSG,
    SW_SHOWNORMAL, TPM_RETURNCMD, TPM_RIGHTBUTTON, WM_NULL, WM_QUIT, WNDCLASSW, WNDPROC,
};

use super::controller::TrayController;
use super::menu::{MenuEntry, MenuItemSet};
use super::shell::{Hicon, Hwnd, OsReturn, ShellApi, TrayIconDescriptor, WindowMessage};
use crate::dialog::wide;
use crate::error::{OsError, TrayError};

const ERROR_CLASS_ALREADY_EXISTS: u32 = 1410;

#[cfg(target_pointer_width = "64")]
use windows_sys::Win32::UI::WindowsAndMessaging::{SetWindowLongPtrW, GWLP_WNDPROC};

#[cfg(target_pointer_width = "32")]
use windows_sys::Win32::UI::WindowsAndMessaging::{SetWindowLongW, GWL_WNDPROC};

fn last_error() -> OsError {
    OsError::new(unsafe { GetLastError() })
}

/// Run `f` with the thread's last error cleared, capturing what it leaves behind.
fn with_last_error(f: impl FnOnce() -> isize) -> OsReturn {
    unsafe { SetLastError(0) };
    let value = f();
    let last_error = unsafe { GetLastError() };
    OsReturn { value, last_error }
}

fn notify_data(owner: Hwnd, id: u32) -> NOTIFYICONDATAW {
    // SAFETY: NOTIFYICONDATAW is plain data; all-zero is a valid empty request.
    let mut data: NOTIFYICONDATAW = unsafe { std::mem::zeroed() };
    data.cbSize = std::mem::size_of::<NOTIFYICONDATAW>() as u32;
    data.hWnd = owner.0;
    data.uID = id;
    data
}

/// Shell access backed by `user32` and `shell32`.
pub struct Win32Shell {
    instance: isize,
}

impl Win32Shell {
    pub fn new() -> Self {
        Self {
            instance: unsafe { GetModuleHandleW(ptr::null()) },
        }
    }
}

impl ShellApi for Win32Shell {
    fn create_tray_window(&self, class_name: &str) -> Result<Hwnd, OsError> {
        let class = wide(class_name);
        let wc = WNDCLASSW {
            style: 0,
            lpfnWndProc: Some(DefWindowProcW),
            cbClsExtra: 0,
            cbWndExtra: 0,
            hInstance: self.instance,
            hIcon: 0,
            hCursor: 0,
            hbrBackground: 0,
            lpszMenuName: ptr::null(),
            lpszClassName: class.as_ptr(),
        };

        if unsafe { RegisterClassW(&wc) } == 0 {
            let err = last_error();
            if err.code != ERROR_CLASS_ALREADY_EXISTS {
                return Err(err);
            }
        }

        // A hidden top-level window rather than a message-only one: only
        // top-level windows receive the shell's restart broadcast.
        let hwnd = unsafe {
            CreateWindowExW(
                0,
                class.as_ptr(),
                class.as_ptr(),
                0,
                0,
                0,
                0,
                0,
                0,
                0,
                self.instance,
                ptr::null(),
            )
        };
        if hwnd == 0 {
            return Err(last_error());
        }
        debug!(hwnd = %Hwnd(hwnd), "Created tray owner window");
        Ok(Hwnd(hwnd))
    }

    fn add_icon(&self, icon: &TrayIconDescriptor) -> Result<(), OsError> {
        let mut data = notify_data(icon.owner, icon.id);
        data.uFlags = NIF_MESSAGE | NIF_ICON | NIF_TIP;
        data.uCallbackMessage = icon.callback_message;
        data.hIcon = icon.icon.0;
        data.szTip = icon.tooltip.to_wide();

        if unsafe { Shell_NotifyIconW(NIM_ADD, &data) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn set_icon_version(&self, icon: &TrayIconDescriptor) -> Result<(), OsError> {
        let mut data = notify_data(icon.owner, icon.id);
        data.Anonymous.uVersion = icon.version.as_raw();

        if unsafe { Shell_NotifyIconW(NIM_SETVERSION, &data) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn delete_icon(&self, owner: Hwnd, id: u32) -> Result<(), OsError> {
        let data = notify_data(owner, id);
        if unsafe { Shell_NotifyIconW(NIM_DELETE, &data) } == 0 {
            return Err(last_error());
        }
        Ok(())
    }

    fn executable_icon(&self) -> Option<Hicon> {
        let exe = std::env::current_exe().ok()?;
        let path = wide(&exe.to_string_lossy());
        let icon = unsafe { ExtractIconW(self.instance, path.as_ptr(), 0) };
        // 1 means the file is not an executable or icon file.
        match icon {
            0 | 1 => None,
            handle => Some(Hicon(handle)),
        }
    }

    fn default_icon(&self) -> Hicon {
        Hicon(unsafe { LoadIconW(0, IDI_APPLICATION) })
    }

    fn register_window_message(&self, name: &str) -> Result<u32, OsError> {
        let name = wide(name);
        match unsafe { RegisterWindowMessageW(name.as_ptr()) } {
            0 => Err(last_error()),
            id => Ok(id),
        }
    }

    fn replace_window_proc(&self, hwnd: Hwnd, handler: isize) -> OsReturn {
        #[cfg(target_pointer_width = "64")]
        {
            with_last_error(|| unsafe { SetWindowLongPtrW(hwnd.0, GWLP_WNDPROC, handler) })
        }

        #[cfg(target_pointer_width = "32")]
        {
            with_last_error(|| unsafe {
                SetWindowLongW(hwnd.0, GWL_WNDPROC, handler as i32) as isize
            })
        }
    }

    fn default_window_proc(&self, msg: &WindowMessage) -> isize {
        unsafe { DefWindowProcW(msg.hwnd.0, msg.id, msg.wparam, msg.lparam) }
    }

    fn call_previous_proc(&self, previous: isize, msg: &WindowMessage) -> isize {
        // SAFETY: `previous` came from SetWindowLongPtrW and is either a
        // function pointer or a handle CallWindowProcW knows how to resolve.
        let proc: WNDPROC = unsafe { std::mem::transmute::<isize, WNDPROC>(previous) };
        unsafe { CallWindowProcW(proc, msg.hwnd.0, msg.id, msg.wparam, msg.lparam) }
    }

    fn post_quit(&self, exit_code: i32) {
        unsafe { PostQuitMessage(exit_code) };
    }
}

/// Pump messages on the calling thread until `WM_QUIT`. A fault recorded by
/// the window procedure is returned once the loop has stopped.
pub fn run_message_loop(tray: &TrayController) -> Result<(), TrayError> {
    // SAFETY: MSG is plain data and fully written by GetMessageW.
    let mut msg: MSG = unsafe { std::mem::zeroed() };
    loop {
        match unsafe { GetMessageW(&mut msg, 0, 0, 0) } {
            0 => break,
            -1 => {
                let err = last_error();
                warn!(error_code = err.code, "GetMessageW failed");
                return Err(TrayError::MessageLoop(err));
            }
            _ => unsafe {
                TranslateMessage(&msg);
                DispatchMessageW(&msg);
            },
        }
    }

    debug!(exit_code = msg.wParam, "Tray message loop ended");
    match tray.take_fault() {
        Some(fault) => Err(fault),
        None => Ok(()),
    }
}

/// Show `items` at the cursor and block until the user picks one. Returns
/// the selected command id, or 0 when the menu was dismissed.
pub fn track_popup_menu(owner: Hwnd, items: &MenuItemSet) -> Result<u32, TrayError> {
    let menu = unsafe { CreatePopupMenu() };
    if menu == 0 {
        return Err(TrayError::Menu(last_error().to_string()));
    }

    let selected = populate_and_track(owner, menu, items);
    unsafe { DestroyMenu(menu) };
    selected
}

fn populate_and_track(owner: Hwnd, menu: isize, items: &MenuItemSet) -> Result<u32, TrayError> {
    for (id, entry) in items.entries() {
        let ok = match entry {
            MenuEntry::Item(action) => {
                let label = wide(action.label());
                unsafe { AppendMenuW(menu, MF_STRING, id as usize, label.as_ptr()) }
            }
            MenuEntry::Separator => unsafe { AppendMenuW(menu, MF_SEPARATOR, 0, ptr::null()) },
        };
        if ok == 0 {
            return Err(TrayError::Menu(format!(
                "adding menu item {id}: {}",
                last_error()
            )));
        }
    }

    let mut cursor = POINT { x: 0, y: 0 };
    unsafe {
        GetCursorPos(&mut cursor);
        // The menu only closes on outside clicks while our window is foreground.
        SetForegroundWindow(owner.0);
    }

    let selected = unsafe {
        TrackPopupMenu(
            menu,
            TPM_RIGHTBUTTON | TPM_RETURNCMD,
            cursor.x,
            cursor.y,
            0,
            owner.0,
            ptr::null(),
        )
    };
    unsafe { PostMessageW(owner.0, WM_NULL, 0, 0) };

    Ok(selected.max(0) as u32)
}

/// Open `path` with its associated program.
pub fn shell_open(path: &Path) -> Result<(), OsError> {
    let verb = wide("open");
    let file = wide(&path.to_string_lossy());
    let result = unsafe {
        ShellExecuteW(
            0,
            verb.as_ptr(),
            file.as_ptr(),
            ptr::null(),
            ptr::null(),
            SW_SHOWNORMAL,
        )
    };
    // Values above 32 mean success; anything else is an SE_ERR code.
    if result > 32 {
        Ok(())
    } else {
        Err(OsError::new(result as u32))
    }
}

/// Stop the message loop of the calling thread.
pub fn post_quit() {
    unsafe { PostQuitMessage(0) };
}

pub fn current_thread_id() -> u32 {
    unsafe { GetCurrentThreadId() }
}

/// Stop the message loop of another thread.
pub fn post_quit_to_thread(thread_id: u32) -> Result<(), OsError> {
    if unsafe { PostThreadMessageW(thread_id, WM_QUIT, 0, 0) } == 0 {
        return Err(last_error());
    }
    Ok(())
}
