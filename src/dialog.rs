//! Blocking message boxes.
//!
//! On non-Windows builds the message goes to stderr instead.

/// NUL-terminated UTF-16 copy of `s` for Win32 string parameters.
#[cfg(windows)]
pub fn wide(s: &str) -> Vec<u16> {
    use std::ffi::OsStr;
    use std::os::windows::ffi::OsStrExt;

    OsStr::new(s).encode_wide().chain(Some(0)).collect()
}

// MB_ICONINFORMATION = 0x40, MB_ICONERROR = 0x10, MB_SETFOREGROUND = 0x10000
#[cfg(windows)]
const INFO_FLAGS: u32 = 0x40 | 0x10000;
#[cfg(windows)]
const ERROR_FLAGS: u32 = 0x10 | 0x10000;

pub fn show_info(title: &str, message: &str) {
    #[cfg(windows)]
    message_box(title, message, INFO_FLAGS);

    #[cfg(not(windows))]
    eprintln!("{title}: {message}");
}

pub fn show_error(title: &str, message: &str) {
    #[cfg(windows)]
    message_box(title, message, ERROR_FLAGS);

    #[cfg(not(windows))]
    eprintln!("{title}: {message}");
}

#[cfg(windows)]
fn message_box(title: &str, message: &str, flags: u32) {
    let title_wide = wide(title);
    let message_wide = wide(message);

    unsafe {
        windows_sys::Win32::UI::WindowsAndMessaging::MessageBoxW(
            0,
            message_wide.as_ptr(),
            title_wide.as_ptr(),
            flags,
        );
    }
}
