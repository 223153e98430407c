//! Crash reporting and panic handling.

use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fs;
use std::panic::{self, AssertUnwindSafe, PanicHookInfo};
use std::path::{Path, PathBuf};

use tracing::error;

use crate::config::paths;
use crate::dialog;
use crate::error::TrayError;
use crate::tray::Diagnostics;

const APP_NAME: &str = "Rainmeter Webhook Monitor";

thread_local! {
    static CONTAINED: Cell<bool> = const { Cell::new(false) };
    static CONTAINED_PANIC: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// Install the panic hook for crash reporting.
pub fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        handle_panic(panic_info);
    }));
}

/// Run `f` and hand a panic back to the caller as its message and location.
///
/// Inside `f` the panic hook only logs; reporting is left to the caller.
pub fn catch_contained<R>(f: impl FnOnce() -> R) -> Result<R, String> {
    let outer = CONTAINED.with(|c| c.replace(true));
    let outcome = panic::catch_unwind(AssertUnwindSafe(f));
    CONTAINED.with(|c| c.set(outer));

    outcome.map_err(|payload| {
        CONTAINED_PANIC
            .with(|p| p.borrow_mut().take())
            .unwrap_or_else(|| panic_message(payload.as_ref()))
    })
}

fn handle_panic(panic_info: &PanicHookInfo) {
    let message = panic_message(panic_info.payload());
    let location = panic_info
        .location()
        .map(|loc| format!("{}:{}:{}", loc.file(), loc.line(), loc.column()))
        .unwrap_or_else(|| "unknown location".to_string());

    if CONTAINED.with(|c| c.get()) {
        error!(%message, %location, "Panic caught by caller");
        CONTAINED_PANIC.with(|p| *p.borrow_mut() = Some(format!("{message} at {location}")));
        return;
    }

    let backtrace = Backtrace::force_capture();

    let report = build_crash_report(
        "Panic Message",
        &message,
        &format!("Location:\n{location}\n\nBacktrace:\n{backtrace}"),
    );
    error!(%message, %location, "Panic");

    let crash_file = paths::log_dir()
        .ok()
        .and_then(|dir| write_crash_report(&dir, &report));

    show_crash_dialog(crash_file.as_deref());
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

fn build_crash_report(heading: &str, message: &str, details: &str) -> String {
    let version = env!("CARGO_PKG_VERSION");
    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    let os_info = format!("{} {}", std::env::consts::OS, std::env::consts::ARCH);

    format!(
        r#"{APP_NAME} Crash Report
========================

Version: {version}
Timestamp: {timestamp}
OS: {os_info}

{heading}:
{message}

{details}
"#
    )
}

/// Write `report` to `crash_<timestamp>.txt` in `dir`.
fn write_crash_report(dir: &Path, report: &str) -> Option<PathBuf> {
    fs::create_dir_all(dir).ok()?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let path = dir.join(format!("crash_{timestamp}.txt"));

    let mut content = fs::read_to_string(&path).unwrap_or_default();
    content.push_str(report);
    fs::write(&path, content).ok()?;
    Some(path)
}

fn show_crash_dialog(crash_file: Option<&Path>) {
    let file_info = crash_file
        .map(|f| format!("\n\nCrash report saved to:\n{}", f.display()))
        .unwrap_or_default();

    dialog::show_error(
        &format!("{APP_NAME} - Crash"),
        &format!("{APP_NAME} has crashed unexpectedly.{file_info}"),
    );
}

/// Record `error` and its source chain in a crash report under `dir`.
pub fn write_crash_log(
    dir: &Path,
    error: &(dyn StdError + 'static),
    context: &str,
) -> Option<PathBuf> {
    let mut chain = String::new();
    let mut source = error.source();
    while let Some(cause) = source {
        chain.push_str(&format!("  caused by: {cause}\n"));
        source = cause.source();
    }

    let report = build_crash_report(
        "Error",
        &error.to_string(),
        &format!("Context:\n{context}\n\nCauses:\n{chain}"),
    );
    write_crash_report(dir, &report)
}

/// Tray diagnostics backed by the crash log and message boxes.
#[cfg_attr(not(windows), allow(dead_code))]
pub struct CrashLog {
    verbose: bool,
}

#[cfg_attr(not(windows), allow(dead_code))]
impl CrashLog {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl Diagnostics for CrashLog {
    fn write_crash_log(&self, err: &TrayError, context: &str) {
        match paths::log_dir() {
            Ok(dir) => {
                if let Some(path) = write_crash_log(&dir, err, context) {
                    error!(path = ?path, "Crash log written");
                }
            }
            Err(e) => error!(error = %e, "No log directory for crash log"),
        }
    }

    fn is_verbose(&self) -> bool {
        self.verbose
    }

    fn show_error(&self, title: &str, message: &str) {
        dialog::show_error(title, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OsError;
    use crate::tray::Hwnd;

    #[test]
    fn test_crash_log_includes_context_and_causes() {
        let dir = tempfile::tempdir().unwrap();
        let err = TrayError::SubclassFailed {
            hwnd: Hwnd(0x1234),
            source: OsError::new(1413),
        };

        let path = write_crash_log(dir.path(), &err, "installing tray window procedure").unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("crash_") && name.ends_with(".txt"));

        let report = fs::read_to_string(&path).unwrap();
        assert!(report.contains("Failed to install window procedure on window 0x1234"));
        assert!(report.contains("installing tray window procedure"));
        assert!(report.contains("caused by: OS error 1413"));
        assert!(report.contains(env!("CARGO_PKG_VERSION")));
    }

    #[test]
    fn test_repeated_reports_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        write_crash_report(dir.path(), "first report\n").unwrap();
        write_crash_report(dir.path(), "second report\n").unwrap();

        let mut combined = String::new();
        for entry in fs::read_dir(dir.path()).unwrap() {
            combined.push_str(&fs::read_to_string(entry.unwrap().path()).unwrap());
        }
        assert!(combined.contains("first report"));
        assert!(combined.contains("second report"));
    }

    #[test]
    fn test_catch_contained_returns_value_or_panic_message() {
        assert_eq!(catch_contained(|| 5), Ok(5));

        let err = catch_contained(|| -> u8 { panic!("menu exploded") }).unwrap_err();
        assert!(err.contains("menu exploded"));
        assert!(!CONTAINED.with(|c| c.get()));
    }

    #[test]
    fn test_panic_message_from_payload() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
        let payload: Box<dyn std::any::Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
