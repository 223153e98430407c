//! Debug log of raw webhook requests.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use tracing::warn;

use super::http::Request;

const INDENT: &str = "    ";
const SEPARATOR: &str =
    "\n\n--------------------------------------------------------------------------------\n\n";

/// Appends one entry per received request to `DebugWebhookLog_<timestamp>.txt`.
pub struct RequestLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl RequestLog {
    /// Log file in `dir`, named after the current time.
    pub fn new(dir: &Path) -> Self {
        let stamp = Local::now().format("%m-%d_%H-%M-%S");
        Self {
            path: dir.join(format!("DebugWebhookLog_{stamp}.txt")),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record `request`. Failures are logged and otherwise ignored.
    pub fn record(&self, request: &Request, webhook_path: &str, recognized: bool) {
        let entry = format_entry(request, webhook_path, recognized, Local::now());
        if let Err(e) = self.append(&entry) {
            warn!(error = %e, path = ?self.path, "Error writing webhook request log");
        }
    }

    fn append(&self, entry: &str) -> io::Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())
    }
}

fn format_entry(
    request: &Request,
    webhook_path: &str,
    recognized: bool,
    time: DateTime<Local>,
) -> String {
    let host = request.header("Host").unwrap_or_default();
    let match_line = if recognized {
        format!("Matches path in config: {webhook_path}")
    } else {
        format!("Does not match path in config: {webhook_path}")
    };

    let mut entry = format!(
        "{method} {host}{target}\n\
         {INDENT}Time: {time}\n\
         {INDENT}Method: {method}\n\
         {INDENT}Host: {host}\n\
         {INDENT}Path: {path}\n\
         {INDENT}{INDENT}{match_line}\n\
         {INDENT}Parameters: \n",
        method = request.method,
        target = request.target,
        path = request.path,
        time = time.format("%Y-%m-%d %H:%M:%S"),
    );
    for (key, value) in &request.query_pairs {
        entry.push_str(&format!("{INDENT}{INDENT}{key}: {value}\n"));
    }
    entry.push_str(SEPARATOR);
    entry
}
