//! Starting Rainmeter with a bang command.

use std::io;
use std::process::{Command, Stdio};

use tracing::debug;

/// Starts a program with a pre-built argument string.
#[cfg_attr(test, mockall::automock)]
pub trait Launcher: Send + Sync {
    /// Start `program` with `args` and return without waiting for it.
    fn launch(&self, program: &str, args: &str) -> io::Result<()>;
}

/// Launches real processes with no console window.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLauncher;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

impl Launcher for ProcessLauncher {
    fn launch(&self, program: &str, args: &str) -> io::Result<()> {
        debug!("Full command:  {program} {args}");

        let mut command = Command::new(program);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            // Rainmeter parses its own command line, so pass it through untouched.
            command.raw_arg(args).creation_flags(CREATE_NO_WINDOW);
        }

        #[cfg(not(windows))]
        command.args(args.split_whitespace());

        // The child is detached; dropping the handle does not wait on it.
        command.spawn().map(drop)
    }
}
