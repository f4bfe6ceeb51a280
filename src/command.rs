//! External process execution.
//!
//! The asset build and every git operation go through [`CommandRunner`] so
//! tests can substitute a recording fake. Commands are always argument
//! vectors handed to `std::process::Command`; nothing is ever passed through
//! a shell, so branch names or URLs from configuration cannot inject extra
//! commands.

use std::io;
use std::path::Path;
use std::process::{Command, Stdio};

/// Exit status plus combined stdout/stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub success: bool,
    pub output: String,
}

impl CommandOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// Runs one external program.
pub trait CommandRunner: Send + Sync {
    /// Execute `argv[0]` with `argv[1..]` in `cwd`.
    ///
    /// `Err` means the program could not be started at all; a non-zero exit
    /// is `Ok` with `success: false`.
    fn run(&self, argv: &[String], cwd: &Path) -> io::Result<CommandOutput>;
}

/// Runs commands on the host with `std::process::Command`.
#[derive(Debug, Default, Clone)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> io::Result<CommandOutput> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            // Never block on a credential prompt.
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .output()?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(CommandOutput {
            success: output.status.success(),
            output: text,
        })
    }
}

/// Build an owned argument vector from string slices.
pub fn argv<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts.into_iter().map(|s| s.as_ref().to_string()).collect()
}
