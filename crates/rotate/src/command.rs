//! External command execution
//!
//! Two invocation shapes exist on purpose. An argument vector never
//! touches a shell, so caller data travels as discrete tokens. A shell
//! line is only for the su/cd/helper idiom and can only be assembled
//! through [`ShellLineBuilder`], which forces every dynamic substring
//! through [`shell_quote`].
//!
//! Every invocation is appended to the run log before its result is
//! returned, so the audit trail survives a later crash.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::Local;
use tracing::debug;

use crate::error::RotateError;

/// Outcome of one external command.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// True only for a zero exit code.
    pub success: bool,
    /// Trimmed stdout on success, diagnostic text on failure.
    pub output: String,
}

impl RunOutcome {
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

/// How a command is to be executed.
#[derive(Debug, Clone)]
pub enum Invocation {
    /// Program plus discrete arguments. No shell is involved, so the
    /// arguments need no quoting regardless of their contents.
    Argv {
        program: String,
        args: Vec<String>,
    },
    /// A full `sh -c` line. Only [`ShellLineBuilder`] produces these.
    ShellLine(String),
}

impl Invocation {
    pub fn argv<P, I, A>(program: P, args: I) -> Self
    where
        P: Into<String>,
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self::Argv {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Invocation::Argv { program, args } => {
                write!(f, "{}", program)?;
                for arg in args {
                    write!(f, " {}", shell_quote(arg))?;
                }
                Ok(())
            }
            Invocation::ShellLine(line) => write!(f, "sh -c: {}", line),
        }
    }
}

/// Quote a value so a POSIX shell treats it as one literal token no
/// matter what it contains. Plain tokens pass through unchanged.
pub fn shell_quote(value: &str) -> String {
    let plain = !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b':' | b'='));
    if plain {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Assembles a shell line from fixed words and quoted dynamic values.
/// String concatenation of unquoted caller data is not reachable from
/// this API.
#[derive(Debug, Default)]
pub struct ShellLineBuilder {
    parts: Vec<String>,
}

impl ShellLineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fixed word the caller fully controls (a program name,
    /// a flag, an operator such as `&&`).
    pub fn word(mut self, s: &str) -> Self {
        self.parts.push(s.to_string());
        self
    }

    /// Append a dynamic value, quoted so the shell sees a single
    /// literal token.
    pub fn quoted(mut self, s: &str) -> Self {
        self.parts.push(shell_quote(s));
        self
    }

    /// The assembled line, for nesting inside an outer shell line
    /// (e.g. the `-c` argument to `su`).
    pub fn into_line(self) -> String {
        self.parts.join(" ")
    }

    pub fn build(self) -> Invocation {
        Invocation::ShellLine(self.into_line())
    }
}

/// Append-only audit file recording every external command and its
/// outcome. One file per run, timestamped name, created eagerly so the
/// operator sees the path before anything executes.
#[derive(Debug)]
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn create(scratch_dir: &Path) -> Result<Self, RotateError> {
        let path = scratch_dir.join(format!(
            "rotate_{}.log",
            Local::now().format("%Y%m%d_%H%M%S")
        ));
        let log = Self { path };
        log.append(&format!("run started, pid {}", std::process::id()))?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one timestamped line and flush before returning.
    pub fn append(&self, message: &str) -> Result<(), RotateError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(RotateError::RunLog)?;
        writeln!(
            file,
            "{} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            message
        )
        .map_err(RotateError::RunLog)?;
        file.flush().map_err(RotateError::RunLog)?;
        Ok(())
    }
}

/// Executes invocations. A trait so the orchestration flow can be
/// driven by scripted outcomes in tests.
pub trait CommandRunner {
    /// Run one command to completion and capture its output. Never
    /// fails on a non-zero exit - that is reported through
    /// [`RunOutcome::success`]. The only error is a run-log write
    /// failure, because audit entries must never be lost.
    fn run(&self, invocation: &Invocation) -> Result<RunOutcome, RotateError>;
}

/// Runs commands on the host, blocking until each completes, and
/// records every one in the run log.
pub struct SystemRunner {
    log: RunLog,
}

impl SystemRunner {
    pub fn new(log: RunLog) -> Self {
        Self { log }
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<RunOutcome, RotateError> {
        // Logged before execution so a crash mid-command still leaves a
        // record of what was attempted.
        self.log.append(&format!("EXEC {}", invocation))?;
        debug!(command = %invocation, "executing");

        let result = match invocation {
            Invocation::Argv { program, args } => {
                Command::new(program).args(args).output()
            }
            Invocation::ShellLine(line) => {
                Command::new("sh").arg("-c").arg(line).output()
            }
        };

        let outcome = match result {
            Ok(output) => {
                if output.status.success() {
                    RunOutcome::ok(
                        String::from_utf8_lossy(&output.stdout).trim().to_string(),
                    )
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    let stdout = String::from_utf8_lossy(&output.stdout);
                    let diagnostic = if stderr.trim().is_empty() {
                        stdout.trim().to_string()
                    } else {
                        stderr.trim().to_string()
                    };
                    RunOutcome::failed(format!(
                        "command failed ({}): {}",
                        output.status, diagnostic
                    ))
                }
            }
            Err(e) => RunOutcome::failed(format!("failed to start command: {}", e)),
        };

        let status = if outcome.success { "OK" } else { "FAIL" };
        self.log.append(&format!("{} {}", status, invocation))?;
        Ok(outcome)
    }
}
