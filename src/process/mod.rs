//! External process execution with a bounded wait.
//!
//! - `ProcessRunner` is the seam: production code uses `SystemProcessRunner`,
//!   tests substitute scripted fakes.
//! - stdout/stderr are drained on reader threads so a chatty child never blocks on a full pipe.
//! - On timeout the child is killed and the outcome says so; nothing is left running unbounded.

mod executor;

pub use executor::{CommandExecutor, LocalShellExecutor, SshExecutor};

use std::borrow::Cow;
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::errors::StoreError;

const POLL_INTERVAL: Duration = Duration::from_millis(10);
/// How long to wait for the output readers once the child is gone.
const READER_GRACE: Duration = Duration::from_millis(500);

/// How a process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Exited(i32),
    /// Terminated by a signal not sent by us.
    Signalled,
    /// Killed by us after the time budget ran out.
    TimedOut,
}

/// Result of one process invocation. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutcome {
    command_line: Vec<String>,
    completion: Completion,
    stdout: Vec<String>,
    stderr: Vec<String>,
}

impl ProcessOutcome {
    pub fn new(
        command_line: Vec<String>,
        completion: Completion,
        stdout: Vec<String>,
        stderr: Vec<String>,
    ) -> Self {
        Self { command_line, completion, stdout, stderr }
    }

    /// Convenience for a process that exited normally.
    pub fn exited(command_line: Vec<String>, code: i32, stdout: Vec<String>) -> Self {
        Self::new(command_line, Completion::Exited(code), stdout, Vec::new())
    }

    pub fn completion(&self) -> Completion {
        self.completion
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self.completion {
            Completion::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Exited with status 0.
    pub fn is_ok(&self) -> bool {
        self.completion == Completion::Exited(0)
    }

    pub fn is_timed_out(&self) -> bool {
        self.completion == Completion::TimedOut
    }

    pub fn stdout(&self) -> &[String] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[String] {
        &self.stderr
    }

    pub fn command_line(&self) -> &[String] {
        &self.command_line
    }

    /// Command line as a single string for diagnostics.
    pub fn command_line_string(&self) -> String {
        self.command_line.join(" ")
    }

    /// Operator-facing summary of a failed run.
    pub fn describe_failure(&self) -> String {
        let how = match self.completion {
            Completion::Exited(code) => format!("exit code {code}"),
            Completion::Signalled => "termination by signal".to_string(),
            Completion::TimedOut => "timeout".to_string(),
        };
        let mut msg = format!("Command '{}' failed with {}", self.command_line_string(), how);
        if !self.stderr.is_empty() {
            msg.push_str(&format!(" [stderr: {}]", self.stderr.join(" | ")));
        }
        msg
    }
}

/// Runs an argv with a timeout. The process-execution collaborator of the stores.
pub trait ProcessRunner: Send + Sync {
    fn run(&self, argv: &[String], timeout: Duration) -> Result<ProcessOutcome, StoreError>;
}

/// `ProcessRunner` backed by `std::process`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn run(&self, argv: &[String], timeout: Duration) -> Result<ProcessOutcome, StoreError> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| StoreError::Configuration("empty command line".into()))?;
        let command_line = argv.to_vec();
        debug!(command = %command_line.join(" "), timeout_ms = timeout.as_millis() as u64, "Running process");

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| StoreError::Launch { program: program.clone(), source })?;

        let stdout_rx = child.stdout.take().map(spawn_line_reader);
        let stderr_rx = child.stderr.take().map(spawn_line_reader);

        let start = Instant::now();
        let completion = loop {
            if let Some(status) = child.try_wait()? {
                break match status.code() {
                    Some(code) => Completion::Exited(code),
                    None => Completion::Signalled,
                };
            }
            let elapsed = start.elapsed();
            if elapsed >= timeout {
                let _ = child.kill();
                let _ = child.wait();
                break Completion::TimedOut;
            }
            thread::sleep(POLL_INTERVAL.min(timeout - elapsed));
        };

        let stdout = collect_lines(stdout_rx);
        let stderr = collect_lines(stderr_rx);
        let outcome = ProcessOutcome::new(command_line, completion, stdout, stderr);
        if !outcome.is_ok() {
            warn!(command = %outcome.command_line_string(), completion = ?outcome.completion(), "Process did not succeed");
        }
        Ok(outcome)
    }
}

fn spawn_line_reader<R: Read + Send + 'static>(reader: R) -> mpsc::Receiver<Vec<String>> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let mut reader = BufReader::new(reader);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    lines.push(line.trim_end_matches(['\n', '\r']).to_string());
                }
            }
        }
        let _ = tx.send(lines);
    });
    rx
}

fn collect_lines(rx: Option<mpsc::Receiver<Vec<String>>>) -> Vec<String> {
    rx.and_then(|rx| rx.recv_timeout(READER_GRACE).ok())
        .unwrap_or_default()
}

/// Quote a word for a POSIX shell only when it needs it.
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_leaves_plain_paths_alone() {
        assert_eq!(shell_quote("/data/in/a.txt"), "/data/in/a.txt");
    }

    #[test]
    fn quote_wraps_spaces_and_quotes() {
        assert_eq!(shell_quote("my file"), "'my file'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn failure_description_mentions_command_and_code() {
        let o = ProcessOutcome::new(
            vec!["ssh".into(), "host".into(), "rm -fr /x".into()],
            Completion::Exited(3),
            vec![],
            vec!["denied".into()],
        );
        let msg = o.describe_failure();
        assert!(msg.contains("rm -fr /x"));
        assert!(msg.contains("exit code 3"));
        assert!(msg.contains("denied"));
    }

    #[cfg(unix)]
    #[test]
    fn runner_captures_output() {
        let argv: Vec<String> = ["sh", "-c", "echo one; echo two >&2; exit 4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let out = SystemProcessRunner.run(&argv, Duration::from_secs(10)).unwrap();
        assert_eq!(out.exit_code(), Some(4));
        assert_eq!(out.stdout(), ["one"]);
        assert_eq!(out.stderr(), ["two"]);
    }

    #[cfg(unix)]
    #[test]
    fn runner_kills_on_timeout() {
        let argv: Vec<String> = ["sleep", "5"].iter().map(|s| s.to_string()).collect();
        let start = Instant::now();
        let out = SystemProcessRunner.run(&argv, Duration::from_millis(200)).unwrap();
        assert!(out.is_timed_out());
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn runner_reports_missing_binary_as_launch_failure() {
        let argv = vec!["/nonexistent/definitely-not-here".to_string()];
        let err = SystemProcessRunner.run(&argv, Duration::from_secs(1)).unwrap_err();
        assert!(err.is_environment_failure());
    }
}
