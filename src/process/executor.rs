//! Single-line shell command execution, locally or on a remote host over ssh.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{ProcessOutcome, ProcessRunner, SystemProcessRunner};
use crate::errors::StoreError;

/// Runs one shell command line somewhere and captures its outcome.
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command: &str, timeout: Duration) -> Result<ProcessOutcome, StoreError>;

    /// Where commands run, for log and status messages.
    fn target(&self) -> &str;
}

/// Runs commands on `host` through an ssh client in batch mode.
pub struct SshExecutor {
    ssh_executable: PathBuf,
    host: String,
    runner: Arc<dyn ProcessRunner>,
}

impl SshExecutor {
    pub fn new(ssh_executable: impl Into<PathBuf>, host: impl Into<String>) -> Self {
        Self::with_runner(ssh_executable, host, Arc::new(SystemProcessRunner))
    }

    pub fn with_runner(
        ssh_executable: impl Into<PathBuf>,
        host: impl Into<String>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self { ssh_executable: ssh_executable.into(), host: host.into(), runner }
    }

    /// argv handed to the runner for `command`.
    pub fn build_command_line(&self, command: &str) -> Vec<String> {
        vec![
            self.ssh_executable.display().to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            self.host.clone(),
            command.to_string(),
        ]
    }
}

impl CommandExecutor for SshExecutor {
    fn execute(&self, command: &str, timeout: Duration) -> Result<ProcessOutcome, StoreError> {
        self.runner.run(&self.build_command_line(command), timeout)
    }

    fn target(&self) -> &str {
        &self.host
    }
}

/// Runs commands through the local `sh`.
pub struct LocalShellExecutor {
    runner: Arc<dyn ProcessRunner>,
}

impl LocalShellExecutor {
    pub fn new() -> Self {
        Self::with_runner(Arc::new(SystemProcessRunner))
    }

    pub fn with_runner(runner: Arc<dyn ProcessRunner>) -> Self {
        Self { runner }
    }
}

impl Default for LocalShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandExecutor for LocalShellExecutor {
    fn execute(&self, command: &str, timeout: Duration) -> Result<ProcessOutcome, StoreError> {
        let argv = vec!["sh".to_string(), "-c".to_string(), command.to_string()];
        self.runner.run(&argv, timeout)
    }

    fn target(&self) -> &str {
        "localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recorder(Mutex<Vec<Vec<String>>>);

    impl ProcessRunner for Recorder {
        fn run(&self, argv: &[String], _timeout: Duration) -> Result<ProcessOutcome, StoreError> {
            self.0.lock().unwrap().push(argv.to_vec());
            Ok(ProcessOutcome::exited(argv.to_vec(), 0, vec![]))
        }
    }

    #[test]
    fn ssh_wraps_command_as_single_argument() {
        let rec = Arc::new(Recorder(Mutex::new(Vec::new())));
        let exec = SshExecutor::with_runner("/usr/bin/ssh", "sprint", rec.clone());
        exec.execute("rm -fr /data/x", Duration::from_secs(1)).unwrap();
        let calls = rec.0.lock().unwrap();
        assert_eq!(
            calls[0],
            vec!["/usr/bin/ssh", "-o", "BatchMode=yes", "sprint", "rm -fr /data/x"]
        );
        assert_eq!(exec.target(), "sprint");
    }

    #[cfg(unix)]
    #[test]
    fn local_shell_runs_pipelines() {
        let exec = LocalShellExecutor::new();
        let out = exec.execute("printf 'b\\na\\n' | sort | head -1", Duration::from_secs(5)).unwrap();
        assert!(out.is_ok());
        assert_eq!(out.stdout(), ["a"]);
    }
}
