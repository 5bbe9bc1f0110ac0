//! `PathCopier` backed by an external `rsync`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::path_ops::PathCopier;
use crate::item::HostAwarePath;
use crate::process::{ProcessRunner, SystemProcessRunner};
use crate::status::Status;

pub struct RsyncCopier {
    rsync_executable: PathBuf,
    ssh_executable: PathBuf,
    timeout: Duration,
    runner: Arc<dyn ProcessRunner>,
}

impl RsyncCopier {
    pub fn new(rsync_executable: impl Into<PathBuf>, ssh_executable: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self::with_runner(rsync_executable, ssh_executable, timeout, Arc::new(SystemProcessRunner))
    }

    pub fn with_runner(
        rsync_executable: impl Into<PathBuf>,
        ssh_executable: impl Into<PathBuf>,
        timeout: Duration,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            rsync_executable: rsync_executable.into(),
            ssh_executable: ssh_executable.into(),
            timeout,
            runner,
        }
    }

    /// rsync argv for one copy; `None` when both sides are remote.
    pub fn build_command_line(&self, source: &HostAwarePath, destination_dir: &HostAwarePath) -> Option<Vec<String>> {
        if source.is_remote() && destination_dir.is_remote() {
            return None;
        }
        let mut argv = vec![self.rsync_executable.display().to_string(), "--archive".to_string()];
        if source.is_remote() || destination_dir.is_remote() {
            argv.push("--rsh".to_string());
            argv.push(self.ssh_executable.display().to_string());
            // Remote paths reach the far side unsplit, spaces and quotes included.
            argv.push("--protect-args".to_string());
        }
        argv.push(source.to_string());
        // Trailing slash: copy *into* the directory.
        let mut dest = destination_dir.to_string();
        if !dest.ends_with('/') {
            dest.push('/');
        }
        argv.push(dest);
        Some(argv)
    }
}

impl PathCopier for RsyncCopier {
    fn copy(&self, source: &HostAwarePath, destination_dir: &HostAwarePath) -> Status {
        let Some(argv) = self.build_command_line(source, destination_dir) else {
            return Status::fatal(format!(
                "rsync cannot copy between two remote locations ('{source}' -> '{destination_dir}')"
            ));
        };
        match self.runner.run(&argv, self.timeout) {
            Ok(outcome) if outcome.is_ok() => {
                debug!(src = %source, dest = %destination_dir, "rsync copy finished");
                Status::Ok
            }
            Ok(outcome) if outcome.is_timed_out() => Status::timed_out(outcome.describe_failure()),
            Ok(outcome) => {
                warn!(src = %source, dest = %destination_dir, "rsync copy failed");
                Status::retriable(outcome.describe_failure())
            }
            Err(e) => Status::fatal(e.to_string()),
        }
    }
}
