//! Store on a remote host. Every operation is one shell command run through a
//! `CommandExecutor`, under either the quick or the long timeout.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use super::{FileStore, FileStoreDescriptor};
use crate::errors::StoreError;
use crate::highwater::HighwaterMarkWatcher;
use crate::item::{HostAwarePath, StoreItem};
use crate::process::{shell_quote, CommandExecutor, Completion, ProcessOutcome};
use crate::status::{BooleanStatus, DateStatus, Failure, Status, StatusFlag};

/// `find` implementations tried in order. Some systems ship a default `find`
/// without `-printf`; GNU find is often installed next to it as `gfind`.
pub const FIND_CANDIDATES: [&str; 2] = ["gfind", "find"];

/// Exit code ssh uses for its own failures (connection refused, host unreachable).
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Result of looking for a usable remote `find`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FindDiscovery {
    Found(String),
    /// No candidate worked, but at least one could not be judged (timeout,
    /// signal, transport failure). Worth another try later.
    Undetermined(Failure),
}

/// Timeout classes for remote commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteTimeouts {
    /// Existence, delete and accessibility checks.
    pub quick: Duration,
    /// Listings and modification-time scans.
    pub long: Duration,
}

impl Default for RemoteTimeouts {
    fn default() -> Self {
        Self { quick: Duration::from_secs(5), long: Duration::from_secs(60) }
    }
}

pub struct RemoteFileStore {
    descriptor: FileStoreDescriptor,
    root: PathBuf,
    executor: Arc<dyn CommandExecutor>,
    timeouts: RemoteTimeouts,
    find_override: Option<String>,
    find_executable: Mutex<Option<String>>,
    watcher: HighwaterMarkWatcher,
}

impl RemoteFileStore {
    pub fn new(
        root: impl Into<PathBuf>,
        description: impl Into<String>,
        executor: Arc<dyn CommandExecutor>,
        timeouts: RemoteTimeouts,
        watcher: HighwaterMarkWatcher,
    ) -> Self {
        let root = root.into();
        let descriptor =
            FileStoreDescriptor::new(HostAwarePath::remote(executor.target(), &root), description);
        Self {
            descriptor,
            root,
            executor,
            timeouts,
            find_override: None,
            find_executable: Mutex::new(None),
            watcher,
        }
    }

    /// Use only `find` (no discovery) when set.
    pub fn with_find_executable(mut self, find: Option<String>) -> Self {
        self.find_override = find;
        self
    }

    pub fn timeouts(&self) -> RemoteTimeouts {
        self.timeouts
    }

    fn quoted(path: &Path) -> String {
        shell_quote(&path.display().to_string()).into_owned()
    }

    fn item_path(&self, item: &StoreItem) -> String {
        Self::quoted(&self.root.join(item.name()))
    }

    fn run(&self, command: &str, timeout: Duration) -> Result<ProcessOutcome, StoreError> {
        debug!(host = self.executor.target(), command, "Running remote command");
        let outcome = self.executor.execute(command, timeout)?;
        if !outcome.is_ok() {
            warn!(host = self.executor.target(), command, failure = %outcome.describe_failure(), "Remote command failed");
        }
        Ok(outcome)
    }

    /// Name of a working `find` on the remote host, discovered once and cached.
    /// Only a success is cached, so a host that was unreachable at first use is
    /// checked again next time.
    ///
    /// A candidate counts as missing only when its check ran to a non-zero exit.
    /// Timeouts, signals and ssh's own exit code 255 leave the answer open
    /// (`FindDiscovery::Undetermined`); `Err(Environment)` means every candidate
    /// is definitely unusable.
    pub fn find_executable(&self) -> Result<FindDiscovery, StoreError> {
        let mut cached = self.find_executable.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(found) = cached.as_ref() {
            return Ok(FindDiscovery::Found(found.clone()));
        }
        let candidates: Vec<&str> = match &self.find_override {
            Some(exe) => vec![exe.as_str()],
            None => FIND_CANDIDATES.to_vec(),
        };
        let mut undetermined: Option<Failure> = None;
        for candidate in &candidates {
            // Checked against `/` so a missing store root is not mistaken for a missing tool.
            let outcome = self.run(&format!("{candidate} / -maxdepth 0 -printf \"\""), self.timeouts.quick)?;
            match outcome.completion() {
                Completion::Exited(0) => {
                    info!(host = self.executor.target(), find = candidate, "Using remote find");
                    *cached = Some(candidate.to_string());
                    return Ok(FindDiscovery::Found(candidate.to_string()));
                }
                Completion::Exited(SSH_TRANSPORT_FAILURE) => {
                    if undetermined.is_none() {
                        undetermined = Some(Failure::new(StatusFlag::RetriableError, outcome.describe_failure()));
                    }
                }
                Completion::Exited(_) => {
                    debug!(host = self.executor.target(), find = candidate, "Remote find candidate unusable");
                }
                Completion::TimedOut => {
                    // A timeout outranks other open answers.
                    if !undetermined.as_ref().is_some_and(|f| f.flag() == StatusFlag::TimedOut) {
                        undetermined = Some(Failure::new(StatusFlag::TimedOut, outcome.describe_failure()));
                    }
                }
                Completion::Signalled => {
                    if undetermined.is_none() {
                        undetermined = Some(Failure::new(StatusFlag::RetriableError, outcome.describe_failure()));
                    }
                }
            }
        }
        if let Some(failure) = undetermined {
            warn!(host = self.executor.target(), failure = %failure, "Cannot tell whether a usable find exists");
            return Ok(FindDiscovery::Undetermined(failure));
        }
        Err(StoreError::Environment(format!(
            "no working find on {} (tried {})",
            self.executor.target(),
            candidates.join(", ")
        )))
    }
}

/// Seconds since the epoch (fractional, as printed by `find -printf %T@`) at millisecond resolution.
fn parse_find_timestamp(line: &str) -> Result<SystemTime, String> {
    let secs: f64 = line.trim().parse().map_err(|_| format!("not a timestamp: '{}'", line.trim()))?;
    if !secs.is_finite() || secs < 0.0 {
        return Err(format!("timestamp out of range: '{}'", line.trim()));
    }
    let millis = (secs * 1000.0) as u64;
    Ok(UNIX_EPOCH + Duration::from_millis(millis))
}

impl FileStore for RemoteFileStore {
    fn descriptor(&self) -> &FileStoreDescriptor {
        &self.descriptor
    }

    fn is_remote(&self) -> bool {
        true
    }

    fn exists(&self, item: &StoreItem) -> BooleanStatus {
        let p = self.item_path(item);
        let command = format!("if [ -e {p} ]; then exit 0; else echo false; fi");
        match self.run(&command, self.timeouts.quick) {
            Ok(o) if o.is_timed_out() => BooleanStatus::retriable(o.describe_failure()),
            // Any output is the negative marker, whatever the exit code.
            Ok(o) if o.exit_code().is_some() => {
                BooleanStatus::from_bool(o.is_ok() && o.stdout().iter().all(|l| l.trim().is_empty()))
            }
            Ok(o) => BooleanStatus::retriable(o.describe_failure()),
            Err(e) => BooleanStatus::fatal(e.to_string()),
        }
    }

    fn delete(&self, item: &StoreItem) -> Status {
        let command = format!("rm -fr {}", self.item_path(item));
        match self.run(&command, self.timeouts.quick) {
            Ok(o) if o.is_ok() => Status::Ok,
            Ok(o) if o.is_timed_out() => Status::timed_out(o.describe_failure()),
            Ok(o) => Status::retriable(o.describe_failure()),
            Err(e) => Status::fatal(e.to_string()),
        }
    }

    /// The remote scan always computes the youngest time; `stop_when_younger_than`
    /// is not used.
    fn last_changed(&self, item: &StoreItem, _stop_when_younger_than: SystemTime) -> Result<DateStatus, StoreError> {
        let find = match self.find_executable()? {
            FindDiscovery::Found(find) => find,
            FindDiscovery::Undetermined(failure) => return Ok(DateStatus::Failed(failure)),
        };
        let command = format!("{find} {} -printf \"%T@\\n\" | sort -n -r | head -1", self.item_path(item));
        let outcome = self.run(&command, self.timeouts.long)?;
        if outcome.is_timed_out() {
            return Ok(DateStatus::timed_out(outcome.describe_failure()));
        }
        if !outcome.is_ok() {
            return Ok(DateStatus::retriable(outcome.describe_failure()));
        }
        let Some(line) = outcome.stdout().iter().find(|l| !l.trim().is_empty()) else {
            return Ok(DateStatus::retriable(format!(
                "no modification time found for '{}' on {}",
                item,
                self.executor.target()
            )));
        };
        parse_find_timestamp(line).map(DateStatus::Ok).map_err(|reason| {
            StoreError::Environment(format!(
                "unusable output of '{}' on {}: {reason}",
                outcome.command_line_string(),
                self.executor.target()
            ))
        })
    }

    fn try_check_directory_fully_accessible(&self, timeout: Duration) -> Option<String> {
        let p = Self::quoted(&self.root);
        let command = format!("if [ -d {p} -a -w {p} -a -r {p} -a -x {p} ]; then exit 0; else echo false; fi");
        match self.run(&command, timeout) {
            Ok(o) if o.is_ok() && o.stdout().iter().all(|l| l.trim().is_empty()) => {}
            Ok(o) if o.is_ok() => {
                return Some(format!(
                    "Directory '{}' is not a readable, writable and searchable directory",
                    self.descriptor.root()
                ));
            }
            Ok(o) => return Some(o.describe_failure()),
            Err(e) => return Some(e.to_string()),
        }
        match self.find_executable() {
            Ok(FindDiscovery::Found(_)) => None,
            Ok(FindDiscovery::Undetermined(failure)) => Some(failure.to_string()),
            Err(e) => Some(e.to_string()),
        }
    }

    fn try_list_sort_by_last_modified(&self) -> Option<Vec<StoreItem>> {
        let command = format!("ls -1 -t -r {}", Self::quoted(&self.root));
        match self.run(&command, self.timeouts.long) {
            Ok(o) if o.is_ok() => Some(
                o.stdout()
                    .iter()
                    .map(|l| l.trim_end())
                    .filter(|l| !l.is_empty())
                    .filter_map(|l| StoreItem::try_new(l).ok())
                    .collect(),
            ),
            Ok(_) => None,
            Err(e) => {
                warn!(store = %self.descriptor, error = %e, "Remote listing failed");
                None
            }
        }
    }

    fn highwater_mark_watcher(&self) -> &HighwaterMarkWatcher {
        &self.watcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highwater::{FreeSpaceProvider, HighwaterMark};

    type Script = dyn Fn(&str) -> Reply + Send + Sync;

    /// Exit code plus stdout, or a timeout.
    enum Reply {
        Done(i32, &'static str),
        Hung,
    }

    struct Scripted {
        calls: Mutex<Vec<String>>,
        script: Box<Script>,
    }

    impl CommandExecutor for Scripted {
        fn execute(&self, command: &str, _timeout: Duration) -> Result<ProcessOutcome, StoreError> {
            self.calls.lock().unwrap().push(command.to_string());
            let argv = vec![command.to_string()];
            Ok(match (self.script)(command) {
                Reply::Done(code, out) => {
                    ProcessOutcome::exited(argv, code, out.lines().map(str::to_string).collect())
                }
                Reply::Hung => ProcessOutcome::new(argv, Completion::TimedOut, vec![], vec![]),
            })
        }

        fn target(&self) -> &str {
            "sprint"
        }
    }

    struct NoSpace;

    impl FreeSpaceProvider for NoSpace {
        fn free_space_kb(&self, _path: &Path) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    fn store(script: impl Fn(&str) -> Reply + Send + Sync + 'static) -> (RemoteFileStore, Arc<Scripted>) {
        let exec = Arc::new(Scripted { calls: Mutex::new(Vec::new()), script: Box::new(script) });
        let watcher = HighwaterMarkWatcher::new(HighwaterMark::disabled(), "/data/out", Arc::new(NoSpace));
        let s = RemoteFileStore::new("/data/out", "outgoing", exec.clone(), RemoteTimeouts::default(), watcher);
        (s, exec)
    }

    #[test]
    fn descriptor_names_host() {
        let (s, _) = store(|_| Reply::Done(0, ""));
        assert_eq!(s.descriptor().root().to_string(), "sprint:/data/out");
        assert!(s.is_remote());
    }

    #[test]
    fn exists_needs_zero_exit_and_no_output() {
        let (s, _) = store(|_| Reply::Done(0, ""));
        assert_eq!(s.exists(&StoreItem::new("a.txt")), BooleanStatus::Value(true));
        let (s, _) = store(|_| Reply::Done(0, "false\n"));
        assert_eq!(s.exists(&StoreItem::new("a.txt")), BooleanStatus::Value(false));
        let (s, _) = store(|_| Reply::Done(1, ""));
        assert_eq!(s.exists(&StoreItem::new("a.txt")), BooleanStatus::Value(false));
    }

    #[test]
    fn exists_timeout_is_retriable() {
        let (s, _) = store(|_| Reply::Hung);
        assert!(s.exists(&StoreItem::new("a.txt")).failure().unwrap().is_retriable());
    }

    #[test]
    fn delete_failure_is_retriable_and_names_command() {
        let (s, exec) = store(|_| Reply::Done(1, ""));
        let st = s.delete(&StoreItem::new("a b.txt"));
        assert_eq!(st.flag(), Some(StatusFlag::RetriableError));
        assert!(st.failure().unwrap().message().contains("exit code 1"));
        assert_eq!(exec.calls.lock().unwrap()[0], "rm -fr '/data/out/a b.txt'");
    }

    #[test]
    fn last_changed_parses_seconds_to_millis() {
        let (s, exec) = store(|cmd| {
            if cmd.contains("-maxdepth 0") { Reply::Done(0, "") } else { Reply::Done(0, "1700000000.1234567890\n") }
        });
        let st = s.last_changed(&StoreItem::new("ds"), SystemTime::now()).unwrap();
        let millis = st.result().unwrap().duration_since(UNIX_EPOCH).unwrap().as_millis();
        assert_eq!(millis, 1_700_000_000_123);
        let calls = exec.calls.lock().unwrap();
        assert!(calls[1].starts_with("gfind /data/out/ds -printf"));
    }

    #[test]
    fn find_discovery_is_cached() {
        let (s, exec) = store(|cmd| {
            if cmd.starts_with("gfind") { Reply::Done(127, "") } else { Reply::Done(0, "") }
        });
        assert_eq!(s.find_executable().unwrap(), FindDiscovery::Found("find".into()));
        assert_eq!(s.find_executable().unwrap(), FindDiscovery::Found("find".into()));
        assert_eq!(exec.calls.lock().unwrap().len(), 2);
    }

    #[test]
    fn configured_find_is_the_only_candidate() {
        let (s, exec) = store(|_| Reply::Done(127, ""));
        let s = s.with_find_executable(Some("/opt/gnu/bin/find".into()));
        assert!(matches!(s.find_executable(), Err(StoreError::Environment(_))));
        let calls = exec.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("/opt/gnu/bin/find "));
    }

    #[test]
    fn garbage_timestamp_is_environment_failure() {
        let (s, _) = store(|cmd| {
            if cmd.contains("-maxdepth 0") { Reply::Done(0, "") } else { Reply::Done(0, "soon\n") }
        });
        let err = s.last_changed(&StoreItem::new("ds"), SystemTime::now()).unwrap_err();
        assert!(err.is_environment_failure());
    }

    #[test]
    fn listing_keeps_remote_order_and_fails_soft() {
        let (s, _) = store(|_| Reply::Done(0, "old\nmid\n\nnew\n"));
        let names: Vec<_> = s.try_list_sort_by_last_modified().unwrap().iter().map(|i| i.to_string()).collect();
        assert_eq!(names, ["old", "mid", "new"]);
        let (s, _) = store(|_| Reply::Done(2, ""));
        assert!(s.try_list_sort_by_last_modified().is_none());
    }

    #[test]
    fn accessibility_requires_directory_and_find() {
        let (s, _) = store(|cmd| {
            if cmd.starts_with("if [ -d") { Reply::Done(0, "") } else { Reply::Done(1, "") }
        });
        let msg = s.try_check_directory_fully_accessible(Duration::from_secs(1)).unwrap();
        assert!(msg.contains("no working find"));
        let (s, _) = store(|_| Reply::Done(0, "false"));
        assert!(s.try_check_directory_fully_accessible(Duration::from_secs(1)).is_some());
        let (s, _) = store(|_| Reply::Done(0, ""));
        assert!(s.try_check_directory_fully_accessible(Duration::from_secs(1)).is_none());
    }

    #[test]
    fn find_check_does_not_depend_on_store_root() {
        let (s, exec) = store(|_| Reply::Done(0, ""));
        s.find_executable().unwrap();
        assert_eq!(exec.calls.lock().unwrap()[0], "gfind / -maxdepth 0 -printf \"\"");
    }

    #[test]
    fn hung_find_check_is_a_timeout_and_not_cached() {
        let (s, exec) = store(|cmd| if cmd.starts_with("gfind") { Reply::Hung } else { Reply::Done(1, "") });
        let found = s.find_executable().unwrap();
        assert!(matches!(&found, FindDiscovery::Undetermined(f) if f.flag() == StatusFlag::TimedOut), "{found:?}");
        s.find_executable().unwrap();
        assert_eq!(exec.calls.lock().unwrap().len(), 4);
    }

    #[test]
    fn ssh_transport_failure_is_retriable() {
        let (s, _) = store(|_| Reply::Done(255, ""));
        let st = s.last_changed(&StoreItem::new("ds"), SystemTime::now()).unwrap();
        assert_eq!(st.failure().unwrap().flag(), StatusFlag::RetriableError);
    }
}
