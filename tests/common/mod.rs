//! Shared fixtures: a scripted command executor and store builders.
#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use datamover_store::highwater::{FreeSpaceProvider, HighwaterMark, HighwaterMarkWatcher};
use datamover_store::process::{CommandExecutor, Completion, ProcessOutcome};
use datamover_store::store::{LocalFileStore, RemoteFileStore, RemoteTimeouts};
use datamover_store::StoreError;

/// Canned answer for a command.
#[derive(Debug, Clone)]
pub enum Reply {
    Exit(i32, &'static str),
    Hang,
}

/// Executor that answers from a rule list (first substring match wins) and records every command.
pub struct ScriptedExecutor {
    host: String,
    rules: Vec<(&'static str, Reply)>,
    fallback: Reply,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new(host: &str, rules: Vec<(&'static str, Reply)>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self { host: host.to_string(), rules, fallback, calls: Mutex::new(Vec::new()) })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command: &str, _timeout: Duration) -> Result<ProcessOutcome, StoreError> {
        self.calls.lock().unwrap().push(command.to_string());
        let reply = self
            .rules
            .iter()
            .find(|(pat, _)| command.contains(pat))
            .map(|(_, r)| r.clone())
            .unwrap_or_else(|| self.fallback.clone());
        let argv = vec!["ssh".to_string(), self.host.clone(), command.to_string()];
        Ok(match reply {
            Reply::Exit(code, out) => ProcessOutcome::exited(argv, code, out.lines().map(str::to_string).collect()),
            Reply::Hang => ProcessOutcome::new(argv, Completion::TimedOut, vec![], vec![]),
        })
    }

    fn target(&self) -> &str {
        &self.host
    }
}

pub struct FixedSpace(pub u64);

impl FreeSpaceProvider for FixedSpace {
    fn free_space_kb(&self, _path: &Path) -> Result<u64, StoreError> {
        Ok(self.0)
    }
}

pub fn unwatched(root: &Path) -> HighwaterMarkWatcher {
    HighwaterMarkWatcher::new(HighwaterMark::disabled(), root, Arc::new(FixedSpace(1 << 30)))
}

pub fn local_store(root: &Path) -> LocalFileStore {
    LocalFileStore::new(root, "local test store", unwatched(root))
}

pub fn remote_store(root: &str, exec: Arc<ScriptedExecutor>) -> RemoteFileStore {
    RemoteFileStore::new(root, "remote test store", exec, RemoteTimeouts::default(), unwatched(Path::new(root)))
}
