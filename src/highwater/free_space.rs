//! Free space probing through `df -k`.
//!
//! `df` wraps long device names onto their own line, so the "available" value is
//! not reliably on line 2. The parser skips the header and counts whitespace
//! tokens across all following lines until it reaches the 4th logical column.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::errors::StoreError;
use crate::process::{shell_quote, CommandExecutor};

/// Zero-based index of the "Available" column in `df -k` output.
const AVAILABLE_COLUMN: usize = 3;

/// Source of remaining capacity for a path.
pub trait FreeSpaceProvider: Send + Sync {
    /// Free space in kilobytes available to unprivileged users.
    fn free_space_kb(&self, path: &Path) -> Result<u64, StoreError>;
}

/// Extract the available kilobytes from `df -k` output lines (header included).
pub fn parse_df_available_kb(lines: &[String]) -> Result<u64, String> {
    let mut seen = 0usize;
    for line in lines.iter().skip(1) {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if seen + tokens.len() > AVAILABLE_COLUMN {
            let token = tokens[AVAILABLE_COLUMN - seen];
            let value: i64 = token
                .parse()
                .map_err(|_| format!("available column '{token}' is not numeric"))?;
            if value < 0 {
                return Err(format!("available column '{token}' is negative"));
            }
            return Ok(value as u64);
        }
        seen += tokens.len();
    }
    Err(format!(
        "output has fewer than {} data columns: {:?}",
        AVAILABLE_COLUMN + 1,
        lines
    ))
}

/// `FreeSpaceProvider` running `df -k <path>` through a `CommandExecutor`.
pub struct DfFreeSpaceProvider {
    executor: Arc<dyn CommandExecutor>,
    timeout: Duration,
}

impl DfFreeSpaceProvider {
    pub fn new(executor: Arc<dyn CommandExecutor>, timeout: Duration) -> Self {
        Self { executor, timeout }
    }

    fn command(path: &Path) -> String {
        format!("df -k {}", shell_quote(&path.display().to_string()))
    }
}

impl FreeSpaceProvider for DfFreeSpaceProvider {
    fn free_space_kb(&self, path: &Path) -> Result<u64, StoreError> {
        let command = Self::command(path);
        let outcome = self.executor.execute(&command, self.timeout)?;
        if !outcome.is_ok() {
            return Err(StoreError::CommandFailed(outcome.describe_failure()));
        }
        let kb = parse_df_available_kb(outcome.stdout()).map_err(|reason| {
            StoreError::FreeSpaceParse { path: path.to_path_buf(), command: command.clone(), reason }
        })?;
        debug!(target_host = self.executor.target(), path = %path.display(), free_kb = kb, "Free space probed");
        Ok(kb)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_single_data_line() {
        let out = lines(&[
            "Filesystem     1K-blocks     Used Available Use% Mounted on",
            "/dev/sda1      103081248 43640016  54182352  45% /",
        ]);
        assert_eq!(parse_df_available_kb(&out).unwrap(), 54_182_352);
    }

    #[test]
    fn parses_wrapped_device_name() {
        let out = lines(&[
            "Filesystem           1K-blocks      Used Available Use% Mounted on",
            "/dev/mapper/VolGroup00-LogVol00",
            "                      72738944  43676516  25307044  64% /",
        ]);
        assert_eq!(parse_df_available_kb(&out).unwrap(), 25_307_044);
    }

    #[test]
    fn rejects_negative_values() {
        let out = lines(&["Filesystem 1K-blocks Used Available", "x 10 20 -10 200% /"]);
        let err = parse_df_available_kb(&out).unwrap_err();
        assert!(err.contains("negative"));
    }

    #[test]
    fn rejects_non_numeric_values() {
        let out = lines(&["Filesystem 1K-blocks Used Available", "x 10 20 lots 20% /"]);
        assert!(parse_df_available_kb(&out).unwrap_err().contains("not numeric"));
    }

    #[test]
    fn rejects_truncated_output() {
        let out = lines(&["Filesystem 1K-blocks Used Available", "x 10"]);
        assert!(parse_df_available_kb(&out).is_err());
    }

    #[test]
    fn command_quotes_paths_with_spaces() {
        assert_eq!(DfFreeSpaceProvider::command(Path::new("/data/my dir")), "df -k '/data/my dir'");
    }
}
