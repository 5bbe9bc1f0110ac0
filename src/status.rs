//! Outcome classification shared by every store operation.
//!
//! Operations report expected failures (remote command failed, path missing,
//! timeout) as values instead of errors. A failure always carries a flag that
//! tells the caller whether retrying makes sense, and a message for operator logs.

use std::fmt;
use std::time::SystemTime;

/// Classification of a failed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusFlag {
    /// Transient or environmental; a later retry may succeed.
    RetriableError,
    /// Permanent; retrying the same operation will not help.
    Error,
    /// The operation did not finish within its time budget ("slow", not "broken").
    TimedOut,
}

impl fmt::Display for StatusFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StatusFlag::RetriableError => "RETRIABLE_ERROR",
            StatusFlag::Error => "ERROR",
            StatusFlag::TimedOut => "TIMED_OUT",
        };
        f.write_str(s)
    }
}

/// A failure flag plus a non-empty, human-readable message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    flag: StatusFlag,
    message: String,
}

impl Failure {
    pub fn new(flag: StatusFlag, message: impl Into<String>) -> Self {
        let mut message = message.into();
        debug_assert!(!message.trim().is_empty(), "failure message must not be empty");
        if message.trim().is_empty() {
            message = format!("{flag} without details");
        }
        Self { flag, message }
    }

    pub fn flag(&self) -> StatusFlag {
        self.flag
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self.flag, StatusFlag::RetriableError | StatusFlag::TimedOut)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.flag, self.message)
    }
}

/// Outcome of an operation without a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed(Failure),
}

impl Status {
    pub fn retriable(message: impl Into<String>) -> Self {
        Status::Failed(Failure::new(StatusFlag::RetriableError, message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Status::Failed(Failure::new(StatusFlag::Error, message))
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        Status::Failed(Failure::new(StatusFlag::TimedOut, message))
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok)
    }

    pub fn is_error(&self) -> bool {
        !self.is_ok()
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Status::Ok => None,
            Status::Failed(f) => Some(f),
        }
    }

    pub fn flag(&self) -> Option<StatusFlag> {
        self.failure().map(Failure::flag)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("OK"),
            Status::Failed(failure) => failure.fmt(f),
        }
    }
}

/// Outcome carrying a boolean answer, e.g. an existence check that may itself fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BooleanStatus {
    Value(bool),
    Failed(Failure),
}

impl BooleanStatus {
    pub fn from_bool(value: bool) -> Self {
        BooleanStatus::Value(value)
    }

    pub fn retriable(message: impl Into<String>) -> Self {
        BooleanStatus::Failed(Failure::new(StatusFlag::RetriableError, message))
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        BooleanStatus::Failed(Failure::new(StatusFlag::Error, message))
    }

    /// `true` only for a successful check that answered yes.
    pub fn is_true(&self) -> bool {
        matches!(self, BooleanStatus::Value(true))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, BooleanStatus::Failed(_))
    }

    pub fn value(&self) -> Option<bool> {
        match self {
            BooleanStatus::Value(v) => Some(*v),
            BooleanStatus::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            BooleanStatus::Value(_) => None,
            BooleanStatus::Failed(f) => Some(f),
        }
    }
}

impl fmt::Display for BooleanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BooleanStatus::Value(v) => write!(f, "{v}"),
            BooleanStatus::Failed(failure) => failure.fmt(f),
        }
    }
}

/// Outcome carrying a timestamp, e.g. the most recent modification time of an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateStatus {
    Ok(SystemTime),
    Failed(Failure),
}

impl DateStatus {
    pub fn retriable(message: impl Into<String>) -> Self {
        DateStatus::Failed(Failure::new(StatusFlag::RetriableError, message))
    }

    pub fn timed_out(message: impl Into<String>) -> Self {
        DateStatus::Failed(Failure::new(StatusFlag::TimedOut, message))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, DateStatus::Failed(_))
    }

    pub fn result(&self) -> Option<SystemTime> {
        match self {
            DateStatus::Ok(t) => Some(*t),
            DateStatus::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            DateStatus::Ok(_) => None,
            DateStatus::Failed(f) => Some(f),
        }
    }
}

impl fmt::Display for DateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DateStatus::Ok(t) => {
                let dt: chrono::DateTime<chrono::Local> = (*t).into();
                write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.3f"))
            }
            DateStatus::Failed(failure) => failure.fmt(f),
        }
    }
}
