//! User-facing output for the CLI, colored only when stdout is a TTY.
//! Logs go through tracing; this is for results operators may script against.

use owo_colors::OwoColorize;

use crate::status::{BooleanStatus, DateStatus, Status};

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

fn is_err_tty() -> bool {
    atty::is(atty::Stream::Stderr)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {msg}");
    }
}

pub fn print_warn(msg: &str) {
    if is_err_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {msg}");
    }
}

pub fn print_error(msg: &str) {
    if is_err_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {msg}");
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {msg}");
    }
}

/// Plain line without prefix, e.g. one listed item.
pub fn print_user(msg: &str) {
    println!("{msg}");
}

/// `<label>: <status>`; failures in red or yellow depending on retriability.
pub fn print_status(label: &str, status: &Status) {
    match status.failure() {
        None => print_success(label),
        Some(f) if f.is_retriable() => print_warn(&format!("{label}: {f}")),
        Some(f) => print_error(&format!("{label}: {f}")),
    }
}

pub fn print_boolean(label: &str, status: &BooleanStatus) {
    match status {
        BooleanStatus::Value(v) => print_user(&format!("{label}: {v}")),
        BooleanStatus::Failed(f) => print_error(&format!("{label}: {f}")),
    }
}

pub fn print_date(label: &str, status: &DateStatus) {
    match status {
        DateStatus::Ok(_) => print_user(&format!("{label}: {status}")),
        DateStatus::Failed(f) => print_error(&format!("{label}: {f}")),
    }
}
