//! I/O error helpers.
//!
//! Enrich io::Error with the operation, the path and an errno-specific hint so
//! status messages and logs tell the operator what to look at.
//!
//! Usage:
//!   // in functions returning anyhow::Result<_>
//!   fs::create_dir_all(dir).map_err(io_error_with_help("create dir", dir))?;
//!
//!   // when building a Status message
//!   Status::retriable(describe_io_error("delete", path, &e))

use anyhow::anyhow;
use std::io;
use std::path::Path;

/// Format "<op> '<path>': <error>" plus a hint and the raw OS code when known.
pub fn describe_io_error(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);

    if let Some(code) = e.raw_os_error() {
        #[cfg(unix)]
        {
            let hint = match code {
                libc::EACCES | libc::EPERM => Some("permission denied; check ownership and mode bits"),
                libc::EXDEV => Some("cross-filesystem; rename not possible"),
                libc::EBUSY | libc::ETXTBSY => Some("resource busy; another process holds it"),
                libc::ENOENT => Some("path not found"),
                libc::EEXIST | libc::ENOTEMPTY => Some("target already exists"),
                libc::ENOSPC => Some("insufficient space on device"),
                libc::EROFS => Some("read-only filesystem"),
                libc::ESTALE => Some("stale network file handle; the mount may need attention"),
                libc::EIO => Some("I/O error; the device or network share may be failing"),
                _ => None,
            };
            if let Some(h) = hint {
                msg.push_str(" (");
                msg.push_str(h);
                msg.push(')');
            }
        }
        msg.push_str(&format!(" [os code: {code}]"));
    } else {
        match e.kind() {
            io::ErrorKind::PermissionDenied => msg.push_str(" (permission denied)"),
            io::ErrorKind::NotFound => msg.push_str(" (path not found)"),
            io::ErrorKind::AlreadyExists => msg.push_str(" (target already exists)"),
            io::ErrorKind::TimedOut => msg.push_str(" (timed out)"),
            _ => {}
        }
    }

    msg
}

/// Adapter for anyhow::Result code, for use with `.map_err(...)`.
pub fn io_error_with_help<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| anyhow!(describe_io_error(op, path, &e))
}

/// Adapter for io::Result code; keeps the original ErrorKind.
pub fn io_error_with_help_io<'a>(
    op: &'a str,
    path: &'a Path,
) -> impl FnOnce(io::Error) -> io::Error + 'a {
    move |e: io::Error| io::Error::new(e.kind(), describe_io_error(op, path, &e))
}

/// EXDEV detection; std has no stable ErrorKind for it.
pub(crate) fn is_cross_device(e: &io::Error) -> bool {
    #[cfg(unix)]
    {
        e.raw_os_error() == Some(libc::EXDEV)
    }
    #[cfg(not(unix))]
    {
        // ERROR_NOT_SAME_DEVICE
        e.raw_os_error() == Some(17)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notfound_kind_hint_includes_path() {
        let p = Path::new("/nonexistent/path");
        let msg = describe_io_error("open", p, &io::Error::from(io::ErrorKind::NotFound));
        assert!(msg.contains("open"));
        assert!(msg.contains("/nonexistent/path"));
        assert!(msg.contains("path not found"));
    }

    #[cfg(unix)]
    #[test]
    fn estale_hint_mentions_mount() {
        let msg = describe_io_error("stat", Path::new("/mnt/x"), &io::Error::from_raw_os_error(libc::ESTALE));
        assert!(msg.contains("mount"), "msg was: {msg}");
        assert!(msg.contains("os code"));
    }

    #[test]
    fn io_adapter_preserves_kind() {
        let p = Path::new("/tmp/test.txt");
        let wrapped = io_error_with_help_io("create", p)(io::Error::from(io::ErrorKind::AlreadyExists));
        assert_eq!(wrapped.kind(), io::ErrorKind::AlreadyExists);
        assert!(wrapped.to_string().contains("already exists"));
    }
}
