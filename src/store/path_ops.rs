//! Path-level collaborators the stores delegate to: removal, moves and copies.

use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::helpers::{describe_io_error, is_cross_device};
use crate::item::HostAwarePath;
use crate::status::Status;

/// Removes a file or directory tree.
pub trait PathRemover: Send + Sync {
    fn remove(&self, path: &Path) -> io::Result<()>;
}

/// Moves a path to a new location on the local machine.
pub trait PathMover: Send + Sync {
    fn move_path(&self, src: &Path, dest: &Path) -> io::Result<()>;
}

/// Copies `source` into the directory `destination_dir`, keeping its name.
pub trait PathCopier: Send + Sync {
    fn copy(&self, source: &HostAwarePath, destination_dir: &HostAwarePath) -> Status;
}

/// Recursive remover; a path that is already gone counts as removed.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPathRemover;

impl PathRemover for FsPathRemover {
    fn remove(&self, path: &Path) -> io::Result<()> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let res = if meta.is_dir() { fs::remove_dir_all(path) } else { fs::remove_file(path) };
        match res {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

/// Rename, falling back to copy+remove when source and destination are on different filesystems.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPathMover;

impl PathMover for FsPathMover {
    fn move_path(&self, src: &Path, dest: &Path) -> io::Result<()> {
        match fs::rename(src, dest) {
            Ok(()) => {
                debug!(src = %src.display(), dest = %dest.display(), "Renamed atomically");
                Ok(())
            }
            Err(e) if is_cross_device(&e) => {
                warn!(src = %src.display(), dest = %dest.display(), "Cross-filesystem move; copying instead");
                copy_tree(src, dest)?;
                FsPathRemover.remove(src)
            }
            Err(e) => Err(e),
        }
    }
}

/// Local recursive copy that preserves modification times.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsPathCopier;

impl PathCopier for FsPathCopier {
    fn copy(&self, source: &HostAwarePath, destination_dir: &HostAwarePath) -> Status {
        if source.is_remote() || destination_dir.is_remote() {
            return Status::fatal(format!(
                "local copier cannot copy '{source}' -> '{destination_dir}'; use rsync for remote locations"
            ));
        }
        let src = source.path();
        let Some(name) = src.file_name() else {
            return Status::fatal(format!("source '{}' has no file name", src.display()));
        };
        let dest = destination_dir.path().join(name);
        match copy_tree(src, &dest) {
            Ok(()) => Status::Ok,
            Err(e) => Status::retriable(describe_io_error("copy", src, &e)),
        }
    }
}

/// Copy a file or a directory tree to `dest`, overwriting existing files.
pub(crate) fn copy_tree(src: &Path, dest: &Path) -> io::Result<()> {
    let meta = fs::symlink_metadata(src)?;
    if !meta.is_dir() {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dest)?;
        return preserve_mtime(&meta, dest);
    }

    for entry in WalkDir::new(src) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| io::Error::other(e.to_string()))?;
        let target = dest.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            preserve_mtime(&entry.metadata()?, &target)?;
        }
    }
    // Directory mtimes last; copying children bumps them.
    for entry in WalkDir::new(src).contents_first(true) {
        let entry = entry?;
        if entry.file_type().is_dir() {
            let rel = entry
                .path()
                .strip_prefix(src)
                .map_err(|e| io::Error::other(e.to_string()))?;
            preserve_mtime(&entry.metadata()?, &dest.join(rel))?;
        }
    }
    Ok(())
}

fn preserve_mtime(meta: &fs::Metadata, dest: &Path) -> io::Result<()> {
    let mtime = filetime::FileTime::from_last_modification_time(meta);
    filetime::set_file_mtime(dest, mtime)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusFlag;
    use tempfile::tempdir;

    #[test]
    fn remover_treats_missing_path_as_removed() {
        let td = tempdir().unwrap();
        FsPathRemover.remove(&td.path().join("gone")).unwrap();
    }

    #[test]
    fn remover_removes_trees() {
        let td = tempdir().unwrap();
        let d = td.path().join("d");
        fs::create_dir_all(d.join("sub")).unwrap();
        fs::write(d.join("sub/f"), b"x").unwrap();
        FsPathRemover.remove(&d).unwrap();
        assert!(!d.exists());
    }

    #[test]
    fn copier_copies_tree_and_keeps_mtime() {
        let td = tempdir().unwrap();
        let src = td.path().join("ds");
        fs::create_dir_all(src.join("sub")).unwrap();
        let f = src.join("sub/data.bin");
        fs::write(&f, b"payload").unwrap();
        let old = filetime::FileTime::from_unix_time(1_000_000_000, 0);
        filetime::set_file_mtime(&f, old).unwrap();

        let dest_dir = td.path().join("out");
        fs::create_dir_all(&dest_dir).unwrap();
        let st = FsPathCopier.copy(&HostAwarePath::local(&src), &HostAwarePath::local(&dest_dir));
        assert!(st.is_ok(), "{st}");

        let copied = dest_dir.join("ds/sub/data.bin");
        assert_eq!(fs::read(&copied).unwrap(), b"payload");
        let mt = filetime::FileTime::from_last_modification_time(&fs::metadata(&copied).unwrap());
        assert_eq!(mt.unix_seconds(), 1_000_000_000);
    }

    #[test]
    fn copier_refuses_remote_locations() {
        let st = FsPathCopier.copy(&HostAwarePath::local("/a"), &HostAwarePath::remote("h", "/b"));
        assert_eq!(st.flag(), Some(StatusFlag::Error));
    }

    #[test]
    fn mover_renames_within_filesystem() {
        let td = tempdir().unwrap();
        let src = td.path().join("a.txt");
        fs::write(&src, b"a").unwrap();
        let dest = td.path().join("b.txt");
        FsPathMover.move_path(&src, &dest).unwrap();
        assert!(!src.exists());
        assert_eq!(fs::read(&dest).unwrap(), b"a");
    }
}
