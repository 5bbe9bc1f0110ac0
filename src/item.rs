//! Store items and host-aware locations.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use crate::errors::StoreError;

/// Relative path of an entry inside a store's root. Never absolute, never escapes the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreItem(String);

impl StoreItem {
    /// Create an item from a trusted relative name.
    ///
    /// # Panics
    /// Panics if `name` is empty, absolute or contains `..`; those are programming errors.
    pub fn new(name: impl Into<String>) -> Self {
        match Self::try_new(name) {
            Ok(item) => item,
            Err(e) => panic!("{e}"),
        }
    }

    /// Create an item from untrusted input (CLI, remote listings).
    pub fn try_new(name: impl Into<String>) -> Result<Self, StoreError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(StoreError::InvalidItem { item: name, reason: "empty name" });
        }
        let p = Path::new(&name);
        if p.is_absolute() || name.starts_with('/') {
            return Err(StoreError::InvalidItem { item: name, reason: "absolute path" });
        }
        if p.components().any(|c| matches!(c, Component::ParentDir)) {
            return Err(StoreError::InvalidItem { item: name, reason: "escapes the store root" });
        }
        Ok(Self(name))
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoreItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A path on the local machine or on a named remote host.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAwarePath {
    host: Option<String>,
    path: PathBuf,
}

impl HostAwarePath {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self { host: None, path: path.into() }
    }

    pub fn remote(host: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self { host: Some(host.into()), path: path.into() }
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_remote(&self) -> bool {
        self.host.is_some()
    }

    /// Same host, path extended by `item`.
    pub fn join(&self, item: &StoreItem) -> Self {
        Self { host: self.host.clone(), path: self.path.join(item.name()) }
    }

    /// Directory that receives `item` when it is copied into this location.
    pub fn parent_dir_for(&self, item: &StoreItem) -> Self {
        match Path::new(item.name()).parent() {
            Some(rel) if !rel.as_os_str().is_empty() => {
                Self { host: self.host.clone(), path: self.path.join(rel) }
            }
            _ => self.clone(),
        }
    }

    /// Parse `[HOST:]DIR[>KB]` into a location and an optional high-water mark in kilobytes.
    ///
    /// A single leading drive-style letter (`C:`) is not treated as a host.
    pub fn parse_with_highwater_mark(spec: &str) -> Result<(Self, Option<u64>), StoreError> {
        let spec = spec.trim();
        let (target, mark) = match spec.rsplit_once('>') {
            Some((t, kb)) => {
                let kb = kb.trim().parse::<u64>().map_err(|_| {
                    StoreError::Configuration(format!(
                        "high-water mark in '{spec}' must be a non-negative number of kilobytes"
                    ))
                })?;
                (t.trim(), Some(kb))
            }
            None => (spec, None),
        };
        if target.is_empty() {
            return Err(StoreError::Configuration(format!("empty target in '{spec}'")));
        }
        let location = match target.split_once(':') {
            Some((host, path)) if host.len() > 1 && !host.contains('/') => {
                if path.is_empty() {
                    return Err(StoreError::Configuration(format!(
                        "remote target '{spec}' has no directory"
                    )));
                }
                Self::remote(host, path)
            }
            _ => Self::local(target),
        };
        Ok((location, mark))
    }
}

impl fmt::Display for HostAwarePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.host {
            Some(h) => write!(f, "{}:{}", h, self.path.display()),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_rejects_escapes() {
        assert!(StoreItem::try_new("../etc").is_err());
        assert!(StoreItem::try_new("/abs").is_err());
        assert!(StoreItem::try_new("").is_err());
        assert_eq!(StoreItem::new("a/b.txt").name(), "a/b.txt");
    }

    #[test]
    #[should_panic(expected = "escapes the store root")]
    fn item_new_panics_on_programming_error() {
        let _ = StoreItem::new("a/../../b");
    }

    #[test]
    fn parse_remote_with_mark() {
        let (loc, mark) = HostAwarePath::parse_with_highwater_mark("sprint:/data/out>1024").unwrap();
        assert_eq!(loc.host(), Some("sprint"));
        assert_eq!(loc.path(), Path::new("/data/out"));
        assert_eq!(mark, Some(1024));
        assert_eq!(loc.to_string(), "sprint:/data/out");
    }

    #[test]
    fn parse_local_without_mark() {
        let (loc, mark) = HostAwarePath::parse_with_highwater_mark("/data/buffer").unwrap();
        assert!(!loc.is_remote());
        assert_eq!(mark, None);
    }

    #[test]
    fn parse_rejects_bad_mark() {
        assert!(HostAwarePath::parse_with_highwater_mark("/data>lots").is_err());
    }
}
