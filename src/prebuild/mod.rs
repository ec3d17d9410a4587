//! The content-addressed prebuild cache (§4.3).
//!
//! Entries live at `_prebuild/<stem>.<hash>.<suffix>` inside a project's
//! `build_output` directory. They are immutable once written: a lookup hit
//! is only ever read or copied, never mutated in place. The directory is
//! shared across workers and across concurrent runs of different users
//! (§5), so every write goes through a temp-file-plus-rename so that a
//! concurrent reader never observes a partially-written entry.

pub mod housekeeper;

use crate::error::{Error, Result};
use crate::fingerprint::to_hex;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

/// `STEM '.' HEX-HASH '.' SUFFIX` (§6, normative).
static RE_PREBUILD_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?P<stem>.+)\.(?P<hash>[0-9a-f]+)\.(?P<suffix>[A-Za-z0-9]+)$").unwrap());

/// The parsed `(stem, hash, suffix)` tuple that is the sole index into the
/// cache — spec.md: "filenames are the sole index".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PrebuildKey {
    pub stem: String,
    pub hash: String,
    pub suffix: String,
}

impl PrebuildKey {
    pub fn new(stem: impl Into<String>, hash: u64, suffix: impl Into<String>) -> Self {
        Self { stem: stem.into(), hash: to_hex(hash), suffix: suffix.into() }
    }

    pub fn filename(&self) -> String {
        format!("{}.{}.{}", self.stem, self.hash, self.suffix)
    }

    /// Parses a filename against the normative grammar; used by the
    /// housekeeper sweep and by tests asserting testable property 6.
    pub fn parse(filename: &str) -> Option<Self> {
        let cap = RE_PREBUILD_NAME.captures(filename)?;
        Some(Self {
            stem: cap["stem"].to_string(),
            hash: cap["hash"].to_string(),
            suffix: cap["suffix"].to_string(),
        })
    }
}

/// The cache directory handle.
#[derive(Clone, Debug)]
pub struct PrebuildCache {
    dir: PathBuf,
    /// Keys `recover`ed or freshly `store`d during this run, consulted by
    /// the default housekeeping sweep (§4.10).
    accessed: std::sync::Arc<std::sync::Mutex<std::collections::BTreeSet<PrebuildKey>>>,
}

impl PrebuildCache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self { dir, accessed: Default::default() })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &PrebuildKey) -> PathBuf {
        self.dir.join(key.filename())
    }

    fn mark_accessed(&self, key: &PrebuildKey) {
        self.accessed.lock().unwrap().insert(key.clone());
    }

    /// Existence check for a specific variant.
    pub fn lookup(&self, key: &PrebuildKey) -> Option<PathBuf> {
        let path = self.path_for(key);
        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    /// Copies an already-produced file into the cache under the canonical
    /// name, atomically: write to a temp sibling, then rename into place,
    /// so a concurrent reader never sees a partial file and the last writer
    /// among concurrent builds targeting the same entry wins cleanly.
    pub fn store(&self, source_path: &Path, key: &PrebuildKey) -> Result<PathBuf> {
        let dest = self.path_for(key);
        let tmp = self.dir.join(format!(".{}.tmp-{}", key.filename(), std::process::id()));
        std::fs::copy(source_path, &tmp).map_err(|e| Error::io(source_path, e))?;
        std::fs::rename(&tmp, &dest).map_err(|e| Error::io(&dest, e))?;
        self.mark_accessed(key);
        Ok(dest)
    }

    /// Copies a cached file out to a working path.
    pub fn recover(&self, key: &PrebuildKey, dest: &Path) -> Result<()> {
        let src = self.path_for(key);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
        }
        std::fs::copy(&src, dest).map_err(|e| Error::io(&src, e))?;
        self.mark_accessed(key);
        Ok(())
    }

    /// Every key accessed (stored or recovered) so far this run.
    pub fn accessed_keys(&self) -> std::collections::BTreeSet<PrebuildKey> {
        self.accessed.lock().unwrap().clone()
    }

    /// Deletes every entry whose key is not in `keep_set`. Used directly by
    /// the default housekeeping policy; `older_than`-based sweeps use
    /// [`housekeeper::sweep_older_than`] instead.
    pub fn sweep(&self, keep_set: &std::collections::BTreeSet<PrebuildKey>) -> Result<usize> {
        let mut removed = 0;
        for entry in std::fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let Some(key) = PrebuildKey::parse(name) else { continue };
            if !keep_set.contains(&key) {
                std::fs::remove_file(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}
