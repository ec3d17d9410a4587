//! Source discovery / copy-in (§2 "Source Discovery / Copy-in").
//!
//! Populates the initial file collections under the build-output root.
//! Remote source-acquisition back-ends (filesystem copy, version-control
//! export) are out of scope per spec.md §1 — this step assumes `source/`
//! is already populated and only classifies and records what's there.

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::store::{ArtefactStore, CollectionName};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case(ext)).unwrap_or(false)
}

/// Walks `config.paths.source()` and classifies every file by extension
/// into `INITIAL_SOURCE` plus the language-specific build-file collections.
/// `.F90`/`.f90` both land in `FORTRAN_BUILD_FILES` (the preprocessor later
/// replaces uppercase entries with their lowercase preprocessed output);
/// `.c` in `C_BUILD_FILES`; `.x90` in `X90_BUILD_FILES`.
pub fn discover(config: &BuildConfig, store: &mut ArtefactStore) -> Result<()> {
    let root = config.paths.source();
    let mut all = Vec::new();
    let mut fortran = Vec::new();
    let mut c = Vec::new();
    let mut x90 = Vec::new();

    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            Error::io(e.path().unwrap_or(&root).to_path_buf(), e.into_io_error().unwrap_or_else(
                || std::io::Error::new(std::io::ErrorKind::Other, "walk failure"),
            ))
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path().to_path_buf();
        all.push(path.clone());

        if has_extension(&path, "f90") || has_extension(&path, "F90") {
            fortran.push(path);
        } else if has_extension(&path, "c") {
            c.push(path);
        } else if has_extension(&path, "x90") {
            x90.push(path);
        }
    }

    store.set_paths(CollectionName::InitialSource, all);
    store.set_paths(CollectionName::FortranBuildFiles, fortran);
    store.set_paths(CollectionName::CBuildFiles, c);
    store.set_paths(CollectionName::X90BuildFiles, x90);
    Ok(())
}

/// Copies a file into `build_output`, preserving its relative path under
/// `source/`, returning the destination path. Used by the preprocessor
/// driver for the "lowercase `.f90` not already under `build_output` is
/// copied unchanged" rule (§4.5).
pub fn copy_into_build_output(config: &BuildConfig, path: &Path) -> Result<PathBuf> {
    let rel = path.strip_prefix(config.paths.source()).unwrap_or(path);
    let dest = config.paths.build_output().join(rel);
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    std::fs::copy(path, &dest).map_err(|e| Error::io(path, e))?;
    Ok(dest)
}
