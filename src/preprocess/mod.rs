//! The preprocessor driver (§4.5).
//!
//! Per file: compute a prebuild key from content + tool identity + flags,
//! serve from the prebuild cache on a hit, otherwise invoke the external
//! tool and store the result. The driver never edits the tool command
//! beyond enforcing the flags §6 names (`-P` for `FPP`).

pub mod pragma;

use crate::config::{BuildConfig, PathFlags};
use crate::discovery::copy_into_build_output;
use crate::error::Result;
use crate::fingerprint::{combine, file_fingerprint, str_fingerprint};
use crate::prebuild::{PrebuildCache, PrebuildKey};
use crate::runtime::run_mp;
use crate::store::{ArtefactStore, CollectionName};
use crate::tool::Preprocess;
use std::path::{Path, PathBuf};

/// Flags that apply to `path`: common flags plus every `path_flags` entry
/// whose glob matches.
fn flags_for(common: &[String], path_flags: &[PathFlags], path: &Path) -> Vec<String> {
    let mut flags = common.to_vec();
    for pf in path_flags {
        if glob::Pattern::new(&pf.glob).map(|p| p.matches_path(path)).unwrap_or(false) {
            flags.extend(pf.flags.iter().cloned());
        }
    }
    flags
}

fn flags_fingerprint(flags: &[String]) -> u64 {
    str_fingerprint(&flags.join("\0"))
}

fn is_uppercase_f90(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()).map(|e| e == "F90").unwrap_or(false)
}

fn stem_of(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string()
}

/// Runs one file through the prebuild-keyed skip/invoke/store cycle,
/// producing `build_output/<stem>.<out_ext>`.
fn preprocess_one(
    config: &BuildConfig,
    cache: &PrebuildCache,
    tool: &dyn Preprocess,
    input: &Path,
    flags: &[String],
    out_ext: &str,
) -> Result<PathBuf> {
    let content_hash = file_fingerprint(input)?;
    let tool_hash = str_fingerprint(&tool.identity());
    let flags_hash = flags_fingerprint(flags);
    let key_hash = combine(&[content_hash, tool_hash, flags_hash]);

    let stem = stem_of(input);
    let key = PrebuildKey::new(stem.as_str(), key_hash, out_ext);
    let dest = config.build_output_path(Path::new(&format!("{stem}.{out_ext}")));

    if cache.lookup(&key).is_some() {
        tracing::trace!(file = %input.display(), "preprocess cache hit");
        cache.recover(&key, &dest)?;
    } else {
        tracing::trace!(file = %input.display(), "preprocess cache miss, invoking tool");
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| crate::error::Error::io(parent, e))?;
        }
        tool.run(input, &dest, flags)?;
        cache.store(&dest, &key)?;
    }
    Ok(dest)
}

/// The Fortran preprocessing path (§4.5): filters uppercase `.F90`,
/// writes lowercase `.f90` under `build_output`, replaces
/// `FORTRAN_BUILD_FILES` with the new paths, and publishes
/// `PREPROCESSED_FORTRAN`. Lowercase `.f90` inputs not already under
/// `build_output` are copied unchanged so every downstream path lives in
/// one place.
pub fn preprocess_fortran(
    config: &BuildConfig,
    store: &mut ArtefactStore,
    cache: &PrebuildCache,
    tool: &dyn Preprocess,
) -> Result<()> {
    let source = CollectionName::resolve_source(&config.preprocessor.io, CollectionName::FortranBuildFiles);
    let output = CollectionName::resolve_output(&config.preprocessor.io, CollectionName::FortranBuildFiles);
    let inputs = store.paths(source)?.to_vec();
    let flags = config.tools.fpp_flags(&config.preprocessor.common_flags);
    let path_flags = config.preprocessor.path_flags.clone();
    let build_output = config.paths.build_output();

    let results = run_mp(inputs, move |input| -> Result<PathBuf> {
        if is_uppercase_f90(&input) {
            let file_flags = flags_for(&flags, &path_flags, &input);
            preprocess_one(config, cache, tool, &input, &file_flags, "f90")
        } else if input.starts_with(&build_output) {
            Ok(input)
        } else {
            copy_into_build_output(config, &input)
        }
    })?;

    let mut outputs = results;
    outputs.sort();
    store.set_paths(output, outputs.clone());
    store.set_paths(CollectionName::PreprocessedFortran, outputs);
    Ok(())
}

/// The C preprocessing path (§4.5): writes preprocessed `.c` to
/// `build_output`, replaces `C_BUILD_FILES`, publishes `PREPROCESSED_C`.
///
/// Unlike [`preprocess_fortran`], flags are passed through raw with no
/// `-P` enforcement: `inject_c_pragmas` depends on the `cpp` line markers
/// `-P` would strip, so this path must leave them in place for the
/// pragma injector to read.
pub fn preprocess_c(
    config: &BuildConfig,
    store: &mut ArtefactStore,
    cache: &PrebuildCache,
    tool: &dyn Preprocess,
) -> Result<()> {
    let source = CollectionName::resolve_source(&config.preprocessor.io, CollectionName::CBuildFiles);
    let output = CollectionName::resolve_output(&config.preprocessor.io, CollectionName::CBuildFiles);
    let inputs = store.paths(source)?.to_vec();
    let flags = config.preprocessor.common_flags.clone();
    let path_flags = config.preprocessor.path_flags.clone();

    let results = run_mp(inputs, move |input| -> Result<PathBuf> {
        let file_flags = flags_for(&flags, &path_flags, &input);
        preprocess_one(config, cache, tool, &input, &file_flags, "c")
    })?;

    let mut outputs = results;
    outputs.sort();
    store.set_paths(output, outputs.clone());
    store.set_paths(CollectionName::PreprocessedC, outputs);
    Ok(())
}

/// The optional C-pragma injector. Runs over the already-preprocessed
/// `PREPROCESSED_C` set (which still carries `cpp` line markers so long as
/// the driver didn't pass `-P`), rewrites them into the sentinel comments
/// [`pragma::SYSTEM_BEGIN`]/[`pragma::SYSTEM_END`], and replaces
/// `C_BUILD_FILES` with the resulting `.prag` paths, publishing
/// `PRAGMAD_C`.
pub fn inject_c_pragmas(_config: &BuildConfig, store: &mut ArtefactStore) -> Result<()> {
    let inputs = store.paths(CollectionName::PreprocessedC)?.to_vec();

    let results = run_mp(inputs, move |input: PathBuf| -> Result<PathBuf> {
        let content =
            std::fs::read_to_string(&input).map_err(|e| crate::error::Error::io(&input, e))?;
        let annotated = pragma::inject(&content);
        let dest = input.with_extension("prag");
        std::fs::write(&dest, &annotated).map_err(|e| crate::error::Error::io(&dest, e))?;
        Ok(dest)
    })?;

    let mut outputs = results;
    outputs.sort();
    store.set_paths(CollectionName::CBuildFiles, outputs.clone());
    store.set_paths(CollectionName::PragmadC, outputs);
    Ok(())
}
