//! The compile scheduler (§4.8): wave-based parallel Fortran compilation
//! with an optional two-stage (syntax-only/codegen) mode, plus the C
//! single-wave path.

pub mod flags;

use crate::analysis::{AnalysedFile, AnalysedFileData};
use crate::config::{BuildConfig, PathFlags};
use crate::error::{Error, Result};
use crate::fingerprint::{combine, str_fingerprint};
use crate::prebuild::PrebuildCache;
use crate::prebuild::PrebuildKey;
use crate::runtime::run_mp;
use crate::tool::{CCompile, FortranCompile};
use crate::tree::BuildTree;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

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

fn stem_of(path: &Path) -> String {
    path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string()
}

/// Paths a [`Error::ToolFailure`] or [`Error::Aggregate`] of such reports,
/// used to compute which downstream files are `BlockedBy` a failed
/// compile.
fn failed_paths(err: &Error) -> Vec<PathBuf> {
    match err {
        Error::ToolFailure { path, .. } => vec![path.clone()],
        Error::Aggregate(errs) => errs.iter().flat_map(failed_paths).collect(),
        _ => Vec::new(),
    }
}

/// Restricts `remaining`'s dependency sets to intra-tree Fortran module
/// edges only: a file's `module_deps` names resolved through `definers`,
/// kept only when the dependency itself is a Fortran member of this same
/// wave set (externally-satisfied and intrinsic modules are dropped since
/// nothing in this tree needs to wait on them).
fn intra_tree_module_deps(
    members: &[PathBuf],
    files: &BTreeMap<PathBuf, AnalysedFile>,
    definers: &BTreeMap<String, PathBuf>,
) -> BTreeMap<PathBuf, BTreeSet<PathBuf>> {
    let member_set: BTreeSet<&PathBuf> = members.iter().collect();
    let mut remaining = BTreeMap::new();
    for path in members {
        let data = files[path].data();
        let mut deps = BTreeSet::new();
        for name in &data.module_deps {
            if let Some(dep_path) = definers.get(name) {
                if dep_path != path && member_set.contains(dep_path) {
                    deps.insert(dep_path.clone());
                }
            }
        }
        remaining.insert(path.clone(), deps);
    }
    remaining
}

/// Drives one file through the prebuild-keyed skip/invoke/store cycle for
/// a single compile, producing (and caching) both the object and any
/// `.mod` files it defines. When `syntax_only` is set the object is
/// discarded (two-stage pass A) and only `.mod` files are cached.
///
/// `dep_fingerprints` must be each dependency's own *compile fingerprint*
/// (the `u64` this same function returned for it), not its raw content
/// hash — the compile fingerprint is recursive (§4.8): a file's fingerprint
/// folds in the fingerprints of the modules it consumes, so a change three
/// hops down the dependency chain still changes every fingerprint above it.
/// Returns that fingerprint alongside the object path so the caller
/// (`run_waves`) can feed it to whichever file depends on this one.
fn compile_one(
    config: &BuildConfig,
    cache: &PrebuildCache,
    tool: &dyn FortranCompile,
    data: &AnalysedFileData,
    dep_fingerprints: &[u64],
    flags: &[String],
    module_dir: &Path,
    syntax_only: bool,
) -> Result<(Option<PathBuf>, u64)> {
    let mut sorted_deps = dep_fingerprints.to_vec();
    sorted_deps.sort_unstable();

    let tool_hash = str_fingerprint(&tool.identity());
    let version_hash = str_fingerprint(&tool.version());
    let flags_hash = flags_fingerprint(flags);
    let fp = combine(&[data.content_hash, tool_hash, version_hash, flags_hash, combine(&sorted_deps)]);

    let stem = stem_of(&data.path);
    let object_out = module_dir.join(format!("{stem}.o"));
    let obj_key = PrebuildKey::new(stem.as_str(), fp, "o");

    let mod_keys: Vec<(PathBuf, PrebuildKey)> = data
        .module_defs
        .iter()
        .map(|name| (module_dir.join(format!("{name}.mod")), PrebuildKey::new(name.as_str(), fp, "mod")))
        .collect();

    // A syntax-only pass over a file that defines no module has no
    // persistent artefact to skip on — always re-run it.
    let cache_hit = if syntax_only {
        !mod_keys.is_empty() && mod_keys.iter().all(|(_, key)| cache.lookup(key).is_some())
    } else {
        cache.lookup(&obj_key).is_some() && mod_keys.iter().all(|(_, key)| cache.lookup(key).is_some())
    };

    if cache_hit {
        if !syntax_only {
            cache.recover(&obj_key, &object_out)?;
        }
        for (mod_path, key) in &mod_keys {
            cache.recover(key, mod_path)?;
        }
        tracing::trace!(file = %data.path.display(), "compile cache hit");
        return Ok(((!syntax_only).then_some(object_out), fp));
    }

    tracing::trace!(file = %data.path.display(), "compile cache miss, invoking tool");
    tool.compile(&data.path, &object_out, module_dir, flags, syntax_only)?;

    if !syntax_only {
        cache.store(&object_out, &obj_key)?;
    }
    for (mod_path, key) in &mod_keys {
        if mod_path.is_file() {
            cache.store(mod_path, key)?;
        }
    }

    Ok(((!syntax_only).then_some(object_out), fp))
}

/// Runs `members` to completion in dependency-wave order, dispatching each
/// wave via [`run_mp`]. On a wave failure, every not-yet-scheduled file is
/// reported `BlockedBy` the failing path(s) and the whole aggregate is
/// returned — the root is abandoned, no further waves run (§4.8 "Fatal for
/// the root").
fn run_waves(
    config: &BuildConfig,
    cache: &PrebuildCache,
    tool: &dyn FortranCompile,
    files: &BTreeMap<PathBuf, AnalysedFile>,
    remaining: BTreeMap<PathBuf, BTreeSet<PathBuf>>,
    module_dir: &Path,
    common_flags: &[String],
    path_flags: &[PathFlags],
    syntax_only: bool,
) -> Result<Vec<PathBuf>> {
    let mut compiled: BTreeMap<PathBuf, u64> = BTreeMap::new();
    let mut objects = Vec::new();
    let mut pending: Vec<PathBuf> = remaining.keys().cloned().collect();

    while !pending.is_empty() {
        let (ready, not_ready): (Vec<PathBuf>, Vec<PathBuf>) =
            pending.into_iter().partition(|p| remaining[p].iter().all(|d| compiled.contains_key(d)));

        if ready.is_empty() {
            return Err(Error::CompileStalled(not_ready));
        }

        let wave_inputs: Vec<PathBuf> = ready.clone();
        let wave_result = run_mp(wave_inputs, |path| -> Result<(PathBuf, Option<PathBuf>, u64)> {
            let data = files[&path].data();
            // Each dependency's own compile fingerprint (already computed
            // in an earlier wave, per the partition above), not its raw
            // content hash — see `compile_one`'s doc comment.
            let dep_fingerprints: Vec<u64> = remaining[&path].iter().map(|d| compiled[d]).collect();
            let file_flags = flags_for(common_flags, path_flags, &path);
            let (obj, fp) = compile_one(config, cache, tool, data, &dep_fingerprints, &file_flags, module_dir, syntax_only)?;
            Ok((path, obj, fp))
        });

        match wave_result {
            Ok(results) => {
                for (path, obj, fp) in results {
                    if let Some(obj) = obj {
                        objects.push(obj);
                    }
                    compiled.insert(path, fp);
                }
                pending = not_ready;
            }
            Err(err) => {
                let failed = failed_paths(&err);
                let mut errs = match err {
                    Error::Aggregate(e) => e,
                    other => vec![other],
                };
                // everything still pending (including the rest of this
                // wave that failed, and every later wave) is blocked.
                let mut blocked: BTreeSet<PathBuf> = not_ready.into_iter().collect();
                blocked.extend(ready.into_iter().filter(|p| !failed.contains(p)));
                for p in blocked {
                    errs.push(Error::BlockedBy(failed.first().cloned().unwrap_or_else(|| p.clone())));
                }
                return Err(Error::Aggregate(errs));
            }
        }
    }

    Ok(objects)
}

/// Compiles the Fortran members of `tree`, returning their object paths.
/// Two-stage mode (`config.fortran_compile.two_stage_flag`) runs a
/// syntax-only pass A to populate every `.mod` first, then a single-wave
/// pass B for objects.
pub fn compile_fortran_tree(
    config: &BuildConfig,
    tree: &BuildTree,
    files: &BTreeMap<PathBuf, AnalysedFile>,
    definers: &BTreeMap<String, PathBuf>,
    cache: &PrebuildCache,
    tool: &dyn FortranCompile,
) -> Result<Vec<PathBuf>> {
    let module_dir = config.paths.build_output();
    let common_flags = &config.fortran_compile.common_flags;
    let path_flags = &config.fortran_compile.path_flags;

    let mut members: Vec<PathBuf> =
        tree.nodes.keys().filter(|p| matches!(files.get(*p), Some(AnalysedFile::Fortran(_)))).cloned().collect();
    members.sort();

    if members.is_empty() {
        return Ok(Vec::new());
    }

    let remaining = intra_tree_module_deps(&members, files, definers);

    if config.fortran_compile.two_stage_flag {
        run_waves(config, cache, tool, files, remaining.clone(), &module_dir, common_flags, path_flags, true)?;
        // pass B: all modules now exist, single wave.
        let flat: BTreeMap<PathBuf, BTreeSet<PathBuf>> =
            members.iter().map(|p| (p.clone(), BTreeSet::new())).collect();
        run_waves(config, cache, tool, files, flat, &module_dir, common_flags, path_flags, false)
    } else {
        run_waves(config, cache, tool, files, remaining, &module_dir, common_flags, path_flags, false)
    }
}

/// Compiles the C members of `tree` in a single wave (§4.8 "C"). Compile
/// fingerprint: `hash(content_hash || compiler_identity || flags)`, no
/// dependency ordering since object files don't need each other to build.
pub fn compile_c_tree(
    config: &BuildConfig,
    tree: &BuildTree,
    files: &BTreeMap<PathBuf, AnalysedFile>,
    cache: &PrebuildCache,
    tool: &dyn CCompile,
) -> Result<Vec<PathBuf>> {
    let module_dir = config.paths.build_output();
    let common_flags = config.tools.cflags.clone();
    let path_flags: Vec<PathFlags> = Vec::new();

    let mut members: Vec<PathBuf> =
        tree.nodes.keys().filter(|p| matches!(files.get(*p), Some(AnalysedFile::C(_)))).cloned().collect();
    members.sort();

    let tool_hash = str_fingerprint(tool.identity().as_str());

    run_mp(members, move |path| -> Result<PathBuf> {
        let data = files[&path].data();
        let file_flags = flags_for(&common_flags, &path_flags, &path);
        let flags_hash = flags_fingerprint(&file_flags);
        let fp = combine(&[data.content_hash, tool_hash, flags_hash]);

        let stem = stem_of(&path);
        let object_out = module_dir.join(format!("{stem}.o"));
        let key = PrebuildKey::new(stem.as_str(), fp, "o");

        if cache.lookup(&key).is_some() {
            cache.recover(&key, &object_out)?;
        } else {
            tool.compile(&path, &object_out, &file_flags)?;
            cache.store(&object_out, &key)?;
        }
        Ok(object_out)
    })
}

/// Resolves a tree's `! DEPENDS ON:` pragma object references into
/// absolute paths under `build_output` (§3 "file_deps" / §4.9 "plus
/// pragma DEPENDS ON objects").
pub fn pragma_object_deps(
    config: &BuildConfig,
    tree: &BuildTree,
    files: &BTreeMap<PathBuf, AnalysedFile>,
) -> Vec<PathBuf> {
    let mut out = BTreeSet::new();
    for path in tree.nodes.keys() {
        let Some(file) = files.get(path) else { continue };
        for dep in &file.data().file_deps {
            if dep.is_absolute() {
                out.insert(dep.clone());
            } else {
                out.insert(config.build_output_path(dep));
            }
        }
    }
    out.into_iter().collect()
}
