//! Source analysis: per-file symbol/module extraction and whole-project
//! dependency graph assembly.
//!
//! Two parsers feed a shared record shape ([`AnalysedFileData`]) so that
//! every step downstream of analysis (tree extraction, scheduling) can stay
//! language-agnostic; only the analyser itself branches on the
//! Fortran/C tag.

pub mod c;
pub mod fortran;
pub mod graph;
pub mod workaround;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// The capability set shared by Fortran and C analysed files (§3).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AnalysedFileData {
    pub path: PathBuf,
    /// Fingerprint of the file's post-preprocess content.
    pub content_hash: u64,
    pub module_defs: BTreeSet<String>,
    pub module_deps: BTreeSet<String>,
    pub symbol_defs: BTreeSet<String>,
    pub symbol_deps: BTreeSet<String>,
    /// Object-path dependencies declared via `! DEPENDS ON:` pragmas, or
    /// (for C) nothing — C never declares these itself.
    pub file_deps: BTreeSet<PathBuf>,
    /// Names in `symbol_defs` that are program entry points (Fortran
    /// `PROGRAM name`, C `main`) rather than plain procedures — the set
    /// `find_programs` (§6 "Analyser: root_symbol or find_programs") draws
    /// its roots from.
    pub program_defs: BTreeSet<String>,
}

/// A per-file analysis record. Round-trips byte-identically through
/// `serde_json` (testable property 3): the derive above only ever emits
/// `BTreeSet`/`BTreeMap`-backed fields, which serialise in a stable order.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum AnalysedFile {
    Fortran(AnalysedFileData),
    C(AnalysedFileData),
}

impl AnalysedFile {
    pub fn data(&self) -> &AnalysedFileData {
        match self {
            AnalysedFile::Fortran(d) | AnalysedFile::C(d) => d,
        }
    }

    pub fn data_mut(&mut self) -> &mut AnalysedFileData {
        match self {
            AnalysedFile::Fortran(d) | AnalysedFile::C(d) => d,
        }
    }

    pub fn path(&self) -> &Path {
        &self.data().path
    }

    pub fn is_fortran(&self) -> bool {
        matches!(self, AnalysedFile::Fortran(_))
    }

    pub fn is_c(&self) -> bool {
        matches!(self, AnalysedFile::C(_))
    }

    /// Serialises to the `.an` record format (§6). Deserialise-then-serialise
    /// must be byte-identical (testable property 3); `serde_json::to_vec`
    /// over `BTreeSet`/`BTreeMap` fields guarantees stable key order, and we
    /// never emit floating point or `HashMap` fields here, so this holds.
    pub fn to_record_bytes(&self) -> crate::error::Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| crate::error::Error::config(e.to_string()))
    }

    pub fn from_record_bytes(bytes: &[u8]) -> crate::error::Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| crate::error::Error::config(e.to_string()))
    }
}

/// The analyser step (§4.6): runs over `FORTRAN_BUILD_FILES ∪
/// C_BUILD_FILES`, reusing a prior `.an` record when the prebuild cache
/// already holds one keyed by `hash(content_hash)` alone (analysis is not
/// sensitive to compiler choice). A `ParserWorkaround` entry matching a
/// file's path is inserted verbatim instead of invoking either parser.
///
/// Returns the analysed files in path-sorted order (§4.6 "Ordering and
/// tie-breaks") ready for [`graph::assemble`].
pub fn analyse(
    config: &crate::config::BuildConfig,
    store: &crate::store::ArtefactStore,
    cache: &crate::prebuild::PrebuildCache,
) -> crate::error::Result<Vec<AnalysedFile>> {
    use crate::error::Error;
    use crate::prebuild::PrebuildKey;
    use crate::store::CollectionName;

    let mut inputs: Vec<PathBuf> = store.paths(CollectionName::FortranBuildFiles)?.to_vec();
    inputs.extend(store.paths(CollectionName::CBuildFiles)?.iter().cloned());
    inputs.sort();

    let workarounds: std::collections::BTreeMap<&Path, &workaround::ParserWorkaround> = config
        .analyser
        .special_measure_analysis_results
        .iter()
        .map(|w| (w.fpath.as_path(), w))
        .collect();

    let intrinsic_modules: BTreeSet<String> = fortran::DEFAULT_INTRINSIC_MODULES
        .iter()
        .map(|s| s.to_string())
        .chain(config.analyser.extra_intrinsic_modules.iter().cloned())
        .collect();

    let mut results = crate::runtime::run_mp(inputs, move |path| -> crate::error::Result<AnalysedFile> {
        let is_fortran =
            path.extension().and_then(|e| e.to_str()).map(|e| e.eq_ignore_ascii_case("f90")).unwrap_or(false);

        if let Some(workaround) = workarounds.get(path.as_path()) {
            let data = AnalysedFileData {
                path: path.clone(),
                content_hash: crate::fingerprint::file_fingerprint(&path)?,
                module_defs: workaround.module_defs.clone(),
                symbol_defs: workaround.symbol_defs.clone(),
                module_deps: workaround.module_deps.clone(),
                symbol_deps: workaround.symbol_deps.clone(),
                file_deps: BTreeSet::new(),
                // A workaround record has no notion of "this symbol is a
                // program entry point" among its five fields, so a file
                // covered by one is invisible to `find_programs`; the user
                // can still reach it via an explicit `root_symbol`.
                program_defs: BTreeSet::new(),
            };
            return Ok(if is_fortran { AnalysedFile::Fortran(data) } else { AnalysedFile::C(data) });
        }

        let content_hash = crate::fingerprint::file_fingerprint(&path)?;
        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("unknown").to_string();
        let key = PrebuildKey::new(stem.as_str(), content_hash, "an");

        if let Some(cached) = cache.lookup(&key) {
            let bytes = std::fs::read(&cached).map_err(|e| Error::io(&cached, e))?;
            return AnalysedFile::from_record_bytes(&bytes);
        }

        let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        let file = if is_fortran {
            AnalysedFile::Fortran(fortran::parse(&content, &path, &intrinsic_modules))
        } else {
            AnalysedFile::C(c::parse(&content, &path))
        };

        let bytes = file.to_record_bytes()?;
        let record_path = config.build_output_path(Path::new(&format!("{stem}.an")));
        std::fs::write(&record_path, &bytes).map_err(|e| Error::io(&record_path, e))?;
        cache.store(&record_path, &key)?;

        Ok(file)
    })?;

    results.sort_by(|a, b| a.path().cmp(b.path()));
    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AnalysedFile {
        let mut data = AnalysedFileData {
            path: PathBuf::from("/src/greeting_mod.f90"),
            content_hash: 42,
            ..Default::default()
        };
        data.module_defs.insert("greeting_mod".into());
        data.symbol_defs.insert("greet".into());
        data.module_deps.insert("constants_mod".into());
        AnalysedFile::Fortran(data)
    }

    #[test]
    fn an_record_round_trips_byte_identically() {
        let file = sample();
        let bytes = file.to_record_bytes().unwrap();
        let back = AnalysedFile::from_record_bytes(&bytes).unwrap();
        let bytes2 = back.to_record_bytes().unwrap();
        assert_eq!(bytes, bytes2);
        assert_eq!(file, back);
    }
}
