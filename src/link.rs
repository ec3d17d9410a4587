//! The archiver / linker driver (§4.9): gathers each root's object set,
//! optionally archives it, then links one executable per root.
//!
//! Both steps key off `OBJECT_FILES`, a root-symbol name -> object list
//! populated by the compile scheduler plus [`crate::compile::pragma_object_deps`].
//! Library-mode roots ([`crate::tree::LIBRARY_ROOT`]) are archived like any
//! other root but never linked — there is no program entry point to link.

use crate::config::BuildConfig;
use crate::error::{Error, Result};
use crate::runtime::run_mp;
use crate::store::ArtefactStore;
use crate::tool::{Archive, Link};
use crate::tree::LIBRARY_ROOT;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Invokes `archiver` over each `OBJECT_FILES[root]`, writing
/// `build_output/lib<root>.a` and populating `OBJECT_ARCHIVES`.
pub fn archive_objects(
    config: &BuildConfig,
    store: &mut ArtefactStore,
    archiver: &dyn Archive,
) -> Result<()> {
    let objects = store.objects()?.clone();
    let roots: Vec<(String, Vec<PathBuf>)> = objects.into_iter().collect();

    let results = run_mp(roots, move |(root, mut objs)| -> Result<(String, PathBuf)> {
        objs.sort();
        let archive_out = config.build_output_path(std::path::Path::new(&format!("lib{root}.a")));
        archiver.archive(&objs, &archive_out)?;
        Ok((root, archive_out))
    })?;

    let archives: BTreeMap<String, PathBuf> = results.into_iter().collect();
    store.set_archives(archives);
    Ok(())
}

/// Reads `OBJECT_ARCHIVES` if non-empty, else `OBJECT_FILES`, and links one
/// executable per non-library root into `EXECUTABLES` (§4.9). Roots with no
/// objects at all (e.g. a root whose tree compiled to nothing) are skipped
/// rather than handed an empty link line.
pub fn link_executables(
    config: &BuildConfig,
    store: &mut ArtefactStore,
    linker: &dyn Link,
) -> Result<()> {
    let archives: BTreeMap<String, PathBuf> = store.archives().ok().cloned().unwrap_or_default();
    let objects = store.objects()?.clone();
    let flags = config.link.flags.clone();

    let roots: Vec<String> = if !archives.is_empty() {
        archives.keys().cloned().collect()
    } else {
        objects.keys().cloned().collect()
    };

    let jobs: Vec<(String, Vec<PathBuf>)> = roots
        .into_iter()
        .filter(|root| root != LIBRARY_ROOT)
        .filter_map(|root| {
            let inputs = if let Some(archive) = archives.get(&root) {
                vec![archive.clone()]
            } else {
                objects.get(&root).cloned().unwrap_or_default()
            };
            if inputs.is_empty() {
                None
            } else {
                Some((root, inputs))
            }
        })
        .collect();

    let results = run_mp(jobs, move |(root, inputs)| -> Result<(String, PathBuf)> {
        let exe_out = config.build_output_path(std::path::Path::new(&root));
        linker.link(&inputs, &flags, &exe_out)?;
        Ok((root, exe_out))
    })?;

    let by_root: BTreeMap<String, PathBuf> = results.into_iter().collect();
    let mut executables: Vec<PathBuf> = by_root.into_values().collect();
    executables.sort();
    store.set_paths(crate::store::CollectionName::Executables, executables);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AnalyserConfig, FortranCompileConfig, HousekeepingConfig, LinkConfig, PreprocessorConfig,
        ProjectPaths, ToolEnv,
    };
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn test_config(root: &std::path::Path) -> BuildConfig {
        BuildConfig {
            paths: ProjectPaths::new(root, "proj"),
            tools: ToolEnv {
                fpp: "fpp".into(),
                fc: "gfortran".into(),
                fflags: vec!["-c".into()],
                cc: "gcc".into(),
                cflags: vec![],
                ld: "gcc".into(),
                lflags: vec![],
            },
            preprocessor: PreprocessorConfig::default(),
            analyser: AnalyserConfig::default(),
            fortran_compile: FortranCompileConfig::default(),
            link: LinkConfig::default(),
            housekeeping: HousekeepingConfig::default(),
            library_mode: false,
        }
    }

    struct RecordingArchiver {
        calls: Mutex<Vec<PathBuf>>,
    }
    impl Archive for RecordingArchiver {
        fn archive(&self, objects: &[PathBuf], archive_out: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(archive_out.to_path_buf());
            std::fs::write(archive_out, format!("{}", objects.len())).map_err(|e| Error::io(archive_out, e))
        }
    }

    struct RecordingLinker {
        calls: AtomicUsize,
    }
    impl Link for RecordingLinker {
        fn link(&self, inputs: &[PathBuf], _flags: &[String], exe_out: &Path) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(exe_out, format!("{}", inputs.len())).map_err(|e| Error::io(exe_out, e))
        }
    }

    #[test]
    fn archives_one_per_root() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        config.ensure_layout().unwrap();

        let mut store = ArtefactStore::new();
        let mut objects = BTreeMap::new();
        objects.insert("prog_a".to_string(), vec![PathBuf::from("a.o"), PathBuf::from("b.o")]);
        store.set_objects(objects);

        let archiver = RecordingArchiver { calls: Mutex::new(Vec::new()) };
        archive_objects(&config, &mut store, &archiver).unwrap();

        let archives = store.archives().unwrap();
        assert_eq!(archives.len(), 1);
        assert!(archives.contains_key("prog_a"));
        assert_eq!(archiver.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn link_prefers_archive_over_raw_objects() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        config.ensure_layout().unwrap();

        let mut store = ArtefactStore::new();
        let mut objects = BTreeMap::new();
        objects.insert("prog_a".to_string(), vec![PathBuf::from("a.o")]);
        store.set_objects(objects);
        let mut archives = BTreeMap::new();
        archives.insert("prog_a".to_string(), PathBuf::from("libprog_a.a"));
        store.set_archives(archives);

        let linker = RecordingLinker { calls: AtomicUsize::new(0) };
        link_executables(&config, &mut store, &linker).unwrap();

        let exes = store.paths(crate::store::CollectionName::Executables).unwrap();
        assert_eq!(exes.len(), 1);
        assert_eq!(linker.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn library_root_is_archived_but_never_linked() {
        let tmp = tempfile::tempdir().unwrap();
        let config = test_config(tmp.path());
        config.ensure_layout().unwrap();

        let mut store = ArtefactStore::new();
        let mut objects = BTreeMap::new();
        objects.insert(LIBRARY_ROOT.to_string(), vec![PathBuf::from("a.o")]);
        store.set_objects(objects);

        let archiver = RecordingArchiver { calls: Mutex::new(Vec::new()) };
        archive_objects(&config, &mut store, &archiver).unwrap();

        let linker = RecordingLinker { calls: AtomicUsize::new(0) };
        link_executables(&config, &mut store, &linker).unwrap();

        assert_eq!(linker.calls.load(Ordering::SeqCst), 0);
        let exes = store.paths(crate::store::CollectionName::Executables).unwrap();
        assert!(exes.is_empty());
    }
}
