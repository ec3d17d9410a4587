#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]

#[macro_use]
extern crate tracing;

pub mod error;

pub mod config;
pub mod fingerprint;
pub mod store;

pub mod prebuild;

pub mod runtime;

pub mod discovery;

pub mod preprocess;

pub mod analysis;

pub mod tree;

pub mod compile;

pub mod link;

pub mod tool;

pub mod metrics;

pub mod report;

pub use config::BuildConfig;
pub use error::{Error, Result};
pub use store::{ArtefactStore, Collection, CollectionName};
pub use tree::BuildTree;

/// Runs the whole pipeline for one project, from source discovery under
/// `config.paths.source()` through linking, returning the final store
/// (§4.4 sequencing, §10 crate layout). Root-symbol roots come from
/// `config.analyser.root_symbols`, or from every discovered `PROGRAM`/`main`
/// when `find_programs` is set; `config.library_mode` additionally builds
/// the single library tree under its sentinel root name (§4.7).
///
/// This ties every step together the way a caller (the out-of-scope CLI,
/// per spec.md §1) would, but takes an already-constructed [`BuildConfig`]
/// rather than parsing arguments itself. On every exit path — success or
/// failure — it runs the prebuild housekeeper and flushes accumulated
/// metrics to `metrics/`, matching the "on scope exit housekeeping runs
/// and metrics are flushed" control flow in §2: a build scope that dies
/// partway through a step still leaves the cache swept and a metrics
/// summary on disk for the run that did happen.
pub fn run(config: &BuildConfig, store: &mut ArtefactStore) -> Result<()> {
    config.ensure_layout()?;
    let cache = prebuild::PrebuildCache::new(config.paths.prebuild())?;
    let metrics = metrics::BuildMetrics::new();

    let result = run_inner(config, store, &cache, &metrics);

    // Scope exit (§2): housekeeping runs over whatever this run actually
    // touched — the same cache handle, so its `accessed_keys` reflect the
    // whole run regardless of where `run_inner` returned — and the metrics
    // summary is flushed to disk, on every exit path, not just success.
    prebuild::housekeeper::run(&cache, &config.housekeeping)?;
    let _ = std::fs::write(config.paths.metrics().join("summary.txt"), metrics.summary());

    result
}

/// Builds the declared step sequence — starting with source discovery, so
/// it runs after [`run`] has called `config.ensure_layout()` and gets the
/// same metrics/ordering coverage as every later step — and hands it to
/// [`runtime::run_steps`] (§4.4: "the runtime does not reorder steps; it
/// runs them strictly in declared order"). The source graph and the
/// per-path analysed-file lookup
/// the compile step needs have no slot in §3's closed collection
/// enumeration — `BUILD_TREES` is the only graph-shaped thing a step may
/// publish — so they're threaded from the analyse/extract step to the
/// compile step through a `RefCell` local to this call, while everything
/// §3 does name a collection for flows through `store` exactly as every
/// other step reads and writes it.
fn run_inner(
    config: &BuildConfig,
    store: &mut ArtefactStore,
    cache: &prebuild::PrebuildCache,
    metrics: &metrics::BuildMetrics,
) -> Result<()> {
    use std::cell::RefCell;
    use std::collections::{BTreeMap, BTreeSet};
    use std::path::PathBuf;
    use tool::{ExternalArchiver, ExternalCCompiler, ExternalFortranCompiler, ExternalLinker, ExternalPreprocessor};

    let fpp = ExternalPreprocessor { program: config.tools.fpp.clone() };
    let fortran_tool = ExternalFortranCompiler::detect(config.tools.fc.clone())?;
    let c_tool = ExternalCCompiler { program: config.tools.cc.clone() };

    let archiver_program = config.link.archiver.clone().unwrap_or_else(|| "ar".to_string());
    let archiver = ExternalArchiver { program: archiver_program };
    let linker_program = config.link.linker.clone().unwrap_or_else(|| config.tools.ld.clone());
    let linker = ExternalLinker { program: linker_program };

    let analysis_state: RefCell<Option<(BTreeMap<PathBuf, analysis::AnalysedFile>, BTreeMap<String, PathBuf>)>> =
        RefCell::new(None);

    let mut steps: Vec<Box<dyn runtime::Step + '_>> = vec![
        runtime::step("discover", |store| metrics.time_step("discover", || discovery::discover(config, store))),
        runtime::step("preprocess_fortran", |store| {
            metrics.time_step("preprocess_fortran", || preprocess::preprocess_fortran(config, store, cache, &fpp))
        }),
        runtime::step("preprocess_c", |store| {
            metrics.time_step("preprocess_c", || preprocess::preprocess_c(config, store, cache, &fpp))
        }),
        runtime::step("inject_c_pragmas", |store| {
            metrics.time_step("inject_c_pragmas", || preprocess::inject_c_pragmas(config, store))
        }),
        runtime::step("analyse_and_extract", |store| metrics.time_step("analyse_and_extract", || {
            let files = analysis::analyse(config, store, cache)?;
            let graph = analysis::graph::assemble(&files, &config.analyser.unreferenced_deps)?;
            let definers = analysis::graph::definers(&files)?;

            // §3 "A build may declare multiple roots or request automatic
            // discovery of every program": `find_programs` draws the root
            // set from every analysed file's `program_defs` rather than
            // requiring the caller to name them up front.
            let roots: Vec<String> = if config.analyser.find_programs {
                let mut names = BTreeSet::new();
                for file in &files {
                    names.extend(file.data().program_defs.iter().cloned());
                }
                names.into_iter().collect()
            } else {
                config.analyser.root_symbols.clone()
            };

            let files_by_path: BTreeMap<PathBuf, analysis::AnalysedFile> =
                files.into_iter().map(|f| (f.path().to_path_buf(), f)).collect();

            let mut trees = BTreeMap::new();
            if config.library_mode {
                trees.insert(tree::LIBRARY_ROOT.to_string(), tree::extract_library(&graph)?);
            }
            for root in &roots {
                trees.insert(root.clone(), tree::extract(&graph, &definers, root)?);
            }
            store.set_trees(trees);

            *analysis_state.borrow_mut() = Some((files_by_path, definers));
            Ok(())
        })),
        runtime::step("compile", |store| metrics.time_step("compile", || {
            let state = analysis_state.borrow();
            let (files_by_path, definers) =
                state.as_ref().expect("analyse_and_extract runs before compile");
            let trees = store.trees()?.clone();

            let mut objects = BTreeMap::new();
            for (root, tree) in &trees {
                let mut root_objects =
                    compile::compile_fortran_tree(config, tree, files_by_path, definers, cache, &fortran_tool)?;
                root_objects.extend(compile::compile_c_tree(config, tree, files_by_path, cache, &c_tool)?);
                root_objects.extend(compile::pragma_object_deps(config, tree, files_by_path));
                root_objects.sort();
                objects.insert(root.clone(), root_objects);
            }
            store.set_objects(objects);
            Ok(())
        })),
    ];

    if config.link.archive {
        steps.push(runtime::step("archive", |store| {
            metrics.time_step("archive", || link::archive_objects(config, store, &archiver))
        }));
    }
    steps.push(runtime::step("link", |store| metrics.time_step("link", || link::link_executables(config, store, &linker))));

    runtime::run_steps(store, &steps)
}
