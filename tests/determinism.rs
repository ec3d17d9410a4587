//! Testable properties 1, 2, 4, 5, 7. Where the S1-S6 scenario tests each
//! drive one pipeline stage, these compare two full pipeline runs against
//! each other, the way the properties themselves are phrased.


use fab::error::Error;
use fab::tool::FortranCompile;
use fab::Result;
use fixtures::*;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

struct PanicsIfCalledPreprocessor;
impl fab::tool::Preprocess for PanicsIfCalledPreprocessor {
    fn identity(&self) -> String {
        "fake-fpp".into()
    }
    fn run(&self, _input: &Path, _output: &Path, _flags: &[String]) -> Result<()> {
        panic!("preprocessor should not run: everything should be a cache hit");
    }
}

struct PanicsIfCalledFortranCompiler;
impl FortranCompile for PanicsIfCalledFortranCompiler {
    fn identity(&self) -> String {
        "fake-gfortran".into()
    }
    fn version(&self) -> String {
        "13.0".into()
    }
    fn compile(&self, _input: &Path, _object_out: &Path, _module_dir: &Path, _flags: &[String], _syntax_only: bool) -> Result<()> {
        panic!("fortran compiler should not run: everything should be a cache hit");
    }
}

struct PanicsIfCalledCCompiler;
impl fab::tool::CCompile for PanicsIfCalledCCompiler {
    fn identity(&self) -> String {
        "fake-gcc".into()
    }
    fn compile(&self, _input: &Path, _object_out: &Path, _flags: &[String]) -> Result<()> {
        panic!("c compiler should not run: everything should be a cache hit");
    }
}

/// property 1: given an unmodified source tree and config, a second run
/// invokes zero preprocessor/compiler processes and produces a
/// byte-equivalent executable.
#[test]
fn unmodified_rebuild_invokes_no_tools_and_reproduces_the_executable() {
    let mut project = Project::new();
    project.write_source("greeting_mod.f90", "MODULE greeting_mod\nEND MODULE greeting_mod\n");
    project.write_source("first.f90", "PROGRAM first\n  USE greeting_mod\nEND PROGRAM first\n");
    project.config.analyser.root_symbols = vec!["first".to_string()];

    let (run1, fc1) = run_default(&project).unwrap();
    assert!(fc1.calls.load(Ordering::SeqCst) > 0);
    let exe1 = run1.store.paths(fab::store::CollectionName::Executables).unwrap()[0].clone();
    let bytes1 = std::fs::read(&exe1).unwrap();

    let run2 = run_with_fakes(
        &project,
        &PanicsIfCalledPreprocessor,
        &PanicsIfCalledFortranCompiler,
        &PanicsIfCalledCCompiler,
        &FakeArchiver,
        &FakeLinker,
    )
    .unwrap();
    let exe2 = run2.store.paths(fab::store::CollectionName::Executables).unwrap()[0].clone();
    let bytes2 = std::fs::read(&exe2).unwrap();

    assert_eq!(bytes1, bytes2);
}

/// property 2: modifying one file recompiles it and exactly the set of
/// files transitively reachable from it along reverse module edges — a
/// three-hop chain (`top` -> `a_mod` -> `b_mod` -> `c_mod`) confirms the
/// fingerprint recursion actually propagates past one hop, and an
/// unrelated sibling module confirms it doesn't over-propagate.
#[test]
fn modifying_a_leaf_module_recompiles_its_whole_reverse_closure_and_nothing_else() {
    let mut project = Project::new();
    project.write_source("sibling_mod.f90", "MODULE sibling_mod\n  INTEGER :: unrelated\nEND MODULE sibling_mod\n");
    project.write_source("c_mod.f90", "MODULE c_mod\n  INTEGER, PARAMETER :: c_val = 1\nEND MODULE c_mod\n");
    project.write_source("b_mod.f90", "MODULE b_mod\n  USE c_mod\nEND MODULE b_mod\n");
    project.write_source("a_mod.f90", "MODULE a_mod\n  USE b_mod\nEND MODULE a_mod\n");
    project.write_source("top.f90", "PROGRAM top\n  USE a_mod\nEND PROGRAM top\n");
    project.config.analyser.root_symbols = vec!["top".to_string()];

    let (_run1, fc1) = run_default(&project).unwrap();
    let first_pass: Vec<String> =
        fc1.compiled.lock().unwrap().iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();
    assert!(first_pass.contains(&"c_mod.f90".to_string()));
    assert!(first_pass.contains(&"sibling_mod.f90".to_string()));

    project.write_source("c_mod.f90", "MODULE c_mod\n  INTEGER, PARAMETER :: c_val = 2\nEND MODULE c_mod\n");

    let (_run2, fc2) = run_default(&project).unwrap();
    let recompiled: std::collections::BTreeSet<String> =
        fc2.compiled.lock().unwrap().iter().map(|p| p.file_name().unwrap().to_string_lossy().into_owned()).collect();

    assert_eq!(
        recompiled,
        std::collections::BTreeSet::from([
            "top.f90".to_string(),
            "a_mod.f90".to_string(),
            "b_mod.f90".to_string(),
            "c_mod.f90".to_string(),
        ])
    );
    assert!(!recompiled.contains("sibling_mod.f90"));
}

/// property 4: uniqueness holds for externally-visible symbol_defs, not
/// only module_defs — two files defining the same top-level `SUBROUTINE`
/// (no enclosing `MODULE`) must be rejected the same way a duplicate
/// module is.
#[test]
fn duplicate_external_subroutine_name_is_rejected_like_a_duplicate_module() {
    let project = Project::new();
    project.write_source("helper_a.f90", "SUBROUTINE helper()\nEND SUBROUTINE helper\n");
    project.write_source("helper_b.f90", "SUBROUTINE helper()\nEND SUBROUTINE helper\n");

    let fpp = FakePreprocessor::default();
    let fc = FakeFortranCompiler::default();
    let cc = FakeCCompiler::default();
    let err = run_with_fakes(&project, &fpp, &fc, &cc, &FakeArchiver, &FakeLinker).unwrap_err();

    assert!(matches!(err, Error::DuplicateDefinition { name, .. } if name == "helper"));
}

/// property 5: `BUILD_TREES[root]` is exactly the reachable closure of the
/// file defining `root` under the full graph's edges — neither more
/// (siblings with no path to root) nor less (a dependency two hops away).
#[test]
fn build_tree_is_exactly_the_reachable_closure() {
    let mut project = Project::new();
    project.write_source("unrelated_mod.f90", "MODULE unrelated_mod\nEND MODULE unrelated_mod\n");
    project.write_source("leaf_mod.f90", "MODULE leaf_mod\nEND MODULE leaf_mod\n");
    project.write_source("middle_mod.f90", "MODULE middle_mod\n  USE leaf_mod\nEND MODULE middle_mod\n");
    project.write_source("root_prog.f90", "PROGRAM root_prog\n  USE middle_mod\nEND PROGRAM root_prog\n");
    project.config.analyser.root_symbols = vec!["root_prog".to_string()];

    let (run, _fc) = run_default(&project).unwrap();
    let tree = &run.trees["root_prog"];
    let build_output = project.config.paths.build_output();
    let member = |name: &str| build_output.join(name);

    assert!(tree.nodes.contains_key(&member("root_prog.f90")));
    assert!(tree.nodes.contains_key(&member("middle_mod.f90")));
    assert!(tree.nodes.contains_key(&member("leaf_mod.f90")));
    assert!(!tree.nodes.contains_key(&member("unrelated_mod.f90")));
    assert_eq!(tree.nodes.len(), 3);
}

/// A fake compiler whose object/module bytes are a deterministic function
/// of the input source, so two-stage vs single-stage output can be
/// compared byte-for-byte rather than just by invocation count.
struct ContentDerivedCompiler {
    calls: AtomicUsize,
}

impl Default for ContentDerivedCompiler {
    fn default() -> Self {
        Self { calls: AtomicUsize::new(0) }
    }
}

impl FortranCompile for ContentDerivedCompiler {
    fn identity(&self) -> String {
        "fake-gfortran".into()
    }
    fn version(&self) -> String {
        "13.0".into()
    }
    fn compile(&self, input: &Path, object_out: &Path, module_dir: &Path, _flags: &[String], syntax_only: bool) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let content = std::fs::read_to_string(input).map_err(|e| fab::Error::io(input, e))?;
        if !syntax_only {
            std::fs::write(object_out, format!("OBJ:{content}")).map_err(|e| fab::Error::io(object_out, e))?;
        }
        let stem = object_out.file_stem().unwrap().to_str().unwrap().to_string();
        std::fs::write(module_dir.join(format!("{stem}.mod")), format!("MOD:{content}")).ok();
        Ok(())
    }
}

fn build_chain(two_stage: bool) -> (fixtures::PipelineRun, BTreeMap<String, Vec<u8>>) {
    let mut project = Project::new();
    project.write_source("leaf_mod.f90", "MODULE leaf_mod\n  INTEGER, PARAMETER :: v = 1\nEND MODULE leaf_mod\n");
    project.write_source("top.f90", "PROGRAM top\n  USE leaf_mod\nEND PROGRAM top\n");
    project.config.analyser.root_symbols = vec!["top".to_string()];
    project.config.fortran_compile.two_stage_flag = two_stage;

    let fpp = FakePreprocessor::default();
    let fc = ContentDerivedCompiler::default();
    let cc = FakeCCompiler::default();
    let run = run_with_fakes(&project, &fpp, &fc, &cc, &FakeArchiver, &FakeLinker).unwrap();

    let objects = run.store.objects().unwrap()["top"].clone();
    let bytes: BTreeMap<String, Vec<u8>> = objects
        .iter()
        .map(|p| (p.file_name().unwrap().to_string_lossy().into_owned(), std::fs::read(p).unwrap()))
        .collect();
    (run, bytes)
}

/// property 7: two-stage compilation (syntax-only pass A then a flat
/// object pass B) produces object output byte-equivalent to single-stage
/// compilation of the same source — module content is determined by
/// source, not by whether object emission was suppressed on the pass that
/// produced it.
#[test]
fn two_stage_and_single_stage_produce_byte_equivalent_objects() {
    let (_single_run, single_objects) = build_chain(false);
    let (_two_stage_run, two_stage_objects) = build_chain(true);

    assert_eq!(single_objects, two_stage_objects);
    assert!(!single_objects.is_empty());
}
