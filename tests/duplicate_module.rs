//! S5: duplicate module definition. Two files both declare `MODULE util`;
//! this must surface as `DuplicateDefinition` before any build tree is
//! extracted or any compiler is invoked.


use fab::error::Error;
use fixtures::*;

#[test]
fn duplicate_module_definition_aborts_before_compiling_anything() {
    let mut project = Project::new();

    project.write_source("util_a.f90", "MODULE util\n  INTEGER :: from_a\nEND MODULE util\n");
    project.write_source("util_b.f90", "MODULE util\n  INTEGER :: from_b\nEND MODULE util\n");
    project.write_source(
        "main.f90",
        "PROGRAM main_prog\n  USE util\nEND PROGRAM main_prog\n",
    );

    project.config.analyser.root_symbols = vec!["main_prog".to_string()];

    let fpp = FakePreprocessor::default();
    let fc = FakeFortranCompiler::default();
    let cc = FakeCCompiler::default();
    let err = run_with_fakes(&project, &fpp, &fc, &cc, &FakeArchiver, &FakeLinker).unwrap_err();

    match err {
        Error::DuplicateDefinition { name, a, b } => {
            assert_eq!(name, "util");
            let build_output = project.config.paths.build_output();
            let mut seen = [a, b];
            seen.sort();
            let mut expected =
                [build_output.join("util_a.f90"), build_output.join("util_b.f90")];
            expected.sort();
            assert_eq!(seen, expected);
        }
        other => panic!("expected DuplicateDefinition, got {other:?}"),
    }

    // No compiler invocation happened: the error surfaces during graph
    // assembly, before the scheduler ever sees a build tree.
    assert_eq!(fc.calls.load(std::sync::atomic::Ordering::SeqCst), 0);
}
