//! Fortran extraction rules (§4.6).
//!
//! Parsing here is a deliberately lightweight line-oriented regex scan, not
//! a full Fortran grammar — spec.md tolerates this by design (continuation
//! lines and preprocessor conditionals are assumed resolved upstream by the
//! preprocessor driver, and files the scan can't make sense of are covered
//! by [`ParserWorkaround`]).

use super::AnalysedFileData;
use crate::fingerprint::str_fingerprint;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

// `regex` has no lookaround; the "not MODULE PROCEDURE" exclusion is applied
// by the caller after capturing the first word.
static RE_MODULE_DEF: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\s*MODULE\s+(\w+)\s*$").unwrap());
static RE_END_MODULE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*END\s*(?:SUB)?MODULE\b").unwrap());
static RE_SUBMODULE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*SUBMODULE\s*\(\s*(\w+)(?:\s*:\s*\w+)?\s*\)\s*(\w+)").unwrap()
});
static RE_PROGRAM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\s*PROGRAM\s+(\w+)").unwrap());
static RE_SUBROUTINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(?:RECURSIVE\s+)?SUBROUTINE\s+(\w+)").unwrap());
static RE_FUNCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:[A-Za-z_][\w*()\s,]*\s)??(?:RECURSIVE\s+)?FUNCTION\s+(\w+)").unwrap()
});
static RE_USE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*USE\s*(?:,\s*(?:INTRINSIC|NON_INTRINSIC)\s*)?(?:::\s*)?(\w+)").unwrap()
});
static RE_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?im)^\s*CALL\s+(\w+)").unwrap());
static RE_DEPENDS_ON: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)!\s*DEPENDS\s+ON\s*:\s*(.+?)\s*$").unwrap());

/// Module names treated as always-resolved and never added to
/// `module_deps`. Extended by configuration (§4.6 "a configurable set of
/// names").
pub const DEFAULT_INTRINSIC_MODULES: &[&str] =
    &["iso_c_binding", "iso_fortran_env", "ieee_arithmetic", "ieee_exceptions", "ieee_features"];

/// Parses one preprocessed Fortran source file.
pub fn parse(content: &str, path: &Path, intrinsic_modules: &BTreeSet<String>) -> AnalysedFileData {
    let mut module_defs = BTreeSet::new();
    let mut module_deps = BTreeSet::new();
    let mut symbol_defs = BTreeSet::new();
    let mut symbol_deps = BTreeSet::new();
    let mut file_deps = BTreeSet::new();
    let mut program_defs = BTreeSet::new();

    let mut inside_module_depth: u32 = 0;

    for line in content.lines() {
        // Comment-only pragma lines are scanned regardless of module nesting.
        if let Some(cap) = RE_DEPENDS_ON.captures(line) {
            for obj in cap[1].split([',', ' ']).filter(|s| !s.is_empty()) {
                file_deps.insert(PathBuf::from(obj.trim()));
            }
        }

        // Strip a trailing inline comment before matching statements so
        // `CALL foo() ! comment` doesn't confuse the statement regexes.
        let code = line.split_once('!').map(|(code, _)| code).unwrap_or(line);
        if code.trim().is_empty() {
            continue;
        }

        if let Some(cap) = RE_SUBMODULE.captures(code) {
            // a submodule contributes its procedures to the parent module's
            // interface and is never itself `USE`d.
            module_deps.insert(cap[1].to_lowercase());
            inside_module_depth += 1;
            continue;
        }

        if let Some(cap) = RE_MODULE_DEF.captures(code) {
            if cap[1].eq_ignore_ascii_case("procedure") {
                // `MODULE PROCEDURE foo` inside an interface block is a
                // binding, not a module definition.
            } else {
                module_defs.insert(cap[1].to_lowercase());
                inside_module_depth += 1;
            }
            continue;
        }

        if RE_END_MODULE.is_match(code) {
            inside_module_depth = inside_module_depth.saturating_sub(1);
            continue;
        }

        if let Some(cap) = RE_PROGRAM.captures(code) {
            let name = cap[1].to_lowercase();
            symbol_defs.insert(name.clone());
            program_defs.insert(name);
            continue;
        }

        if let Some(cap) = RE_SUBROUTINE.captures(code) {
            if inside_module_depth == 0 {
                symbol_defs.insert(cap[1].to_lowercase());
            }
            continue;
        }

        if let Some(cap) = RE_FUNCTION.captures(code) {
            if inside_module_depth == 0 {
                symbol_defs.insert(cap[1].to_lowercase());
            }
            continue;
        }

        if let Some(cap) = RE_USE.captures(code) {
            let name = cap[1].to_lowercase();
            if !intrinsic_modules.contains(&name) {
                module_deps.insert(name);
            }
            continue;
        }

        if let Some(cap) = RE_CALL.captures(code) {
            symbol_deps.insert(cap[1].to_lowercase());
        }
    }

    // A procedure never depends on itself or a sibling declared in the same
    // file by way of an unqualified CALL; that's resolved at graph assembly
    // by checking whether the name is one this very file already defines.
    symbol_deps.retain(|name| !symbol_defs.contains(name));

    AnalysedFileData {
        path: path.to_path_buf(),
        content_hash: str_fingerprint(content),
        module_defs,
        module_deps,
        symbol_defs,
        symbol_deps,
        file_deps,
        program_defs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intrinsics() -> BTreeSet<String> {
        DEFAULT_INTRINSIC_MODULES.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn extracts_module_with_subroutine() {
        let src = r#"
MODULE greeting_mod
  IMPLICIT NONE
CONTAINS
  SUBROUTINE greet(buf)
    CHARACTER(*) :: buf
    buf = "hello"
  END SUBROUTINE greet
END MODULE greeting_mod
"#;
        let data = parse(src, Path::new("greeting_mod.f90"), &intrinsics());
        assert_eq!(data.module_defs, BTreeSet::from(["greeting_mod".to_string()]));
        assert!(data.symbol_defs.is_empty(), "module-contained routines are not symbol_defs");
    }

    #[test]
    fn program_using_module_only_clause() {
        let src = r#"
PROGRAM first
  USE greeting_mod, ONLY: greet
  IMPLICIT NONE
  CALL greet(buf)
END PROGRAM first
"#;
        let data = parse(src, Path::new("first.f90"), &intrinsics());
        assert_eq!(data.symbol_defs, BTreeSet::from(["first".to_string()]));
        assert_eq!(data.module_deps, BTreeSet::from(["greeting_mod".to_string()]));
        // `greet` is called but provided by a used module; graph assembly
        // resolves it by module edge, but the raw extraction still records
        // the call as a symbol_dep candidate (disambiguated later).
        assert!(data.symbol_deps.contains("greet"));
    }

    #[test]
    fn program_is_recorded_as_a_program_def() {
        let src = "PROGRAM first\nEND PROGRAM first\n";
        let data = parse(src, Path::new("first.f90"), &intrinsics());
        assert_eq!(data.program_defs, BTreeSet::from(["first".to_string()]));
    }

    #[test]
    fn subroutine_outside_a_module_is_not_a_program_def() {
        let src = "SUBROUTINE helper()\nEND SUBROUTINE helper\n";
        let data = parse(src, Path::new("helper.f90"), &intrinsics());
        assert!(data.program_defs.is_empty());
    }

    #[test]
    fn intrinsic_modules_are_not_deps() {
        let src = r#"
MODULE f_inters
  USE ISO_C_BINDING
END MODULE f_inters
"#;
        let data = parse(src, Path::new("f_inters.f90"), &intrinsics());
        assert!(data.module_deps.is_empty());
    }

    #[test]
    fn depends_on_pragma_is_recorded_as_file_dep() {
        let src = r#"
SUBROUTINE f_inter() BIND(C, name="f_inter")
  ! DEPENDS ON: f_var.o
END SUBROUTINE f_inter
"#;
        let data = parse(src, Path::new("f_inters.f90"), &intrinsics());
        assert!(data.file_deps.contains(&PathBuf::from("f_var.o")));
    }

    #[test]
    fn function_with_type_prefix() {
        let src = r#"
REAL FUNCTION area(r)
  REAL, INTENT(IN) :: r
  area = 3.14 * r * r
END FUNCTION area
"#;
        let data = parse(src, Path::new("area.f90"), &intrinsics());
        assert_eq!(data.symbol_defs, BTreeSet::from(["area".to_string()]));
    }

    #[test]
    fn submodule_depends_on_parent_and_defines_nothing_new() {
        let src = r#"
SUBMODULE (parent_mod) parent_impl
CONTAINS
  SUBROUTINE helper()
  END SUBROUTINE helper
END SUBMODULE parent_impl
"#;
        let data = parse(src, Path::new("parent_impl.f90"), &intrinsics());
        assert!(data.module_defs.is_empty());
        assert!(data.module_deps.contains("parent_mod"));
    }
}
