//! Whole-project source-graph assembly (§4.6 "Graph assembly").
//!
//! Turns the per-file [`AnalysedFileData`] records the Fortran/C parsers
//! produce into a single graph: a node per file, an edge per resolved
//! `module_deps`/`symbol_deps` name.

use super::AnalysedFile;
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One node of the assembled source graph: a file and the set of other
/// files it depends on (by any means — module use, symbol call, or
/// `! DEPENDS ON:` pragma).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceNode {
    pub path: PathBuf,
    pub depends_on: BTreeSet<PathBuf>,
}

/// The whole-project dependency graph (§4.6).
#[derive(Clone, Debug, Default)]
pub struct SourceGraph {
    pub nodes: BTreeMap<PathBuf, SourceNode>,
}

impl SourceGraph {
    pub fn get(&self, path: &Path) -> Option<&SourceNode> {
        self.nodes.get(path)
    }
}

/// Builds the name -> defining-file map and resolves every file's declared
/// dependency names against it, producing the edge set.
///
/// `files` must already be in path-sorted order (§4.6 "Ordering and
/// tie-breaks" — the caller, the analyser driver, owns that sort since it
/// also decides how `.an` cache hits interleave with fresh parses).
///
/// Unresolved names are dropped with a `warn!`, unless they name an entry
/// in `unreferenced_deps`, in which case the analyser records an implied
/// dependency on the file defining that name.
/// Builds the name -> defining-file map shared by [`assemble`] and the
/// build-tree extractor's root lookup, enforcing the uniqueness invariant
/// (§3 "at most one file... defines any given module name").
pub fn definers(files: &[AnalysedFile]) -> Result<BTreeMap<String, PathBuf>> {
    let mut definers: BTreeMap<String, PathBuf> = BTreeMap::new();

    for file in files {
        let data = file.data();
        for name in data.module_defs.iter().chain(data.symbol_defs.iter()) {
            if let Some(existing) = definers.get(name) {
                if existing != &data.path {
                    return Err(Error::DuplicateDefinition {
                        name: name.clone(),
                        a: existing.clone(),
                        b: data.path.clone(),
                    });
                }
            } else {
                definers.insert(name.clone(), data.path.clone());
            }
        }
    }

    Ok(definers)
}

pub fn assemble(files: &[AnalysedFile], unreferenced_deps: &BTreeSet<String>) -> Result<SourceGraph> {
    let definers = definers(files)?;

    // §4.6: "implied dependency on the matching file" for any name in
    // `unreferenced_deps` that a file in this project actually defines.
    // These calls are invisible to the line-oriented scanner (the one-line
    // `IF`-guarded `CALL` gap, §9), so the analyser can't tell which
    // specific file makes the call — it forces the defining file into
    // every other file's dependency set rather than guessing one.
    let implied: Vec<&PathBuf> =
        unreferenced_deps.iter().filter_map(|name| definers.get(name)).collect();

    let mut nodes = BTreeMap::new();
    for file in files {
        let data = file.data();
        let mut depends_on: BTreeSet<PathBuf> = BTreeSet::new();

        for name in data.module_deps.iter().chain(data.symbol_deps.iter()) {
            match definers.get(name) {
                Some(def_path) if def_path != &data.path => {
                    depends_on.insert(def_path.clone());
                }
                Some(_) => {
                    // self-reference (e.g. recursive CALL); not an edge.
                }
                None => {
                    if unreferenced_deps.contains(name) {
                        // No file in this project defines `name` (it's
                        // resolved externally, e.g. a vendored .mod or a
                        // system library routine) but the user has
                        // whitelisted it — silence the warning, record no
                        // edge since there's nothing in-project to point at.
                        tracing::debug!(
                            file = %data.path.display(),
                            name,
                            "name covered by unreferenced_deps, suppressing warning"
                        );
                    } else {
                        tracing::warn!(
                            file = %data.path.display(),
                            name,
                            "dropping unresolved dependency name"
                        );
                    }
                }
            }
        }

        for obj in &data.file_deps {
            depends_on.insert(obj.clone());
        }

        for def_path in &implied {
            if def_path.as_path() != data.path.as_path() {
                depends_on.insert((*def_path).clone());
            }
        }

        nodes.insert(data.path.clone(), SourceNode { path: data.path.clone(), depends_on });
    }

    Ok(SourceGraph { nodes })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::AnalysedFileData;

    fn fortran(path: &str, module_defs: &[&str], symbol_defs: &[&str], module_deps: &[&str], symbol_deps: &[&str]) -> AnalysedFile {
        AnalysedFile::Fortran(AnalysedFileData {
            path: PathBuf::from(path),
            content_hash: 0,
            module_defs: module_defs.iter().map(|s| s.to_string()).collect(),
            symbol_defs: symbol_defs.iter().map(|s| s.to_string()).collect(),
            module_deps: module_deps.iter().map(|s| s.to_string()).collect(),
            symbol_deps: symbol_deps.iter().map(|s| s.to_string()).collect(),
            file_deps: BTreeSet::new(),
            program_defs: BTreeSet::new(),
        })
    }

    #[test]
    fn resolves_use_to_defining_file() {
        let files = vec![
            fortran("constants_mod.f90", &["constants_mod"], &[], &[], &[]),
            fortran("greeting_mod.f90", &["greeting_mod"], &[], &["constants_mod"], &[]),
        ];
        let graph = assemble(&files, &BTreeSet::new()).unwrap();
        let node = graph.get(Path::new("greeting_mod.f90")).unwrap();
        assert!(node.depends_on.contains(&PathBuf::from("constants_mod.f90")));
    }

    #[test]
    fn duplicate_definition_is_an_error() {
        let files = vec![
            fortran("a.f90", &["dup_mod"], &[], &[], &[]),
            fortran("b.f90", &["dup_mod"], &[], &[], &[]),
        ];
        let err = assemble(&files, &BTreeSet::new()).unwrap_err();
        assert!(matches!(err, Error::DuplicateDefinition { name, .. } if name == "dup_mod"));
    }

    #[test]
    fn unresolved_name_is_dropped_without_edge() {
        let files = vec![fortran("only.f90", &[], &["only"], &["missing_mod"], &[])];
        let graph = assemble(&files, &BTreeSet::new()).unwrap();
        assert!(graph.get(Path::new("only.f90")).unwrap().depends_on.is_empty());
    }

    #[test]
    fn unreferenced_deps_silences_the_warning_but_adds_no_edge_when_unmatched() {
        let files = vec![fortran("consumer.f90", &[], &["consumer"], &[], &["external_routine"])];
        let mut unreferenced = BTreeSet::new();
        unreferenced.insert("external_routine".to_string());
        // No file in this project defines `external_routine`; whitelisting
        // it in unreferenced_deps only suppresses the dangling-name
        // warning, it can't manufacture an edge to a file that doesn't
        // exist in this graph.
        let graph = assemble(&files, &unreferenced).unwrap();
        assert!(graph.get(Path::new("consumer.f90")).unwrap().depends_on.is_empty());
    }

    #[test]
    fn unreferenced_deps_matching_a_project_file_implies_a_dependency_on_it() {
        // `hidden_routine` is defined in this project but called only from
        // inside a one-line `IF`, invisible to the scanner (§9) — neither
        // file's `symbol_deps` mentions it at all. Listing it in
        // `unreferenced_deps` forces an edge from every other file onto its
        // definer, since the analyser can't tell which file made the call.
        let files = vec![
            fortran("hidden_mod.f90", &[], &["hidden_routine"], &[], &[]),
            fortran("caller.f90", &[], &["caller"], &[], &[]),
        ];
        let mut unreferenced = BTreeSet::new();
        unreferenced.insert("hidden_routine".to_string());

        let graph = assemble(&files, &unreferenced).unwrap();
        assert!(graph.get(Path::new("caller.f90")).unwrap().depends_on.contains(&PathBuf::from("hidden_mod.f90")));
        // The definer itself gets no self-edge.
        assert!(graph.get(Path::new("hidden_mod.f90")).unwrap().depends_on.is_empty());
    }

    #[test]
    fn self_reference_is_not_an_edge() {
        let files = vec![fortran("recur.f90", &[], &["recur"], &[], &["recur"])];
        let graph = assemble(&files, &BTreeSet::new()).unwrap();
        assert!(graph.get(Path::new("recur.f90")).unwrap().depends_on.is_empty());
    }

    #[test]
    fn file_deps_become_edges_to_the_named_object_path() {
        let mut file = fortran("f_inter.f90", &[], &["f_inter"], &[], &[]);
        file.data_mut().file_deps.insert(PathBuf::from("f_var.o"));
        let graph = assemble(&[file], &BTreeSet::new()).unwrap();
        assert!(graph.get(Path::new("f_inter.f90")).unwrap().depends_on.contains(&PathBuf::from("f_var.o")));
    }
}
