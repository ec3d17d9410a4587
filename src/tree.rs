//! The build-tree extractor (§4.7): prunes the whole-project source graph
//! down to the subgraph reachable from one root symbol.

use crate::analysis::graph::{SourceGraph, SourceNode};
use crate::error::{Error, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// The sentinel root name used for library builds (§4.7: "the subgraph
/// equals the entire graph, keyed under a sentinel root name").
pub const LIBRARY_ROOT: &str = "__library__";

/// A pruned subgraph reachable from one root symbol's defining file.
#[derive(Clone, Debug, Default)]
pub struct BuildTree {
    pub root_name: String,
    pub root_path: Option<PathBuf>,
    pub nodes: BTreeMap<PathBuf, SourceNode>,
}

impl BuildTree {
    pub fn member_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.nodes.keys()
    }
}

/// Finds the file whose `module_defs ∪ symbol_defs` contains `root_name`
/// (case-insensitively for Fortran `PROGRAM` names, exactly for C's
/// `main`), by scanning every node's original analysis data. Since
/// `SourceGraph` only retains the resolved edge set, the caller passes the
/// name→file map it already built during assembly.
pub fn extract(
    graph: &SourceGraph,
    definers: &BTreeMap<String, PathBuf>,
    root_name: &str,
) -> Result<BuildTree> {
    let root_path = definers
        .get(&root_name.to_lowercase())
        .cloned()
        .ok_or_else(|| Error::RootNotFound(root_name.to_string()))?;

    let stems = stem_index(graph);

    let mut visited: BTreeSet<PathBuf> = BTreeSet::new();
    let mut queue = std::collections::VecDeque::new();
    queue.push_back(root_path.clone());
    visited.insert(root_path.clone());

    while let Some(current) = queue.pop_front() {
        let Some(node) = graph.get(&current) else { continue };
        for dep in &node.depends_on {
            if let Some(resolved) = resolve_dep(graph, &stems, dep) {
                if visited.insert(resolved.clone()) {
                    queue.push_back(resolved);
                }
            }
        }
    }

    let mut nodes = BTreeMap::new();
    for path in &visited {
        if let Some(node) = graph.get(path) {
            nodes.insert(path.clone(), node.clone());
        }
    }

    detect_cycle(&nodes)?;

    Ok(BuildTree { root_name: root_name.to_string(), root_path: Some(root_path), nodes })
}

/// Maps each node's file stem to its path, so a `! DEPENDS ON: f_var.o`
/// edge (named after the object the dependency compiles to, not the source
/// path the graph keys on) can still be resolved to the node that produces
/// it (§4.6 "file_deps", S3).
fn stem_index(graph: &SourceGraph) -> BTreeMap<String, PathBuf> {
    let mut index = BTreeMap::new();
    for path in graph.nodes.keys() {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            index.entry(stem.to_string()).or_insert_with(|| path.clone());
        }
    }
    index
}

/// Resolves one `depends_on` entry to an actual graph node: either it's
/// already a node path, or its stem (typically an object name like
/// `f_var.o`) matches the stem of the file that produces it.
fn resolve_dep(graph: &SourceGraph, stems: &BTreeMap<String, PathBuf>, dep: &PathBuf) -> Option<PathBuf> {
    if graph.get(dep).is_some() {
        return Some(dep.clone());
    }
    dep.file_stem().and_then(|s| s.to_str()).and_then(|stem| stems.get(stem)).cloned()
}

/// Library mode: the subgraph is the entire graph, keyed under
/// [`LIBRARY_ROOT`].
pub fn extract_library(graph: &SourceGraph) -> Result<BuildTree> {
    let nodes = graph.nodes.clone();
    detect_cycle(&nodes)?;
    Ok(BuildTree { root_name: LIBRARY_ROOT.to_string(), root_path: None, nodes })
}

/// Detects a strongly-connected component spanning more than one file.
/// Self-edges don't exist in an assembled [`SourceGraph`] (graph assembly
/// already drops intra-file self-references), so any back-edge found here
/// necessarily involves at least two distinct files.
fn detect_cycle(nodes: &BTreeMap<PathBuf, SourceNode>) -> Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Color {
        White,
        Gray,
        Black,
    }

    let mut color: BTreeMap<&PathBuf, Color> = nodes.keys().map(|p| (p, Color::White)).collect();
    let mut stack: Vec<PathBuf> = Vec::new();

    fn visit<'a>(
        path: &'a PathBuf,
        nodes: &'a BTreeMap<PathBuf, SourceNode>,
        color: &mut BTreeMap<&'a PathBuf, Color>,
        stack: &mut Vec<PathBuf>,
    ) -> Result<()> {
        color.insert(path, Color::Gray);
        stack.push(path.clone());

        if let Some(node) = nodes.get(path) {
            for dep in &node.depends_on {
                let Some(dep_color) = color.get(dep).copied() else { continue };
                match dep_color {
                    Color::White => visit(dep, nodes, color, stack)?,
                    Color::Gray => {
                        let start = stack.iter().position(|p| p == dep).unwrap_or(0);
                        let mut cycle: Vec<PathBuf> = stack[start..].to_vec();
                        cycle.push(dep.clone());
                        return Err(Error::CycleDetected(cycle));
                    }
                    Color::Black => {}
                }
            }
        }

        stack.pop();
        color.insert(path, Color::Black);
        Ok(())
    }

    let keys: Vec<PathBuf> = nodes.keys().cloned().collect();
    for path in &keys {
        if color.get(path).copied() == Some(Color::White) {
            visit(path, nodes, &mut color, &mut stack)?;
        }
    }
    Ok(())
}
