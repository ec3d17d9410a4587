//! The artefact store: a per-run mapping of collection name to collection.
//!
//! Data flow between steps is *only* through the store — no step receives
//! another step's output directly. The store is owned by the driver thread
//! and is not internally concurrent; workers spawned by [`crate::runtime::run_mp`]
//! operate on snapshots handed to them and return their produced artefacts
//! for the driver to merge back in.

use crate::error::{Error, Result};
use crate::tree::BuildTree;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// The closed enumeration of recognised collection names (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionName {
    InitialSource,
    FortranBuildFiles,
    CBuildFiles,
    X90BuildFiles,
    PreprocessedFortran,
    PreprocessedC,
    PragmadC,
    BuildTrees,
    ObjectFiles,
    ObjectArchives,
    Executables,
}

impl CollectionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollectionName::InitialSource => "INITIAL_SOURCE",
            CollectionName::FortranBuildFiles => "FORTRAN_BUILD_FILES",
            CollectionName::CBuildFiles => "C_BUILD_FILES",
            CollectionName::X90BuildFiles => "X90_BUILD_FILES",
            CollectionName::PreprocessedFortran => "PREPROCESSED_FORTRAN",
            CollectionName::PreprocessedC => "PREPROCESSED_C",
            CollectionName::PragmadC => "PRAGMAD_C",
            CollectionName::BuildTrees => "BUILD_TREES",
            CollectionName::ObjectFiles => "OBJECT_FILES",
            CollectionName::ObjectArchives => "OBJECT_ARCHIVES",
            CollectionName::Executables => "EXECUTABLES",
        }
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CollectionName {
    /// Parses one of the closed-enumeration names back from its string form
    /// (case-insensitive), the counterpart to [`CollectionName::as_str`].
    /// Used to resolve a step's `source`/`output_collection` override (§4.4,
    /// §6 "Every step: `source`..., `output_collection`...") from the plain
    /// string a caller supplies back to the typed key the store indexes on.
    pub fn parse(name: &str) -> Option<Self> {
        let all = [
            CollectionName::InitialSource,
            CollectionName::FortranBuildFiles,
            CollectionName::CBuildFiles,
            CollectionName::X90BuildFiles,
            CollectionName::PreprocessedFortran,
            CollectionName::PreprocessedC,
            CollectionName::PragmadC,
            CollectionName::BuildTrees,
            CollectionName::ObjectFiles,
            CollectionName::ObjectArchives,
            CollectionName::Executables,
        ];
        all.into_iter().find(|c| c.as_str().eq_ignore_ascii_case(name))
    }

    /// Resolves a step's `source` override against `default`: an unset or
    /// unparseable override falls back to the step's normal input
    /// collection rather than failing outright.
    pub fn resolve_source(io: &crate::config::StepIo, default: CollectionName) -> CollectionName {
        io.source.as_deref().and_then(CollectionName::parse).unwrap_or(default)
    }

    /// Resolves a step's `output_collection` override against `default`.
    pub fn resolve_output(io: &crate::config::StepIo, default: CollectionName) -> CollectionName {
        io.output_collection.as_deref().and_then(CollectionName::parse).unwrap_or(default)
    }
}

/// A heterogeneous collection value. Every variant corresponds to exactly
/// one of the [`CollectionName`] entries.
#[derive(Debug, Clone, Default)]
pub enum Collection {
    #[default]
    Empty,
    /// `INITIAL_SOURCE`, `FORTRAN_BUILD_FILES`, `C_BUILD_FILES`,
    /// `X90_BUILD_FILES`, `PREPROCESSED_FORTRAN`, `PREPROCESSED_C`,
    /// `PRAGMAD_C`, `EXECUTABLES`.
    Paths(Vec<PathBuf>),
    /// `BUILD_TREES`: root-symbol name -> reachable subgraph.
    Trees(BTreeMap<String, BuildTree>),
    /// `OBJECT_FILES`: root-symbol name -> set of compiled object paths.
    Objects(BTreeMap<String, Vec<PathBuf>>),
    /// `OBJECT_ARCHIVES`: root-symbol name -> archive path.
    Archives(BTreeMap<String, PathBuf>),
}

impl Collection {
    fn type_name(&self) -> &'static str {
        match self {
            Collection::Empty => "Empty",
            Collection::Paths(_) => "Paths",
            Collection::Trees(_) => "Trees",
            Collection::Objects(_) => "Objects",
            Collection::Archives(_) => "Archives",
        }
    }
}

/// The per-run artefact store.
///
/// Created empty at scope entry and discarded at scope exit (the files it
/// references on disk persist; only the in-memory index is released).
#[derive(Debug, Default)]
pub struct ArtefactStore {
    collections: BTreeMap<CollectionName, Collection>,
}

impl ArtefactStore {
    pub fn new() -> Self {
        Self { collections: BTreeMap::new() }
    }

    pub fn has(&self, name: CollectionName) -> bool {
        self.collections.contains_key(&name)
    }

    pub fn set(&mut self, name: CollectionName, value: Collection) {
        self.collections.insert(name, value);
    }

    fn get(&self, name: CollectionName) -> Result<&Collection> {
        self.collections.get(&name).ok_or_else(|| Error::MissingCollection(name.to_string()))
    }

    pub fn paths(&self, name: CollectionName) -> Result<&[PathBuf]> {
        match self.get(name)? {
            Collection::Paths(p) => Ok(p.as_slice()),
            other => panic!("collection {name} holds {} not Paths", other.type_name()),
        }
    }

    pub fn set_paths(&mut self, name: CollectionName, paths: Vec<PathBuf>) {
        self.set(name, Collection::Paths(paths));
    }

    pub fn trees(&self) -> Result<&BTreeMap<String, BuildTree>> {
        match self.get(CollectionName::BuildTrees)? {
            Collection::Trees(t) => Ok(t),
            other => panic!("BUILD_TREES holds {} not Trees", other.type_name()),
        }
    }

    pub fn set_trees(&mut self, trees: BTreeMap<String, BuildTree>) {
        self.set(CollectionName::BuildTrees, Collection::Trees(trees));
    }

    pub fn objects(&self) -> Result<&BTreeMap<String, Vec<PathBuf>>> {
        match self.get(CollectionName::ObjectFiles)? {
            Collection::Objects(o) => Ok(o),
            other => panic!("OBJECT_FILES holds {} not Objects", other.type_name()),
        }
    }

    pub fn set_objects(&mut self, objects: BTreeMap<String, Vec<PathBuf>>) {
        self.set(CollectionName::ObjectFiles, Collection::Objects(objects));
    }

    pub fn archives(&self) -> Result<&BTreeMap<String, PathBuf>> {
        match self.get(CollectionName::ObjectArchives)? {
            Collection::Archives(a) => Ok(a),
            other => panic!("OBJECT_ARCHIVES holds {} not Archives", other.type_name()),
        }
    }

    pub fn set_archives(&mut self, archives: BTreeMap<String, PathBuf>) {
        self.set(CollectionName::ObjectArchives, Collection::Archives(archives));
    }

    /// Iterates the populated collection names, sorted, for deterministic
    /// diagnostics.
    pub fn names(&self) -> impl Iterator<Item = CollectionName> + '_ {
        self.collections.keys().copied()
    }
}
