//! The error taxonomy shared by every step of the pipeline.
//!
//! Item-level failures (tool invocations, per-file parses) are collected by
//! the step that produced them and aggregated into a single [`Error`] at the
//! end of the step; see [`crate::runtime`].

use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The stage a [`Error::ToolFailure`] originated in, used only for
/// diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Preprocess,
    Compile,
    Link,
    Archive,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Preprocess => "preprocess",
            Stage::Compile => "compile",
            Stage::Link => "link",
            Stage::Archive => "archive",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing mandatory field, unresolvable tool, bad workspace path.
    /// Fatal, surfaced before any step runs.
    #[error("configuration error: {0}")]
    Config(String),

    /// Filesystem read/write failure. Propagated to the step; fatal for
    /// that item.
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, #[source] source: std::io::Error },

    /// A named artefact collection was requested but never populated.
    #[error("missing collection `{0}` in artefact store")]
    MissingCollection(String),

    /// `preprocess`/`compile`/`link` returned non-zero. Item-level;
    /// collected and aggregated by the owning step.
    #[error("{stage} of {path} failed: {stderr}")]
    ToolFailure { stage: Stage, path: PathBuf, stderr: String },

    /// The analyser could not parse a file and no [`crate::analysis::workaround::ParserWorkaround`]
    /// covers it.
    #[error("failed to parse {0}")]
    Parse(PathBuf),

    /// Two files define the same module or externally-visible symbol.
    #[error("duplicate definition of `{name}` in {a} and {b}")]
    DuplicateDefinition { name: String, a: PathBuf, b: PathBuf },

    /// The build-tree extractor could not locate a requested root symbol.
    #[error("no file defines root symbol `{0}`")]
    RootNotFound(String),

    /// Graph assembly found a strongly-connected component spanning more
    /// than one file.
    #[error("dependency cycle detected: {}", .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(" -> "))]
    CycleDetected(Vec<PathBuf>),

    /// The compile scheduler could not advance a wave; none of the
    /// remaining files had all dependencies satisfied.
    #[error("compile stalled, {} file(s) could not be scheduled: {}", .0.len(), .0.iter().map(|p| p.display().to_string()).collect::<Vec<_>>().join(", "))]
    CompileStalled(Vec<PathBuf>),

    /// Reported per downstream file of a [`Error::ToolFailure`].
    #[error("blocked by failed compile of {0}")]
    BlockedBy(PathBuf),

    /// Archiving failed for the named root.
    #[error("archiving {root} failed: {stderr}")]
    ArchiveFailed { root: String, stderr: String },

    /// Linking failed for the named root.
    #[error("linking {root} failed: {stderr}")]
    LinkFailed { root: String, stderr: String },

    /// Several items in a step failed; this variant names every offender
    /// rather than surfacing only the first.
    #[error("{} item(s) failed:\n{}", .0.len(), .0.iter().map(|e| format!("  - {e}")).collect::<Vec<_>>().join("\n"))]
    Aggregate(Vec<Error>),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Flattens a batch of per-item results into `Ok(values)` or a single
    /// [`Error::Aggregate`] naming every failure. Mirrors the "first failure
    /// surfaces, but all workers are drained" policy of [`crate::runtime`].
    pub fn aggregate<T>(results: Vec<Result<T>>) -> Result<Vec<T>> {
        let mut oks = Vec::with_capacity(results.len());
        let mut errs = Vec::new();
        for r in results {
            match r {
                Ok(v) => oks.push(v),
                Err(e) => errs.push(e),
            }
        }
        if errs.is_empty() {
            Ok(oks)
        } else if errs.len() == 1 {
            Err(errs.into_iter().next().unwrap())
        } else {
            Err(Error::Aggregate(errs))
        }
    }

    /// Exit code for the orchestrating process, per spec: 0 success
    /// (callers only convert `Ok`), 1 fatal build error, 2 configuration
    /// error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Config(_) => 2,
            _ => 1,
        }
    }
}
