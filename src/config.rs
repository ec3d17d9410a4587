//! Per-run configuration, collected once into an immutable object and
//! passed explicitly to every step (§9 "Global state" — no process-wide
//! singletons).
//!
//! The CLI/argument-parsing layer that populates this from flags is out of
//! scope per spec.md §1; this module is the boundary it would call into.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::analysis::workaround::ParserWorkaround;
use crate::error::{Error, Result};

/// Reads `FAB_WORKSPACE`, falling back to `~/fab-workspace` (§6).
pub fn default_workspace_root() -> PathBuf {
    std::env::var_os("FAB_WORKSPACE").map(PathBuf::from).unwrap_or_else(|| {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join("fab-workspace")
    })
}

/// A `(glob, flags_to_add)` entry applied to files matching `glob`, used by
/// both the preprocessor and Fortran compile step configuration surfaces.
#[derive(Clone, Debug)]
pub struct PathFlags {
    pub glob: String,
    pub flags: Vec<String>,
}

/// Per-step collection-name overrides, present on every step (§6 "Every
/// step: `source`, `output_collection`").
#[derive(Clone, Debug, Default)]
pub struct StepIo {
    pub source: Option<String>,
    pub output_collection: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct PreprocessorConfig {
    pub io: StepIo,
    pub common_flags: Vec<String>,
    pub path_flags: Vec<PathFlags>,
}

#[derive(Clone, Debug, Default)]
pub struct AnalyserConfig {
    pub io: StepIo,
    /// Explicit root-symbol names (§3 "A build may declare multiple
    /// roots"). Ignored when [`AnalyserConfig::find_programs`] is set.
    pub root_symbols: Vec<String>,
    /// "...or automatic discovery of every program" (§3, §4.7): when set,
    /// every file's `program_defs` across the whole project becomes a root,
    /// rather than requiring the caller to name them.
    pub find_programs: bool,
    pub unreferenced_deps: BTreeSet<String>,
    pub special_measure_analysis_results: Vec<ParserWorkaround>,
    /// Extends [`crate::analysis::fortran::DEFAULT_INTRINSIC_MODULES`].
    pub extra_intrinsic_modules: BTreeSet<String>,
}

#[derive(Clone, Debug, Default)]
pub struct FortranCompileConfig {
    pub io: StepIo,
    pub common_flags: Vec<String>,
    pub path_flags: Vec<PathFlags>,
    pub two_stage_flag: bool,
}

#[derive(Clone, Debug, Default)]
pub struct LinkConfig {
    pub io: StepIo,
    pub flags: Vec<String>,
    pub linker: Option<String>,
    /// Whether the "archive objects" step (§4.9) runs before linking.
    /// When unset, the linker consumes `OBJECT_FILES` directly.
    pub archive: bool,
    /// Program used by the archiver step when [`LinkConfig::archive`] is
    /// set; defaults to `ar` (no archiver-specific environment variable is
    /// named in §6, unlike `FC`/`CC`/`LD`).
    pub archiver: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct HousekeepingConfig {
    /// If set, only entries older than this are pruned, regardless of
    /// whether this run accessed them. If unset, the default
    /// access-based sweep applies (§4.10).
    pub older_than: Option<Duration>,
}

/// Environment-derived tool configuration (§6 "Environment variables
/// consumed").
#[derive(Clone, Debug)]
pub struct ToolEnv {
    pub fpp: String,
    pub fc: String,
    pub fflags: Vec<String>,
    pub cc: String,
    pub cflags: Vec<String>,
    pub ld: String,
    pub lflags: Vec<String>,
}

fn split_flags(s: &str) -> Vec<String> {
    s.split_whitespace().map(str::to_string).collect()
}

impl ToolEnv {
    /// Reads `FPP`, `FC`, `FFLAGS`, `CC`, `CFLAGS`, `LD`, `LFLAGS`, applying
    /// the defaults spec.md names: `FPP` gets `-P` appended if absent, `FC`
    /// gets `-c` appended if absent.
    pub fn from_env() -> Result<Self> {
        fn require(name: &str) -> Result<String> {
            std::env::var(name)
                .map_err(|_| Error::config(format!("required environment variable {name} is unset")))
        }

        let fpp = require("FPP")?;
        let fc = require("FC")?;
        let cc = require("CC")?;
        let ld = std::env::var("LD").unwrap_or_else(|_| cc.clone());

        let mut fflags = std::env::var("FFLAGS").map(|s| split_flags(&s)).unwrap_or_default();
        if !fflags.iter().any(|f| f == "-c") {
            fflags.push("-c".into());
        }

        let cflags = std::env::var("CFLAGS").map(|s| split_flags(&s)).unwrap_or_default();
        let lflags = std::env::var("LFLAGS").map(|s| split_flags(&s)).unwrap_or_default();

        Ok(Self { fpp, fc, fflags, cc, cflags, ld, lflags })
    }

    /// `FPP` flags with `-P` appended if the user didn't already specify it.
    pub fn fpp_flags(&self, extra: &[String]) -> Vec<String> {
        let mut flags: Vec<String> = extra.to_vec();
        if !flags.iter().any(|f| f == "-P") {
            flags.push("-P".into());
        }
        flags
    }
}

/// The layout of one project workspace (§6).
#[derive(Clone, Debug)]
pub struct ProjectPaths {
    pub workspace_root: PathBuf,
    pub project_label: String,
}

impl ProjectPaths {
    pub fn new(workspace_root: impl Into<PathBuf>, project_label: impl Into<String>) -> Self {
        Self { workspace_root: workspace_root.into(), project_label: project_label.into() }
    }

    pub fn project_root(&self) -> PathBuf {
        self.workspace_root.join(&self.project_label)
    }

    pub fn source(&self) -> PathBuf {
        self.project_root().join("source")
    }

    pub fn build_output(&self) -> PathBuf {
        self.project_root().join("build_output")
    }

    pub fn prebuild(&self) -> PathBuf {
        self.build_output().join("_prebuild")
    }

    pub fn metrics(&self) -> PathBuf {
        self.project_root().join("metrics")
    }

    pub fn log(&self) -> PathBuf {
        self.project_root().join("log.txt")
    }
}

/// The complete, immutable per-run configuration object (§9).
#[derive(Clone, Debug)]
pub struct BuildConfig {
    pub paths: ProjectPaths,
    pub tools: ToolEnv,
    pub preprocessor: PreprocessorConfig,
    pub analyser: AnalyserConfig,
    pub fortran_compile: FortranCompileConfig,
    pub link: LinkConfig,
    pub housekeeping: HousekeepingConfig,
    pub library_mode: bool,
}

impl BuildConfig {
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.paths.source(), self.paths.build_output(), self.paths.prebuild(), self.paths.metrics()]
        {
            std::fs::create_dir_all(&dir).map_err(|e| Error::io(dir, e))?;
        }
        Ok(())
    }

    pub fn build_output_path(&self, relative: &Path) -> PathBuf {
        self.paths.build_output().join(relative)
    }
}
