//! The seam through which the preprocessor, compiler, archiver and linker
//! steps invoke external tools.
//!
//! spec.md scopes the *concrete* command lines of `cpp`/`fpp`/`gfortran`/
//! `ifort`/`gcc`/`ar`/`ld` out of this system as external collaborators —
//! this module specifies only the interface those steps call through.
//! [`ToolCommand`] is the one concrete implementation: a thin, synchronous
//! `std::process::Command` wrapper, since every step still needs *some* way
//! to actually run a tool, and spec.md's timeouts/cancellation model (§5) is
//! "none at the orchestration level" — a blocking spawn is a faithful match.

use crate::error::{Error, Result, Stage};
use std::path::{Path, PathBuf};
use std::process::Command;

/// A tool invocation: program name plus the flags the calling step decided
/// on. Two commands with the same `identity()` are assumed to behave
/// identically for fingerprinting purposes (§4.8 "compiler_identity").
#[derive(Clone, Debug)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self { program: program.into(), args }
    }

    /// A fingerprint over the program name and its flags, used as one input
    /// to the compile/preprocess fingerprint (§4.5, §4.8).
    pub fn identity_fingerprint(&self) -> u64 {
        let joined = format!("{}\0{}", self.program, self.args.join("\0"));
        crate::fingerprint::str_fingerprint(&joined)
    }

    /// Runs the tool, treating any non-zero exit as a [`Error::ToolFailure`]
    /// for `stage`/`context_path`. Brackets the spawn with the scoped
    /// [`crate::report::Reporter`] (§11), mirroring the teacher's
    /// `report::compiler_spawn`/`compiler_success` pair around `rustc`/`solc`
    /// invocations.
    pub fn run(&self, stage: Stage, context_path: &Path) -> Result<()> {
        let start = std::time::Instant::now();
        crate::report::tool_spawn(stage, context_path);

        let output = Command::new(&self.program).args(&self.args).output().map_err(|e| {
            Error::ToolFailure {
                stage,
                path: context_path.to_path_buf(),
                stderr: format!("failed to spawn `{}`: {e}", self.program),
            }
        })?;

        if output.status.success() {
            crate::report::tool_success(stage, context_path, start.elapsed());
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            crate::report::tool_failure(stage, context_path, &stderr);
            Err(Error::ToolFailure { stage, path: context_path.to_path_buf(), stderr })
        }
    }
}

/// Identifies the compiler/preprocessor family so managed-flag enforcement
/// (§4.8 "Managed flags") knows which module-output flag to strip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Gfortran,
    Ifort,
    Gcc,
    Other,
}

impl ToolKind {
    pub fn from_program_name(program: &str) -> Self {
        let base =
            Path::new(program).file_stem().and_then(|s| s.to_str()).unwrap_or(program).to_lowercase();
        if base.contains("gfortran") {
            ToolKind::Gfortran
        } else if base.contains("ifort") {
            ToolKind::Ifort
        } else if base.contains("gcc") || base.contains("cc") {
            ToolKind::Gcc
        } else {
            ToolKind::Other
        }
    }
}

/// The interface the preprocessor driver (§4.5) calls through. spec.md
/// keeps the concrete `cpp`/`fpp` invocation out of scope; this trait is
/// the seam. [`ExternalPreprocessor`] is the one real implementation,
/// shelling out to the configured tool; tests substitute a fake.
pub trait Preprocess: Send + Sync {
    /// Stable identity string mixed into the preprocess fingerprint.
    fn identity(&self) -> String;

    fn run(&self, input: &Path, output: &Path, flags: &[String]) -> Result<()>;
}

/// Invokes `program <flags> -o <output> <input>`, the common convention for
/// `fpp`/`cpp`-alike preprocessors.
pub struct ExternalPreprocessor {
    pub program: String,
}

impl Preprocess for ExternalPreprocessor {
    fn identity(&self) -> String {
        self.program.clone()
    }

    fn run(&self, input: &Path, output: &Path, flags: &[String]) -> Result<()> {
        let mut args = flags.to_vec();
        args.push("-o".into());
        args.push(output.display().to_string());
        args.push(input.display().to_string());
        ToolCommand::new(&self.program, args).run(Stage::Preprocess, input)
    }
}

/// The interface the compile scheduler (§4.8) calls through for a single
/// Fortran compilation unit.
pub trait FortranCompile: Send + Sync {
    fn identity(&self) -> String;
    fn version(&self) -> String;

    /// Compiles `input`. When `syntax_only` is set (two-stage pass A), only
    /// the module file(s) should be produced; the caller discards any
    /// object output. `module_dir` is the single flat module-output folder
    /// (§3 invariant) the driver has already arranged the managed
    /// `-J`/`-module` flag to point at.
    fn compile(
        &self,
        input: &Path,
        object_out: &Path,
        module_dir: &Path,
        flags: &[String],
        syntax_only: bool,
    ) -> Result<()>;
}

pub struct ExternalFortranCompiler {
    pub program: String,
    pub version: String,
    pub kind: ToolKind,
}

impl ExternalFortranCompiler {
    /// Builds a compiler handle, probing `program --version` for the
    /// version string mixed into the compile fingerprint (§4.8
    /// "tool_version_hash") rather than leaving it empty — a compiler
    /// upgrade must change the fingerprint even when `program` and
    /// `flags` don't.
    pub fn detect(program: impl Into<String>) -> Result<Self> {
        let program = program.into();
        let kind = ToolKind::from_program_name(&program);
        let output = Command::new(&program).arg("--version").output().map_err(|e| Error::Config(
            format!("failed to probe version of `{program}`: {e}"),
        ))?;
        let version = String::from_utf8_lossy(&output.stdout).lines().next().unwrap_or("").trim().to_string();
        Ok(Self { program, version, kind })
    }
}

impl FortranCompile for ExternalFortranCompiler {
    fn identity(&self) -> String {
        self.program.clone()
    }

    fn version(&self) -> String {
        self.version.clone()
    }

    fn compile(
        &self,
        input: &Path,
        object_out: &Path,
        module_dir: &Path,
        flags: &[String],
        syntax_only: bool,
    ) -> Result<()> {
        let mut args = crate::compile::flags::managed_flags(self.kind, flags, module_dir);
        if syntax_only {
            args.push(match self.kind {
                ToolKind::Ifort => "-syntax-only".into(),
                _ => "-fsyntax-only".into(),
            });
        } else {
            args.push("-o".into());
            args.push(object_out.display().to_string());
        }
        args.push(input.display().to_string());
        ToolCommand::new(&self.program, args).run(Stage::Compile, input)
    }
}

/// The interface the single-pass C compile step calls through.
pub trait CCompile: Send + Sync {
    fn identity(&self) -> String;
    fn compile(&self, input: &Path, object_out: &Path, flags: &[String]) -> Result<()>;
}

pub struct ExternalCCompiler {
    pub program: String,
}

impl CCompile for ExternalCCompiler {
    fn identity(&self) -> String {
        self.program.clone()
    }

    fn compile(&self, input: &Path, object_out: &Path, flags: &[String]) -> Result<()> {
        let mut args = flags.to_vec();
        if !args.iter().any(|f| f == "-c") {
            args.push("-c".into());
        }
        args.push("-o".into());
        args.push(object_out.display().to_string());
        args.push(input.display().to_string());
        ToolCommand::new(&self.program, args).run(Stage::Compile, input)
    }
}

/// The interface the archiver step calls through.
pub trait Archive: Send + Sync {
    fn archive(&self, objects: &[PathBuf], archive_out: &Path) -> Result<()>;
}

pub struct ExternalArchiver {
    pub program: String,
}

impl Archive for ExternalArchiver {
    fn archive(&self, objects: &[PathBuf], archive_out: &Path) -> Result<()> {
        let mut args = vec!["rcs".to_string(), archive_out.display().to_string()];
        args.extend(objects.iter().map(|p| p.display().to_string()));
        ToolCommand::new(&self.program, args)
            .run(Stage::Archive, archive_out)
            .map_err(|e| remap_archive_error(e, archive_out))
    }
}

fn remap_archive_error(err: Error, archive_out: &Path) -> Error {
    match err {
        Error::ToolFailure { stderr, .. } => Error::ArchiveFailed {
            root: archive_out.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
            stderr,
        },
        other => other,
    }
}

/// The interface the linker step calls through.
pub trait Link: Send + Sync {
    fn link(&self, inputs: &[PathBuf], flags: &[String], exe_out: &Path) -> Result<()>;
}

pub struct ExternalLinker {
    pub program: String,
}

impl Link for ExternalLinker {
    fn link(&self, inputs: &[PathBuf], flags: &[String], exe_out: &Path) -> Result<()> {
        let mut args = flags.to_vec();
        args.push("-o".into());
        args.push(exe_out.display().to_string());
        args.extend(inputs.iter().map(|p| p.display().to_string()));
        ToolCommand::new(&self.program, args).run(Stage::Link, exe_out).map_err(|e| {
            remap_link_error(e, exe_out)
        })
    }
}

fn remap_link_error(err: Error, exe_out: &Path) -> Error {
    match err {
        Error::ToolFailure { stderr, .. } => Error::LinkFailed {
            root: exe_out.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default(),
            stderr,
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_fingerprint_is_sensitive_to_flags() {
        let a = ToolCommand::new("gfortran", vec!["-c".into()]);
        let b = ToolCommand::new("gfortran", vec!["-c".into(), "-O2".into()]);
        assert_ne!(a.identity_fingerprint(), b.identity_fingerprint());
    }

    #[test]
    fn tool_kind_recognises_gfortran_and_ifort() {
        assert_eq!(ToolKind::from_program_name("gfortran"), ToolKind::Gfortran);
        assert_eq!(ToolKind::from_program_name("/usr/bin/gfortran-13"), ToolKind::Gfortran);
        assert_eq!(ToolKind::from_program_name("ifort"), ToolKind::Ifort);
        assert_eq!(ToolKind::from_program_name("gcc"), ToolKind::Gcc);
    }

    #[test]
    fn run_reports_tool_failure_on_nonzero_exit() {
        let cmd = ToolCommand::new("false", vec![]);
        let err = cmd.run(Stage::Compile, Path::new("x.f90")).unwrap_err();
        assert!(matches!(err, Error::ToolFailure { stage: Stage::Compile, .. }));
    }
}
