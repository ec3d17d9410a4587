//! Minimal process entrypoint: collects [`fab::BuildConfig`] from the
//! environment variables spec.md §6 names, runs the pipeline once, and maps
//! the result to a process exit code (§6 "Exit codes"). Argument parsing,
//! config-file loading, and anything resembling a CLI are out of scope
//! (spec.md §1) — a caller that wants those builds them on top of
//! [`fab::BuildConfig`] directly.

use fab::config::{
    AnalyserConfig, BuildConfig, FortranCompileConfig, HousekeepingConfig, LinkConfig,
    PreprocessorConfig, ProjectPaths, ToolEnv,
};
use fab::error::{Error, Result};
use fab::ArtefactStore;

/// Reads `FAB_PROJECT` (the one thing not already covered by `ToolEnv` or
/// `default_workspace_root`) plus the few env toggles this binary needs to
/// do anything useful without argument parsing: `FAB_FIND_PROGRAMS`,
/// `FAB_ROOT_SYMBOLS` (comma-separated), `FAB_LIBRARY_MODE`, `FAB_ARCHIVE`.
fn config_from_env() -> Result<BuildConfig> {
    let project_label = std::env::var("FAB_PROJECT")
        .map_err(|_| Error::config("required environment variable FAB_PROJECT is unset"))?;

    let tools = ToolEnv::from_env()?;
    let paths = ProjectPaths::new(fab::config::default_workspace_root(), project_label);

    let find_programs = env_flag("FAB_FIND_PROGRAMS");
    let root_symbols: Vec<String> = std::env::var("FAB_ROOT_SYMBOLS")
        .map(|s| s.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default();

    Ok(BuildConfig {
        paths,
        tools,
        preprocessor: PreprocessorConfig::default(),
        analyser: AnalyserConfig { root_symbols, find_programs, ..AnalyserConfig::default() },
        fortran_compile: FortranCompileConfig::default(),
        link: LinkConfig { archive: env_flag("FAB_ARCHIVE"), ..LinkConfig::default() },
        housekeeping: HousekeepingConfig::default(),
        library_mode: env_flag("FAB_LIBRARY_MODE"),
    })
}

fn env_flag(name: &str) -> bool {
    matches!(std::env::var(name).as_deref(), Ok("1") | Ok("true"))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    std::process::exit(match run() {
        Ok(()) => 0,
        Err(err) => {
            eprint!("{}", fab::report::summarize(&err));
            err.exit_code()
        }
    });
}

fn run() -> Result<()> {
    let config = config_from_env()?;
    let mut build_store = ArtefactStore::new();
    fab::run(&config, &mut build_store)
}
