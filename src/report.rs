//! Build-event reporting: a scoped, swappable [`Reporter`] each step invokes
//! around a tool spawn, mirroring the teacher's `report::compiler_spawn`/
//! `compiler_success` call sites around `compiler.compile()` in
//! `compile/project.rs`, generalised from "solc version + dirty sources" to
//! this system's stage/path/duration shape.
//!
//! Kept separate from `tracing` (§11): `tracing` is for structured log
//! lines a human reads in a terminal; a `Reporter` is for a caller (a
//! progress bar, a test assertion, a metrics sink) that wants to *observe*
//! build events programmatically without scraping log output.

use crate::error::Stage;
use std::cell::RefCell;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Observes tool invocations as steps make them. All methods have a default
/// no-op body so implementers only override what they care about.
pub trait Reporter: Send + Sync + fmt::Debug {
    fn on_spawn(&self, _stage: Stage, _path: &Path) {}
    fn on_success(&self, _stage: Stage, _path: &Path, _elapsed: Duration) {}
    fn on_failure(&self, _stage: Stage, _path: &Path, _stderr: &str) {}
}

/// The reporter installed when nothing else has been scoped.
#[derive(Clone, Debug, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

thread_local! {
    static CURRENT: RefCell<Arc<dyn Reporter>> = RefCell::new(Arc::new(NoopReporter));
}

/// Reads the reporter installed on the current thread.
///
/// Used by the compile scheduler before handing work to a rayon pool: the
/// pool's worker threads each start with a fresh `thread_local`, so the
/// value must be captured on the spawning thread and re-installed per
/// worker via [`set_scoped`] (exactly the teacher's `compile_parallel`
/// pattern — read the comment there for why).
pub fn get_default<T>(f: impl FnOnce(&Arc<dyn Reporter>) -> T) -> T {
    CURRENT.with(|r| f(&r.borrow()))
}

/// Installs `reporter` as current for this thread until the returned guard
/// drops, at which point the previous reporter is restored.
pub fn set_scoped(reporter: &Arc<dyn Reporter>) -> ScopedReporter {
    let previous = CURRENT.with(|r| std::mem::replace(&mut *r.borrow_mut(), reporter.clone()));
    ScopedReporter { previous: Some(previous) }
}

pub struct ScopedReporter {
    previous: Option<Arc<dyn Reporter>>,
}

impl Drop for ScopedReporter {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT.with(|r| *r.borrow_mut() = previous);
        }
    }
}

pub fn tool_spawn(stage: Stage, path: &Path) {
    get_default(|r| r.on_spawn(stage, path));
}

pub fn tool_success(stage: Stage, path: &Path, elapsed: Duration) {
    get_default(|r| r.on_success(stage, path, elapsed));
}

pub fn tool_failure(stage: Stage, path: &Path, stderr: &str) {
    get_default(|r| r.on_failure(stage, path, stderr));
}

/// A human-readable, multi-line summary of an [`crate::error::Error`],
/// expanding `Aggregate`/`BlockedBy` into an indented tree rather than the
/// single-line `Display` impl error.rs uses for `{e}` interpolation.
pub fn summarize(err: &crate::error::Error) -> String {
    fn indent(level: usize) -> String {
        "  ".repeat(level)
    }

    fn write_one(out: &mut String, err: &crate::error::Error, level: usize) {
        match err {
            crate::error::Error::Aggregate(errs) => {
                out.push_str(&format!("{}{} failure(s):\n", indent(level), errs.len()));
                for e in errs {
                    write_one(out, e, level + 1);
                }
            }
            other => {
                out.push_str(&indent(level));
                out.push_str(&other.to_string());
                out.push('\n');
            }
        }
    }

    let mut out = String::new();
    write_one(&mut out, err, 0);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct RecordingReporter {
        spawns: AtomicUsize,
        successes: Mutex<Vec<String>>,
    }

    impl Reporter for RecordingReporter {
        fn on_spawn(&self, _stage: Stage, _path: &Path) {
            self.spawns.fetch_add(1, Ordering::SeqCst);
        }
        fn on_success(&self, _stage: Stage, path: &Path, _elapsed: Duration) {
            self.successes.lock().unwrap().push(path.display().to_string());
        }
    }

    #[test]
    fn scoped_reporter_receives_events_and_restores_on_drop() {
        let concrete = Arc::new(RecordingReporter::default());
        let as_trait_object: Arc<dyn Reporter> = concrete.clone();
        {
            let _guard = set_scoped(&as_trait_object);
            tool_spawn(Stage::Compile, Path::new("a.f90"));
            tool_success(Stage::Compile, Path::new("a.f90"), Duration::from_millis(5));
        }
        // after the guard drops, the default (noop) reporter is back, so a
        // spawn issued now must not be recorded.
        tool_spawn(Stage::Compile, Path::new("b.f90"));

        assert_eq!(concrete.spawns.load(Ordering::SeqCst), 1);
        assert_eq!(concrete.successes.lock().unwrap().len(), 1);
    }

    #[test]
    fn aggregate_summary_nests_by_indent() {
        let err = crate::error::Error::Aggregate(vec![
            crate::error::Error::RootNotFound("prog_a".into()),
            crate::error::Error::CompileStalled(vec![std::path::PathBuf::from("stalled.f90")]),
        ]);
        let summary = summarize(&err);
        assert!(summary.starts_with("2 failure(s):"));
        assert!(summary.contains("no file defines root symbol"));
    }
}
