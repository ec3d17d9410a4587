//! The step runtime (§4.4): sequences steps in declared order and provides
//! `run_mp`, the parallel-fan-out helper every step uses internally.
//!
//! Steps communicate only through the [`crate::store::ArtefactStore`]; there
//! are no channels between steps (§9 "Concurrency primitives").

use crate::error::{Error, Result};
use crate::store::ArtefactStore;
use rayon::prelude::*;

/// A build step: reads and writes named collections in `store`.
pub trait Step {
    /// Human-readable name, used in diagnostics and metrics.
    fn name(&self) -> &str;

    fn run(&self, store: &mut ArtefactStore) -> Result<()>;
}

/// Runs `steps` strictly in declared order. The runtime never reorders
/// steps; a step declares its own input-collection overrides (§4.4) rather
/// than the runtime inferring a schedule.
pub fn run_steps<'a>(store: &mut ArtefactStore, steps: &[Box<dyn Step + 'a>]) -> Result<()> {
    for step in steps {
        let _span = tracing::info_span!("step", name = step.name()).entered();
        tracing::debug!("running step");
        step.run(store)?;
    }
    Ok(())
}

/// A [`Step`] backed by a closure, for callers (like [`crate::run`]) that
/// assemble their step sequence dynamically from already-configured tool
/// handles rather than declaring one named struct per stage.
struct FnStep<'a> {
    name: &'static str,
    func: Box<dyn Fn(&mut ArtefactStore) -> Result<()> + 'a>,
}

impl<'a> Step for FnStep<'a> {
    fn name(&self) -> &str {
        self.name
    }

    fn run(&self, store: &mut ArtefactStore) -> Result<()> {
        (self.func)(store)
    }
}

/// Wraps `func` as a boxed [`Step`] named `name`.
pub fn step<'a>(name: &'static str, func: impl Fn(&mut ArtefactStore) -> Result<()> + 'a) -> Box<dyn Step + 'a> {
    Box::new(FnStep { name, func: Box::new(func) })
}

/// Evaluates `func` over `items` concurrently on a fixed-size worker pool
/// (sized to the available CPU count, matching the teacher's
/// `rayon::ThreadPoolBuilder::new().num_threads(num_jobs)` pattern), and
/// collects results preserving input order.
///
/// Task-parallel, not data-parallel: each item is dispatched whole to one
/// worker. Errors from every worker are collected — not just the first —
/// and aggregated via [`Error::aggregate`]; all workers are drained before
/// the aggregate is returned to the caller (§4.4, §5 "Cancellation").
pub fn run_mp<T, R, F>(items: Vec<T>, func: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Send + Sync,
{
    let results: Vec<Result<R>> = items.into_par_iter().map(func).collect();
    Error::aggregate(results)
}

/// As [`run_mp`], but bounded to an explicit worker count rather than
/// rayon's global pool size — used by the compile scheduler, which sizes
/// its pool from `solc_jobs`-equivalent configuration rather than the
/// ambient default.
pub fn run_mp_bounded<T, R, F>(items: Vec<T>, num_jobs: usize, func: F) -> Result<Vec<R>>
where
    T: Send,
    R: Send,
    F: Fn(T) -> Result<R> + Send + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(num_jobs.max(1))
        .build()
        .map_err(|e| Error::config(e.to_string()))?;
    let results: Vec<Result<R>> = pool.install(|| items.into_par_iter().map(func).collect());
    Error::aggregate(results)
}

/// Default worker pool size: the available CPU count (§5).
pub fn default_job_count() -> usize {
    num_cpus::get()
}
