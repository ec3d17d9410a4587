//! Step timing and prebuild cache hit/miss counters.
//!
//! Grounded on the teacher's `let start = Instant::now(); ...
//! start.elapsed()` bracketing around `compiler.compile()` in
//! `compile/project.rs`, generalised into a reusable per-step recorder
//! rather than a single inline timer, since this system has several steps
//! worth tracking independently ([`crate::runtime::run_steps`] runs them in
//! sequence and each one's cache behaviour is a useful diagnostic on its
//! own).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cache hit/miss counters and cumulative wall time for one named step.
#[derive(Debug, Default)]
pub struct StepMetrics {
    name: String,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    elapsed: Mutex<Duration>,
}

impl StepMetrics {
    fn new(name: &str) -> Self {
        Self { name: name.to_string(), ..Default::default() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_duration(&self, d: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap();
        *elapsed += d;
    }

    pub fn hits(&self) -> u64 {
        self.cache_hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.cache_misses.load(Ordering::Relaxed)
    }

    pub fn duration(&self) -> Duration {
        *self.elapsed.lock().unwrap()
    }
}

/// The whole run's metrics, keyed by step name (§4.4 step names: the
/// same strings `Step::name` returns).
#[derive(Debug, Default)]
pub struct BuildMetrics {
    steps: Mutex<BTreeMap<String, Arc<StepMetrics>>>,
}

impl BuildMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the counter set for `name`, creating it on first use.
    pub fn step(&self, name: &str) -> Arc<StepMetrics> {
        let mut steps = self.steps.lock().unwrap();
        steps.entry(name.to_string()).or_insert_with(|| Arc::new(StepMetrics::new(name))).clone()
    }

    /// Runs `f`, recording its wall time against `name`'s counters.
    pub fn time_step<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let metrics = self.step(name);
        let start = Instant::now();
        let result = f();
        metrics.add_duration(start.elapsed());
        result
    }

    /// One line per step: name, hit/miss counts, elapsed time, in step-name
    /// order (matching the Determinism property: diagnostics are sorted at
    /// every observable boundary).
    pub fn summary(&self) -> String {
        let steps = self.steps.lock().unwrap();
        let mut out = String::new();
        for metrics in steps.values() {
            out.push_str(&format!(
                "{}: {} hit(s), {} miss(es), {:.3}s\n",
                metrics.name(),
                metrics.hits(),
                metrics.misses(),
                metrics.duration().as_secs_f64()
            ));
        }
        out
    }
}
