use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    pub units_checked: AtomicUsize,
    pub blocks_built: AtomicUsize,
    pub fixpoint_iterations: AtomicUsize,
    pub fixpoint_bailouts: AtomicUsize,
    pub expressions_evaluated: AtomicUsize,
    pub narrowing_branches: AtomicUsize,
    pub chain_invalidations: AtomicUsize,
    pub return_inferences: AtomicUsize,
    pub diagnostics_reported: AtomicUsize,
    pub phase_times: Mutex<HashMap<&'static str, Vec<Duration>>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self) {
        self.units_checked.store(0, Ordering::SeqCst);
        self.blocks_built.store(0, Ordering::SeqCst);
        self.fixpoint_iterations.store(0, Ordering::SeqCst);
        self.fixpoint_bailouts.store(0, Ordering::SeqCst);
        self.expressions_evaluated.store(0, Ordering::SeqCst);
        self.narrowing_branches.store(0, Ordering::SeqCst);
        self.chain_invalidations.store(0, Ordering::SeqCst);
        self.return_inferences.store(0, Ordering::SeqCst);
        self.diagnostics_reported.store(0, Ordering::SeqCst);
        if let Ok(mut times) = self.phase_times.lock() {
            times.clear();
        }
    }

    pub fn record_unit(&self) {
        self.units_checked.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_blocks(&self, count: usize) {
        self.blocks_built.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_fixpoint(&self, iterations: usize, converged: bool) {
        self.fixpoint_iterations
            .fetch_add(iterations, Ordering::SeqCst);
        if !converged {
            self.fixpoint_bailouts.fetch_add(1, Ordering::SeqCst);
        }
    }

    pub fn record_expression(&self) {
        self.expressions_evaluated.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_narrowing_branch(&self) {
        self.narrowing_branches.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_chain_invalidation(&self) {
        self.chain_invalidations.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_return_inference(&self) {
        self.return_inferences.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_diagnostics(&self, count: usize) {
        self.diagnostics_reported.fetch_add(count, Ordering::SeqCst);
    }

    pub fn record_phase_time(&self, phase: &'static str, duration: Duration) {
        if let Ok(mut times) = self.phase_times.lock() {
            times.entry(phase).or_default().push(duration);
        }
    }

    /// Total time spent in `phase` across all recorded runs
    pub fn phase_total(&self, phase: &str) -> Duration {
        self.phase_times
            .lock()
            .ok()
            .and_then(|times| times.get(phase).map(|d| d.iter().sum()))
            .unwrap_or_default()
    }

    pub fn get_summary(&self) -> MetricSummary {
        let units = self.units_checked.load(Ordering::SeqCst);
        let iterations = self.fixpoint_iterations.load(Ordering::SeqCst);

        MetricSummary {
            units_checked: units,
            blocks_built: self.blocks_built.load(Ordering::SeqCst),
            fixpoint_iterations: iterations,
            iterations_per_unit: if units > 0 {
                iterations as f64 / units as f64
            } else {
                0.0
            },
            fixpoint_bailouts: self.fixpoint_bailouts.load(Ordering::SeqCst),
            expressions_evaluated: self.expressions_evaluated.load(Ordering::SeqCst),
            narrowing_branches: self.narrowing_branches.load(Ordering::SeqCst),
            chain_invalidations: self.chain_invalidations.load(Ordering::SeqCst),
            return_inferences: self.return_inferences.load(Ordering::SeqCst),
            diagnostics_reported: self.diagnostics_reported.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug)]
pub struct MetricSummary {
    pub units_checked: usize,
    pub blocks_built: usize,
    pub fixpoint_iterations: usize,
    pub iterations_per_unit: f64,
    pub fixpoint_bailouts: usize,
    pub expressions_evaluated: usize,
    pub narrowing_branches: usize,
    pub chain_invalidations: usize,
    pub return_inferences: usize,
    pub diagnostics_reported: usize,
}

impl MetricSummary {
    pub fn format(&self) -> String {
        format!(
            r#"=== Checker Metrics ===
Units Checked: {}
Blocks Built: {}
Fixpoint Iterations: {} ({:.1} per unit)
Fixpoint Bailouts: {}
Expressions Evaluated: {}
Narrowing Branches: {}
Chain Invalidations: {}
Return Inferences: {}
Diagnostics Reported: {}"#,
            self.units_checked,
            self.blocks_built,
            self.fixpoint_iterations,
            self.iterations_per_unit,
            self.fixpoint_bailouts,
            self.expressions_evaluated,
            self.narrowing_branches,
            self.chain_invalidations,
            self.return_inferences,
            self.diagnostics_reported
        )
    }
}
