use serde::Serialize;

/// Request accounting of a finished (or cancelled) run.
///
/// `completed` includes requests that ended in "no data" or a pacing violation;
/// those are also counted in `no_data` and `pacing_violations`. At the end of a run
/// `completed + failed + abandoned == grand_total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub grand_total: usize,
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    /// Never submitted because the run was cancelled.
    pub abandoned: usize,
    pub no_data: usize,
    pub pacing_violations: usize,
    /// Requests whose parameters were corrected before submission.
    pub dirty: usize,
    /// Times a request was parked behind an in-flight request for its instrument.
    pub deferrals: usize,
    pub cancelled: bool,
}

impl RunSummary {
    /// `submitted / grand_total * 100`; an empty run counts as done.
    pub fn percent(&self) -> f64 {
        if self.grand_total == 0 {
            100.0
        } else {
            self.submitted as f64 / self.grand_total as f64 * 100.0
        }
    }
}

/// Point-in-time view of a running scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub grand_total: usize,
    pub submitted: usize,
    pub completed: usize,
    pub failed: usize,
    pub in_flight: usize,
    pub deferred: usize,
    /// Everything not yet completed or failed: queued, deferred and in flight.
    pub pending: usize,
    pub percent: f64,
    pub cancelled: bool,
}

impl ProgressSnapshot {
    /// Every request is accounted for exactly once.
    pub fn is_conserved(&self) -> bool {
        self.completed + self.failed + self.pending == self.grand_total
    }
}
