use serde::{Deserialize, Serialize};

/// Per-column rollup of cell states for one run
///
/// `queued + running + done + failed == total` holds after every recorded
/// transition; each `record_*` call moves exactly one cell between buckets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComputeProgress {
    pub total: usize,
    pub queued: usize,
    pub running: usize,
    pub done: usize,
    pub failed: usize,
}

impl ComputeProgress {
    /// `queued` cells waiting for dispatch plus `resolved` cells already done
    pub fn new(queued: usize, resolved: usize) -> Self {
        Self {
            total: queued + resolved,
            queued,
            running: 0,
            done: resolved,
            failed: 0,
        }
    }

    pub fn record_start(&mut self) {
        self.queued = self.queued.saturating_sub(1);
        self.running += 1;
    }

    pub fn record_success(&mut self, was_running: bool) {
        self.leave_pending(was_running);
        self.done += 1;
    }

    pub fn record_failure(&mut self, was_running: bool) {
        self.leave_pending(was_running);
        self.failed += 1;
    }

    /// A running cell returned to the queue by a stop
    pub fn record_interrupt(&mut self) {
        self.running = self.running.saturating_sub(1);
        self.queued += 1;
    }

    fn leave_pending(&mut self, was_running: bool) {
        if was_running {
            self.running = self.running.saturating_sub(1);
        } else {
            self.queued = self.queued.saturating_sub(1);
        }
    }

    pub fn completed(&self) -> usize {
        self.done + self.failed
    }

    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed())
    }

    /// Every cell of the run reached done or failed
    pub fn is_settled(&self) -> bool {
        self.completed() == self.total
    }

    pub fn is_consistent(&self) -> bool {
        self.queued + self.running + self.done + self.failed == self.total
    }
}
