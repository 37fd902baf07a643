//! Cooperative driver for [`RestoreTask`].
//!
//! A host with its own frame loop calls [`RestoreTask::step`] once per frame
//! with a fresh [`SliceBudget`]. Hosts without one use
//! [`run_to_completion`], which loops over slices back to back.

use std::time::{Duration, Instant};

use tessera_world::world::World;

use crate::error::SchematicError;
use crate::notify::NotificationSink;
use crate::restore::{RestoreReport, RestoreTask, StepOutcome};
use crate::session::SessionPreferences;

// ---------------------------------------------------------------------------
// SliceBudget
// ---------------------------------------------------------------------------

/// Wall-clock allowance for one slice of work.
#[derive(Debug, Clone, Copy)]
pub struct SliceBudget {
    started: Instant,
    budget: Duration,
}

impl SliceBudget {
    /// Start a slice now.
    pub fn start(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget,
        }
    }

    /// A slice that never runs out.
    pub fn unlimited() -> Self {
        Self::start(Duration::MAX)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Whether the slice has used up its allowance.
    pub fn exhausted(&self) -> bool {
        self.elapsed() >= self.budget
    }
}

// ---------------------------------------------------------------------------
// SliceDiagnostics
// ---------------------------------------------------------------------------

/// Timing across the slices of one restore.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SliceDiagnostics {
    /// Number of `step` calls.
    pub slices: usize,
    /// Wall-clock time of the longest slice.
    pub longest: Duration,
    /// Sum of all slices.
    pub total: Duration,
}

impl SliceDiagnostics {
    pub fn record(&mut self, elapsed: Duration) {
        self.slices += 1;
        self.longest = self.longest.max(elapsed);
        self.total += elapsed;
    }
}

// ---------------------------------------------------------------------------
// run_to_completion
// ---------------------------------------------------------------------------

/// Drive `task` slice by slice until it finishes or aborts.
///
/// Each slice gets the task's configured budget. Every step makes progress,
/// so this terminates even with a zero budget.
pub fn run_to_completion(
    task: &mut RestoreTask,
    world: &mut World,
    prefs: &SessionPreferences,
    sink: &mut dyn NotificationSink,
) -> Result<RestoreReport, SchematicError> {
    loop {
        let budget = SliceBudget::start(task.slice_budget());
        match task.step(world, prefs, sink, &budget) {
            StepOutcome::Pending(_) => {}
            StepOutcome::Finished(report) => return Ok(report),
            StepOutcome::Aborted(err) => return Err(err),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_exhausted_immediately() {
        assert!(SliceBudget::start(Duration::ZERO).exhausted());
        assert!(!SliceBudget::unlimited().exhausted());
    }

    #[test]
    fn diagnostics_track_longest_slice() {
        let mut diagnostics = SliceDiagnostics::default();
        diagnostics.record(Duration::from_millis(3));
        diagnostics.record(Duration::from_millis(9));
        diagnostics.record(Duration::from_millis(1));
        assert_eq!(diagnostics.slices, 3);
        assert_eq!(diagnostics.longest, Duration::from_millis(9));
        assert_eq!(diagnostics.total, Duration::from_millis(13));
    }
}
