//! Drain statistics.

use serde::Serialize;

use super::Priority;

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainStats {
    /// Views whose update completed.
    pub updated: usize,

    /// Views left with work they could not do yet.
    pub postponed: usize,

    /// Views inserted during the pass.
    pub mounted: usize,

    /// Views found invisible and unmounted instead of updated.
    pub unmounted: usize,

    /// Most urgent priority that saw a completed update.
    pub priority: Option<Priority>,

    /// Nothing is pending after the pass.
    pub empty: bool,
}

impl DrainStats {
    /// Whether the pass changed anything.
    pub fn made_progress(&self) -> bool {
        self.updated > 0 || self.unmounted > 0
    }

    pub(crate) fn record_priority(&mut self, priority: Priority) {
        self.priority = Some(self.priority.map_or(priority, |p| p.min(priority)));
    }

    /// Add another pass's counters to these.
    pub fn absorb(&mut self, other: &DrainStats) {
        self.updated += other.updated;
        self.postponed += other.postponed;
        self.mounted += other.mounted;
        self.unmounted += other.unmounted;
        if let Some(priority) = other.priority {
            self.record_priority(priority);
        }
        self.empty = other.empty;
    }
}

/// Totals of a visibility check.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VisibilityStats {
    pub mounted: usize,
    pub unmounted: usize,
}

/// Totals of a whole render cycle, reported after it ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RenderStats {
    pub updated: usize,
    pub postponed: usize,
    pub mounted: usize,
    pub unmounted: usize,
    pub priority: Option<Priority>,

    /// Drain passes or frames the cycle took.
    pub batches: usize,
}

impl RenderStats {
    pub(crate) fn absorb(&mut self, drain: &DrainStats) {
        self.updated += drain.updated;
        self.postponed += drain.postponed;
        self.mounted += drain.mounted;
        self.unmounted += drain.unmounted;
        if let Some(priority) = drain.priority {
            self.priority = Some(self.priority.map_or(priority, |p| p.min(priority)));
        }
        self.batches += 1;
    }

    pub(crate) fn absorb_visibility(&mut self, check: &VisibilityStats) {
        self.mounted += check.mounted;
        self.unmounted += check.unmounted;
    }
}
