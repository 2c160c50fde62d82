//! Named batch tracking.
//!
//! The model layer brackets compound operations with named batches. Some
//! batch names defer work: while one is open, flushing updates or re-sorting
//! paint order is postponed and runs once when the last of them closes.

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::warn;

/// Work that can be held back by open batches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeferredAction {
    /// Drain the pending updates.
    FlushUpdates,

    /// Re-sort the paint order.
    Resort,
}

#[derive(Debug, Clone)]
struct Category {
    action: DeferredAction,
    names: Vec<String>,
    armed: bool,
}

/// Per-name batch counters plus the actions they defer.
#[derive(Debug, Clone, Default)]
pub struct BatchTracker {
    counts: IndexMap<String, usize>,
    categories: Vec<Category>,
}

impl BatchTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make batches named in `names` defer `action`.
    pub fn with_category<I, S>(mut self, action: DeferredAction, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.categories.push(Category {
            action,
            names: names.into_iter().map(Into::into).collect(),
            armed: false,
        });
        self
    }

    /// Open a batch. Returns the new depth of `name`.
    pub fn start(&mut self, name: &str) -> usize {
        let count = self.counts.entry(name.to_owned()).or_insert(0);
        *count += 1;
        *count
    }

    /// Close a batch, returning the deferred actions that are now due.
    ///
    /// Closing a batch that is not open is logged and ignored.
    pub fn stop(&mut self, name: &str) -> SmallVec<[DeferredAction; 2]> {
        let mut due = SmallVec::new();
        match self.counts.get_mut(name) {
            Some(count) if *count > 1 => {
                *count -= 1;
                return due;
            }
            Some(_) => {
                self.counts.shift_remove(name);
            }
            None => {
                warn!(batch = name, "stopped a batch that was not started");
                return due;
            }
        }

        let counts = &self.counts;
        for category in &mut self.categories {
            let closes = category.names.iter().any(|n| n == name);
            let still_open = category.names.iter().any(|n| counts.contains_key(n));
            if closes && category.armed && !still_open {
                category.armed = false;
                due.push(category.action);
            }
        }
        due
    }

    /// Hold `action` back if one of its batches is open. Returns whether it
    /// was deferred.
    pub fn defer(&mut self, action: DeferredAction) -> bool {
        let mut deferred = false;
        for category in self.categories.iter_mut().filter(|c| c.action == action) {
            if category.names.iter().any(|n| self.counts.contains_key(n)) {
                category.armed = true;
                deferred = true;
            }
        }
        deferred
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.counts.contains_key(name)
    }

    /// Whether any of `names` is open. An empty slice asks about any batch.
    pub fn has_active<S: AsRef<str>>(&self, names: &[S]) -> bool {
        if names.is_empty() {
            return !self.counts.is_empty();
        }
        names.iter().any(|name| self.is_active(name.as_ref()))
    }

    pub fn depth(&self, name: &str) -> usize {
        self.counts.get(name).copied().unwrap_or(0)
    }

    /// Open batch names, oldest first.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.counts.keys().map(String::as_str)
    }

    pub fn clear(&mut self) {
        self.counts.clear();
        for category in &mut self.categories {
            category.armed = false;
        }
    }
}
