//! Staleness history — a bounded record of recently played groups.
//!
//! Occurrences are weighted by their slot in a window of `capacity` slots:
//! the newest slot counts `alpha`, the one before `alpha^2`, and so on, and
//! entries fill the window from its oldest end. A history that is not yet
//! full therefore weighs its newest entry `alpha^(capacity - len + 1)`. The
//! summed count is turned into a penalty that is subtracted from a
//! candidate's log-weight.

use std::collections::{BTreeMap, VecDeque};

/// Bounded recency queue of played groups.
#[derive(Debug, Clone)]
pub struct StaleHistory {
    entries: VecDeque<String>,
    capacity: usize,
    alpha: f64,
}

impl StaleHistory {
    pub fn new(capacity: usize, alpha: f64) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            alpha,
        }
    }

    /// Record a played group, evicting the oldest if at capacity.
    pub fn push(&mut self, group: &str) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(group.to_string());
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Played groups, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    /// Decayed occurrence count per group.
    pub fn counts(&self) -> BTreeMap<&str, f64> {
        let mut counts = BTreeMap::new();
        let empty_slots = self.capacity.saturating_sub(self.entries.len());
        let mut weight = self.alpha.powi(empty_slots as i32 + 1);
        for group in self.entries.iter().rev() {
            *counts.entry(group.as_str()).or_insert(0.0) += weight;
            weight *= self.alpha;
        }
        counts
    }

    /// Penalty for choosing `group` now. Zero for groups not in the history.
    pub fn penalty(&self, group: &str) -> f64 {
        self.counts().get(group).map_or(0.0, |&c| stale_penalty(c))
    }
}

/// Map a decayed count to a log-weight penalty.
///
/// Strictly increasing, with steps at counts above 3, 6 and 7.
pub fn stale_penalty(count: f64) -> f64 {
    let mut p = (count / 10.0).exp() - 1.0;
    if count > 3.0 {
        p += 0.5;
    }
    if count > 6.0 {
        p += 1.0;
    }
    if count > 7.0 {
        p += 2.0;
    }
    p
}
