//! Lookahead plan — the loop groups that queued and playing melodies need.
//!
//! The plan is one ordered sequence split in two: a committed prefix, whose
//! head is the loop currently playing, and a provisional suffix inferred from
//! queued melodies. Provisional entries are promoted as they become needed.

use std::collections::VecDeque;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopPlan {
    committed: VecDeque<String>,
    provisional: VecDeque<String>,
}

impl LoopPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total planned groups.
    pub fn len(&self) -> usize {
        self.committed.len() + self.provisional.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    pub fn provisional_len(&self) -> usize {
        self.provisional.len()
    }

    /// Group at lookahead index `i` (0 = the playing loop).
    pub fn get(&self, i: usize) -> Option<&str> {
        if i < self.committed.len() {
            self.committed.get(i).map(String::as_str)
        } else {
            self.provisional
                .get(i - self.committed.len())
                .map(String::as_str)
        }
    }

    /// All planned groups in order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.committed
            .iter()
            .chain(self.provisional.iter())
            .map(String::as_str)
    }

    pub fn committed(&self) -> impl Iterator<Item = &str> {
        self.committed.iter().map(String::as_str)
    }

    pub fn provisional(&self) -> impl Iterator<Item = &str> {
        self.provisional.iter().map(String::as_str)
    }

    pub fn push_committed(&mut self, group: &str) {
        self.committed.push_back(group.to_string());
    }

    /// Overwrite the group at lookahead index `i`. Returns `false` past the end.
    pub fn replace(&mut self, i: usize, group: &str) -> bool {
        let committed = self.committed.len();
        let slot = if i < committed {
            self.committed.get_mut(i)
        } else {
            self.provisional.get_mut(i - committed)
        };
        match slot {
            Some(entry) => {
                *entry = group.to_string();
                true
            }
            None => false,
        }
    }

    /// Drop the head once its loop has finished.
    pub fn consume_head(&mut self) -> Option<String> {
        self.committed.pop_front()
    }

    /// Move the first provisional group into the committed prefix.
    pub fn promote(&mut self) -> bool {
        match self.provisional.pop_front() {
            Some(group) => {
                self.committed.push_back(group);
                true
            }
            None => false,
        }
    }

    /// Promote until the committed prefix holds `n` groups or nothing is left.
    pub fn promote_until(&mut self, n: usize) {
        while self.committed.len() < n && self.promote() {}
    }

    /// Whether `groups` agrees with the plan from index `start` onward.
    ///
    /// Entries past the plan's end are unconstrained. An empty plan, or a
    /// start past its end (which would leave a gap), never matches.
    pub fn matches(&self, groups: &[String], start: usize) -> bool {
        if self.is_empty() || start > self.len() {
            return false;
        }
        groups
            .iter()
            .enumerate()
            .take_while(|(i, _)| start + i < self.len())
            .all(|(i, g)| self.get(start + i) == Some(g.as_str()))
    }

    /// Append the part of `groups`, placed at `start`, that runs past the plan's end.
    pub fn extend_for(&mut self, groups: &[String], start: usize) {
        let known = self.len().saturating_sub(start);
        for group in groups.iter().skip(known) {
            self.provisional.push_back(group.clone());
        }
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.provisional.clear();
    }
}
