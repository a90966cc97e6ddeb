//! Engine phases, the next-loop commitment, and bar/chord cursors.

use serde::Serialize;

use crate::track::LoopId;

/// Lifecycle of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Nothing scheduled yet.
    Uninitialized,
    /// Counting ticks before the first loop is committed.
    Warming { ticks: u32 },
    /// Loops are being chosen and played.
    Running,
}

/// The loop that will follow the current one, if already decided.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum NextLoop {
    #[default]
    NoCommitment,
    Committed {
        loop_id: LoopId,
        start_time: f64,
        /// A later decision must carry a strictly higher priority to replace this one.
        priority: u32,
    },
}

impl NextLoop {
    /// Whether a decision at `priority` may replace the current commitment.
    pub fn can_commit(&self, priority: u32) -> bool {
        match self {
            NextLoop::NoCommitment => true,
            NextLoop::Committed { priority: held, .. } => *held < priority,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, NextLoop::Committed { .. })
    }

    pub fn loop_id(&self) -> Option<LoopId> {
        match self {
            NextLoop::NoCommitment => None,
            NextLoop::Committed { loop_id, .. } => Some(*loop_id),
        }
    }

    pub fn start_time(&self) -> Option<f64> {
        match self {
            NextLoop::NoCommitment => None,
            NextLoop::Committed { start_time, .. } => Some(*start_time),
        }
    }
}

/// Position within a sequence of beat lengths (bars or chord terms).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BeatCursor {
    pub index: usize,
    /// Beat, relative to the loop start, at which entry `index` began.
    pub start: f64,
}

impl BeatCursor {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Step to the next entry if `beats` has passed the end of the current one.
    ///
    /// Moves at most one entry per call, so a stalled clock catches up over
    /// several ticks. The last entry is never left.
    pub fn advance(&mut self, count: usize, current_len: f64, beats: f64) -> bool {
        if self.index + 1 < count && beats - self.start > current_len {
            self.start += current_len;
            self.index += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_must_be_strictly_greater() {
        let none = NextLoop::NoCommitment;
        assert!(none.can_commit(0));
        assert!(!none.is_committed());
        assert_eq!(none.start_time(), None);

        let held = NextLoop::Committed {
            loop_id: LoopId(3),
            start_time: 8.0,
            priority: 1,
        };
        assert!(!held.can_commit(1));
        assert!(held.can_commit(2));
        assert_eq!(held.loop_id(), Some(LoopId(3)));
        assert_eq!(held.start_time(), Some(8.0));
    }

    #[test]
    fn cursor_advances_past_entry_end() {
        let lengths = [4.0, 4.0, 2.0];
        let mut c = BeatCursor::default();
        assert!(!c.advance(lengths.len(), lengths[c.index], 4.0));
        assert!(c.advance(lengths.len(), lengths[c.index], 4.01));
        assert_eq!(c.index, 1);
        assert_eq!(c.start, 4.0);
    }

    #[test]
    fn cursor_moves_one_entry_per_call() {
        let lengths = [1.0, 1.0, 1.0, 1.0];
        let mut c = BeatCursor::default();
        assert!(c.advance(lengths.len(), lengths[c.index], 3.5));
        assert_eq!(c.index, 1);
        assert!(c.advance(lengths.len(), lengths[c.index], 3.5));
        assert!(c.advance(lengths.len(), lengths[c.index], 3.5));
        assert_eq!(c.index, 3);
        // never leaves the last entry
        assert!(!c.advance(lengths.len(), lengths[c.index], 100.0));
        c.reset();
        assert_eq!(c, BeatCursor::default());
    }
}
