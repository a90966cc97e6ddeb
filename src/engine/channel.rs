//! Channel pools — fixed sets of melody and jingle channels, plus the
//! alternating loop pair.

use std::collections::BTreeMap;

use crate::backend::ChannelId;
use crate::track::Clip;

/// What a busy channel is playing.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub clip: Clip,
    /// Start time on the playback clock, lead included.
    pub start_time: f64,
}

/// A fixed-capacity free/busy channel pool.
///
/// Every channel is in exactly one of the two lists.
#[derive(Debug, Clone)]
pub struct ChannelPool {
    make: fn(usize) -> ChannelId,
    capacity: usize,
    free: Vec<usize>,
    busy: BTreeMap<usize, Reservation>,
}

impl ChannelPool {
    pub fn melodies(capacity: usize) -> Self {
        Self::new(ChannelId::Melody, capacity)
    }

    pub fn jingles(capacity: usize) -> Self {
        Self::new(ChannelId::Jingle, capacity)
    }

    fn new(make: fn(usize) -> ChannelId, capacity: usize) -> Self {
        Self {
            make,
            capacity,
            free: (0..capacity).rev().collect(),
            busy: BTreeMap::new(),
        }
    }

    /// Reserve a free channel for `clip` starting at `start_time`.
    ///
    /// Returns `None` when the pool is exhausted.
    pub fn acquire(&mut self, clip: &Clip, start_time: f64) -> Option<ChannelId> {
        let index = self.free.pop()?;
        self.busy.insert(
            index,
            Reservation {
                clip: clip.clone(),
                start_time,
            },
        );
        Some((self.make)(index))
    }

    /// Return a busy channel to the free list.
    ///
    /// Returns `false`, changing nothing, if the channel is not busy in this pool.
    pub fn release(&mut self, channel: ChannelId) -> bool {
        let released = self
            .index_of(channel)
            .filter(|index| self.busy.remove(index).is_some());
        let Some(index) = released else {
            log::warn!("release of idle channel {channel:?} ignored");
            return false;
        };
        self.free.push(index);
        true
    }

    /// Free every channel.
    pub fn reset(&mut self) {
        self.busy.clear();
        self.free = (0..self.capacity).rev().collect();
    }

    pub fn reservation(&self, channel: ChannelId) -> Option<&Reservation> {
        self.index_of(channel).and_then(|i| self.busy.get(&i))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn busy_count(&self) -> usize {
        self.busy.len()
    }

    pub fn is_busy(&self, channel: ChannelId) -> bool {
        self.reservation(channel).is_some()
    }

    fn index_of(&self, channel: ChannelId) -> Option<usize> {
        let index = match channel {
            ChannelId::Loop(i) | ChannelId::Melody(i) | ChannelId::Jingle(i) => i,
        };
        (index < self.capacity && (self.make)(index) == channel).then_some(index)
    }
}

/// Two loop channels used in turn, so a new loop can start while the
/// previous one rings out.
#[derive(Debug, Clone, Default)]
pub struct LoopPair {
    next: usize,
}

impl LoopPair {
    /// The channel for the next loop; flips on every call.
    pub fn take(&mut self) -> ChannelId {
        let channel = ChannelId::Loop(self.next);
        self.next = 1 - self.next;
        channel
    }

    pub fn reset(&mut self) {
        self.next = 0;
    }
}
