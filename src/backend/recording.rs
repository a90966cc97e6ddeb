//! Recording backend — a simulated audio system driven by a [`SampleClock`].
//!
//! Keeps every scheduling call instead of playing it, so engine runs can be
//! inspected in tests and printed by the CLI.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::clock::SampleClock;
use super::{Bus, ChannelId, PlaybackBackend};
use crate::track::Clip;

/// One `schedule` call as seen by the backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledClip {
    pub channel: ChannelId,
    pub clip: String,
    pub start_time: f64,
    /// Clock time at which the call was made.
    pub issued_at: f64,
}

/// A backend that records instead of playing.
#[derive(Debug, Clone)]
pub struct RecordingBackend {
    clock: SampleClock,
    scheduled: Vec<ScheduledClip>,
    volumes: BTreeMap<Bus, f32>,
    disabled: BTreeSet<ChannelId>,
    stop_count: usize,
}

impl RecordingBackend {
    /// Create a backend whose clock counts frames at `sample_rate`.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            clock: SampleClock::new(sample_rate),
            scheduled: Vec::new(),
            volumes: BTreeMap::new(),
            disabled: BTreeSet::new(),
            stop_count: 0,
        }
    }

    /// Move the clock forward.
    pub fn advance(&mut self, secs: f64) {
        self.clock.advance_by_seconds(secs);
    }

    /// Every clip scheduled so far, oldest first.
    pub fn scheduled(&self) -> &[ScheduledClip] {
        &self.scheduled
    }

    /// Scheduled clips on channels of one bus.
    pub fn scheduled_on(&self, bus: Bus) -> impl Iterator<Item = &ScheduledClip> {
        self.scheduled.iter().filter(move |s| s.channel.bus() == bus)
    }

    /// Remove and return the recorded calls.
    pub fn take_scheduled(&mut self) -> Vec<ScheduledClip> {
        std::mem::take(&mut self.scheduled)
    }

    pub fn volume(&self, bus: Bus) -> Option<f32> {
        self.volumes.get(&bus).copied()
    }

    pub fn is_enabled(&self, channel: ChannelId) -> bool {
        !self.disabled.contains(&channel)
    }

    /// Number of `stop_all` calls.
    pub fn stop_count(&self) -> usize {
        self.stop_count
    }
}

impl Default for RecordingBackend {
    fn default() -> Self {
        Self::new(48_000)
    }
}

impl PlaybackBackend for RecordingBackend {
    fn now(&self) -> f64 {
        self.clock.seconds()
    }

    fn schedule(&mut self, channel: ChannelId, clip: &Clip, start_time: f64) {
        self.scheduled.push(ScheduledClip {
            channel,
            clip: clip.path.clone(),
            start_time,
            issued_at: self.clock.seconds(),
        });
    }

    fn stop_all(&mut self) {
        self.stop_count += 1;
    }

    fn set_enabled(&mut self, channel: ChannelId, enabled: bool) {
        if enabled {
            self.disabled.remove(&channel);
        } else {
            self.disabled.insert(channel);
        }
    }

    fn set_volume(&mut self, bus: Bus, volume: f32) {
        self.volumes.insert(bus, volume);
    }
}
