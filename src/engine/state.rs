//! Mutable scheduler state, owned and written only by the engine.

use std::collections::BTreeMap;

use super::channel::{ChannelPool, LoopPair};
use super::clock::{BeatCursor, NextLoop, Phase};
use super::plan::LoopPlan;
use super::stale::StaleHistory;
use crate::backend::ChannelId;
use crate::config::EngineConfig;
use crate::track::{JingleId, LoopId, MelodyId};

/// A melody that is queued, playing, or retiring.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeMelody {
    pub melody: MelodyId,
    /// While queued: loop boundaries until its first loop starts.
    /// While playing: loops left before it retires.
    pub loops_left: i32,
    /// Index into `over_loops` of the loop now playing. `-1` while a melody
    /// that starts before its first loop is sounding ahead of it.
    pub loop_index: i32,
    pub channel: Option<ChannelId>,
}

/// A jingle that is queued or playing.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeJingle {
    pub jingle: JingleId,
    /// Bar boundaries until the bar it plays in.
    pub bars_left: i32,
    /// Beats before the end of that bar at which it starts.
    pub beats_before_bar: f64,
    pub channel: Option<ChannelId>,
}

/// Everything the engine mutates from tick to tick.
#[derive(Debug, Clone)]
pub struct SchedulerState {
    pub phase: Phase,
    pub playing: bool,
    pub current_loop: Option<LoopId>,
    pub next: NextLoop,
    /// Clock time at which the current loop started.
    pub start_time: f64,
    /// Beats per second of the current loop.
    pub bps: f64,
    /// Beats elapsed in the current loop.
    pub beats: f64,
    pub bar: BeatCursor,
    pub chord: BeatCursor,
    /// Playing melodies by instrument.
    pub melodies: BTreeMap<String, RuntimeMelody>,
    /// Queued melodies by instrument.
    pub queued_melodies: BTreeMap<String, RuntimeMelody>,
    /// Finished melodies whose channel is reclaimed after their kill time.
    pub retiring: Vec<RuntimeMelody>,
    pub plan: LoopPlan,
    pub jingles: Vec<RuntimeJingle>,
    pub queued_jingles: Vec<RuntimeJingle>,
    pub stale: StaleHistory,
    pub melody_channels: ChannelPool,
    pub jingle_channels: ChannelPool,
    pub loop_channels: LoopPair,
}

impl SchedulerState {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            phase: Phase::Uninitialized,
            playing: false,
            current_loop: None,
            next: NextLoop::NoCommitment,
            start_time: 0.0,
            bps: 0.0,
            beats: 0.0,
            bar: BeatCursor::default(),
            chord: BeatCursor::default(),
            melodies: BTreeMap::new(),
            queued_melodies: BTreeMap::new(),
            retiring: Vec::new(),
            plan: LoopPlan::new(),
            jingles: Vec::new(),
            queued_jingles: Vec::new(),
            stale: StaleHistory::new(config.stale_memory, config.stale_alpha),
            melody_channels: ChannelPool::melodies(config.melody_channels),
            jingle_channels: ChannelPool::jingles(config.jingle_channels),
            loop_channels: LoopPair::default(),
        }
    }

    /// Clear every queue and pool and return to [`Phase::Uninitialized`].
    ///
    /// The `playing` flag is left to the caller.
    pub fn clear(&mut self) {
        self.phase = Phase::Uninitialized;
        self.current_loop = None;
        self.next = NextLoop::NoCommitment;
        self.start_time = 0.0;
        self.bps = 0.0;
        self.beats = 0.0;
        self.bar.reset();
        self.chord.reset();
        self.melodies.clear();
        self.queued_melodies.clear();
        self.retiring.clear();
        self.plan.clear();
        self.jingles.clear();
        self.queued_jingles.clear();
        self.stale.clear();
        self.melody_channels.reset();
        self.jingle_channels.reset();
        self.loop_channels.reset();
    }
}
