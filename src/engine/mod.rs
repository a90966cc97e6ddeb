//! Music engine — the per-tick scheduling state machine.
//!
//! [`MusicEngine`] owns a compiled [`RuntimeTrack`], the mutable
//! [`SchedulerState`], a seeded RNG, and the [`PlaybackBackend`] it schedules
//! onto. The caller drives it by calling [`MusicEngine::tick`] regularly
//! (typically once per frame). Every decision is committed as a future time
//! on the backend clock, so uneven tick spacing never produces gaps.
//!
//! Per tick, once running:
//! 1. elapsed beats are recomputed from the backend clock;
//! 2. a committed next loop whose start time has passed becomes current;
//! 3. bar and chord cursors advance (at most one step each);
//! 4. finished jingles release their channels;
//! 5. due melodies and jingles are started on free channels;
//! 6. in the last bars of a loop, the next loop is chosen.

pub mod channel;
pub mod clock;
pub mod jingle;
pub mod melody;
pub mod plan;
pub mod selector;
pub mod stale;
pub mod state;
pub mod status;
pub mod weighted;

pub use channel::{ChannelPool, LoopPair, Reservation};
pub use clock::{BeatCursor, NextLoop, Phase};
pub use plan::LoopPlan;
pub use selector::{loop_candidates, loop_weight};
pub use stale::{stale_penalty, StaleHistory};
pub use state::{RuntimeJingle, RuntimeMelody, SchedulerState};
pub use status::{EngineStatus, MelodyStatus};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::backend::{Bus, PlaybackBackend};
use crate::config::{BusVolumes, EngineConfig};
use crate::error::EngineError;
use crate::track::RuntimeTrack;

/// The adaptive music scheduler.
pub struct MusicEngine<B: PlaybackBackend> {
    track: RuntimeTrack,
    state: SchedulerState,
    backend: B,
    rng: ChaCha8Rng,
    config: EngineConfig,
    volumes: BusVolumes,
}

impl<B: PlaybackBackend> MusicEngine<B> {
    /// Create a stopped engine. Call [`start`](Self::start) to begin warming up.
    pub fn new(track: RuntimeTrack, backend: B, config: EngineConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        let mut engine = Self {
            state: SchedulerState::new(&config),
            volumes: config.volumes,
            track,
            backend,
            rng,
            config,
        };
        engine.apply_volumes();
        engine
    }

    pub fn track(&self) -> &RuntimeTrack {
        &self.track
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn is_playing(&self) -> bool {
        self.state.playing
    }

    /// Begin (or resume) ticking.
    pub fn start(&mut self) {
        self.state.playing = true;
    }

    /// Silence everything, clear all state, and stop ticking.
    pub fn stop(&mut self) {
        self.silence();
        self.state.playing = false;
    }

    /// Silence everything and clear all state. A playing engine warms up again.
    pub fn reset(&mut self) {
        self.silence();
    }

    /// Replace the track. Implies [`stop`](Self::stop).
    pub fn change_track(&mut self, track: RuntimeTrack) {
        self.stop();
        self.track = track;
    }

    pub fn change_track_and_start(&mut self, track: RuntimeTrack) {
        self.change_track(track);
        self.start();
    }

    pub fn volumes(&self) -> BusVolumes {
        self.volumes
    }

    pub fn set_loop_volume(&mut self, volume: f32) {
        self.volumes.loops = volume;
        self.backend.set_volume(Bus::Loops, volume);
    }

    pub fn set_melody_volume(&mut self, volume: f32) {
        self.volumes.melodies = volume;
        self.backend.set_volume(Bus::Melodies, volume);
    }

    pub fn set_jingle_volume(&mut self, volume: f32) {
        self.volumes.jingles = volume;
        self.backend.set_volume(Bus::Jingles, volume);
    }

    fn apply_volumes(&mut self) {
        self.backend.set_volume(Bus::Loops, self.volumes.loops);
        self.backend.set_volume(Bus::Melodies, self.volumes.melodies);
        self.backend.set_volume(Bus::Jingles, self.volumes.jingles);
    }

    fn silence(&mut self) {
        self.backend.stop_all();
        self.state.clear();
        self.apply_volumes();
        log::info!("engine reset");
    }

    /// Advance the scheduler to the backend's current clock time.
    ///
    /// Errors only when compiled data breaks an invariant the compiler could
    /// not check, such as a plan that no loop can follow.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        if !self.state.playing {
            return Ok(());
        }
        let now = self.backend.now();
        match self.state.phase {
            Phase::Uninitialized => self.warm_up(now, 1),
            Phase::Warming { ticks } => self.warm_up(now, ticks + 1),
            Phase::Running => self.run(now)?,
        }
        Ok(())
    }

    fn warm_up(&mut self, now: f64, ticks: u32) {
        if ticks < self.config.warmup_ticks {
            self.state.phase = Phase::Warming { ticks };
            return;
        }
        self.state.start_time = now + self.config.start_buffer;
        let start_group = self.track.start_group().to_string();
        if self.commit_group(1, &start_group, None) {
            log::info!(
                "first loop `{}` committed for {:.3}s",
                start_group,
                self.state.start_time
            );
        }
        self.state.phase = Phase::Running;
    }

    fn run(&mut self, now: f64) -> Result<(), EngineError> {
        if let NextLoop::Committed { start_time, .. } = self.state.next {
            if now > start_time {
                self.play_next();
                self.on_loop_boundary();
            }
        }
        let Some(current) = self.state.current_loop else {
            // The first loop is committed but has not started yet.
            return Ok(());
        };

        let (bar_advanced, chord_advanced) = {
            let lp = self.track.get_loop(current);
            let state = &mut self.state;
            state.beats = (now - state.start_time) * state.bps;
            let bar = state
                .bar
                .advance(lp.bars.len(), lp.bars[state.bar.index], state.beats);
            let chord = state.chord.advance(
                lp.chords.len(),
                lp.chords[state.chord.index].beats,
                state.beats,
            );
            (bar, chord)
        };
        if bar_advanced {
            self.on_bar_boundary();
        }
        if chord_advanced {
            log::debug!("chord {} at beat {:.2}", self.state.chord.index, self.state.beats);
        }

        self.retire_jingles(now);
        self.fire_due_melodies(now);
        self.fire_due_jingles(now);
        self.choose_next_if_due()
    }

    /// Make the committed next loop current and schedule its clip.
    fn play_next(&mut self) {
        let NextLoop::Committed {
            loop_id,
            start_time,
            ..
        } = self.state.next
        else {
            return;
        };
        let channel = self.state.loop_channels.take();
        let lp = self.track.get_loop(loop_id);
        self.backend
            .schedule(channel, &lp.clip, start_time + self.config.schedule_lead);
        log::info!("loop `{}` ({}) at {:.3}s", lp.group, lp.clip.path, start_time);

        self.state.start_time = start_time;
        self.state.next = NextLoop::NoCommitment;
        self.state.current_loop = Some(loop_id);
    }

    fn on_loop_boundary(&mut self) {
        let Some(current) = self.state.current_loop else {
            return;
        };
        let lp = self.track.get_loop(current);
        let state = &mut self.state;

        state.plan.consume_head();
        if state.plan.committed_len() == 0 {
            state.plan.push_committed(&lp.group);
        }
        state.stale.push(&lp.group);
        state.bps = lp.bps;
        state.beats = 0.0;
        state.bar.reset();
        state.chord.reset();
        for jingle in &mut state.queued_jingles {
            jingle.bars_left -= 1;
        }
        for queued in state.queued_melodies.values_mut() {
            queued.loops_left -= 1;
        }

        let follow_ups = self.advance_active_melodies();
        for melody in follow_ups {
            self.schedule_follow(melody);
        }
    }

    fn on_bar_boundary(&mut self) {
        for jingle in &mut self.state.queued_jingles {
            jingle.bars_left -= 1;
        }
        self.reclaim_retired_melodies();
    }

    /// Choose the next loop once the current one reaches its last bars.
    fn choose_next_if_due(&mut self) -> Result<(), EngineError> {
        let Some(current) = self.state.current_loop else {
            return Ok(());
        };
        if self.state.next.is_committed() {
            return Ok(());
        }
        let bars = self.track.get_loop(current).bars.len();
        if self.state.bar.index + self.config.commit_bars_ahead < bars {
            return Ok(());
        }

        let plan = &mut self.state.plan;
        plan.promote_until(3);
        let this_group = (plan.committed_len() > 1)
            .then(|| plan.get(1).map(str::to_string))
            .flatten();
        let next_group = (plan.committed_len() > 2)
            .then(|| plan.get(2).map(str::to_string))
            .flatten();

        let chosen = self.queue_next_loop(1, this_group.as_deref(), next_group.as_deref())?;
        if let (None, Some(loop_id)) = (this_group, chosen) {
            let group = self.track.get_loop(loop_id).group.clone();
            self.state.plan.push_committed(&group);
        }
        Ok(())
    }
}
