//! Melody planning — queueing melodies whose loop-group sequence agrees with
//! the lookahead plan, starting them on time, and retiring them.
//!
//! A request names a melody and a horizon of `loops` boundaries. Each variant
//! of the melody, on each instrument that is free (or frees up in time), is
//! tried at every start offset within the horizon. Feasible placements are
//! weighted by length and staleness and one is drawn.

use std::collections::BTreeMap;

use super::stale::stale_penalty;
use super::state::RuntimeMelody;
use super::weighted;
use super::MusicEngine;
use crate::backend::PlaybackBackend;
use crate::track::{MelodyDefinition, MelodyId};

/// Follow-up weights keyed by (melody name, instrument, start group).
type FollowWeights = BTreeMap<(String, String, String), f64>;

/// A melody variant and the earliest offset it may start at.
#[derive(Debug, Clone, Copy)]
struct Variant {
    melody: MelodyId,
    min_offset: usize,
}

/// A feasible placement: start `melody` after `offset` loop boundaries.
#[derive(Debug, Clone, Copy)]
struct Placement {
    melody: MelodyId,
    offset: usize,
}

/// Base weight of a placement: longer melodies are favoured, stale groups are not.
fn sustain_weight(end: i32, stale: f64) -> f64 {
    (f64::from(end) / 10.0 - stale).exp()
}

impl<B: PlaybackBackend> MusicEngine<B> {
    /// Try to queue melody `name` to start within the next `loops` loops.
    ///
    /// Restricting to one `instrument` is optional. Returns whether a
    /// placement was found.
    pub fn try_queue_melody(&mut self, name: &str, loops: usize, instrument: Option<&str>) -> bool {
        let Some(by_instrument) = self.track.melodies_named(name) else {
            log::warn!("unknown melody `{name}`");
            return false;
        };
        let mut variants = Vec::new();
        for (instr, ids) in by_instrument {
            if instrument.map_or(false, |wanted| wanted != instr) {
                continue;
            }
            if let Some(min_offset) = self.instrument_availability(instr, loops) {
                variants.extend(ids.iter().map(|&melody| Variant { melody, min_offset }));
            }
        }
        let queued = self.plan_melody(&variants, loops, None);
        if !queued {
            log::debug!("no placement for melody `{name}` within {loops} loops");
        }
        queued
    }

    /// Queue one of `melody`'s follow-ups, or nothing, by weight.
    pub(crate) fn schedule_follow(&mut self, melody: MelodyId) {
        const FOLLOW_LOOPS: usize = 2;
        let def = self.track.melody(melody);
        if def.follows.is_empty() {
            return;
        }
        let weights: FollowWeights = def
            .follows
            .iter()
            .map(|f| {
                (
                    (f.name.clone(), f.instrument.clone(), f.start_group.clone()),
                    f.weight,
                )
            })
            .collect();
        let no_follow = def.no_follow_weight;

        let mut variants = Vec::new();
        for (name, instr, group) in weights.keys() {
            let Some(ids) = self
                .track
                .melodies_named(name)
                .and_then(|by_instrument| by_instrument.get(instr))
            else {
                continue;
            };
            let Some(min_offset) = self.instrument_availability(instr, FOLLOW_LOOPS) else {
                continue;
            };
            variants.extend(
                ids.iter()
                    .filter(|&&id| self.track.melody(id).over_loops.first() == Some(group))
                    .map(|&melody| Variant { melody, min_offset }),
            );
        }
        self.plan_melody(&variants, FOLLOW_LOOPS, Some((&weights, no_follow)));
    }

    /// Earliest offset at which `instrument` is free, if within `loops`.
    fn instrument_availability(&self, instrument: &str, loops: usize) -> Option<usize> {
        if self.state.queued_melodies.contains_key(instrument) {
            return None;
        }
        match self.state.melodies.get(instrument) {
            None => Some(0),
            Some(active) if (active.loops_left as i64) < loops as i64 => {
                Some(active.loops_left.max(0) as usize)
            }
            Some(_) => None,
        }
    }

    /// Whether a queued or playing melody needs the group at plan index `index`.
    pub(crate) fn melody_needs_slot(&self, index: usize) -> bool {
        let index = index as i64;
        let queued = self.state.queued_melodies.values().any(|q| {
            let len = self.track.melody(q.melody).over_loops.len() as i64;
            let start = i64::from(q.loops_left);
            (start..start + len).contains(&index)
        });
        let playing = self.state.melodies.values().any(|m| {
            let len = self.track.melody(m.melody).over_loops.len() as i64;
            (0..len).contains(&(i64::from(m.loop_index) + index))
        });
        queued || playing
    }

    /// Whether `def` may start after `offset` boundaries given the current beat.
    fn offset_admissible(&self, def: &MelodyDefinition, offset: usize) -> bool {
        let beats = self.state.beats;
        if def.beats_into_loop >= 0.0 {
            return offset > 0 || beats <= def.beats_into_loop;
        }
        match offset {
            0 => false,
            1 => self
                .state
                .current_loop
                .map_or(false, |id| beats < self.track.get_loop(id).beats + def.beats_into_loop),
            _ => true,
        }
    }

    /// Whether a melody placed at the end of the plan can be reached from
    /// the group planned before it.
    fn joins_plan(&self, def: &MelodyDefinition, offset: usize) -> bool {
        if offset == 0 || offset < self.state.plan.len() {
            return true;
        }
        let Some(prev) = self.state.plan.get(offset - 1) else {
            return false;
        };
        // loops already chosen must themselves lead into the melody
        let chosen = match offset - 1 {
            0 => self.state.current_loop,
            1 => self.state.next.loop_id(),
            _ => None,
        };
        let candidates = match chosen {
            Some(id) => vec![id],
            None => self.track.loops_in(prev).to_vec(),
        };
        candidates.into_iter().any(|id| {
            self.track
                .get_loop(id)
                .next_groups
                .contains_key(&def.over_loops[0])
        })
    }

    fn plan_melody(
        &mut self,
        variants: &[Variant],
        loops: usize,
        follows: Option<(&FollowWeights, f64)>,
    ) -> bool {
        let mut placements = Vec::new();
        for variant in variants {
            let def = self.track.melody(variant.melody);
            for offset in variant.min_offset..loops {
                if self.offset_admissible(def, offset)
                    && self.state.plan.matches(&def.over_loops, offset)
                    && self.joins_plan(def, offset)
                {
                    placements.push(Placement {
                        melody: variant.melody,
                        offset,
                    });
                }
            }
        }
        if placements.is_empty() {
            return false;
        }

        let counts = self.state.stale.counts();
        let mut total_stale = 0.0;
        let weights: Vec<f64> = placements
            .iter()
            .map(|p| {
                let def = self.track.melody(p.melody);
                let stale: f64 = def
                    .over_loops
                    .iter()
                    .map(|g| stale_penalty(counts.get(g.as_str()).copied().unwrap_or(0.0)))
                    .sum::<f64>()
                    / def.over_loops.len() as f64;
                total_stale += stale;
                let mut weight = sustain_weight(def.end, stale);
                if let Some((follow_weights, _)) = follows {
                    let key = (
                        def.name.clone(),
                        def.instrument.clone(),
                        def.over_loops[0].clone(),
                    );
                    weight += follow_weights.get(&key).copied().unwrap_or(0.0);
                }
                weight.max(0.0)
            })
            .collect();
        let rest = follows.map_or(0.0, |(_, no_follow)| {
            (no_follow - total_stale / placements.len() as f64).exp()
        });

        match weighted::choose(&mut self.rng, &weights, rest) {
            Some(i) => {
                self.queue_placement(placements[i]);
                true
            }
            None => false,
        }
    }

    fn queue_placement(&mut self, placement: Placement) {
        let def = self.track.melody(placement.melody);
        self.state.plan.extend_for(&def.over_loops, placement.offset);
        log::info!(
            "melody `{}` on `{}` queued {} loops ahead",
            def.name,
            def.instrument,
            placement.offset
        );
        self.state.queued_melodies.insert(
            def.instrument.clone(),
            RuntimeMelody {
                melody: placement.melody,
                loops_left: placement.offset as i32,
                loop_index: 0,
                channel: None,
            },
        );
    }

    /// Clock time at which a queued melody should start, once its loop is due.
    fn melody_start_time(&self, def: &MelodyDefinition, loops_left: i32) -> Option<f64> {
        let state = &self.state;
        if def.beats_into_loop >= 0.0 && loops_left == 0 {
            return Some(state.start_time + def.beats_into_loop / state.bps);
        }
        if def.beats_into_loop < 0.0 && loops_left == 1 {
            let current = self.track.get_loop(state.current_loop?);
            return Some(state.start_time + (current.beats + def.beats_into_loop) / state.bps);
        }
        None
    }

    /// Start queued melodies whose time has come.
    pub(crate) fn fire_due_melodies(&mut self, now: f64) {
        let mut due = Vec::new();
        let mut missed = Vec::new();
        for (instrument, queued) in &self.state.queued_melodies {
            let def = self.track.melody(queued.melody);
            match self.melody_start_time(def, queued.loops_left) {
                Some(start) if now > start => due.push((instrument.clone(), start)),
                Some(_) => {}
                None if queued.loops_left < 0 => missed.push(instrument.clone()),
                None => {}
            }
        }
        for instrument in missed {
            if let Some(queued) = self.state.queued_melodies.remove(&instrument) {
                log::warn!("melody `{}` missed its start", self.track.melody(queued.melody).name);
            }
        }

        let mut follow_ups = Vec::new();
        for (instrument, start) in due {
            let Some(mut melody) = self.state.queued_melodies.remove(&instrument) else {
                continue;
            };
            let def = self.track.melody(melody.melody);
            let at = start + self.config.schedule_lead;
            let Some(channel) = self.state.melody_channels.acquire(&def.clip, at) else {
                log::warn!("no free melody channel for `{}`; dropped", def.name);
                continue;
            };
            self.backend.set_enabled(channel, true);
            self.backend.schedule(channel, &def.clip, at);
            log::info!("melody `{}` on `{}` at {:.3}s", def.name, instrument, start);

            let early = i32::from(def.beats_into_loop < 0.0);
            melody.loops_left = def.end + early;
            melody.loop_index = -early;
            melody.channel = Some(channel);
            if melody.loops_left == 1 {
                follow_ups.push(melody.melody);
            }
            self.state
                .plan
                .promote_until(def.over_loops.len() + early as usize);
            if let Some(replaced) = self.state.melodies.insert(instrument, melody) {
                self.state.retiring.push(replaced);
            }
        }
        for melody in follow_ups {
            self.schedule_follow(melody);
        }
    }

    /// Step playing melodies across a loop boundary.
    ///
    /// Returns the melodies entering their last loop, which may queue a follow-up.
    pub(crate) fn advance_active_melodies(&mut self) -> Vec<MelodyId> {
        let mut follow_ups = Vec::new();
        let mut finished = Vec::new();
        for (instrument, melody) in &mut self.state.melodies {
            melody.loops_left -= 1;
            melody.loop_index += 1;
            match melody.loops_left {
                1 => follow_ups.push(melody.melody),
                left if left <= 0 => finished.push(instrument.clone()),
                _ => {}
            }
        }
        for instrument in finished {
            let Some(melody) = self.state.melodies.remove(&instrument) else {
                continue;
            };
            if melody.loops_left == 0 {
                self.state.retiring.push(melody);
            } else if let Some(channel) = melody.channel {
                self.state.melody_channels.release(channel);
                self.backend.set_enabled(channel, false);
            }
        }
        follow_ups
    }

    /// Free retiring melodies once the loop passes their kill beat.
    pub(crate) fn reclaim_retired_melodies(&mut self) {
        let beats = self.state.beats;
        let (expired, keep): (Vec<_>, Vec<_>) = std::mem::take(&mut self.state.retiring)
            .into_iter()
            .partition(|m| self.track.melody(m.melody).beats_to_kill < beats);
        self.state.retiring = keep;
        for melody in expired {
            if let Some(channel) = melody.channel {
                self.state.melody_channels.release(channel);
                self.backend.set_enabled(channel, false);
                log::debug!("melody `{}` released", self.track.melody(melody.melody).name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{engine_for, loop_def, run_until};
    use super::*;
    use crate::backend::Bus;
    use crate::track::{Chord, Clip, MelodyFollow, TrackDefinition};

    fn melody(name: &str, instrument: &str, over: &[&str], end: i32) -> MelodyDefinition {
        MelodyDefinition {
            name: name.into(),
            instrument: instrument.into(),
            clip: Clip::new(format!("{name}.wav"), 8.0),
            beats_into_loop: 0.0,
            over_loops: over.iter().map(|g| g.to_string()).collect(),
            end,
            follows: vec![],
            no_follow_weight: -1000.0,
            beats_to_kill: 2.0,
        }
    }

    /// `a` and `b` each repeat or switch; 4 s per loop.
    fn track(melodies: Vec<MelodyDefinition>) -> TrackDefinition {
        TrackDefinition {
            start_group: "a".into(),
            loops: vec![
                loop_def("a", &[("a", 0.0), ("b", 0.0)], &[Chord::C, Chord::G]),
                loop_def("b", &[("a", 0.0), ("b", 0.0)], &[Chord::Am, Chord::F]),
            ],
            melodies,
            jingles: vec![],
        }
    }

    #[test]
    fn every_extra_loop_raises_weight() {
        assert!((sustain_weight(0, 0.0) - 1.0).abs() < 1e-12);
        assert!((sustain_weight(3, 0.0) - 0.3f64.exp()).abs() < 1e-12);
        assert!(sustain_weight(2, 0.0) > sustain_weight(1, 0.0));
        assert!(sustain_weight(2, 0.5) < sustain_weight(2, 0.0));
    }

    #[test]
    fn unknown_melody_is_refused() {
        let mut engine = engine_for(&track(vec![]));
        run_until(&mut engine, 0.6, 0.01);
        assert!(!engine.try_queue_melody("nope", 2, None));
    }

    #[test]
    fn nothing_queues_before_first_loop() {
        let mut engine = engine_for(&track(vec![melody("m", "lead", &["a"], 1)]));
        assert!(!engine.try_queue_melody("m", 3, None));
    }

    #[test]
    fn melody_extends_plan_and_starts_on_its_loop() {
        let mut engine = engine_for(&track(vec![melody("m", "lead", &["a", "b"], 2)]));
        run_until(&mut engine, 1.0, 0.01);
        assert!(engine.try_queue_melody("m", 2, None));
        // starting now would need beats <= 0, so the next loop is the earliest
        let queued = &engine.state().queued_melodies["lead"];
        assert_eq!(queued.loops_left, 1);
        assert_eq!(engine.state().plan.iter().collect::<Vec<_>>(), vec!["a", "a", "b"]);

        run_until(&mut engine, 8.0, 0.01);
        assert!(engine.state().queued_melodies.is_empty());
        let active = &engine.state().melodies["lead"];
        assert_eq!(active.loops_left, 2);
        let started: Vec<_> = engine.backend().scheduled_on(Bus::Melodies).collect();
        assert_eq!(started.len(), 1);
        // second loop starts at 4.53, plus the lead
        assert!((started[0].start_time - 4.63).abs() < 1e-9);
        assert_eq!(engine.current_group(), Some("a"));
        assert_eq!(engine.loop_at(1), Some("b"));
    }

    #[test]
    fn busy_instrument_refuses_second_melody() {
        let mut engine = engine_for(&track(vec![
            melody("m", "lead", &["a"], 4),
            melody("n", "lead", &["a"], 1),
        ]));
        run_until(&mut engine, 1.0, 0.01);
        assert!(engine.try_queue_melody("m", 2, None));
        assert!(!engine.try_queue_melody("n", 2, None));
        assert!(!engine.try_queue_melody("n", 3, Some("lead")));
    }

    #[test]
    fn finished_melody_retires_then_releases_channel() {
        let mut engine = engine_for(&track(vec![melody("m", "lead", &["a"], 1)]));
        run_until(&mut engine, 1.0, 0.01);
        assert!(engine.try_queue_melody("m", 2, None));
        run_until(&mut engine, 5.0, 0.01);
        assert_eq!(engine.state().melody_channels.busy_count(), 1);
        // next boundary at 8.53: loops_left reaches 0 and the melody retires
        run_until(&mut engine, 8.6, 0.01);
        assert!(engine.state().melodies.is_empty());
        assert_eq!(engine.state().retiring.len(), 1);
        // kill beat 2 is passed at the next bar boundary (10.53)
        run_until(&mut engine, 10.6, 0.01);
        assert!(engine.state().retiring.is_empty());
        assert_eq!(engine.state().melody_channels.busy_count(), 0);
    }

    #[test]
    fn exhausted_pool_drops_melody() {
        let mut def = track(vec![melody("m", "lead", &["a"], 3)]);
        def.melodies.push(melody("n", "bass", &["a"], 3));
        let mut engine = engine_for(&def);
        engine.state.melody_channels = super::super::ChannelPool::melodies(1);
        run_until(&mut engine, 1.0, 0.01);
        assert!(engine.try_queue_melody("m", 2, None));
        assert!(engine.try_queue_melody("n", 2, None));
        run_until(&mut engine, 5.0, 0.01);
        assert_eq!(engine.state().melodies.len(), 1);
        assert!(engine.state().queued_melodies.is_empty());
        assert_eq!(engine.state().melody_channels.free_count(), 0);
    }

    #[test]
    fn anticipating_melody_starts_before_boundary() {
        let mut m = melody("pickup", "lead", &["b"], 1);
        m.beats_into_loop = -1.0;
        let mut engine = engine_for(&track(vec![m]));
        run_until(&mut engine, 1.0, 0.01);
        assert!(engine.try_queue_melody("pickup", 2, None));
        assert_eq!(engine.state().queued_melodies["lead"].loops_left, 1);
        // one beat (0.5 s) before the 4.53 boundary
        run_until(&mut engine, 4.1, 0.01);
        let started: Vec<_> = engine.backend().scheduled_on(Bus::Melodies).collect();
        assert_eq!(started.len(), 1);
        assert!((started[0].start_time - 4.13).abs() < 1e-9);
        let active = &engine.state().melodies["lead"];
        assert_eq!(active.loops_left, 2);
        assert_eq!(active.loop_index, -1);
        run_until(&mut engine, 4.6, 0.01);
        assert_eq!(engine.current_group(), Some("b"));
        assert_eq!(engine.state().melodies["lead"].loop_index, 0);
    }

    #[test]
    fn follow_up_queues_on_last_loop() {
        let mut first = melody("verse", "lead", &["a"], 2);
        first.follows.push(MelodyFollow {
            name: "answer".into(),
            instrument: "lead".into(),
            start_group: "b".into(),
            weight: 50.0,
        });
        let second = melody("answer", "lead", &["b"], 1);
        let mut engine = engine_for(&track(vec![first, second]));
        run_until(&mut engine, 1.0, 0.01);
        assert!(engine.try_queue_melody("verse", 2, None));
        // verse starts at 4.53 with two loops; its last loop begins at 8.53
        run_until(&mut engine, 8.6, 0.01);
        let queued = &engine.state().queued_melodies["lead"];
        assert_eq!(engine.track().melody(queued.melody).name, "answer");
        assert_eq!(queued.loops_left, 1);
        assert_eq!(engine.loop_at(1), Some("b"));
    }
}
