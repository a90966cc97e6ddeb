//! Jingle placement — fitting short clips against upcoming bar ends.
//!
//! A jingle lists offsets (beats before a bar end) at which it may start,
//! plus the chords it may start and end on and its tempo. The search relaxes
//! constraints in tiers until something fits, so a request for a known
//! jingle always queues it:
//! 1. the current bar, tempo and chords matching;
//! 2. the next bar, tempo and chords matching;
//! 3. tempo only, current bar then next bar;
//! 4. any offset of any variant.
//!
//! Within a tier the earliest start wins, with near-ties broken at random.

use rand::seq::SliceRandom;

use super::state::RuntimeJingle;
use super::MusicEngine;
use crate::backend::PlaybackBackend;
use crate::track::{Chord, JingleId};

/// Starts within this many beats of the earliest are treated as ties.
const TIE_BEATS: f64 = 0.01;
/// How far past the start of the next bar a slot may begin.
const NEXT_BAR_TOLERANCE: f64 = -0.05;

/// Where a queued jingle will start.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Slot {
    jingle: JingleId,
    beats_before_bar: f64,
    bars_left: i32,
}

/// Chord requirements for one bar.
#[derive(Debug, Clone, Copy)]
struct Harmony {
    start: Option<Chord>,
    end: Option<Chord>,
}

/// Keeps the slots with the smallest slack, up to [`TIE_BEATS`].
#[derive(Debug, Default)]
struct Earliest {
    best: f64,
    slots: Vec<Slot>,
}

impl Earliest {
    fn new() -> Self {
        Self {
            best: f64::INFINITY,
            slots: Vec::new(),
        }
    }

    fn offer(&mut self, slack: f64, slot: Slot) {
        if slack > self.best + TIE_BEATS {
            return;
        }
        if slack < self.best - TIE_BEATS {
            self.slots.clear();
            self.best = slack;
        }
        self.slots.push(slot);
    }
}

fn fits(allowed: &[Chord], actual: Option<Chord>) -> bool {
    actual.map_or(true, |chord| chord.satisfies(allowed))
}

impl<B: PlaybackBackend> MusicEngine<B> {
    /// Queue jingle `name` at the earliest slot that fits.
    ///
    /// Returns `false` for unknown names and while no loop is playing.
    pub fn queue_jingle(&mut self, name: &str) -> bool {
        let ids = self.track.jingles_named(name).to_vec();
        if ids.is_empty() {
            log::warn!("unknown jingle `{name}`");
            return false;
        }
        if self.state.current_loop.is_none() {
            log::debug!("jingle `{name}` ignored: no loop playing");
            return false;
        }
        let slots = self.jingle_slots(&ids);
        let Some(&slot) = slots.choose(&mut self.rng) else {
            return false;
        };
        log::info!(
            "jingle `{}` queued {} beats before bar end, {} bars ahead",
            name,
            slot.beats_before_bar,
            slot.bars_left
        );
        self.state.queued_jingles.push(RuntimeJingle {
            jingle: slot.jingle,
            bars_left: slot.bars_left,
            beats_before_bar: slot.beats_before_bar,
            channel: None,
        });
        true
    }

    fn jingle_slots(&self, ids: &[JingleId]) -> Vec<Slot> {
        let elapsed = self.state.beats - self.state.bar.start;
        let bar_len = self.current_bar_length().unwrap_or(0.0);
        let next_bar_len = self.next_bar_length();
        let this_bar = Harmony {
            start: self.chord(),
            end: self.chord_at_next_bar(),
        };
        let next_bar = Harmony {
            start: self.chord_at_next_bar(),
            end: self.chord_at_next_next_bar(),
        };

        let in_this_bar = |s: f64| bar_len - s > elapsed;
        let in_next_bar = |s: f64| (bar_len - elapsed) + next_bar_len.unwrap_or(0.0) - s;

        // current bar, everything matching
        let slots = self.search(ids, Some(this_bar), 0, |s| {
            in_this_bar(s).then(|| bar_len - s - elapsed)
        });
        if !slots.is_empty() {
            return slots;
        }
        if next_bar_len.is_some() {
            let slots = self.search(ids, Some(next_bar), 1, |s| {
                let slack = in_next_bar(s);
                (slack - (bar_len - elapsed) >= NEXT_BAR_TOLERANCE).then_some(slack)
            });
            if !slots.is_empty() {
                return slots;
            }
        }

        // tempo only
        let slots = self.search(ids, None, 0, |s| {
            in_this_bar(s).then(|| bar_len - s - elapsed)
        });
        if !slots.is_empty() {
            return slots;
        }
        if next_bar_len.is_some() {
            let slots = self.search(ids, None, 1, |s| {
                let slack = in_next_bar(s);
                (slack - (bar_len - elapsed) >= NEXT_BAR_TOLERANCE).then_some(slack)
            });
            if !slots.is_empty() {
                return slots;
            }
        }

        // anything at all, in the first bar long enough to hold the offset
        let following = self.following_bar_lengths();
        let bars_ahead = |s: f64| -> i32 {
            if in_this_bar(s) {
                return 0;
            }
            following
                .iter()
                .position(|&len| len >= s)
                .map_or(1, |i| i as i32 + 1)
        };
        ids.iter()
            .flat_map(|&jingle| {
                self.track
                    .jingle(jingle)
                    .beats_until_bar
                    .iter()
                    .map(move |&s| Slot {
                        jingle,
                        beats_before_bar: s,
                        bars_left: bars_ahead(s),
                    })
            })
            .collect()
    }

    /// Slots among `ids` matching tempo (and `harmony`, if given), earliest first.
    ///
    /// `slack` maps an offset to beats from now until the slot, or `None` if
    /// the slot is not reachable in this bar.
    fn search(
        &self,
        ids: &[JingleId],
        harmony: Option<Harmony>,
        bars_left: i32,
        slack: impl Fn(f64) -> Option<f64>,
    ) -> Vec<Slot> {
        let mut earliest = Earliest::new();
        for &jingle in ids {
            let def = self.track.jingle(jingle);
            if (self.state.bps - def.bpm / 60.0).abs() >= self.config.tempo_tolerance {
                continue;
            }
            if let Some(h) = harmony {
                if !fits(&def.start_chords, h.start) || !fits(&def.end_chords, h.end) {
                    continue;
                }
            }
            for &s in &def.beats_until_bar {
                if let Some(until) = slack(s) {
                    earliest.offer(
                        until,
                        Slot {
                            jingle,
                            beats_before_bar: s,
                            bars_left,
                        },
                    );
                }
            }
        }
        earliest.slots
    }

    /// Start queued jingles whose slot has come, and drop missed ones.
    ///
    /// A slot that lies before `now` plus the schedule lead starts at `now`.
    pub(crate) fn fire_due_jingles(&mut self, now: f64) {
        let Some(bar_len) = self.current_bar_length() else {
            return;
        };
        let elapsed = self.state.beats - self.state.bar.start;
        let mut i = 0;
        while i < self.state.queued_jingles.len() {
            let queued = &self.state.queued_jingles[i];
            if queued.bars_left < 0 {
                let missed = self.state.queued_jingles.remove(i);
                log::warn!("jingle `{}` missed its bar", self.track.jingle(missed.jingle).name);
                continue;
            }
            if queued.bars_left > 0 || elapsed <= bar_len - queued.beats_before_bar {
                i += 1;
                continue;
            }

            let mut jingle = self.state.queued_jingles.remove(i);
            let def = self.track.jingle(jingle.jingle);
            let start = self.state.start_time
                + (self.state.bar.start + bar_len - jingle.beats_before_bar) / self.state.bps;
            let at = (start + self.config.schedule_lead).max(now);
            let Some(channel) = self.state.jingle_channels.acquire(&def.clip, at) else {
                log::warn!("no free jingle channel for `{}`; dropped", def.name);
                continue;
            };
            self.backend.set_enabled(channel, true);
            self.backend.schedule(channel, &def.clip, at);
            log::info!("jingle `{}` at {:.3}s", def.name, start);
            jingle.channel = Some(channel);
            self.state.jingles.push(jingle);
        }
    }

    /// Release the channels of jingles that are about to end.
    pub(crate) fn retire_jingles(&mut self, now: f64) {
        let release = self.config.jingle_release_secs;
        let track = &self.track;
        let pool = &mut self.state.jingle_channels;
        self.state.jingles.retain(|jingle| {
            let Some(channel) = jingle.channel else {
                return false;
            };
            let Some(reservation) = pool.reservation(channel) else {
                return false;
            };
            let length = track.jingle(jingle.jingle).clip.length.unwrap_or(0.0);
            if length - (now - reservation.start_time) < release {
                pool.release(channel);
                false
            } else {
                true
            }
        });
    }
}
