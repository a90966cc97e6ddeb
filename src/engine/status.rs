//! Read-only queries: the current position, upcoming chords and bars, the
//! lookahead plan, and a serializable snapshot of all of it.

use std::collections::BTreeMap;

use serde::Serialize;

use super::clock::Phase;
use super::state::{RuntimeJingle, RuntimeMelody};
use super::MusicEngine;
use crate::backend::PlaybackBackend;
use crate::track::{chord_at, Chord, ChordTerm, RuntimeLoop};

/// A playing or queued melody, as reported by [`EngineStatus`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MelodyStatus {
    pub instrument: String,
    pub name: String,
    pub loops_left: i32,
}

/// Snapshot of the engine for display and logging.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineStatus {
    pub time: f64,
    pub phase: Phase,
    pub playing: bool,
    pub current_group: Option<String>,
    pub next_group: Option<String>,
    pub next_start_time: Option<f64>,
    pub beats: f64,
    pub bar: usize,
    pub chord: Option<Chord>,
    pub plan: Vec<String>,
    pub committed: usize,
    pub melodies: Vec<MelodyStatus>,
    pub queued_melodies: Vec<MelodyStatus>,
    pub jingles: Vec<String>,
    pub queued_jingles: Vec<String>,
    pub free_melody_channels: usize,
    pub free_jingle_channels: usize,
}

impl<B: PlaybackBackend> MusicEngine<B> {
    fn current(&self) -> Option<&RuntimeLoop> {
        self.state.current_loop.map(|id| self.track.get_loop(id))
    }

    /// Group of the loop now playing.
    pub fn current_group(&self) -> Option<&str> {
        self.current().map(|lp| lp.group.as_str())
    }

    /// Group of the committed next loop.
    pub fn next_group(&self) -> Option<&str> {
        self.state
            .next
            .loop_id()
            .map(|id| self.track.get_loop(id).group.as_str())
    }

    /// Planned group `i` loops ahead (0 = now playing).
    pub fn loop_at(&self, i: usize) -> Option<&str> {
        self.state.plan.get(i)
    }

    /// Chord sounding now.
    pub fn chord(&self) -> Option<Chord> {
        let lp = self.current()?;
        lp.chords.get(self.state.chord.index).map(|t| t.chord)
    }

    pub fn current_bar_length(&self) -> Option<f64> {
        let lp = self.current()?;
        lp.bars.get(self.state.bar.index).copied()
    }

    /// Chords and bars of the loop after the current one: the committed loop
    /// if any, otherwise the shared timing of the planned group.
    fn upcoming(&self) -> Option<(&[ChordTerm], &[f64])> {
        if let Some(id) = self.state.next.loop_id() {
            let lp = self.track.get_loop(id);
            return Some((&lp.chords, &lp.bars));
        }
        let group = self.track.group(self.state.plan.get(1)?)?;
        Some((&group.chords, &group.bars))
    }

    /// Chord at `beat`, counted from the current loop's start, looking into
    /// the upcoming loop when past the end.
    fn chord_at_beat(&self, beat: f64) -> Option<Chord> {
        let lp = self.current()?;
        if beat < lp.beats - 1e-9 {
            return chord_at(&lp.chords, beat);
        }
        let (chords, _) = self.upcoming()?;
        chord_at(chords, beat - lp.beats)
    }

    /// Beat, from the current loop's start, at which the current bar ends.
    fn next_bar_beat(&self) -> Option<f64> {
        Some(self.state.bar.start + self.current_bar_length()?)
    }

    /// Chord at the start of the next bar.
    pub fn chord_at_next_bar(&self) -> Option<Chord> {
        self.chord_at_beat(self.next_bar_beat()?)
    }

    /// Chord at the start of the bar after next.
    pub fn chord_at_next_next_bar(&self) -> Option<Chord> {
        let beat = self.next_bar_beat()? + self.next_bar_length()?;
        self.chord_at_beat(beat)
    }

    /// Length in beats of the next bar, which may be the upcoming loop's first.
    pub fn next_bar_length(&self) -> Option<f64> {
        let lp = self.current()?;
        let next = self.state.bar.index + 1;
        if next < lp.bars.len() {
            return Some(lp.bars[next]);
        }
        let (_, bars) = self.upcoming()?;
        bars.first().copied()
    }

    /// Lengths of the known bars after the current one, running into the
    /// upcoming loop when it is committed or planned.
    pub(crate) fn following_bar_lengths(&self) -> Vec<f64> {
        let mut lengths: Vec<f64> = self.current().map_or_else(Vec::new, |lp| {
            lp.bars.iter().skip(self.state.bar.index + 1).copied().collect()
        });
        if let Some((_, bars)) = self.upcoming() {
            lengths.extend_from_slice(bars);
        }
        lengths
    }

    /// Beats from now until planned loop `i` starts. Negative for the loop
    /// already playing; `None` if the plan does not reach that far.
    pub fn beats_until_loop(&self, i: usize) -> Option<f64> {
        self.current()?;
        let mut beats = -self.state.beats;
        for j in 0..i {
            beats += self.track.group(self.state.plan.get(j)?)?.beats;
        }
        Some(beats)
    }

    pub fn status(&self) -> EngineStatus {
        let melodies = |map: &BTreeMap<String, RuntimeMelody>| -> Vec<MelodyStatus> {
            map.iter()
                .map(|(instrument, m)| MelodyStatus {
                    instrument: instrument.clone(),
                    name: self.track.melody(m.melody).name.clone(),
                    loops_left: m.loops_left,
                })
                .collect()
        };
        let jingles = |list: &[RuntimeJingle]| -> Vec<String> {
            list.iter()
                .map(|j| self.track.jingle(j.jingle).name.clone())
                .collect()
        };
        let state = &self.state;
        EngineStatus {
            time: self.backend.now(),
            phase: state.phase,
            playing: state.playing,
            current_group: self.current_group().map(str::to_string),
            next_group: self.next_group().map(str::to_string),
            next_start_time: state.next.start_time(),
            beats: state.beats,
            bar: state.bar.index,
            chord: self.chord(),
            plan: state.plan.iter().map(str::to_string).collect(),
            committed: state.plan.committed_len(),
            melodies: melodies(&state.melodies),
            queued_melodies: melodies(&state.queued_melodies),
            jingles: jingles(&state.jingles),
            queued_jingles: jingles(&state.queued_jingles),
            free_melody_channels: state.melody_channels.free_count(),
            free_jingle_channels: state.jingle_channels.free_count(),
        }
    }
}
