//! Track compiler — validates a [`TrackDefinition`] and builds lookup tables.
//!
//! Only the first loop seen for a group seeds that group's timing cache
//! (beats, chords, bars, tempo). Later loops of the same group are added as
//! candidates and must agree with the cached timing.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use super::chord::{progression_beats, ChordTerm};
use super::definition::{Clip, JingleDefinition, LoopDefinition, MelodyDefinition, TrackDefinition};
use crate::error::TrackError;

const BEAT_EPS: f64 = 1e-6;

/// Index of a loop in a [`RuntimeTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct LoopId(pub usize);

/// Index of a melody in a [`RuntimeTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct MelodyId(pub usize);

/// Index of a jingle in a [`RuntimeTrack`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JingleId(pub usize);

/// A loop with its derived timing.
#[derive(Debug, Clone)]
pub struct RuntimeLoop {
    pub id: LoopId,
    pub clip: Clip,
    pub group: String,
    /// Beats per second.
    pub bps: f64,
    pub tags: BTreeSet<String>,
    pub next_groups: BTreeMap<String, f64>,
    pub next_tags: BTreeMap<String, f64>,
    pub chords: Vec<ChordTerm>,
    pub bars: Vec<f64>,
    /// Total length in beats.
    pub beats: f64,
    /// Total length in seconds.
    pub length: f64,
}

impl RuntimeLoop {
    fn new(id: LoopId, def: &LoopDefinition) -> Self {
        let bps = def.bpm / 60.0;
        let beats = progression_beats(&def.chords);
        let bars = if def.bars.is_empty() {
            def.chords.iter().map(|t| t.beats).collect()
        } else {
            def.bars.clone()
        };
        Self {
            id,
            clip: def.clip.clone(),
            group: def.group.clone(),
            bps,
            tags: def.tags.iter().cloned().collect(),
            next_groups: def.next_groups.clone(),
            next_tags: def.next_tags.clone(),
            chords: def.chords.clone(),
            bars,
            beats,
            length: beats / bps,
        }
    }
}

/// Timing shared by every loop of a group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupTiming {
    pub beats: f64,
    pub chords: Vec<ChordTerm>,
    pub bars: Vec<f64>,
    pub bps: f64,
}

impl GroupTiming {
    fn of(lp: &RuntimeLoop) -> Self {
        Self {
            beats: lp.beats,
            chords: lp.chords.clone(),
            bars: lp.bars.clone(),
            bps: lp.bps,
        }
    }
}

/// The compiled, read-only form of a track.
#[derive(Debug, Clone)]
pub struct RuntimeTrack {
    start_group: String,
    loops: Vec<RuntimeLoop>,
    loop_table: BTreeMap<String, Vec<LoopId>>,
    groups: BTreeMap<String, GroupTiming>,
    melodies: Vec<MelodyDefinition>,
    melody_table: BTreeMap<String, BTreeMap<String, Vec<MelodyId>>>,
    jingles: Vec<JingleDefinition>,
    jingle_table: BTreeMap<String, Vec<JingleId>>,
}

impl RuntimeTrack {
    /// Validate `def` and build the lookup tables.
    pub fn compile(def: &TrackDefinition) -> Result<Self, TrackError> {
        let mut loops = Vec::with_capacity(def.loops.len());
        let mut loop_table: BTreeMap<String, Vec<LoopId>> = BTreeMap::new();
        let mut groups: BTreeMap<String, GroupTiming> = BTreeMap::new();

        for (i, loop_def) in def.loops.iter().enumerate() {
            validate_loop(loop_def)?;
            let lp = RuntimeLoop::new(LoopId(i), loop_def);
            match groups.get(&lp.group) {
                None => {
                    groups.insert(lp.group.clone(), GroupTiming::of(&lp));
                }
                Some(cached) => check_group_agrees(cached, &lp)?,
            }
            loop_table.entry(lp.group.clone()).or_default().push(lp.id);
            loops.push(lp);
        }

        if !loop_table.contains_key(&def.start_group) {
            return Err(TrackError::UnknownStartGroup(def.start_group.clone()));
        }
        for lp in &loops {
            for next in lp.next_groups.keys() {
                if !loop_table.contains_key(next) {
                    return Err(TrackError::UnknownGroup {
                        owner: format!("loop group `{}`", lp.group),
                        group: next.clone(),
                    });
                }
            }
        }

        let mut melody_table: BTreeMap<String, BTreeMap<String, Vec<MelodyId>>> = BTreeMap::new();
        for (i, mel) in def.melodies.iter().enumerate() {
            validate_melody(mel, &loops, &loop_table)?;
            melody_table
                .entry(mel.name.clone())
                .or_default()
                .entry(mel.instrument.clone())
                .or_default()
                .push(MelodyId(i));
            log::debug!("compiled melody `{}` on `{}`", mel.name, mel.instrument);
        }
        for mel in &def.melodies {
            for follow in &mel.follows {
                let known = melody_table
                    .get(&follow.name)
                    .is_some_and(|by_instr| by_instr.contains_key(&follow.instrument));
                if !known {
                    return Err(TrackError::UnknownFollow {
                        owner: mel.name.clone(),
                        name: follow.name.clone(),
                        instrument: follow.instrument.clone(),
                    });
                }
            }
        }

        let mut jingle_table: BTreeMap<String, Vec<JingleId>> = BTreeMap::new();
        for (i, jingle) in def.jingles.iter().enumerate() {
            if jingle.beats_until_bar.is_empty() {
                return Err(TrackError::NoJingleOffsets(jingle.name.clone()));
            }
            if jingle.bpm <= 0.0 {
                return Err(TrackError::InvalidTempo {
                    owner: format!("jingle `{}`", jingle.name),
                });
            }
            if jingle.clip.length.is_none() {
                return Err(TrackError::MissingClipLength(jingle.clip.path.clone()));
            }
            jingle_table
                .entry(jingle.name.clone())
                .or_default()
                .push(JingleId(i));
        }

        Ok(Self {
            start_group: def.start_group.clone(),
            loops,
            loop_table,
            groups,
            melodies: def.melodies.clone(),
            melody_table,
            jingles: def.jingles.clone(),
            jingle_table,
        })
    }

    pub fn start_group(&self) -> &str {
        &self.start_group
    }

    pub fn get_loop(&self, id: LoopId) -> &RuntimeLoop {
        &self.loops[id.0]
    }

    /// All loop variants of a group. Empty for unknown groups.
    pub fn loops_in(&self, group: &str) -> &[LoopId] {
        self.loop_table.get(group).map_or(&[], Vec::as_slice)
    }

    /// Cached timing for a group, seeded by its first loop.
    pub fn group(&self, group: &str) -> Option<&GroupTiming> {
        self.groups.get(group)
    }

    pub fn melody(&self, id: MelodyId) -> &MelodyDefinition {
        &self.melodies[id.0]
    }

    /// Melodies registered under `name`, keyed by instrument.
    pub fn melodies_named(&self, name: &str) -> Option<&BTreeMap<String, Vec<MelodyId>>> {
        self.melody_table.get(name)
    }

    pub fn melody_names(&self) -> impl Iterator<Item = &str> {
        self.melody_table.keys().map(String::as_str)
    }

    pub fn jingle(&self, id: JingleId) -> &JingleDefinition {
        &self.jingles[id.0]
    }

    /// Jingles registered under `name`. Empty for unknown names.
    pub fn jingles_named(&self, name: &str) -> &[JingleId] {
        self.jingle_table.get(name).map_or(&[], Vec::as_slice)
    }

    pub fn jingle_names(&self) -> impl Iterator<Item = &str> {
        self.jingle_table.keys().map(String::as_str)
    }
}

fn validate_loop(def: &LoopDefinition) -> Result<(), TrackError> {
    if def.bpm <= 0.0 {
        return Err(TrackError::InvalidTempo {
            owner: format!("loop group `{}`", def.group),
        });
    }
    if def.chords.is_empty() {
        return Err(TrackError::EmptyProgression(def.group.clone()));
    }
    if def.next_groups.is_empty() {
        return Err(TrackError::NoSuccessor(def.group.clone()));
    }
    if !def.bars.is_empty() {
        let bars: f64 = def.bars.iter().sum();
        let chords = progression_beats(&def.chords);
        if (bars - chords).abs() > BEAT_EPS {
            return Err(TrackError::BarMismatch {
                group: def.group.clone(),
                bars,
                chords,
            });
        }
    }
    Ok(())
}

fn check_group_agrees(cached: &GroupTiming, lp: &RuntimeLoop) -> Result<(), TrackError> {
    let field = if (cached.bps - lp.bps).abs() > BEAT_EPS {
        "tempo"
    } else if cached.chords != lp.chords {
        "chord progression"
    } else if cached.bars != lp.bars {
        "bar lengths"
    } else {
        return Ok(());
    };
    Err(TrackError::InconsistentGroup {
        group: lp.group.clone(),
        field,
    })
}

fn validate_melody(
    mel: &MelodyDefinition,
    loops: &[RuntimeLoop],
    loop_table: &BTreeMap<String, Vec<LoopId>>,
) -> Result<(), TrackError> {
    if mel.over_loops.is_empty() {
        return Err(TrackError::EmptyMelodyLoops(mel.name.clone()));
    }
    for group in &mel.over_loops {
        if !loop_table.contains_key(group) {
            return Err(TrackError::UnknownGroup {
                owner: format!("melody `{}`", mel.name),
                group: group.clone(),
            });
        }
    }
    for pair in mel.over_loops.windows(2) {
        let (from, to) = (&pair[0], &pair[1]);
        let reachable = loop_table[from]
            .iter()
            .any(|id| loops[id.0].next_groups.contains_key(to));
        if !reachable {
            return Err(TrackError::UnreachableMelodyStep {
                name: mel.name.clone(),
                from: from.clone(),
                to: to.clone(),
            });
        }
    }
    Ok(())
}
