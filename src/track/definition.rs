//! Authored track data: loops, melodies, jingles, and the clips they play.
//!
//! These types mirror the YAML a composer writes. They are validated and
//! turned into lookup tables by [`compile`](super::compile).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::chord::{Chord, ChordTerm};

/// A handle to an audio clip owned by the playback backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Backend-specific path or asset name.
    pub path: String,
    /// Clip length in seconds. Probed from the file when omitted.
    #[serde(default)]
    pub length: Option<f64>,
}

impl Clip {
    pub fn new(path: impl Into<String>, length: f64) -> Self {
        Self {
            path: path.into(),
            length: Some(length),
        }
    }
}

/// A complete piece of adaptive music.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackDefinition {
    pub start_group: String,
    pub loops: Vec<LoopDefinition>,
    #[serde(default)]
    pub melodies: Vec<MelodyDefinition>,
    #[serde(default)]
    pub jingles: Vec<JingleDefinition>,
}

/// One seamlessly repeatable loop variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopDefinition {
    pub clip: Clip,
    pub bpm: f64,
    pub group: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Candidate successor groups and their base log-weights.
    #[serde(default)]
    pub next_groups: BTreeMap<String, f64>,
    /// Log-weight bonus for successors carrying a tag.
    #[serde(default)]
    pub next_tags: BTreeMap<String, f64>,
    pub chords: Vec<ChordTerm>,
    /// Beats per bar. Empty means bars follow the chord terms.
    #[serde(default)]
    pub bars: Vec<f64>,
}

/// A melodic overlay bound to one instrument and a sequence of loop groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MelodyDefinition {
    pub name: String,
    pub instrument: String,
    pub clip: Clip,
    /// Beat offset into the first loop. Negative values start before the boundary.
    #[serde(default)]
    pub beats_into_loop: f64,
    pub over_loops: Vec<String>,
    /// Loops to sustain before the instrument may take another melody.
    pub end: i32,
    #[serde(default)]
    pub follows: Vec<MelodyFollow>,
    #[serde(default = "default_no_follow_weight")]
    pub no_follow_weight: f64,
    /// Beats into a loop after which a retiring melody's channel is reclaimed.
    #[serde(default)]
    pub beats_to_kill: f64,
}

fn default_no_follow_weight() -> f64 {
    -1000.0
}

/// A weighted follow-up for a melody that is about to finish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MelodyFollow {
    pub name: String,
    pub instrument: String,
    pub start_group: String,
    pub weight: f64,
}

/// A short reactive clip placed relative to bar ends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JingleDefinition {
    pub name: String,
    pub clip: Clip,
    pub bpm: f64,
    /// Beats before the end of a bar at which the jingle may start.
    pub beats_until_bar: Vec<f64>,
    #[serde(default = "any_chord")]
    pub start_chords: Vec<Chord>,
    #[serde(default = "any_chord")]
    pub end_chords: Vec<Chord>,
}

fn any_chord() -> Vec<Chord> {
    vec![Chord::Any]
}
