//! Chord symbols and chord-progression terms.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A chord symbol as authored in track data.
///
/// `Any` is a wildcard: on either side of a comparison it matches every chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Chord {
    A,
    Am,
    Bb,
    Bbm,
    B,
    Bm,
    C,
    Cm,
    Db,
    CSm,
    D,
    Dm,
    Eb,
    Ebm,
    E,
    Em,
    F,
    Fm,
    FS,
    FSm,
    G,
    Gm,
    Ab,
    GSm,
    Any,
    Other,
}

impl Chord {
    /// Whether `self` is acceptable for a jingle that requires one of `allowed`.
    pub fn satisfies(self, allowed: &[Chord]) -> bool {
        self == Chord::Any || allowed.contains(&Chord::Any) || allowed.contains(&self)
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One entry of a chord progression: a chord held for a number of beats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChordTerm {
    pub chord: Chord,
    pub beats: f64,
}

impl ChordTerm {
    pub fn new(chord: Chord, beats: f64) -> Self {
        Self { chord, beats }
    }
}

/// Total length in beats of a progression.
pub fn progression_beats(terms: &[ChordTerm]) -> f64 {
    terms.iter().map(|t| t.beats).sum()
}

/// The chord sounding `offset` beats into a progression, or `None` past its end.
///
/// A position exactly on a term boundary belongs to the term that starts there.
pub fn chord_at(terms: &[ChordTerm], offset: f64) -> Option<Chord> {
    const EPS: f64 = 1e-9;
    if offset < -EPS {
        return None;
    }
    let mut end = 0.0;
    for term in terms {
        end += term.beats;
        if offset + EPS < end {
            return Some(term.chord);
        }
    }
    None
}
