//! Error types for track compilation, loading, and the running engine.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A malformed track definition. Raised once, when the track is compiled.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackError {
    #[error("start group `{0}` has no loops")]
    UnknownStartGroup(String),

    #[error("loop group `{0}` has an empty chord progression")]
    EmptyProgression(String),

    #[error("loop group `{group}`: bars total {bars} beats but chords total {chords}")]
    BarMismatch { group: String, bars: f64, chords: f64 },

    #[error("loops of group `{group}` disagree on {field}")]
    InconsistentGroup { group: String, field: &'static str },

    #[error("a loop of group `{0}` declares no successor groups")]
    NoSuccessor(String),

    #[error("{owner} refers to unknown group `{group}`")]
    UnknownGroup { owner: String, group: String },

    #[error("melody `{0}` plays over no loops")]
    EmptyMelodyLoops(String),

    #[error("melody `{name}` needs `{from}` -> `{to}` but no `{from}` loop leads to `{to}`")]
    UnreachableMelodyStep {
        name: String,
        from: String,
        to: String,
    },

    #[error("melody `{owner}` follows unknown melody `{name}` on `{instrument}`")]
    UnknownFollow {
        owner: String,
        name: String,
        instrument: String,
    },

    #[error("jingle `{0}` declares no trigger offsets")]
    NoJingleOffsets(String),

    #[error("clip `{0}` has no length and could not be probed")]
    MissingClipLength(String),

    #[error("{owner} has a non-positive tempo")]
    InvalidTempo { owner: String },
}

/// Failure to read a track or config file from disk.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid YAML in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to probe WAV clip {path}: {source}")]
    Wav {
        path: PathBuf,
        #[source]
        source: hound::Error,
    },

    #[error(transparent)]
    Track(#[from] TrackError),
}

/// An internal invariant broke while the engine was running.
///
/// These indicate compiled data that slipped past validation and are never
/// patched over.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("no loop can follow `{current}` (required group: {required:?}, then: {then:?})")]
    NoCandidates {
        current: String,
        required: Option<String>,
        then: Option<String>,
    },
}
