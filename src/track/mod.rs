//! Track data — authored definitions, chord terms, and the compiled runtime tables.
//!
//! A [`TrackDefinition`] is what a composer writes (usually as YAML). It is
//! compiled once into a [`RuntimeTrack`], which the engine reads every tick
//! and never mutates.

pub mod chord;
pub mod compile;
pub mod definition;
pub mod loader;

pub use chord::{chord_at, progression_beats, Chord, ChordTerm};
pub use compile::{GroupTiming, JingleId, LoopId, MelodyId, RuntimeLoop, RuntimeTrack};
pub use definition::{
    Clip, JingleDefinition, LoopDefinition, MelodyDefinition, MelodyFollow, TrackDefinition,
};
pub use loader::{compile_track_file, load_track, parse_track, probe_wav_length};
