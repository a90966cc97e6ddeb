//! Playback backend interface — the engine's only view of the audio system.
//!
//! The engine never touches samples. It asks a [`PlaybackBackend`] for the
//! current clock time and hands it clips with absolute start times on that
//! clock. Mixing, filters, and sample-accurate starts are the backend's job.

pub mod clock;
pub mod recording;

use serde::Serialize;

pub use clock::SampleClock;
pub use recording::{RecordingBackend, ScheduledClip};

use crate::track::Clip;

/// A playback channel owned by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ChannelId {
    /// One of the two alternating loop channels.
    Loop(usize),
    Melody(usize),
    Jingle(usize),
}

impl ChannelId {
    /// The output bus this channel feeds.
    pub fn bus(self) -> Bus {
        match self {
            ChannelId::Loop(_) => Bus::Loops,
            ChannelId::Melody(_) => Bus::Melodies,
            ChannelId::Jingle(_) => Bus::Jingles,
        }
    }
}

/// Independent volume buses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Bus {
    Loops,
    Melodies,
    Jingles,
}

/// The audio system the engine schedules onto.
pub trait PlaybackBackend {
    /// Current time on the playback clock, in seconds.
    fn now(&self) -> f64;

    /// Start `clip` on `channel` at absolute clock time `start_time`.
    fn schedule(&mut self, channel: ChannelId, clip: &Clip, start_time: f64);

    /// Stop every channel immediately.
    fn stop_all(&mut self);

    /// Mute or unmute a channel.
    fn set_enabled(&mut self, channel: ChannelId, enabled: bool);

    fn set_volume(&mut self, bus: Bus, volume: f32);
}
