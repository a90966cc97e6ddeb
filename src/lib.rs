//! Loopweave — an adaptive music engine for games.
//!
//! A track is authored as loop variants grouped by musical role, melodies
//! that ride over sequences of groups, and short jingles aligned to bar ends.
//! The engine picks loops by weighted chance, plans ahead so queued melodies
//! land on the loops they were written for, and hands every clip to a
//! [`backend::PlaybackBackend`] with an absolute start time.

pub mod backend;
pub mod config;
pub mod engine;
pub mod error;
pub mod track;
