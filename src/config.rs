//! Engine configuration — timing constants, pool sizes, and staleness tuning,
//! loaded from ~/.loopweave/engine.yaml.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;

/// Tunables for the scheduling engine. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Ticks to wait after start before the first loop is committed.
    pub warmup_ticks: u32,
    /// Seconds between the commit of the first loop and its start.
    pub start_buffer: f64,
    /// Seconds added to every start time sent to the backend.
    pub schedule_lead: f64,
    pub melody_channels: usize,
    pub jingle_channels: usize,
    /// Played groups remembered for staleness.
    pub stale_memory: usize,
    /// Decay per step back in the staleness history.
    pub stale_alpha: f64,
    /// Bars before the end of a loop at which the next loop is chosen.
    pub commit_bars_ahead: usize,
    /// An active jingle with less than this many seconds left frees its channel.
    pub jingle_release_secs: f64,
    /// Allowed beats-per-second difference between a jingle and the loop.
    pub tempo_tolerance: f64,
    /// RNG seed. `None` seeds from entropy.
    pub seed: Option<u64>,
    pub volumes: BusVolumes,
}

/// Initial levels for the three output buses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusVolumes {
    pub loops: f32,
    pub melodies: f32,
    pub jingles: f32,
}

impl Default for BusVolumes {
    fn default() -> Self {
        Self {
            loops: 1.0,
            melodies: 1.0,
            jingles: 1.0,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            warmup_ticks: 3,
            start_buffer: 0.5,
            schedule_lead: 0.1,
            melody_channels: 4,
            jingle_channels: 2,
            stale_memory: 10,
            stale_alpha: 0.7,
            commit_bars_ahead: 1,
            jingle_release_secs: 1.0,
            tempo_tolerance: 0.01,
            seed: None,
            volumes: BusVolumes::default(),
        }
    }
}

impl EngineConfig {
    /// Standard config location (~/.loopweave/engine.yaml).
    pub fn default_path() -> PathBuf {
        let mut path = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        path.push(".loopweave");
        path.push("engine.yaml");
        path
    }

    /// Load config from the standard path.
    /// Returns None if the file doesn't exist or is invalid (graceful fallback).
    pub fn load() -> Option<Self> {
        let content = std::fs::read_to_string(Self::default_path()).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    /// Load config from an explicit file, reporting any failure.
    pub fn from_path(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_yaml::from_str(&content).map_err(|source| LoadError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }
}
