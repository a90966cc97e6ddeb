//! Track loading — YAML track files with clip paths relative to the file.

use std::path::{Path, PathBuf};

use super::compile::RuntimeTrack;
use super::definition::{Clip, TrackDefinition};
use crate::error::LoadError;

/// Parse a track definition from YAML text. Clip paths are left untouched.
pub fn parse_track(yaml: &str, origin: &Path) -> Result<TrackDefinition, LoadError> {
    serde_yaml::from_str(yaml).map_err(|source| LoadError::Yaml {
        path: origin.to_path_buf(),
        source,
    })
}

/// Load a track definition from a YAML file.
///
/// Relative clip paths are resolved against the file's directory, and clips
/// without a `length` are probed when the WAV file is present.
pub fn load_track(path: &Path) -> Result<TrackDefinition, LoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut def = parse_track(&content, path)?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let clips = def
        .loops
        .iter_mut()
        .map(|l| &mut l.clip)
        .chain(def.melodies.iter_mut().map(|m| &mut m.clip))
        .chain(def.jingles.iter_mut().map(|j| &mut j.clip));
    for clip in clips {
        resolve_clip(clip, base)?;
    }
    Ok(def)
}

/// Load and compile a track file in one step.
pub fn compile_track_file(path: &Path) -> Result<RuntimeTrack, LoadError> {
    let def = load_track(path)?;
    Ok(RuntimeTrack::compile(&def)?)
}

fn resolve_clip(clip: &mut Clip, base: &Path) -> Result<(), LoadError> {
    let mut resolved = PathBuf::from(&clip.path);
    if resolved.is_relative() {
        resolved = base.join(resolved);
    }
    if clip.length.is_none() {
        if resolved.exists() {
            clip.length = Some(probe_wav_length(&resolved)?);
        } else {
            log::debug!("clip {} not found, length left unset", resolved.display());
        }
    }
    clip.path = resolved.to_string_lossy().into_owned();
    Ok(())
}

/// Duration of a WAV file in seconds.
pub fn probe_wav_length(path: &Path) -> Result<f64, LoadError> {
    let reader = hound::WavReader::open(path).map_err(|source| LoadError::Wav {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}
