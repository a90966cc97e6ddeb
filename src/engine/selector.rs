//! Loop selection — choosing the loop that follows the current one.
//!
//! A candidate's weight is `exp(base + tag_bonus - stale_penalty)`:
//! - base: the current loop's log-weight for the candidate's group (0 if absent),
//! - tag bonus: the sum of the current loop's tag weights the candidate carries,
//! - staleness: how recently the candidate's group has been played.

use rand::seq::SliceRandom;

use super::clock::NextLoop;
use super::stale::StaleHistory;
use super::weighted;
use super::MusicEngine;
use crate::backend::PlaybackBackend;
use crate::error::EngineError;
use crate::track::{LoopId, RuntimeLoop, RuntimeTrack};

/// Loops that may follow `current`.
///
/// With a required group only its loops qualify; otherwise every loop of
/// every group `current` names. With a `then` group, candidates must be able
/// to move on to it.
pub fn loop_candidates(
    track: &RuntimeTrack,
    current: &RuntimeLoop,
    required: Option<&str>,
    then: Option<&str>,
) -> Vec<LoopId> {
    let groups: Vec<&str> = match required {
        Some(group) => vec![group],
        None => current.next_groups.keys().map(String::as_str).collect(),
    };
    groups
        .into_iter()
        .flat_map(|g| track.loops_in(g).iter().copied())
        .filter(|&id| then.map_or(true, |t| track.get_loop(id).next_groups.contains_key(t)))
        .collect()
}

/// Selection weight of `candidate` following `current`.
pub fn loop_weight(candidate: &RuntimeLoop, current: &RuntimeLoop, stale: &StaleHistory) -> f64 {
    let base = current
        .next_groups
        .get(&candidate.group)
        .copied()
        .unwrap_or(0.0);
    let tags: f64 = current
        .next_tags
        .iter()
        .filter(|(tag, _)| candidate.tags.contains(*tag))
        .map(|(_, w)| w)
        .sum();
    (base + tags - stale.penalty(&candidate.group)).exp()
}

impl<B: PlaybackBackend> MusicEngine<B> {
    /// Commit a uniformly chosen loop of `group` as the next loop, among those
    /// that can move on to `then`.
    ///
    /// Returns `false` if a commitment of equal or higher priority is held or
    /// no loop of the group qualifies.
    pub(crate) fn commit_group(
        &mut self,
        priority: u32,
        group: &str,
        then: Option<&str>,
    ) -> bool {
        if !self.state.next.can_commit(priority) {
            return false;
        }
        let track = &self.track;
        let loops: Vec<LoopId> = track
            .loops_in(group)
            .iter()
            .copied()
            .filter(|&id| then.map_or(true, |t| track.get_loop(id).next_groups.contains_key(t)))
            .collect();
        let Some(&loop_id) = loops.choose(&mut self.rng) else {
            return false;
        };
        self.state.next = NextLoop::Committed {
            loop_id,
            start_time: self.next_start_time(),
            priority,
        };
        true
    }

    /// Choose and commit the next loop by weight.
    ///
    /// Returns the chosen loop, or `None` if the held commitment outranks
    /// `priority` or no loop is playing yet.
    pub(crate) fn queue_next_loop(
        &mut self,
        priority: u32,
        required: Option<&str>,
        then: Option<&str>,
    ) -> Result<Option<LoopId>, EngineError> {
        if !self.state.next.can_commit(priority) {
            return Ok(None);
        }
        let Some(current_id) = self.state.current_loop else {
            return Ok(None);
        };
        let current = self.track.get_loop(current_id);
        let candidates = loop_candidates(&self.track, current, required, then);
        if candidates.is_empty() {
            return Err(EngineError::NoCandidates {
                current: current.group.clone(),
                required: required.map(str::to_string),
                then: then.map(str::to_string),
            });
        }

        let weights: Vec<f64> = candidates
            .iter()
            .map(|&id| loop_weight(self.track.get_loop(id), current, &self.state.stale))
            .collect();
        let pick = weighted::choose(&mut self.rng, &weights, 0.0).unwrap_or(weights.len() - 1);
        let loop_id = candidates[pick];
        log::debug!(
            "next loop `{}` chosen from {} candidates (weight {:.3})",
            self.track.get_loop(loop_id).group,
            candidates.len(),
            weights[pick]
        );

        self.state.next = NextLoop::Committed {
            loop_id,
            start_time: self.next_start_time(),
            priority,
        };
        Ok(Some(loop_id))
    }

    /// Override the next loop with a uniformly chosen loop of `group`.
    ///
    /// Refused while no loop is playing, when `priority` does not beat the
    /// held commitment, or when a melody relies on a different group at that
    /// position. A freely selected next loop is replaced.
    pub fn force_next_group(&mut self, group: &str, priority: u32) -> bool {
        if self.state.current_loop.is_none() || self.track.loops_in(group).is_empty() {
            return false;
        }
        if let Some(planned) = self.state.plan.get(1) {
            if planned != group && self.melody_needs_slot(1) {
                log::warn!("cannot force `{group}`: a melody needs `{planned}` next");
                return false;
            }
        }
        let then = self.state.plan.get(2).map(str::to_string);
        if !self.commit_group(priority, group, then.as_deref()) {
            return false;
        }
        if self.state.plan.len() == 1 {
            self.state.plan.push_committed(group);
        } else {
            self.state.plan.replace(1, group);
        }
        log::info!("next loop forced to `{group}` at priority {priority}");
        true
    }

    fn next_start_time(&self) -> f64 {
        let length = self
            .state
            .current_loop
            .map_or(0.0, |id| self.track.get_loop(id).length);
        self.state.start_time + length
    }
}
