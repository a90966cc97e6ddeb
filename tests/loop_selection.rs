//! Loop selection tests — weighting, staleness, and plan-driven choices.

use loopweave::backend::{Bus, PlaybackBackend, RecordingBackend};
use loopweave::config::EngineConfig;
use loopweave::engine::{loop_candidates, loop_weight, MusicEngine, StaleHistory};
use loopweave::track::{Chord, ChordTerm, Clip, LoopDefinition, RuntimeTrack, TrackDefinition};

fn loop_def(group: &str, next: &[(&str, f64)]) -> LoopDefinition {
    LoopDefinition {
        clip: Clip::new(format!("{group}.wav"), 0.0),
        bpm: 120.0,
        group: group.into(),
        tags: vec![],
        next_groups: next.iter().map(|(g, w)| (g.to_string(), *w)).collect(),
        next_tags: Default::default(),
        chords: vec![ChordTerm::new(Chord::C, 4.0), ChordTerm::new(Chord::G, 4.0)],
        bars: vec![],
    }
}

/// `A → B` at 1.0 and `A → A` at 0.3; B always returns to A.
fn ab_track() -> RuntimeTrack {
    RuntimeTrack::compile(&TrackDefinition {
        start_group: "A".into(),
        loops: vec![
            loop_def("A", &[("B", 1.0), ("A", 0.3)]),
            loop_def("B", &[("A", 1.0)]),
            loop_def("C", &[("A", 1.0)]),
        ],
        melodies: vec![],
        jingles: vec![],
    })
    .unwrap()
}

fn probability_of_b(track: &RuntimeTrack, stale: &StaleHistory) -> f64 {
    let a = track.get_loop(track.loops_in("A")[0]);
    let candidates = loop_candidates(track, a, None, None);
    let weights: Vec<(String, f64)> = candidates
        .iter()
        .map(|&id| {
            let lp = track.get_loop(id);
            (lp.group.clone(), loop_weight(lp, a, stale))
        })
        .collect();
    let total: f64 = weights.iter().map(|(_, w)| w).sum();
    weights
        .iter()
        .filter(|(g, _)| g == "B")
        .map(|(_, w)| w / total)
        .sum()
}

fn history(groups: &[&str]) -> StaleHistory {
    let mut h = StaleHistory::new(10, 0.7);
    for g in groups {
        h.push(g);
    }
    h
}

#[test]
fn recent_b_lowers_chance_of_b() {
    let track = ab_track();
    // same history for A, but B never played
    let fresh = probability_of_b(&track, &history(&["A", "C", "A", "C", "A"]));
    let stale = probability_of_b(&track, &history(&["A", "B", "A", "B", "A"]));
    assert!(stale < fresh, "stale {stale} vs fresh {fresh}");
}

#[test]
fn untouched_history_follows_base_weights() {
    let track = ab_track();
    let p = probability_of_b(&track, &StaleHistory::new(10, 0.7));
    let expected = 1.0f64.exp() / (1.0f64.exp() + 0.3f64.exp());
    assert!((p - expected).abs() < 1e-12);
}

#[test]
fn empirical_frequencies_favor_heavier_group() {
    let mut b_after_a = 0;
    let mut a_after_a = 0;
    for seed in 0..40 {
        let config = EngineConfig {
            seed: Some(seed),
            stale_memory: 0,
            ..EngineConfig::default()
        };
        let mut engine = MusicEngine::new(ab_track(), RecordingBackend::new(1000), config);
        engine.start();
        while engine.backend().now() < 40.0 {
            engine.backend_mut().advance(0.02);
            engine.tick().unwrap();
        }
        let clips: Vec<String> = engine
            .backend()
            .scheduled_on(Bus::Loops)
            .map(|s| s.clip.clone())
            .collect();
        for pair in clips.windows(2) {
            match (pair[0].as_str(), pair[1].as_str()) {
                ("A.wav", "B.wav") => b_after_a += 1,
                ("A.wav", "A.wav") => a_after_a += 1,
                _ => {}
            }
        }
    }
    // P(B | A) is about 0.67 with staleness disabled
    let total = (a_after_a + b_after_a) as f64;
    let ratio = b_after_a as f64 / total;
    assert!(total > 100.0);
    assert!(ratio > 0.55 && ratio < 0.8, "ratio {ratio}");
}

#[test]
fn c_is_never_chosen_from_a() {
    let config = EngineConfig {
        seed: Some(9),
        ..EngineConfig::default()
    };
    let mut engine = MusicEngine::new(ab_track(), RecordingBackend::new(1000), config);
    engine.start();
    while engine.backend().now() < 120.0 {
        engine.backend_mut().advance(0.02);
        engine.tick().unwrap();
    }
    assert!(engine
        .backend()
        .scheduled_on(Bus::Loops)
        .all(|s| s.clip != "C.wav"));
}

#[test]
fn forced_group_plays_next() {
    let config = EngineConfig {
        seed: Some(1),
        ..EngineConfig::default()
    };
    let mut engine = MusicEngine::new(ab_track(), RecordingBackend::new(1000), config);
    engine.start();
    while engine.current_group().is_none() {
        engine.backend_mut().advance(0.02);
        engine.tick().unwrap();
    }
    assert!(engine.force_next_group("C", 10));
    while engine.backend().now() < 5.0 {
        engine.backend_mut().advance(0.02);
        engine.tick().unwrap();
    }
    assert_eq!(engine.current_group(), Some("C"));
    // C only leads back to A
    while engine.backend().now() < 9.0 {
        engine.backend_mut().advance(0.02);
        engine.tick().unwrap();
    }
    assert_eq!(engine.current_group(), Some("A"));
}
