//! Melody planning tests — plan extension, offsets, and follow-ups driven
//! through the public engine surface.

use assert_approx_eq::assert_approx_eq;

use loopweave::backend::{Bus, PlaybackBackend, RecordingBackend};
use loopweave::config::EngineConfig;
use loopweave::engine::MusicEngine;
use loopweave::track::{
    Chord, ChordTerm, Clip, LoopDefinition, MelodyDefinition, MelodyFollow, RuntimeTrack,
    TrackDefinition,
};

/// 8 beats at 120 BPM: 4 s per loop.
fn loop_def(group: &str, next: &[&str]) -> LoopDefinition {
    LoopDefinition {
        clip: Clip::new(format!("{group}.wav"), 0.0),
        bpm: 120.0,
        group: group.into(),
        tags: vec![],
        next_groups: next.iter().map(|g| (g.to_string(), 0.0)).collect(),
        next_tags: Default::default(),
        chords: vec![ChordTerm::new(Chord::C, 4.0), ChordTerm::new(Chord::G, 4.0)],
        bars: vec![],
    }
}

fn melody(name: &str, instrument: &str, over: &[&str], offset: f64, end: i32) -> MelodyDefinition {
    MelodyDefinition {
        name: name.into(),
        instrument: instrument.into(),
        clip: Clip::new(format!("{name}-{instrument}.wav"), 8.0),
        beats_into_loop: offset,
        over_loops: over.iter().map(|g| g.to_string()).collect(),
        end,
        follows: vec![],
        no_follow_weight: -1000.0,
        beats_to_kill: 1.0,
    }
}

fn engine(melodies: Vec<MelodyDefinition>) -> MusicEngine<RecordingBackend> {
    let def = TrackDefinition {
        start_group: "G1".into(),
        loops: vec![
            loop_def("G1", &["G1", "G2"]),
            loop_def("G2", &["G1", "G2"]),
            loop_def("G3", &["G1"]),
        ],
        melodies,
        jingles: vec![],
    };
    let config = EngineConfig {
        seed: Some(21),
        ..EngineConfig::default()
    };
    let mut engine =
        MusicEngine::new(RuntimeTrack::compile(&def).unwrap(), RecordingBackend::new(1000), config);
    engine.start();
    engine
}

fn run_until(engine: &mut MusicEngine<RecordingBackend>, until: f64) {
    while engine.backend().now() < until {
        engine.backend_mut().advance(0.01);
        engine.tick().unwrap();
    }
}

#[test]
fn offset_zero_extends_plan_and_waits_for_its_beat() {
    let mut engine = engine(vec![melody("m", "lead", &["G1", "G2"], 2.0, 2)]);
    // first loop starts at 0.53; 0.5 beats in
    run_until(&mut engine, 0.78);
    assert_eq!(engine.state().plan.committed().collect::<Vec<_>>(), vec!["G1"]);
    assert_eq!(engine.state().plan.provisional_len(), 0);

    assert!(engine.try_queue_melody("m", 1, None));
    assert_eq!(engine.state().queued_melodies["lead"].loops_left, 0);
    assert_eq!(engine.state().plan.provisional().collect::<Vec<_>>(), vec!["G2"]);

    // beat 2 is at 1.53 s
    run_until(&mut engine, 1.5);
    assert_eq!(engine.backend().scheduled_on(Bus::Melodies).count(), 0);
    run_until(&mut engine, 1.6);
    let started: Vec<_> = engine.backend().scheduled_on(Bus::Melodies).collect();
    assert_eq!(started.len(), 1);
    assert_approx_eq!(started[0].start_time, 1.53 + 0.1, 1e-9);

    // the next loop honours the melody's second group
    run_until(&mut engine, 4.6);
    assert_eq!(engine.current_group(), Some("G2"));
}

#[test]
fn passed_offset_moves_to_next_loop() {
    let mut engine = engine(vec![melody("m", "lead", &["G1"], 2.0, 1)]);
    // 3 beats in: too late for this loop
    run_until(&mut engine, 2.05);
    assert!(engine.try_queue_melody("m", 3, None));
    let queued = &engine.state().queued_melodies["lead"];
    assert_eq!(queued.loops_left, 1);
    assert_eq!(engine.loop_at(1), Some("G1"));
}

#[test]
fn horizon_too_short_refuses() {
    let mut engine = engine(vec![melody("m", "lead", &["G1"], 2.0, 1)]);
    run_until(&mut engine, 2.05);
    assert!(!engine.try_queue_melody("m", 1, None));
    assert!(engine.state().queued_melodies.is_empty());
}

#[test]
fn conflicting_plan_is_refused() {
    let mut engine = engine(vec![
        melody("first", "lead", &["G1", "G2"], 0.0, 2),
        melody("second", "bass", &["G1", "G1"], 0.0, 2),
    ]);
    run_until(&mut engine, 1.0);
    assert!(engine.try_queue_melody("first", 2, None));
    // the plan is now G1, G1, G2: second fits neither at 1 nor at 2
    assert!(!engine.try_queue_melody("second", 2, None));
    assert!(!engine.try_queue_melody("second", 3, None));
    // past the end of the plan, after G2
    assert!(engine.try_queue_melody("second", 4, None));
    assert_eq!(engine.state().queued_melodies["bass"].loops_left, 3);
    assert_eq!(
        engine.state().plan.iter().collect::<Vec<_>>(),
        vec!["G1", "G1", "G2", "G1", "G1"]
    );
}

#[test]
fn unreachable_group_is_never_planned() {
    // nothing leads into G3
    let mut engine = engine(vec![melody("odd", "lead", &["G3"], 0.0, 1)]);
    run_until(&mut engine, 1.0);
    assert!(!engine.try_queue_melody("odd", 4, None));
    run_until(&mut engine, 3.0);
    assert!(!engine.try_queue_melody("odd", 4, None));
}

#[test]
fn instrument_filter_picks_variant() {
    let mut engine = engine(vec![
        melody("theme", "flute", &["G1"], 0.0, 1),
        melody("theme", "cello", &["G1"], 0.0, 1),
    ]);
    run_until(&mut engine, 1.0);
    assert!(engine.try_queue_melody("theme", 2, Some("cello")));
    assert!(engine.state().queued_melodies.contains_key("cello"));
    assert!(!engine.state().queued_melodies.contains_key("flute"));
    // the other variant is still free
    assert!(engine.try_queue_melody("theme", 2, Some("flute")));
}

#[test]
fn future_slot_behind_playing_melody() {
    let mut engine = engine(vec![
        melody("long", "lead", &["G1"], 0.0, 2),
        melody("next", "lead", &["G1"], 0.0, 1),
    ]);
    run_until(&mut engine, 1.0);
    assert!(engine.try_queue_melody("long", 2, None));
    // long plays 4.53..12.53; wait for the loop after this one to be chosen
    run_until(&mut engine, 7.0);
    assert_eq!(engine.state().melodies["lead"].loops_left, 2);
    // the instrument frees after two more boundaries
    assert!(!engine.try_queue_melody("next", 2, None));
    assert!(engine.try_queue_melody("next", 3, None));
    assert_eq!(engine.state().queued_melodies["lead"].loops_left, 2);

    run_until(&mut engine, 12.6);
    let playing = &engine.state().melodies["lead"];
    assert_eq!(engine.track().melody(playing.melody).name, "next");
}

#[test]
fn follow_up_can_be_declined() {
    let mut first = melody("call", "lead", &["G1"], 0.0, 1);
    first.follows.push(MelodyFollow {
        name: "response".into(),
        instrument: "lead".into(),
        start_group: "G2".into(),
        weight: -1000.0,
    });
    first.no_follow_weight = 50.0;
    let mut engine = engine(vec![first, melody("response", "lead", &["G2"], 0.0, 1)]);
    run_until(&mut engine, 1.0);
    assert!(engine.try_queue_melody("call", 2, None));
    run_until(&mut engine, 5.0);
    // call is on its last loop: a follow-up was considered and declined
    assert_eq!(engine.state().melodies["lead"].loops_left, 1);
    assert!(engine.state().queued_melodies.is_empty());
}

#[test]
fn follow_up_queues_over_its_group() {
    let mut first = melody("call", "lead", &["G1"], 0.0, 1);
    first.follows.push(MelodyFollow {
        name: "response".into(),
        instrument: "lead".into(),
        start_group: "G2".into(),
        weight: 100.0,
    });
    let mut engine = engine(vec![first, melody("response", "lead", &["G2"], 0.0, 1)]);
    run_until(&mut engine, 1.0);
    assert!(engine.try_queue_melody("call", 2, None));
    run_until(&mut engine, 5.0);
    let queued = &engine.state().queued_melodies["lead"];
    assert_eq!(engine.track().melody(queued.melody).name, "response");
    assert_eq!(engine.loop_at(1), Some("G2"));

    run_until(&mut engine, 8.6);
    assert_eq!(engine.current_group(), Some("G2"));
    let names: Vec<_> = engine
        .backend()
        .scheduled_on(Bus::Melodies)
        .map(|s| s.clip.as_str())
        .collect();
    assert_eq!(names, vec!["call-lead.wav", "response-lead.wav"]);
}
