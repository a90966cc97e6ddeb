//! Loopweave — simulate a track against a recording backend.
//!
//! Ticks the engine on a simulated clock and prints every clip it schedules.
//! Melodies and jingles can be cued at fixed times to audition how the
//! engine places them.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use loopweave::backend::{PlaybackBackend, RecordingBackend};
use loopweave::config::EngineConfig;
use loopweave::engine::MusicEngine;
use loopweave::track::compile_track_file;

#[derive(Parser)]
#[command(name = "loopweave", about = "Simulate an adaptive music track")]
struct Cli {
    /// Track definition (YAML)
    track: PathBuf,
    /// Engine config file [default: ~/.loopweave/engine.yaml]
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// RNG seed, overriding the config
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated duration in seconds
    #[arg(long, default_value_t = 60.0)]
    seconds: f64,
    /// Tick interval in milliseconds
    #[arg(long, default_value_t = 16)]
    tick_ms: u64,
    /// Queue a melody at a time, as NAME@SECONDS
    #[arg(long = "melody", value_parser = parse_cue)]
    melodies: Vec<Cue>,
    /// Loops ahead a cued melody may be placed
    #[arg(long, default_value_t = 2)]
    melody_loops: usize,
    /// Queue a jingle at a time, as NAME@SECONDS
    #[arg(long = "jingle", value_parser = parse_cue)]
    jingles: Vec<Cue>,
    /// Tick in real time instead of as fast as possible
    #[arg(long)]
    realtime: bool,
    /// Print a JSON status line whenever the playing loop changes
    #[arg(long)]
    status: bool,
}

#[derive(Debug, Clone)]
struct Cue {
    name: String,
    at: f64,
}

fn parse_cue(s: &str) -> Result<Cue, String> {
    let (name, at) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("expected NAME@SECONDS, got `{s}`"))?;
    let at = at
        .parse::<f64>()
        .map_err(|e| format!("bad time in `{s}`: {e}"))?;
    if name.is_empty() {
        return Err(format!("missing name in `{s}`"));
    }
    Ok(Cue {
        name: name.to_string(),
        at,
    })
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => match EngineConfig::from_path(path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("failed to load config: {e}");
                std::process::exit(1);
            }
        },
        None => EngineConfig::load().unwrap_or_default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }

    let track = match compile_track_file(&cli.track) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("failed to load track: {e}");
            std::process::exit(1);
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let handler_flag = Arc::clone(&running);
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(false, Ordering::SeqCst)) {
        log::warn!("could not install Ctrl-C handler: {e}");
    }

    let mut melodies = cli.melodies.clone();
    let mut jingles = cli.jingles.clone();
    melodies.sort_by(|a, b| a.at.total_cmp(&b.at));
    jingles.sort_by(|a, b| a.at.total_cmp(&b.at));
    let mut melodies = melodies.into_iter().peekable();
    let mut jingles = jingles.into_iter().peekable();

    let tick = Duration::from_millis(cli.tick_ms.max(1));
    let mut engine = MusicEngine::new(track, RecordingBackend::default(), config);
    engine.start();
    let mut last_group = None;

    while running.load(Ordering::SeqCst) && engine.backend().now() < cli.seconds {
        engine.backend_mut().advance(tick.as_secs_f64());
        if let Err(e) = engine.tick() {
            eprintln!("engine error: {e}");
            std::process::exit(1);
        }

        let now = engine.backend().now();
        while let Some(cue) = melodies.next_if(|c| c.at <= now) {
            if !engine.try_queue_melody(&cue.name, cli.melody_loops, None) {
                println!("{now:>8.3}s  melody `{}` could not be placed", cue.name);
            }
        }
        while let Some(cue) = jingles.next_if(|c| c.at <= now) {
            if !engine.queue_jingle(&cue.name) {
                println!("{now:>8.3}s  jingle `{}` not queued", cue.name);
            }
        }

        for s in engine.backend_mut().take_scheduled() {
            println!(
                "{:>8.3}s  {:<12} {} @ {:.3}s",
                s.issued_at,
                format!("{:?}", s.channel),
                s.clip,
                s.start_time
            );
        }

        if cli.status {
            let group = engine.current_group().map(str::to_string);
            if group != last_group {
                match serde_json::to_string(&engine.status()) {
                    Ok(json) => println!("{json}"),
                    Err(e) => log::warn!("status not serializable: {e}"),
                }
                last_group = group;
            }
        }

        if cli.realtime {
            thread::sleep(tick);
        }
    }

    engine.stop();
    println!("done.");
}
