use anyhow::Context;
use clap::Parser;
use petalmix::{Audio, DVec2, PetalMixConfig};
use std::path::PathBuf;
use std::time::{Duration, Instant};

const FRAME: Duration = Duration::from_millis(16);

/// Plays a music track and circles a sound around the listener
#[derive(Parser)]
#[command(name = "petalmix-play")]
#[command(version)]
struct Args {
    /// Asset roots, each holding a `sounds/` folder
    #[arg(required = true)]
    roots: Vec<PathBuf>,

    /// Music track to play
    #[arg(long)]
    music: Option<String>,

    /// Sound to circle around the listener
    #[arg(long)]
    sound: Option<String>,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Args { roots, music, sound } = Args::parse();

    let mut audio = Audio::with_default_output(PetalMixConfig::default().initial_volume(0.5))
        .context("Failed to create audio output")?;
    audio.init(roots.as_slice()).context("Failed to initialize audio")?;

    let started = Instant::now();
    while audio.progress() < 1.0 {
        println!("Loading sounds: {:.0}%", audio.progress() * 100.0);
        std::thread::sleep(Duration::from_millis(100));
    }
    println!("Loaded sounds in {:.2}s", started.elapsed().as_secs_f64());

    if let Some(name) = music.as_deref() {
        audio.play_music(name);
    }

    let sound = sound.map(|name| audio.get(&name));
    let player = audio.player();
    let started = Instant::now();
    let mut frame = 0u64;
    while started.elapsed() < Duration::from_secs(10) {
        audio.update(DVec2::ZERO);

        if let Some(sound) = sound.as_ref() {
            // One emitter every half second, moving around the listener
            if frame % 30 == 0 {
                let angle = started.elapsed().as_secs_f64();
                player.play_at(sound, DVec2::new(angle.cos(), angle.sin()) * 400.0);
            }
        }

        audio.step();
        frame += 1;
        std::thread::sleep(FRAME);
    }

    audio.play_music("");
    audio.quit();
    Ok(())
}
