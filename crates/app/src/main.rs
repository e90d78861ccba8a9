use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use sample_map_core::timeline::PlaybackClock;
use sample_map_core::{
    factory_presets, load_sample_list, DirectorySource, EngineConfig, Preset, RecordingSettings,
    SampleMap, Viewport,
};
use tracing_subscriber::EnvFilter;

const FRAME_DT: f32 = 1.0 / 60.0;

fn main() -> sample_map_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => EngineConfig::from_json_file(path)?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Explore {
            samples,
            root,
            frames,
        } => run_explore(config, &samples, &root, frames),
        Commands::Play {
            samples,
            root,
            preset,
            seconds,
        } => run_play(config, &samples, &root, &preset, seconds),
        Commands::Bounce {
            samples,
            root,
            preset,
            output,
        } => run_bounce(config, &samples, &root, &preset, &output),
        Commands::Presets => {
            list_presets();
            Ok(())
        }
    }
}

fn open_map(
    config: EngineConfig,
    samples: &Path,
    root: &Path,
) -> sample_map_core::Result<SampleMap> {
    let records = load_sample_list(samples)?;
    SampleMap::new(
        &records,
        Box::new(DirectorySource::new(root)),
        config,
        Viewport::new(1280.0, 800.0),
    )
}

fn run_explore(
    config: EngineConfig,
    samples: &Path,
    root: &Path,
    frames: usize,
) -> sample_map_core::Result<()> {
    tracing::info!(?samples, frames, "exploring sample map");

    let mut map = open_map(config, samples, root)?;
    map.zoom_to_fit();
    for _ in 0..frames {
        map.advance(FRAME_DT);
    }

    let camera = map.camera().camera();
    let frame = map.frame();
    tracing::info!(
        samples = frame.hud.sample_count,
        visible = frame.dots.len(),
        zoom = camera.zoom,
        x = camera.position.x,
        y = camera.position.y,
        links = map.layout().graph().links.len(),
        "exploration finished"
    );
    map.teardown();
    Ok(())
}

fn run_play(
    config: EngineConfig,
    samples: &Path,
    root: &Path,
    preset: &str,
    seconds: f32,
) -> sample_map_core::Result<()> {
    let preset = Preset::find(preset)?;
    let mut map = open_map(config, samples, root)?;
    map.apply_preset(&preset);
    tracing::info!(preset = %preset.name, bpm = preset.bpm, seconds, "playing preset");

    let mut clock = PlaybackClock::default();
    let first = map.start_sequencer(clock.now_ms);
    let mut hits = report(&map, first.hits.len());
    while clock.now_ms < seconds as f64 * 1000.0 {
        clock.advance(FRAME_DT);
        while let Some(step) = map.poll_sequencer(clock.now_ms) {
            hits += report(&map, step.hits.len());
        }
        map.advance(FRAME_DT);
    }

    map.teardown();
    tracing::info!(hits, "playback finished");
    Ok(())
}

fn report(map: &SampleMap, hits: usize) -> usize {
    if let Some(step) = map.sequencer().cursor() {
        tracing::debug!(step, hits, voices = map.audio().tracked_count(), "step");
    }
    hits
}

fn run_bounce(
    config: EngineConfig,
    samples: &Path,
    root: &Path,
    preset: &str,
    output: &Path,
) -> sample_map_core::Result<()> {
    let settings = RecordingSettings::from_config(&config.audio, &config.sequencer);
    let preset = Preset::find(preset)?;
    let mut map = open_map(config, samples, root)?;
    map.apply_preset(&preset);

    let mix = map.bounce(&settings)?;
    mix.write_wav_file(output)?;
    tracing::info!(?output, seconds = mix.duration_secs(), peak = mix.peak(), "bounce written");
    Ok(())
}

fn list_presets() {
    for preset in factory_presets() {
        println!(
            "{:<14} {:>5.0} bpm  swing {:>3.0}%  {} tracks",
            preset.name,
            preset.bpm,
            preset.swing,
            preset.tracks.len()
        );
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless sample map explorer", long_about = None)]
struct Cli {
    /// JSON file overriding engine defaults.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a library, settle the layout and run the frame loop.
    Explore {
        /// Sample list JSON.
        #[arg(short, long)]
        samples: PathBuf,
        /// Directory the relative sample paths resolve against.
        #[arg(short, long, default_value = ".")]
        root: PathBuf,
        #[arg(short, long, default_value_t = 120)]
        frames: usize,
    },
    /// Run a preset against a synthetic clock.
    Play {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(short, long)]
        root: PathBuf,
        /// Factory preset name or preset JSON file.
        #[arg(short, long)]
        preset: String,
        #[arg(long, default_value_t = 4.0)]
        seconds: f32,
    },
    /// Render one pass of a preset to a WAV file.
    Bounce {
        #[arg(short, long)]
        samples: PathBuf,
        #[arg(short, long)]
        root: PathBuf,
        #[arg(short, long)]
        preset: String,
        #[arg(short, long)]
        output: PathBuf,
    },
    /// List the factory presets.
    Presets,
}
