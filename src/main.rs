// Melody Engine demo - plays a pattern through the default audio device (or offline)

use clap::Parser;
use melody_engine::{
    CpalHost, EngineConfig, EngineResult, ManualHost, Preset, SequencerEngine, SCALE,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// UI frame period used to poll visual events
const FRAME: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "melody_engine")]
#[command(about = "Step-sequencer melody engine demo", long_about = None)]
struct Cli {
    /// Engine configuration file (RON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Built-in pattern: empty, scale-run, arpeggio, lullaby
    #[arg(short, long)]
    preset: Option<String>,

    /// Tempo in BPM (overrides the configuration)
    #[arg(short, long)]
    bpm: Option<f64>,

    /// How long to play
    #[arg(short, long, default_value = "8.0")]
    seconds: f32,

    /// Render with a manual clock instead of the audio device
    #[arg(long)]
    offline: bool,

    /// Sample rate for offline rendering
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// Block size for offline rendering
    #[arg(long, default_value = "512")]
    block_size: usize,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, recoverable = e.is_recoverable(), "melody_engine failed");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> EngineResult<()> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig {
            preset: Preset::Lullaby,
            ..EngineConfig::default()
        },
    };
    if let Some(preset) = &cli.preset {
        config.preset = preset.parse()?;
    }
    if let Some(bpm) = cli.bpm {
        config.tempo_bpm = bpm;
    }
    info!(preset = config.preset.name(), tempo = config.tempo_bpm, "configuration loaded");

    if cli.offline {
        render_offline(config, cli)
    } else {
        play_live(config, cli)
    }
}

fn log_steps<H: melody_engine::AudioHost>(engine: &SequencerEngine<H>) {
    engine.on_events(
        |step| {
            if step < 0 {
                info!("stopped");
            }
        },
        |row| match row.and_then(|row| SCALE.get(row)) {
            Some(pitch) => info!(%pitch, "note"),
            None => info!("rest"),
        },
    );
}

fn play_live(config: EngineConfig, cli: &Cli) -> EngineResult<()> {
    let engine = SequencerEngine::new(CpalHost::new(), config)?;
    log_steps(&engine);

    engine.play()?;
    let deadline = Instant::now() + Duration::from_secs_f32(cli.seconds.max(0.0));
    while Instant::now() < deadline {
        engine.poll();
        thread::sleep(FRAME);
    }

    engine.stop();
    info!(stats = ?engine.stats(), "playback finished");
    engine.dispose();
    Ok(())
}

fn render_offline(config: EngineConfig, cli: &Cli) -> EngineResult<()> {
    let (host, clock) = ManualHost::new(cli.sample_rate as f64, 2);
    let engine = SequencerEngine::new(host, config)?;
    log_steps(&engine);

    engine.play()?;
    let total_frames = (cli.seconds.max(0.0) * cli.sample_rate as f32) as usize;
    let block = cli.block_size.max(1);
    let mut rendered = 0;
    let mut peak = 0.0f32;
    while rendered < total_frames {
        let frames = block.min(total_frames - rendered);
        let out = clock.run_block(frames);
        peak = out.iter().fold(peak, |acc, s| acc.max(s.abs()));
        engine.poll();
        rendered += frames;
    }

    engine.stop();
    info!(frames = rendered, peak, stats = ?engine.stats(), "offline render finished");
    engine.dispose();
    Ok(())
}
