//! Command-line renderer.
//!
//! Loads a JSON parameter file, renders the requested modes in parallel
//! and writes one mono 32-bit float WAV per mode.

mod signals;

use anyhow::{bail, Context, Result};
use clap::Parser;
use hound::{SampleFormat, WavSpec, WavWriter};
use rir_dsp::{render_batch, RenderMode, RirParams};
use signals::Stimulus;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rir", about = "Room impulse response renderer")]
struct Cli {
    /// JSON parameter file (omit to use the built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Render mode, repeatable (default: every mode)
    #[arg(short, long = "mode")]
    modes: Vec<RenderMode>,

    /// Input stimulus
    #[arg(short, long, value_enum, default_value_t = Stimulus::Unit)]
    signal: Stimulus,

    /// Output length in seconds
    #[arg(short, long, default_value_t = 2.0)]
    length: f64,

    /// Seed for the noise stimulus
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Output directory
    #[arg(short, long, default_value = "rir_output")]
    output_dir: PathBuf,

    /// Number of worker threads (0 = auto)
    #[arg(long, default_value_t = 0)]
    threads: usize,
}

fn load_params(path: Option<&Path>) -> Result<RirParams> {
    let Some(path) = path else {
        return Ok(RirParams::default());
    };
    let json = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    RirParams::from_json(&json).with_context(|| format!("parsing {}", path.display()))
}

fn write_wav(path: &Path, samples: &[f64], fs: f64) -> Result<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate: fs.round() as u32,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &s in samples {
        writer.write_sample(s as f32)?;
    }
    writer.finalize().with_context(|| format!("finalizing {}", path.display()))?;
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    if !(cli.length > 0.0) {
        bail!("--length must be positive, got {}", cli.length);
    }
    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("configuring thread pool")?;
    }

    let params = load_params(cli.config.as_deref())?;
    if params.fs.fract() != 0.0 {
        warn!(fs = params.fs, "sample rate is not an integer, WAV header will be rounded");
    }
    let modes = if cli.modes.is_empty() {
        RenderMode::ALL.to_vec()
    } else {
        cli.modes.clone()
    };

    let input = cli.signal.generate(params.fs, cli.length, cli.seed);
    fs::create_dir_all(&cli.output_dir).with_context(|| format!("creating {}", cli.output_dir.display()))?;

    let start = Instant::now();
    let rendered = render_batch(&input, &params, &modes).context("rendering")?;
    info!(jobs = rendered.len(), elapsed_ms = start.elapsed().as_millis() as u64, "render finished");

    for (mode, samples) in &rendered {
        let path = cli.output_dir.join(format!("{}_{}.wav", mode, cli.signal.name()));
        write_wav(&path, samples, params.fs)?;
        let peak = samples.iter().fold(0.0f64, |m, s| m.max(s.abs()));
        info!(%mode, path = %path.display(), peak, "wrote");
    }
    Ok(())
}
