use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use kickbeat::cli::{open_sink, overridden_rate, DetectorArgs, OutputFormat};
use kickbeat::{run, AudioFrame, AudioSource, OnsetPipeline, SourceError, StopSignal, WavSource};

#[derive(Parser)]
#[command(name = "kickbeat-replay")]
#[command(about = "Run the kick onset detector over a WAV file")]
struct Args {
    /// WAV file to analyze
    #[arg()]
    input_file: PathBuf,

    #[command(flatten)]
    detector: DetectorArgs,

    /// Write events to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Event encoding
    #[arg(long, value_enum, default_value_t = OutputFormat::Ascii)]
    format: OutputFormat,

    /// Pace reads at the file's real-time rate instead of as fast as possible
    #[arg(long)]
    realtime: bool,
}

/// Holds each read back until its audio would have arrived from a device
struct PacedSource<S> {
    inner: S,
    started: Option<Instant>,
    frames_read: u64,
}

impl<S: AudioSource> PacedSource<S> {
    fn new(inner: S) -> Self {
        Self {
            inner,
            started: None,
            frames_read: 0,
        }
    }
}

impl<S: AudioSource> AudioSource for PacedSource<S> {
    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError> {
        let started = *self.started.get_or_insert_with(Instant::now);
        self.frames_read += frames as u64;
        let due = Duration::from_secs_f64(self.frames_read as f64 / self.sample_rate() as f64);
        if let Some(wait) = due.checked_sub(started.elapsed()) {
            thread::sleep(wait);
        }
        self.inner.read(frames)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Kickbeat replay");
    info!("Input file: {:?}", args.input_file);

    let mut config = args
        .detector
        .resolve()
        .context("Failed to load detector configuration")?;

    let source = WavSource::open(&args.input_file)
        .with_context(|| format!("Failed to open {:?}", args.input_file))?;
    if let Some(rate) = overridden_rate(args.detector.rate, source.sample_rate()) {
        warn!("File is {} Hz, ignoring --rate {}", source.sample_rate(), rate);
    }
    config.sample_rate = source.sample_rate();

    let mut pipeline = OnsetPipeline::new(config).context("Invalid detector configuration")?;
    let mut sink = open_sink(args.output.as_deref(), args.format)
        .context("Failed to open event output")?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.stop())
        .context("Failed to install Ctrl-C handler")?;

    let started = Instant::now();
    let summary = if args.realtime {
        let mut source = PacedSource::new(source);
        run(&mut pipeline, &mut source, &mut sink, &stop)?
    } else {
        let mut source = source;
        run(&mut pipeline, &mut source, &mut sink, &stop)?
    };
    let elapsed = started.elapsed().as_secs_f64();
    let audio_seconds = summary.hops as f64 * pipeline.config().hop_seconds();

    info!("\n=== REPLAY RESULTS ===");
    info!("Audio: {:.2} s in {} hops", audio_seconds, summary.hops);
    info!("Onsets: {}", summary.onsets);
    info!("Gated hops: {}", summary.gated_hops);
    info!("Suppressed (refractory): {}", summary.suppressed);
    match summary.estimated_bpm {
        Some(bpm) => info!("Tempo estimate: {:.1} BPM", bpm),
        None => info!("Tempo estimate: none"),
    }
    if elapsed > 0.0 {
        info!(
            "Processed in {:.3} s ({:.1}x real time)",
            elapsed,
            audio_seconds / elapsed
        );
    }
    if summary.deadline_misses > 0 {
        warn!("{} hops exceeded the real-time budget", summary.deadline_misses);
    }

    Ok(())
}
