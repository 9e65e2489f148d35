use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use std::path::PathBuf;

use kickbeat::cli::{open_sink, overridden_rate, DetectorArgs, OutputFormat};
use kickbeat::{
    join_detector, spawn_detector, AudioSource, CaptureMode, CpalSource, EventSink, SourceError,
    StopSignal,
};

#[derive(Parser)]
#[command(name = "kickbeat")]
#[command(about = "Live kick drum onset detector, printing 1 on a kick and 0 otherwise per hop")]
struct Args {
    #[command(flatten)]
    detector: DetectorArgs,

    /// Capture from the first input device whose name contains this text
    #[arg(long, conflicts_with = "loopback")]
    device: Option<String>,

    /// Capture what the default output device is playing (WASAPI only)
    #[arg(long)]
    loopback: bool,

    /// Write events to this file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Event encoding
    #[arg(long, value_enum, default_value_t = OutputFormat::Ascii)]
    format: OutputFormat,

    /// Events buffered between the detector thread and the writer
    #[arg(long, default_value = "64")]
    queue: usize,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    info!("Starting kickbeat live detector");

    let config = args
        .detector
        .resolve()
        .context("Failed to load detector configuration")?;
    config.validate().context("Invalid detector configuration")?;

    let mode = match (&args.device, args.loopback) {
        (Some(name), _) => CaptureMode::Named(name.clone()),
        (None, true) => CaptureMode::Loopback,
        (None, false) => CaptureMode::DefaultInput,
    };
    info!("Capture mode: {:?}", mode);

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        info!("Interrupt received, stopping");
        handler_stop.stop();
    })
    .context("Failed to install Ctrl-C handler")?;

    let mut sink = open_sink(args.output.as_deref(), args.format)
        .context("Failed to open event output")?;

    let requested_rate = args.detector.rate;
    let open_device = move || -> Result<CpalSource, SourceError> {
        let source = CpalSource::open(&mode)?;
        if let Some(rate) = overridden_rate(requested_rate, source.sample_rate()) {
            warn!(
                "--rate {} is ignored, the device runs at {} Hz",
                rate,
                source.sample_rate()
            );
        }
        Ok(source)
    };
    let (events, handle) = spawn_detector(config, open_device, stop.clone(), args.queue)?;

    let mut sink_result = Ok(());
    for event in events.iter() {
        if let Err(e) = sink.emit(&event) {
            error!("Event output failed: {}", e);
            stop.stop();
            sink_result = Err(e);
            break;
        }
    }
    drop(events);

    let summary = join_detector(handle).context("Detector stopped with an error")?;
    sink_result.context("Failed to write events")?;

    info!(
        "Processed {} hops: {} onsets, {} gated, {} suppressed",
        summary.hops, summary.onsets, summary.gated_hops, summary.suppressed
    );
    if summary.source_faults > 0 {
        warn!("{} audio source faults were skipped", summary.source_faults);
    }
    match summary.estimated_bpm {
        Some(bpm) => info!("Final tempo estimate: {:.1} BPM", bpm),
        None => info!("No tempo estimate"),
    }

    Ok(())
}
