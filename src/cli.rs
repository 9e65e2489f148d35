//! Command-line options shared by the binaries

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, ValueEnum};

use crate::config::{DetectorConfig, WindowFunction};
use crate::error::ConfigError;
use crate::events::{EventSink, JsonLinesSink, LineSink};

/// Detector parameters; each flag overrides the config file value
#[derive(Args, Debug, Clone, Default)]
pub struct DetectorArgs {
    /// JSON config file (missing fields take their defaults)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Stream sample rate in Hz
    #[arg(long)]
    pub rate: Option<u32>,

    /// Analysis window length in samples
    #[arg(long)]
    pub chunk: Option<usize>,

    /// Hop length in samples (default: half the window)
    #[arg(long)]
    pub hop: Option<usize>,

    /// Flux history length in seconds
    #[arg(long)]
    pub hist_sec: Option<f64>,

    /// Onset threshold multiplier on the flux standard deviation
    #[arg(long)]
    pub k_high: Option<f32>,

    /// Re-arm threshold multiplier
    #[arg(long)]
    pub k_low: Option<f32>,

    /// Minimum seconds between onsets
    #[arg(long)]
    pub min_interval: Option<f64>,

    /// RMS below which a window counts as silence
    #[arg(long)]
    pub rms_th: Option<f32>,

    /// Absolute flux floor for onsets
    #[arg(long)]
    pub abs_flux_th: Option<f32>,

    /// Band-pass lower cutoff in Hz
    #[arg(long)]
    pub bp_low: Option<f64>,

    /// Band-pass upper cutoff in Hz
    #[arg(long)]
    pub bp_high: Option<f64>,

    /// Butterworth prototype order
    #[arg(long)]
    pub bp_order: Option<usize>,

    /// Window applied before the FFT
    #[arg(long, value_enum)]
    pub window: Option<WindowArg>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowArg {
    None,
    Hann,
}

impl From<WindowArg> for WindowFunction {
    fn from(arg: WindowArg) -> Self {
        match arg {
            WindowArg::None => WindowFunction::None,
            WindowArg::Hann => WindowFunction::Hann,
        }
    }
}

impl DetectorArgs {
    /// Config file (or defaults) with the command-line overrides applied
    pub fn resolve(&self) -> Result<DetectorConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => DetectorConfig::load(path)?,
            None => DetectorConfig::default(),
        };
        self.apply(&mut config);
        Ok(config)
    }

    fn apply(&self, config: &mut DetectorConfig) {
        if let Some(rate) = self.rate {
            config.sample_rate = rate;
        }
        if let Some(chunk) = self.chunk {
            config.chunk_size = chunk;
        }
        if let Some(hop) = self.hop {
            config.hop_size = Some(hop);
        }
        if let Some(seconds) = self.hist_sec {
            config.hist_seconds = seconds;
        }
        if let Some(k) = self.k_high {
            config.k_high = k;
        }
        if let Some(k) = self.k_low {
            config.k_low = k;
        }
        if let Some(interval) = self.min_interval {
            config.min_interval = interval;
        }
        if let Some(th) = self.rms_th {
            config.rms_threshold = th;
        }
        if let Some(th) = self.abs_flux_th {
            config.abs_flux_threshold = th;
        }
        if let Some(hz) = self.bp_low {
            config.band_low_hz = hz;
        }
        if let Some(hz) = self.bp_high {
            config.band_high_hz = hz;
        }
        if let Some(order) = self.bp_order {
            config.filter_order = order;
        }
        if let Some(window) = self.window {
            config.window = window.into();
        }
    }
}

/// The `--rate` value when it disagrees with the rate the source delivers
pub fn overridden_rate(requested: Option<u32>, actual: u32) -> Option<u32> {
    requested.filter(|&rate| rate != actual)
}

/// Event stream encoding
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// One "1" or "0" line per hop
    #[default]
    Ascii,
    /// One JSON object per hop
    Json,
}

/// Open the event sink: stdout when `path` is `None`, otherwise a file
pub fn open_sink(
    path: Option<&Path>,
    format: OutputFormat,
) -> std::io::Result<Box<dyn EventSink + Send>> {
    let writer: Box<dyn Write + Send> = match path {
        Some(path) => Box::new(BufWriter::new(File::create(path)?)),
        None => Box::new(std::io::stdout()),
    };
    let sink: Box<dyn EventSink + Send> = match format {
        OutputFormat::Ascii => Box::new(LineSink::new(writer)),
        OutputFormat::Json => Box::new(JsonLinesSink::new(writer)),
    };
    Ok(sink)
}
