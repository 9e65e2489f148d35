//! Real-time kick onset detection.
//!
//! Mono PCM arrives one hop at a time, is gated on RMS, band-passed around the
//! kick drum's fundamental and reduced to a spectral flux value. An adaptive
//! mean + k·σ threshold with armed/disarmed hysteresis turns the flux into at
//! most one onset per drum hit, and every hop yields a `BeatEvent` whose wire
//! form is the line `1` or `0`.
//!
//! ```no_run
//! use kickbeat::{DetectorConfig, LineSink, OnsetPipeline, StopSignal, WavSource};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut source = WavSource::open("loop.wav")?;
//! let config = DetectorConfig {
//!     sample_rate: kickbeat::AudioSource::sample_rate(&source),
//!     ..DetectorConfig::default()
//! };
//! let mut pipeline = OnsetPipeline::new(config)?;
//! let mut sink = LineSink::new(std::io::stdout());
//! kickbeat::run(&mut pipeline, &mut source, &mut sink, &StopSignal::new())?;
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod runner;

pub use audio::{
    AudioFrame, AudioSource, CaptureMode, CpalSource, DetectorState, MemorySource, OnsetPipeline,
    Transition, WavSource,
};
pub use config::{DetectorConfig, WindowFunction};
pub use error::{ConfigError, RunError, SinkError, SourceError};
pub use events::{BeatEvent, ChannelSink, EventSink, JsonLinesSink, LineSink};
pub use runner::{join_detector, run, spawn_detector, RunSummary, StopSignal};
