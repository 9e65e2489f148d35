pub mod accumulator;
pub mod beat_detector;
pub mod fft;
pub mod filter;
pub mod flux;
pub mod pipeline;
pub mod processor;
pub mod source;
pub mod tempo;

pub use accumulator::FrameAccumulator;
pub use beat_detector::{DetectorState, OnsetDetector, Thresholds, Transition};
pub use fft::SpectralAnalyzer;
pub use filter::BandPassFilter;
pub use flux::{FluxEngine, FluxHistory, FluxStats};
pub use pipeline::OnsetPipeline;
pub use processor::{CaptureMode, CpalSource};
pub use source::{AudioSource, MemorySource, WavSource};
pub use tempo::TempoEstimator;

/// A block of interleaved PCM samples as delivered by an audio source
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub samples: Vec<f32>,
    pub channels: u16,
    pub sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            channels,
            sample_rate,
        }
    }

    /// Single-channel frame
    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }
}
