//! Per-hop onset pipeline
//!
//! accumulate → gate → filter → spectrum → flux → thresholds → transition → emit
//!
//! All mutable state (raw and filtered rings, filter delay line, previous
//! spectrum, flux history, detector state, tempo) lives in one
//! `OnsetPipeline`, which is driven strictly one hop at a time. Each input
//! sample passes through the band-pass exactly once, as the newest hop; the
//! FFT then runs over the filtered ring.

use log::{debug, info};

use super::{
    AudioFrame, BandPassFilter, DetectorState, FluxEngine, FluxStats, FrameAccumulator,
    OnsetDetector, SpectralAnalyzer, Thresholds,
};
use crate::config::DetectorConfig;
use crate::error::ConfigError;
use crate::events::{BeatEvent, EventEmitter};

pub struct OnsetPipeline {
    config: DetectorConfig,
    accumulator: FrameAccumulator,
    filter: BandPassFilter,
    analyzer: SpectralAnalyzer,
    flux: FluxEngine,
    detector: OnsetDetector,
    emitter: EventEmitter,
    filtered: FrameAccumulator,
    filtered_hop: Vec<f32>,
    hops_processed: u64,
    dropped_frames: u64,
    last_stats: Option<FluxStats>,
    last_thresholds: Option<Thresholds>,
}

impl OnsetPipeline {
    /// Validate `config` and build the pipeline in its initial state
    pub fn new(config: DetectorConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let chunk = config.chunk_size;
        let hop = config.hop();
        let filter = BandPassFilter::butterworth(
            config.band_low_hz,
            config.band_high_hz,
            config.filter_order,
            config.sample_rate as f64,
        )?;
        let analyzer = SpectralAnalyzer::new(chunk, config.window);
        let flux = FluxEngine::new(analyzer.bin_count(), config.hist_frames());

        info!(
            "Onset pipeline: {} Hz, chunk {}, hop {} ({:.2} ms), history {} hops",
            config.sample_rate,
            chunk,
            hop,
            config.hop_seconds() * 1000.0,
            config.hist_frames()
        );
        info!(
            "Band-pass {:.1}-{:.1} Hz order {}",
            config.band_low_hz, config.band_high_hz, config.filter_order
        );
        info!(
            "Thresholds: k_high {}, k_low {}, min interval {:.3}s, rms gate {}, flux floor {}",
            config.k_high,
            config.k_low,
            config.min_interval,
            config.rms_threshold,
            config.abs_flux_threshold
        );

        Ok(Self {
            accumulator: FrameAccumulator::new(chunk, hop),
            filter,
            analyzer,
            flux,
            detector: OnsetDetector::new(&config),
            emitter: EventEmitter::new(),
            filtered: FrameAccumulator::new(chunk, hop),
            filtered_hop: vec![0.0; hop],
            hops_processed: 0,
            dropped_frames: 0,
            last_stats: None,
            last_thresholds: None,
            config,
        })
    }

    /// Process one hop, timestamped by the stream clock.
    ///
    /// The clock counts processed hops plus any frames reported lost through
    /// `note_dropped_frames`.
    ///
    /// # Panics
    /// If the frame does not hold exactly one hop of samples.
    pub fn process(&mut self, frame: &AudioFrame) -> BeatEvent {
        let samples = (self.hops_processed + 1) * self.hop_size() as u64 + self.dropped_frames;
        let now = samples as f64 / self.config.sample_rate as f64;
        self.process_at(frame, now)
    }

    /// Advance the stream clock over audio the source lost
    pub fn note_dropped_frames(&mut self, frames: u64) {
        self.dropped_frames += frames;
    }

    /// Process one hop with a caller-supplied timestamp in seconds.
    pub fn process_at(&mut self, frame: &AudioFrame, now: f64) -> BeatEvent {
        debug_assert_eq!(frame.sample_rate, self.config.sample_rate);
        self.hops_processed += 1;

        let window = self.accumulator.push(frame);
        let rms = (window.iter().map(|x| x * x).sum::<f32>() / window.len() as f32).sqrt();

        if rms < self.config.rms_threshold {
            self.filtered.push_silence();
            self.last_stats = None;
            self.last_thresholds = None;
            let transition = self.detector.gate();
            return self.emitter.emit(transition, now, None);
        }

        let newest = &window[window.len() - self.filtered_hop.len()..];
        self.filter.process(newest, &mut self.filtered_hop);
        let filtered = self.filtered.push_mono(&self.filtered_hop);
        let spectrum = self.analyzer.magnitudes(filtered);
        let stats = self.flux.update(spectrum);
        let thresholds = self.detector.thresholds(&stats);
        let transition = self.detector.step(stats.flux, thresholds, now);

        if transition.is_onset() {
            debug!(
                "hop {}: flux {:.4} (mu {:.4}, sigma {:.4}, rms {:.4})",
                self.hops_processed, stats.flux, stats.mean, stats.std_dev, rms
            );
        }

        self.last_stats = Some(stats);
        self.last_thresholds = Some(thresholds);
        self.emitter.emit(transition, now, Some(stats.flux))
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn hop_size(&self) -> usize {
        self.accumulator.hop_size()
    }

    pub fn hops_processed(&self) -> u64 {
        self.hops_processed
    }

    pub fn detector_state(&self) -> DetectorState {
        self.detector.state()
    }

    pub fn last_onset(&self) -> Option<f64> {
        self.detector.last_onset()
    }

    pub fn estimated_bpm(&self) -> Option<f32> {
        self.emitter.estimated_bpm()
    }

    /// Flux statistics of the last analyzed hop; `None` after a gated hop
    pub fn last_stats(&self) -> Option<FluxStats> {
        self.last_stats
    }

    pub fn last_thresholds(&self) -> Option<Thresholds> {
        self.last_thresholds
    }

    /// Band-passed analysis window of the last analyzed hop, oldest first
    pub fn filtered_window(&self) -> &[f32] {
        self.filtered.window()
    }

    pub fn flux_history_len(&self) -> usize {
        self.flux.history().len()
    }

    pub fn flux_history_capacity(&self) -> usize {
        self.flux.history().capacity()
    }
}
