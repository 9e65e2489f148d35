//! Drives a pipeline from an audio source into an event sink
//!
//! `run` is the synchronous pull loop. `spawn_detector` moves the same loop
//! onto a worker thread that owns the pipeline and the source, handing events
//! back over a bounded channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::Receiver;
use log::{debug, info, warn};

use crate::audio::{AudioSource, OnsetPipeline, Transition};
use crate::config::DetectorConfig;
use crate::error::{RunError, SourceError};
use crate::events::{BeatEvent, ChannelSink, EventSink};

/// Shared flag asking a running loop to stop after the current hop
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub hops: u64,
    pub onsets: u64,
    pub gated_hops: u64,
    pub suppressed: u64,
    /// Recoverable source faults that were logged and skipped
    pub source_faults: u64,
    /// Hops whose processing took longer than the hop duration
    pub deadline_misses: u64,
    pub estimated_bpm: Option<f32>,
}

impl RunSummary {
    fn record(&mut self, event: &BeatEvent) {
        self.hops += 1;
        match event.transition {
            Transition::Confirmed { .. } => self.onsets += 1,
            Transition::Gated => self.gated_hops += 1,
            Transition::Suppressed => self.suppressed += 1,
            Transition::Rearmed | Transition::Idle => {}
        }
        self.estimated_bpm = event.estimated_bpm;
    }
}

/// Pull hops from `source`, process them and emit every event into `sink`
/// until the source ends or `stop` is raised.
pub fn run<S, K>(
    pipeline: &mut OnsetPipeline,
    source: &mut S,
    sink: &mut K,
    stop: &StopSignal,
) -> Result<RunSummary, RunError>
where
    S: AudioSource + ?Sized,
    K: EventSink + ?Sized,
{
    let config_rate = pipeline.config().sample_rate;
    if source.sample_rate() != config_rate {
        return Err(RunError::SampleRateMismatch {
            source_rate: source.sample_rate(),
            config_rate,
        });
    }

    let hop = pipeline.hop_size();
    let budget = pipeline.config().hop_seconds();
    let mut summary = RunSummary::default();

    info!(
        "Detection running: {} channel(s), hop budget {:.2} ms",
        source.channels(),
        budget * 1000.0
    );

    while !stop.is_stopped() {
        let frame = match source.read(hop) {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                info!("Audio source ended");
                break;
            }
            Err(e) if e.is_recoverable() => {
                warn!("Audio source fault: {}", e);
                if let SourceError::Overflow { dropped } = e {
                    let channels = source.channels().max(1) as usize;
                    pipeline.note_dropped_frames((dropped / channels) as u64);
                }
                summary.source_faults += 1;
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let started = Instant::now();
        let event = pipeline.process(&frame);
        let elapsed = started.elapsed().as_secs_f64();
        if elapsed > budget {
            summary.deadline_misses += 1;
            debug!(
                "Hop took {:.3} ms, budget {:.3} ms",
                elapsed * 1000.0,
                budget * 1000.0
            );
        }

        summary.record(&event);
        sink.emit(&event)?;
    }

    if summary.deadline_misses > 0 {
        warn!(
            "{} of {} hops exceeded the real-time budget",
            summary.deadline_misses, summary.hops
        );
    }
    Ok(summary)
}

/// Run the detection loop on its own thread.
///
/// `open_source` is called on the worker thread, so sources that must not
/// cross threads (live capture streams) are created where they are used and
/// released there on every exit path. The pipeline is built once the source
/// is open and runs at the source's sample rate. Events arrive on the
/// returned receiver, which closes when the loop ends.
pub fn spawn_detector<S, F>(
    mut config: DetectorConfig,
    open_source: F,
    stop: StopSignal,
    capacity: usize,
) -> Result<(Receiver<BeatEvent>, JoinHandle<Result<RunSummary, RunError>>), RunError>
where
    S: AudioSource,
    F: FnOnce() -> Result<S, SourceError> + Send + 'static,
{
    let (sender, receiver) = crossbeam_channel::bounded(capacity.max(1));

    let handle = std::thread::Builder::new()
        .name("kickbeat-detector".to_string())
        .spawn(move || {
            let mut source = open_source()?;
            if source.sample_rate() != config.sample_rate {
                info!(
                    "Source runs at {} Hz, replacing configured {} Hz",
                    source.sample_rate(),
                    config.sample_rate
                );
                config.sample_rate = source.sample_rate();
            }
            let mut pipeline = OnsetPipeline::new(config)?;
            let mut sink = ChannelSink::new(sender);
            run(&mut pipeline, &mut source, &mut sink, &stop)
        })
        .map_err(RunError::Spawn)?;

    Ok((receiver, handle))
}

/// Wait for a detector thread, folding a panic into `RunError`
pub fn join_detector(
    handle: JoinHandle<Result<RunSummary, RunError>>,
) -> Result<RunSummary, RunError> {
    handle.join().map_err(|_| RunError::WorkerPanicked)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioFrame, MemorySource};

    /// Fails with a recoverable fault every other read
    struct FlakySource {
        inner: MemorySource,
        fail_next: bool,
    }

    impl AudioSource for FlakySource {
        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn channels(&self) -> u16 {
            self.inner.channels()
        }

        fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError> {
            self.fail_next = !self.fail_next;
            if self.fail_next {
                Err(SourceError::Overflow { dropped: 16 })
            } else {
                self.inner.read(frames)
            }
        }
    }

    struct BrokenSource;

    impl AudioSource for BrokenSource {
        fn sample_rate(&self) -> u32 {
            44100
        }

        fn channels(&self) -> u16 {
            1
        }

        fn read(&mut self, _frames: usize) -> Result<Option<AudioFrame>, SourceError> {
            Err(SourceError::Disconnected("unplugged".to_string()))
        }
    }

    fn pipeline() -> OnsetPipeline {
        OnsetPipeline::new(DetectorConfig::default()).unwrap()
    }

    #[test]
    fn test_runs_to_end_of_stream() {
        let mut source = MemorySource::mono(vec![0.0; 256 * 10], 44100);
        let mut events: Vec<BeatEvent> = Vec::new();
        let summary = run(&mut pipeline(), &mut source, &mut events, &StopSignal::new()).unwrap();

        assert_eq!(summary.hops, 10);
        assert_eq!(summary.gated_hops, 10);
        assert_eq!(summary.onsets, 0);
        assert_eq!(events.len(), 10);
    }

    #[test]
    fn test_stop_signal_halts_before_reading() {
        let stop = StopSignal::new();
        stop.stop();
        let mut source = MemorySource::mono(vec![0.0; 256 * 10], 44100);
        let mut events: Vec<BeatEvent> = Vec::new();
        let summary = run(&mut pipeline(), &mut source, &mut events, &stop).unwrap();

        assert_eq!(summary.hops, 0);
        assert!(events.is_empty());
        assert_eq!(source.remaining(), 256 * 10);
    }

    #[test]
    fn test_recoverable_faults_are_skipped() {
        let mut source = FlakySource {
            inner: MemorySource::mono(vec![0.0; 256 * 4], 44100),
            fail_next: false,
        };
        let mut events: Vec<BeatEvent> = Vec::new();
        let summary = run(&mut pipeline(), &mut source, &mut events, &StopSignal::new()).unwrap();

        assert_eq!(summary.hops, 4);
        assert_eq!(summary.source_faults, 5);
    }

    #[test]
    fn test_overflow_moves_the_clock_forward() {
        let mut source = FlakySource {
            inner: MemorySource::new(vec![0.0; 256 * 2 * 2], 2, 44100),
            fail_next: false,
        };
        let mut events: Vec<BeatEvent> = Vec::new();
        run(&mut pipeline(), &mut source, &mut events, &StopSignal::new()).unwrap();

        // each fault drops 16 interleaved stereo samples, 8 frames
        assert_eq!(events.len(), 2);
        assert!((events[0].timestamp - (256.0 + 8.0) / 44100.0).abs() < 1e-12);
        assert!((events[1].timestamp - (512.0 + 16.0) / 44100.0).abs() < 1e-12);
    }

    #[test]
    fn test_fatal_fault_ends_run() {
        let mut events: Vec<BeatEvent> = Vec::new();
        let result = run(&mut pipeline(), &mut BrokenSource, &mut events, &StopSignal::new());
        assert!(matches!(result, Err(RunError::Source(SourceError::Disconnected(_)))));
    }

    #[test]
    fn test_sample_rate_mismatch_is_rejected() {
        let mut source = MemorySource::mono(vec![0.0; 256], 48000);
        let mut events: Vec<BeatEvent> = Vec::new();
        let result = run(&mut pipeline(), &mut source, &mut events, &StopSignal::new());
        assert!(matches!(result, Err(RunError::SampleRateMismatch { .. })));
    }

    #[test]
    fn test_worker_thread_forwards_every_event() {
        let samples = vec![0.0; 256 * 20];
        let (receiver, handle) = spawn_detector(
            DetectorConfig::default(),
            move || Ok(MemorySource::mono(samples, 44100)),
            StopSignal::new(),
            2,
        )
        .unwrap();

        let events: Vec<BeatEvent> = receiver.iter().collect();
        let summary = join_detector(handle).unwrap();
        assert_eq!(events.len(), 20);
        assert_eq!(summary.hops, 20);
    }

    #[test]
    fn test_worker_matches_synchronous_loop() {
        let samples: Vec<f32> = (0..256 * 200)
            .map(|n| {
                let t = n as f32 / 44100.0;
                let burst = if (n / 256) % 50 < 4 { 0.8 } else { 0.0 };
                0.05 + burst * (2.0 * std::f32::consts::PI * 60.0 * t).sin()
            })
            .collect();

        let mut source = MemorySource::mono(samples.clone(), 44100);
        let mut expected: Vec<BeatEvent> = Vec::new();
        run(&mut pipeline(), &mut source, &mut expected, &StopSignal::new()).unwrap();

        let (receiver, handle) = spawn_detector(
            DetectorConfig::default(),
            move || Ok(MemorySource::mono(samples, 44100)),
            StopSignal::new(),
            4,
        )
        .unwrap();
        let threaded: Vec<BeatEvent> = receiver.iter().collect();
        join_detector(handle).unwrap();

        assert_eq!(threaded, expected);
    }

    #[test]
    fn test_worker_adopts_source_sample_rate() {
        let samples = vec![0.0; 240 * 4];
        let config = DetectorConfig {
            chunk_size: 480,
            ..DetectorConfig::default()
        };
        let (receiver, handle) = spawn_detector(
            config,
            move || Ok(MemorySource::mono(samples, 48000)),
            StopSignal::new(),
            8,
        )
        .unwrap();

        let events: Vec<BeatEvent> = receiver.iter().collect();
        let summary = join_detector(handle).unwrap();
        assert_eq!(summary.hops, 4);
        assert!((events[0].timestamp - 240.0 / 48000.0).abs() < 1e-12);
    }

    #[test]
    fn test_worker_reports_open_failure() {
        let (receiver, handle) = spawn_detector(
            DetectorConfig::default(),
            || -> Result<MemorySource, SourceError> {
                Err(SourceError::Device("no input device".to_string()))
            },
            StopSignal::new(),
            1,
        )
        .unwrap();

        assert!(receiver.iter().next().is_none());
        assert!(matches!(join_detector(handle), Err(RunError::Source(SourceError::Device(_)))));
    }
}
