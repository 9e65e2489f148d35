//! Audio sources feeding the pipeline one hop at a time

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use hound::{SampleFormat, WavIntoSamples, WavReader};
use log::info;

use super::AudioFrame;
use crate::error::SourceError;

/// Blocking producer of fixed-size PCM frames
pub trait AudioSource {
    fn sample_rate(&self) -> u32;

    fn channels(&self) -> u16;

    /// Block until `frames` sample frames are available.
    ///
    /// `Ok(None)` marks the end of the stream. Errors for which
    /// `SourceError::is_recoverable` holds leave the source usable.
    fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError>;
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn channels(&self) -> u16 {
        (**self).channels()
    }

    fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError> {
        (**self).read(frames)
    }
}

/// Interleaved samples held in memory; the last partial frame is zero-padded
pub struct MemorySource {
    samples: Vec<f32>,
    position: usize,
    channels: u16,
    sample_rate: u32,
}

impl MemorySource {
    pub fn new(samples: Vec<f32>, channels: u16, sample_rate: u32) -> Self {
        Self {
            samples,
            position: 0,
            channels: channels.max(1),
            sample_rate,
        }
    }

    pub fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self::new(samples, 1, sample_rate)
    }

    pub fn remaining(&self) -> usize {
        self.samples.len() - self.position
    }
}

impl AudioSource for MemorySource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError> {
        if self.position >= self.samples.len() {
            return Ok(None);
        }

        let wanted = frames * self.channels as usize;
        let end = (self.position + wanted).min(self.samples.len());
        let mut block = self.samples[self.position..end].to_vec();
        block.resize(wanted, 0.0);
        self.position = end;

        Ok(Some(AudioFrame::new(block, self.channels, self.sample_rate)))
    }
}

enum WavSamples {
    Int {
        samples: WavIntoSamples<BufReader<File>, i32>,
        scale: f32,
    },
    Float(WavIntoSamples<BufReader<File>, f32>),
}

impl WavSamples {
    fn next_sample(&mut self) -> Option<Result<f32, hound::Error>> {
        match self {
            WavSamples::Int { samples, scale } => {
                samples.next().map(|s| s.map(|v| v as f32 / *scale))
            }
            WavSamples::Float(samples) => samples.next(),
        }
    }
}

/// Streams a WAV file; integer formats are normalized to [-1, 1]
pub struct WavSource {
    samples: WavSamples,
    channels: u16,
    sample_rate: u32,
    finished: bool,
}

impl WavSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SourceError> {
        let reader = WavReader::open(&path)?;
        let spec = reader.spec();
        info!(
            "Opened {:?}: {} Hz, {} channels, {} bits {:?}",
            path.as_ref(),
            spec.sample_rate,
            spec.channels,
            spec.bits_per_sample,
            spec.sample_format
        );

        let samples = match spec.sample_format {
            SampleFormat::Int => WavSamples::Int {
                samples: reader.into_samples::<i32>(),
                scale: (1i64 << (spec.bits_per_sample - 1)) as f32,
            },
            SampleFormat::Float => WavSamples::Float(reader.into_samples::<f32>()),
        };

        Ok(Self {
            samples,
            channels: spec.channels.max(1),
            sample_rate: spec.sample_rate,
            finished: false,
        })
    }
}

impl AudioSource for WavSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError> {
        if self.finished {
            return Ok(None);
        }

        let wanted = frames * self.channels as usize;
        let mut block = Vec::with_capacity(wanted);
        while block.len() < wanted {
            match self.samples.next_sample() {
                Some(sample) => block.push(sample?),
                None => {
                    self.finished = true;
                    break;
                }
            }
        }

        if block.is_empty() {
            return Ok(None);
        }
        block.resize(wanted, 0.0);
        Ok(Some(AudioFrame::new(block, self.channels, self.sample_rate)))
    }
}
