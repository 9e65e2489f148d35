use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{info, warn};

use super::{AudioFrame, AudioSource};
use crate::error::SourceError;

/// Callback blocks buffered between the audio thread and the reader
const CALLBACK_QUEUE: usize = 64;

/// How long `read` waits for the device before reporting a timeout
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Which device to capture from
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CaptureMode {
    /// Default input device
    #[default]
    DefaultInput,
    /// First input device whose name contains the given text
    Named(String),
    /// What the default output device is playing (WASAPI loopback)
    Loopback,
}

/// State shared with the audio callback
#[derive(Debug, Default)]
struct CaptureFlags {
    /// Interleaved samples discarded since the last read
    dropped: AtomicUsize,
    disconnected: AtomicBool,
}

/// Live capture through cpal.
///
/// The audio callback pushes interleaved blocks into a bounded channel; when
/// the reader falls behind, blocks are dropped and reported once as an
/// overflow. The stream stops when the source is dropped.
pub struct CpalSource {
    #[allow(dead_code)]
    stream: Stream,
    receiver: Receiver<Vec<f32>>,
    pending: Vec<f32>,
    flags: Arc<CaptureFlags>,
    channels: u16,
    sample_rate: u32,
}

impl CpalSource {
    pub fn open(mode: &CaptureMode) -> Result<Self, SourceError> {
        let host = cpal::default_host();
        let (device, supported) = match mode {
            CaptureMode::DefaultInput => {
                let device = host
                    .default_input_device()
                    .ok_or_else(|| device_error("No input device available"))?;
                let config = device
                    .default_input_config()
                    .map_err(|e| device_error(format!("No default input config: {}", e)))?;
                (device, config)
            }
            CaptureMode::Named(name) => {
                let device = host
                    .input_devices()
                    .map_err(|e| device_error(format!("Failed to list input devices: {}", e)))?
                    .find(|d| d.name().map(|n| n.contains(name.as_str())).unwrap_or(false))
                    .ok_or_else(|| device_error(format!("No input device matching '{}'", name)))?;
                let config = device
                    .default_input_config()
                    .map_err(|e| device_error(format!("Failed to get input config: {}", e)))?;
                (device, config)
            }
            CaptureMode::Loopback => {
                let device = host
                    .default_output_device()
                    .ok_or_else(|| device_error("No output device available"))?;
                let config = device
                    .default_output_config()
                    .map_err(|e| device_error(format!("No default output config: {}", e)))?;
                (device, config)
            }
        };

        info!("Using audio device: {}", device.name().unwrap_or_else(|_| "Unknown".to_string()));
        info!("Audio config: {:?}", supported);

        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let (sender, receiver) = crossbeam_channel::bounded(CALLBACK_QUEUE);
        let flags = Arc::new(CaptureFlags::default());

        let stream = match sample_format {
            SampleFormat::F32 => Self::input_stream::<f32>(&device, &config, sender, &flags),
            SampleFormat::I16 => Self::input_stream::<i16>(&device, &config, sender, &flags),
            SampleFormat::U16 => Self::input_stream::<u16>(&device, &config, sender, &flags),
            SampleFormat::I32 => Self::input_stream::<i32>(&device, &config, sender, &flags),
            other => Err(device_error(format!("Unsupported sample format {:?}", other))),
        }?;
        stream
            .play()
            .map_err(|e| device_error(format!("Failed to start stream: {}", e)))?;

        Ok(Self {
            stream,
            receiver,
            pending: Vec::new(),
            flags,
            channels: config.channels,
            sample_rate: config.sample_rate.0,
        })
    }

    fn input_stream<T>(
        device: &Device,
        config: &StreamConfig,
        sender: Sender<Vec<f32>>,
        flags: &Arc<CaptureFlags>,
    ) -> Result<Stream, SourceError>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        info!(
            "Creating input stream with {} channels at {} Hz",
            config.channels, config.sample_rate.0
        );

        let data_flags = Arc::clone(flags);
        let error_flags = Arc::clone(flags);
        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    let block: Vec<f32> = data.iter().map(|&s| f32::from_sample(s)).collect();
                    match sender.try_send(block) {
                        Ok(()) => {}
                        Err(TrySendError::Full(block)) => {
                            data_flags.dropped.fetch_add(block.len(), Ordering::Relaxed);
                        }
                        Err(TrySendError::Disconnected(_)) => {}
                    }
                },
                move |err| {
                    warn!("Audio stream error: {}", err);
                    if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                        error_flags.disconnected.store(true, Ordering::Relaxed);
                    }
                },
                None,
            )
            .map_err(|e| device_error(format!("Failed to build input stream: {}", e)))
    }
}

fn device_error(message: impl Into<String>) -> SourceError {
    SourceError::Device(message.into())
}

impl AudioSource for CpalSource {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn channels(&self) -> u16 {
        self.channels
    }

    fn read(&mut self, frames: usize) -> Result<Option<AudioFrame>, SourceError> {
        let dropped = self.flags.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            return Err(SourceError::Overflow { dropped });
        }

        let wanted = frames * self.channels as usize;
        while self.pending.len() < wanted {
            if self.flags.disconnected.load(Ordering::Relaxed) {
                return Err(SourceError::Disconnected("device not available".to_string()));
            }
            match self.receiver.recv_timeout(READ_TIMEOUT) {
                Ok(block) => self.pending.extend_from_slice(&block),
                Err(RecvTimeoutError::Timeout) => return Err(SourceError::Timeout),
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(SourceError::Disconnected("capture stream closed".to_string()))
                }
            }
        }

        let samples: Vec<f32> = self.pending.drain(..wanted).collect();
        Ok(Some(AudioFrame::new(samples, self.channels, self.sample_rate)))
    }
}
