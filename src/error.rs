//! Error types for the onset detector and its collaborators

use thiserror::Error;

/// Invalid detector configuration, reported before streaming begins
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Sample rate must be positive
    #[error("sample rate must be positive")]
    ZeroSampleRate,

    /// Window or hop size of zero samples
    #[error("{name} must be positive")]
    ZeroSize {
        /// Which size was zero ("chunk size" or "hop size")
        name: &'static str,
    },

    /// Hop longer than the analysis window, or not dividing it evenly
    #[error("chunk size {chunk} must be a multiple of hop size {hop}")]
    HopMismatch {
        /// Analysis window length
        chunk: usize,
        /// Hop length
        hop: usize,
    },

    /// A numeric parameter is out of its accepted range
    #[error("invalid {name}: {value}")]
    OutOfRange {
        /// Parameter name as it appears in the config file
        name: &'static str,
        /// Offending value
        value: f64,
    },

    /// Band-pass cutoffs are not ordered or exceed the Nyquist frequency
    #[error("invalid band-pass cutoffs {low_hz} Hz .. {high_hz} Hz (Nyquist {nyquist_hz} Hz)")]
    Cutoffs {
        /// Lower cutoff
        low_hz: f64,
        /// Upper cutoff
        high_hz: f64,
        /// Half the sample rate
        nyquist_hz: f64,
    },

    /// Filter order of zero
    #[error("filter order must be at least 1")]
    ZeroOrder,

    /// Config file could not be read
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Config file is not valid JSON for `DetectorConfig`
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Faults reported by an audio source
#[derive(Debug, Error)]
pub enum SourceError {
    /// The capture buffer overflowed and samples were lost
    #[error("audio buffer overflow, {dropped} samples dropped")]
    Overflow {
        /// Number of interleaved samples discarded
        dropped: usize,
    },

    /// No audio arrived within the read timeout
    #[error("timed out waiting for audio")]
    Timeout,

    /// The device went away or the capture stream closed
    #[error("audio device disconnected: {0}")]
    Disconnected(String),

    /// Device lookup or stream setup failed
    #[error("audio device error: {0}")]
    Device(String),

    /// WAV decoding error
    #[error("wav error: {0}")]
    Wav(#[from] hound::Error),

    /// Underlying I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Whether the host should log the fault and keep reading
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::Overflow { .. } | SourceError::Timeout)
    }
}

/// Faults reported by an event sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// Writing to the underlying stream failed
    #[error("failed to write event: {0}")]
    Io(#[from] std::io::Error),

    /// Event could not be serialized
    #[error("failed to serialize event: {0}")]
    Json(#[from] serde_json::Error),

    /// The receiving side of a channel sink is gone
    #[error("event channel closed")]
    Closed,
}

/// Errors that end a detection run
#[derive(Debug, Error)]
pub enum RunError {
    /// Pipeline setup failed
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Non-recoverable source fault
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Sink fault
    #[error(transparent)]
    Sink(#[from] SinkError),

    /// Source stream format does not match the pipeline
    #[error("source delivers {source_rate} Hz but the detector is configured for {config_rate} Hz")]
    SampleRateMismatch {
        /// Rate reported by the source
        source_rate: u32,
        /// Rate in the detector config
        config_rate: u32,
    },

    /// The detector thread could not be started
    #[error("failed to spawn detector thread: {0}")]
    Spawn(std::io::Error),

    /// The detector thread panicked
    #[error("detector thread panicked")]
    WorkerPanicked,
}
