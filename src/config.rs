//! Detector configuration

use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Longest accepted flux history
pub const MAX_HIST_SECONDS: f64 = 600.0;

/// Analysis window applied before the FFT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowFunction {
    /// Rectangular, the filtered window goes to the FFT as-is
    #[default]
    None,
    /// Hann taper
    Hann,
}

/// Onset detector parameters
///
/// Every field has a default, so a config file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Stream sample rate in Hz (default: 44100)
    pub sample_rate: u32,

    /// Analysis window length in samples (default: 512)
    pub chunk_size: usize,

    /// Hop length in samples; `None` means half the window (default: None)
    pub hop_size: Option<usize>,

    /// Flux history length in seconds (default: 1.0)
    pub hist_seconds: f64,

    /// Upper threshold multiplier on the flux standard deviation (default: 1.3)
    pub k_high: f32,

    /// Re-arm threshold multiplier, expected below `k_high` (default: 0.8)
    pub k_low: f32,

    /// Minimum time between confirmed onsets in seconds (default: 0.18)
    pub min_interval: f64,

    /// RMS below which a window is treated as silence (default: 0.01)
    pub rms_threshold: f32,

    /// Flux floor an onset must exceed regardless of statistics (default: 0.05)
    pub abs_flux_threshold: f32,

    /// Band-pass lower cutoff in Hz (default: 40.0)
    pub band_low_hz: f64,

    /// Band-pass upper cutoff in Hz (default: 80.0)
    pub band_high_hz: f64,

    /// Butterworth prototype order (default: 1)
    pub filter_order: usize,

    /// Window applied before the FFT (default: none)
    pub window: WindowFunction,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            chunk_size: 512,
            hop_size: None,
            hist_seconds: 1.0,
            k_high: 1.3,
            k_low: 0.8,
            min_interval: 0.18,
            rms_threshold: 0.01,
            abs_flux_threshold: 0.05,
            band_low_hz: 40.0,
            band_high_hz: 80.0,
            filter_order: 1,
            window: WindowFunction::None,
        }
    }
}

impl DetectorConfig {
    /// Load a JSON config file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let config: DetectorConfig = serde_json::from_str(&json)?;
        Ok(config)
    }

    /// Effective hop length
    pub fn hop(&self) -> usize {
        self.hop_size.unwrap_or(self.chunk_size / 2)
    }

    /// Hop duration in seconds
    pub fn hop_seconds(&self) -> f64 {
        self.hop() as f64 / self.sample_rate as f64
    }

    /// Flux history capacity in hops, at least one
    pub fn hist_frames(&self) -> usize {
        let frames = (self.hist_seconds / self.hop_seconds()).round();
        (frames as usize).max(1)
    }

    /// Check every parameter, failing on the first invalid one
    ///
    /// `k_high <= k_low` only logs a warning: the hysteresis still runs, it just
    /// stops suppressing chatter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroSize { name: "chunk size" });
        }
        let hop = self.hop();
        if hop == 0 {
            return Err(ConfigError::ZeroSize { name: "hop size" });
        }
        if hop > self.chunk_size || self.chunk_size % hop != 0 {
            return Err(ConfigError::HopMismatch {
                chunk: self.chunk_size,
                hop,
            });
        }

        if !self.hist_seconds.is_finite()
            || self.hist_seconds <= 0.0
            || self.hist_seconds > MAX_HIST_SECONDS
        {
            return Err(ConfigError::OutOfRange {
                name: "hist_seconds",
                value: self.hist_seconds,
            });
        }
        if !self.min_interval.is_finite() || self.min_interval < 0.0 {
            return Err(ConfigError::OutOfRange {
                name: "min_interval",
                value: self.min_interval,
            });
        }
        check_finite("k_high", self.k_high)?;
        check_finite("k_low", self.k_low)?;
        check_non_negative("rms_threshold", self.rms_threshold)?;
        check_non_negative("abs_flux_threshold", self.abs_flux_threshold)?;

        let nyquist_hz = self.sample_rate as f64 / 2.0;
        if !(self.band_low_hz > 0.0
            && self.band_low_hz < self.band_high_hz
            && self.band_high_hz < nyquist_hz)
        {
            return Err(ConfigError::Cutoffs {
                low_hz: self.band_low_hz,
                high_hz: self.band_high_hz,
                nyquist_hz,
            });
        }
        if self.filter_order == 0 {
            return Err(ConfigError::ZeroOrder);
        }

        if self.k_high <= self.k_low {
            warn!(
                "k_high ({}) is not above k_low ({}); re-arming will not add hysteresis",
                self.k_high, self.k_low
            );
        }

        Ok(())
    }
}

fn check_finite(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: value as f64,
        })
    }
}

fn check_non_negative(name: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value: value as f64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.hop(), 256);
        // 1.0 / (256 / 44100) = 172.27
        assert_eq!(config.hist_frames(), 172);
    }

    #[test]
    fn test_hist_frames_rounds_and_never_hits_zero() {
        let config = DetectorConfig {
            hist_seconds: 0.0145, // 2.498 hops
            ..DetectorConfig::default()
        };
        assert_eq!(config.hist_frames(), 2);

        let config = DetectorConfig {
            hist_seconds: 0.0001,
            ..DetectorConfig::default()
        };
        assert_eq!(config.hist_frames(), 1);
    }

    #[test]
    fn test_rejects_bad_sizes() {
        let zero_chunk = DetectorConfig {
            chunk_size: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(zero_chunk.validate(), Err(ConfigError::ZeroSize { .. })));

        let zero_hop = DetectorConfig {
            hop_size: Some(0),
            ..DetectorConfig::default()
        };
        assert!(matches!(zero_hop.validate(), Err(ConfigError::ZeroSize { .. })));

        let uneven = DetectorConfig {
            hop_size: Some(300),
            ..DetectorConfig::default()
        };
        assert!(matches!(uneven.validate(), Err(ConfigError::HopMismatch { .. })));

        let too_long = DetectorConfig {
            hop_size: Some(1024),
            ..DetectorConfig::default()
        };
        assert!(matches!(too_long.validate(), Err(ConfigError::HopMismatch { .. })));

        let zero_rate = DetectorConfig {
            sample_rate: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(zero_rate.validate(), Err(ConfigError::ZeroSampleRate)));
    }

    #[test]
    fn test_rejects_bad_cutoffs() {
        let inverted = DetectorConfig {
            band_low_hz: 80.0,
            band_high_hz: 40.0,
            ..DetectorConfig::default()
        };
        assert!(matches!(inverted.validate(), Err(ConfigError::Cutoffs { .. })));

        let equal = DetectorConfig {
            band_low_hz: 60.0,
            band_high_hz: 60.0,
            ..DetectorConfig::default()
        };
        assert!(matches!(equal.validate(), Err(ConfigError::Cutoffs { .. })));

        let above_nyquist = DetectorConfig {
            band_high_hz: 22050.0,
            ..DetectorConfig::default()
        };
        assert!(matches!(above_nyquist.validate(), Err(ConfigError::Cutoffs { .. })));

        let zero_low = DetectorConfig {
            band_low_hz: 0.0,
            ..DetectorConfig::default()
        };
        assert!(matches!(zero_low.validate(), Err(ConfigError::Cutoffs { .. })));

        let zero_order = DetectorConfig {
            filter_order: 0,
            ..DetectorConfig::default()
        };
        assert!(matches!(zero_order.validate(), Err(ConfigError::ZeroOrder)));
    }

    #[test]
    fn test_rejects_bad_numbers() {
        let negative_interval = DetectorConfig {
            min_interval: -0.1,
            ..DetectorConfig::default()
        };
        assert!(negative_interval.validate().is_err());

        let nan_k = DetectorConfig {
            k_high: f32::NAN,
            ..DetectorConfig::default()
        };
        assert!(nan_k.validate().is_err());

        let negative_rms = DetectorConfig {
            rms_threshold: -0.01,
            ..DetectorConfig::default()
        };
        assert!(negative_rms.validate().is_err());

        let no_history = DetectorConfig {
            hist_seconds: 0.0,
            ..DetectorConfig::default()
        };
        assert!(no_history.validate().is_err());

        let huge_history = DetectorConfig {
            hist_seconds: 1e30,
            ..DetectorConfig::default()
        };
        assert!(matches!(
            huge_history.validate(),
            Err(ConfigError::OutOfRange { name: "hist_seconds", .. })
        ));

        let ten_minutes = DetectorConfig {
            hist_seconds: MAX_HIST_SECONDS,
            ..DetectorConfig::default()
        };
        assert!(ten_minutes.validate().is_ok());
    }

    #[test]
    fn test_inverted_multipliers_are_accepted() {
        let config = DetectorConfig {
            k_high: 0.5,
            k_low: 0.8,
            ..DetectorConfig::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let json = r#"{ "k_high": 2.0, "window": "hann", "hop_size": 128 }"#;
        let config: DetectorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.k_high, 2.0);
        assert_eq!(config.window, WindowFunction::Hann);
        assert_eq!(config.hop(), 128);
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.min_interval, 0.18);
    }
}
