use log::debug;
use serde::Serialize;

use super::FluxStats;
use crate::config::DetectorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorState {
    Armed,
    Disarmed,
}

/// Outcome of one hop through the state machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum Transition {
    /// Onset fired; `interval` is the time since the previous onset, if any
    Confirmed { interval: Option<f64> },
    /// Spike above both thresholds arrived within `min_interval`; still armed
    Suppressed,
    /// Flux fell below the low threshold after `min_interval`
    Rearmed,
    /// Nothing matched
    Idle,
    /// Window below the RMS gate; forced back to armed
    Gated,
}

impl Transition {
    pub fn is_onset(&self) -> bool {
        matches!(self, Transition::Confirmed { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub high: f32,
    pub low: f32,
}

/// Armed/disarmed hysteresis over adaptive flux thresholds
pub struct OnsetDetector {
    state: DetectorState,
    last_onset: Option<f64>,
    k_high: f32,
    k_low: f32,
    abs_flux_threshold: f32,
    min_interval: f64,
}

impl OnsetDetector {
    pub fn new(config: &DetectorConfig) -> Self {
        Self {
            state: DetectorState::Armed,
            last_onset: None,
            k_high: config.k_high,
            k_low: config.k_low,
            abs_flux_threshold: config.abs_flux_threshold,
            min_interval: config.min_interval,
        }
    }

    pub fn thresholds(&self, stats: &FluxStats) -> Thresholds {
        Thresholds {
            high: stats.mean + self.k_high * stats.std_dev,
            low: stats.mean + self.k_low * stats.std_dev,
        }
    }

    /// Run one hop's flux through the rules; the first matching rule wins.
    pub fn step(&mut self, flux: f32, thresholds: Thresholds, now: f64) -> Transition {
        let interval_ok = self.interval_elapsed(now);
        let spike = flux > thresholds.high && flux > self.abs_flux_threshold;
        let armed = self.state == DetectorState::Armed;

        if armed && spike && interval_ok {
            let interval = self.last_onset.map(|last| now - last);
            debug!(
                "Onset at {:.3}s: flux {:.4} > high {:.4}",
                now, flux, thresholds.high
            );
            self.last_onset = Some(now);
            self.state = DetectorState::Disarmed;
            Transition::Confirmed { interval }
        } else if armed && spike {
            debug!("Spike at {:.3}s inside min interval, suppressed", now);
            Transition::Suppressed
        } else if flux < thresholds.low && interval_ok {
            self.state = DetectorState::Armed;
            Transition::Rearmed
        } else {
            Transition::Idle
        }
    }

    /// Silence gate: re-arm without looking at flux
    pub fn gate(&mut self) -> Transition {
        self.state = DetectorState::Armed;
        Transition::Gated
    }

    pub fn state(&self) -> DetectorState {
        self.state
    }

    pub fn last_onset(&self) -> Option<f64> {
        self.last_onset
    }

    fn interval_elapsed(&self, now: f64) -> bool {
        match self.last_onset {
            Some(last) => now - last > self.min_interval,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> OnsetDetector {
        OnsetDetector::new(&DetectorConfig::default())
    }

    fn stats(mean: f32, std_dev: f32) -> FluxStats {
        FluxStats {
            flux: 0.0,
            mean,
            std_dev,
        }
    }

    const T: Thresholds = Thresholds { high: 1.0, low: 0.5 };

    #[test]
    fn test_thresholds_from_stats() {
        let d = detector();
        let t = d.thresholds(&stats(2.0, 1.0));
        assert!((t.high - 3.3).abs() < 1e-6);
        assert!((t.low - 2.8).abs() < 1e-6);

        // sigma = 0 collapses both thresholds onto the mean
        let t = d.thresholds(&stats(2.0, 0.0));
        assert_eq!(t.high, 2.0);
        assert_eq!(t.low, 2.0);
    }

    #[test]
    fn test_starts_armed_and_fires_once() {
        let mut d = detector();
        assert_eq!(d.state(), DetectorState::Armed);

        let t = d.step(2.0, T, 1.0);
        assert_eq!(t, Transition::Confirmed { interval: None });
        assert_eq!(d.state(), DetectorState::Disarmed);
        assert_eq!(d.last_onset(), Some(1.0));

        // still above threshold, disarmed: nothing
        assert_eq!(d.step(2.0, T, 1.5), Transition::Idle);
    }

    #[test]
    fn test_absolute_floor_blocks_small_spikes() {
        let mut d = detector();
        let tiny = Thresholds { high: 0.01, low: 0.005 };
        assert_eq!(d.step(0.04, tiny, 1.0), Transition::Idle);
        assert!(d.step(0.06, tiny, 1.0).is_onset());
    }

    #[test]
    fn test_flux_equal_to_high_does_not_fire() {
        let mut d = detector();
        assert_eq!(d.step(1.0, T, 1.0), Transition::Idle);
    }

    #[test]
    fn test_rearm_waits_for_min_interval() {
        let mut d = detector();
        assert!(d.step(2.0, T, 1.0).is_onset());

        // below low but too soon
        assert_eq!(d.step(0.1, T, 1.1), Transition::Idle);
        assert_eq!(d.state(), DetectorState::Disarmed);
        assert_eq!(d.step(0.1, T, 1.18), Transition::Idle);

        assert_eq!(d.step(0.1, T, 1.2), Transition::Rearmed);
        assert_eq!(d.state(), DetectorState::Armed);

        let t = d.step(2.0, T, 1.5);
        match t {
            Transition::Confirmed { interval: Some(i) } => assert!((i - 0.5).abs() < 1e-9),
            other => panic!("expected confirmed onset, got {:?}", other),
        }
    }

    #[test]
    fn test_hysteresis_band_keeps_disarmed() {
        let mut d = detector();
        assert!(d.step(2.0, T, 1.0).is_onset());
        // between low and high long after the interval: no re-arm
        assert_eq!(d.step(0.7, T, 3.0), Transition::Idle);
        assert_eq!(d.state(), DetectorState::Disarmed);
        assert_eq!(d.step(2.0, T, 3.1), Transition::Idle);
    }

    #[test]
    fn test_suppressed_spike_stays_armed() {
        let mut d = detector();
        assert!(d.step(2.0, T, 1.0).is_onset());
        d.gate();
        assert_eq!(d.state(), DetectorState::Armed);

        assert_eq!(d.step(2.0, T, 1.1), Transition::Suppressed);
        assert_eq!(d.state(), DetectorState::Armed);
        assert!(d.step(2.0, T, 1.2).is_onset());
    }

    #[test]
    fn test_rearm_reaffirms_armed() {
        let mut d = detector();
        assert_eq!(d.step(0.1, T, 0.5), Transition::Rearmed);
        assert_eq!(d.state(), DetectorState::Armed);
    }

    #[test]
    fn test_gate_forces_armed() {
        let mut d = detector();
        assert!(d.step(2.0, T, 1.0).is_onset());
        assert_eq!(d.gate(), Transition::Gated);
        assert_eq!(d.state(), DetectorState::Armed);
        // the gate does not touch the onset clock
        assert_eq!(d.last_onset(), Some(1.0));
    }

    #[test]
    fn test_zero_min_interval_still_needs_rearm() {
        let config = DetectorConfig {
            min_interval: 0.0,
            ..DetectorConfig::default()
        };
        let mut d = OnsetDetector::new(&config);
        assert!(d.step(2.0, T, 1.0).is_onset());
        assert_eq!(d.step(2.0, T, 1.01), Transition::Idle);
        assert_eq!(d.step(0.1, T, 1.02), Transition::Rearmed);
        assert!(d.step(2.0, T, 1.03).is_onset());
    }
}
