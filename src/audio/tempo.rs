use std::collections::VecDeque;

/// Maximum number of inter-onset intervals averaged into the BPM estimate
pub const MAX_INTERVALS: usize = 8;

/// Rolling BPM from the most recent inter-onset intervals
#[derive(Debug, Clone, Default)]
pub struct TempoEstimator {
    intervals: VecDeque<f64>,
    estimated_bpm: Option<f32>,
}

impl TempoEstimator {
    pub fn new() -> Self {
        Self {
            intervals: VecDeque::with_capacity(MAX_INTERVALS),
            estimated_bpm: None,
        }
    }

    /// Record the time between two confirmed onsets and refresh the estimate
    pub fn record_interval(&mut self, interval: f64) -> Option<f32> {
        if interval <= 0.0 || !interval.is_finite() {
            return self.estimated_bpm;
        }

        self.intervals.push_back(interval);
        if self.intervals.len() > MAX_INTERVALS {
            self.intervals.pop_front();
        }

        let avg_interval = self.intervals.iter().sum::<f64>() / self.intervals.len() as f64;
        self.estimated_bpm = Some((60.0 / avg_interval) as f32);
        self.estimated_bpm
    }

    pub fn estimated_bpm(&self) -> Option<f32> {
        self.estimated_bpm
    }

    pub fn interval_count(&self) -> usize {
        self.intervals.len()
    }
}
