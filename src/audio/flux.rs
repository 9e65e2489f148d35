//! Spectral flux with rolling statistics

use std::collections::VecDeque;

/// Bounded FIFO of flux values
#[derive(Debug, Clone)]
pub struct FluxHistory {
    values: VecDeque<f32>,
    capacity: usize,
}

impl FluxHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append, evicting the oldest value once full
    pub fn push(&mut self, value: f32) {
        if self.values.len() == self.capacity {
            self.values.pop_front();
        }
        self.values.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mean(&self) -> f32 {
        self.mean_f64() as f32
    }

    /// Population standard deviation; zero for fewer than two values
    pub fn std_dev(&self) -> f32 {
        if self.values.len() < 2 {
            return 0.0;
        }
        let mean = self.mean_f64();
        let variance = self
            .values
            .iter()
            .map(|&v| (v as f64 - mean).powi(2))
            .sum::<f64>()
            / self.values.len() as f64;
        variance.sqrt() as f32
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    fn mean_f64(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|&v| v as f64).sum::<f64>() / self.values.len() as f64
    }
}

/// Flux of the current hop and the history statistics including it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FluxStats {
    pub flux: f32,
    pub mean: f32,
    pub std_dev: f32,
}

/// Half-wave rectified spectral difference against the previous spectrum
pub struct FluxEngine {
    previous: Vec<f32>,
    history: FluxHistory,
}

impl FluxEngine {
    pub fn new(bins: usize, history_frames: usize) -> Self {
        Self {
            previous: vec![0.0; bins],
            history: FluxHistory::new(history_frames),
        }
    }

    /// Compute flux for `spectrum`, store it as the new previous spectrum and
    /// push the flux into the history.
    pub fn update(&mut self, spectrum: &[f32]) -> FluxStats {
        debug_assert_eq!(spectrum.len(), self.previous.len());

        let flux = spectrum
            .iter()
            .zip(self.previous.iter())
            .map(|(&current, &previous)| (current - previous).max(0.0))
            .sum::<f32>();
        self.previous.copy_from_slice(spectrum);

        self.history.push(flux);
        FluxStats {
            flux,
            mean: self.history.mean(),
            std_dev: self.history.std_dev(),
        }
    }

    pub fn history(&self) -> &FluxHistory {
        &self.history
    }

    pub fn previous_spectrum(&self) -> &[f32] {
        &self.previous
    }
}
