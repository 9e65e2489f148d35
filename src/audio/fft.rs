use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::WindowFunction;

/// Magnitude spectrum of a real analysis window
pub struct SpectralAnalyzer {
    fft_size: usize,
    fft: std::sync::Arc<dyn rustfft::Fft<f32>>,
    window: Option<Vec<f32>>,
    buffer: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
}

impl SpectralAnalyzer {
    pub fn new(fft_size: usize, window: WindowFunction) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];

        let window = match window {
            WindowFunction::None => None,
            WindowFunction::Hann => Some(Self::hann_window(fft_size)),
        };

        Self {
            fft_size,
            fft,
            window,
            buffer: vec![Complex::new(0.0, 0.0); fft_size],
            scratch,
            magnitudes: vec![0.0; fft_size / 2 + 1],
        }
    }

    fn hann_window(size: usize) -> Vec<f32> {
        if size < 2 {
            return vec![1.0; size];
        }
        (0..size)
            .map(|i| {
                let phase = 2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32;
                0.5 * (1.0 - phase.cos())
            })
            .collect()
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins produced, `fft_size / 2 + 1`
    pub fn bin_count(&self) -> usize {
        self.magnitudes.len()
    }

    /// `|X[k]|` for `k` in `0..=fft_size / 2`, unnormalized.
    pub fn magnitudes(&mut self, samples: &[f32]) -> &[f32] {
        debug_assert_eq!(samples.len(), self.fft_size);

        match &self.window {
            Some(window) => {
                for ((slot, &x), &w) in self.buffer.iter_mut().zip(samples).zip(window) {
                    *slot = Complex::new(x * w, 0.0);
                }
            }
            None => {
                for (slot, &x) in self.buffer.iter_mut().zip(samples) {
                    *slot = Complex::new(x, 0.0);
                }
            }
        }

        self.fft.process_with_scratch(&mut self.buffer, &mut self.scratch);

        for (mag, c) in self.magnitudes.iter_mut().zip(&self.buffer) {
            *mag = c.norm();
        }
        &self.magnitudes
    }
}
