//! Streaming Butterworth band-pass filter
//!
//! Designed from the analog Butterworth prototype: pre-warped cutoffs,
//! low-pass to band-pass transform, then the bilinear transform. The result is
//! realized as cascaded biquads so higher orders stay numerically stable.

use std::f64::consts::PI;

use rustfft::num_complex::Complex64;

use crate::error::ConfigError;

/// One second-order section; the transposed direct form II keeps only two
/// state values
#[derive(Debug, Clone)]
struct Biquad {
    x1: f64,
    x2: f64,
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Band-pass section `g (1 - z^-2) / (1 + a1 z^-1 + a2 z^-2)`
    fn band_pass(gain: f64, a1: f64, a2: f64) -> Self {
        Self {
            x1: 0.0,
            x2: 0.0,
            b0: gain,
            b1: 0.0,
            b2: -gain,
            a1,
            a2,
        }
    }

    #[inline]
    fn process(&mut self, sample: f64) -> f64 {
        let output = self.b0 * sample + self.x1;
        self.x1 = self.b1 * sample + self.x2 - self.a1 * output;
        self.x2 = self.b2 * sample - self.a2 * output;
        output
    }

    fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
    }

    fn response(&self, z_inv: Complex64) -> Complex64 {
        let z_inv2 = z_inv * z_inv;
        let num = self.b0 + z_inv * self.b1 + z_inv2 * self.b2;
        let den = Complex64::new(1.0, 0.0) + z_inv * self.a1 + z_inv2 * self.a2;
        num / den
    }
}

/// Causal band-pass whose delay line carries over between calls
#[derive(Debug, Clone)]
pub struct BandPassFilter {
    sections: Vec<Biquad>,
    sample_rate: f64,
    low_hz: f64,
    high_hz: f64,
    order: usize,
}

impl BandPassFilter {
    /// Design a band-pass of prototype order `order` (filter order `2 * order`).
    pub fn butterworth(
        low_hz: f64,
        high_hz: f64,
        order: usize,
        sample_rate: f64,
    ) -> Result<Self, ConfigError> {
        let nyquist_hz = sample_rate / 2.0;
        if !(low_hz > 0.0 && low_hz < high_hz && high_hz < nyquist_hz) {
            return Err(ConfigError::Cutoffs {
                low_hz,
                high_hz,
                nyquist_hz,
            });
        }
        if order == 0 {
            return Err(ConfigError::ZeroOrder);
        }

        // Pre-warp the normalized cutoffs for a bilinear transform at fs = 2
        let fs = 2.0;
        let warp = |hz: f64| 2.0 * fs * (PI * (hz / nyquist_hz) / fs).tan();
        let w_low = warp(low_hz);
        let w_high = warp(high_hz);
        let bandwidth = w_high - w_low;
        let centre = (w_low * w_high).sqrt();

        // Analog band-pass poles from the low-pass prototype
        let n = order as f64;
        let mut analog_poles = Vec::with_capacity(2 * order);
        for k in 0..order {
            let m = 2.0 * k as f64 - (n - 1.0);
            let prototype = -Complex64::from_polar(1.0, PI * m / (2.0 * n));
            let scaled = prototype * (bandwidth / 2.0);
            let offset = (scaled * scaled - centre * centre).sqrt();
            analog_poles.push(scaled + offset);
            analog_poles.push(scaled - offset);
        }

        // Bilinear transform: `order` zeros at s = 0 map to z = 1, the rest land at z = -1
        let fs2 = 2.0 * fs;
        let mut den = Complex64::new(1.0, 0.0);
        for &p in &analog_poles {
            den *= fs2 - p;
        }
        let gain = bandwidth.powi(order as i32) * (fs2.powi(order as i32) / den).re;

        let digital_poles: Vec<Complex64> = analog_poles
            .iter()
            .map(|&p| (fs2 + p) / (fs2 - p))
            .collect();

        let sections = pair_poles(&digital_poles)
            .into_iter()
            .enumerate()
            .map(|(i, (a1, a2))| Biquad::band_pass(if i == 0 { gain } else { 1.0 }, a1, a2))
            .collect();

        Ok(Self {
            sections,
            sample_rate,
            low_hz,
            high_hz,
            order,
        })
    }

    /// Filter `input` into `output`, continuing from the previous call's state.
    pub fn process(&mut self, input: &[f32], output: &mut [f32]) {
        debug_assert_eq!(input.len(), output.len());
        for (x, y) in input.iter().zip(output.iter_mut()) {
            let mut v = *x as f64;
            for section in &mut self.sections {
                v = section.process(v);
            }
            *y = v as f32;
        }
    }

    /// Clear the delay lines
    pub fn reset(&mut self) {
        for section in &mut self.sections {
            section.reset();
        }
    }

    /// Magnitude of the frequency response at `hz`
    pub fn magnitude_at(&self, hz: f64) -> f64 {
        let omega = 2.0 * PI * hz / self.sample_rate;
        let z_inv = Complex64::from_polar(1.0, -omega);
        self.sections
            .iter()
            .fold(Complex64::new(1.0, 0.0), |acc, s| acc * s.response(z_inv))
            .norm()
    }

    /// Number of biquad sections (equal to the prototype order)
    pub fn section_count(&self) -> usize {
        self.sections.len()
    }

    pub fn band(&self) -> (f64, f64) {
        (self.low_hz, self.high_hz)
    }

    pub fn order(&self) -> usize {
        self.order
    }
}

/// Group poles into real second-order denominators `(a1, a2)`.
///
/// Complex poles pair with their conjugate; real poles pair with each other.
fn pair_poles(poles: &[Complex64]) -> Vec<(f64, f64)> {
    const IMAG_EPS: f64 = 1e-12;

    let mut denominators = Vec::with_capacity(poles.len() / 2);
    let mut reals = Vec::new();
    for p in poles {
        if p.im > IMAG_EPS {
            denominators.push((-2.0 * p.re, p.norm_sqr()));
        } else if p.im.abs() <= IMAG_EPS {
            reals.push(p.re);
        }
    }

    reals.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    for pair in reals.chunks(2) {
        match pair {
            [p1, p2] => denominators.push((-(p1 + p2), p1 * p2)),
            [p] => denominators.push((-p, 0.0)),
            _ => {}
        }
    }

    denominators
}
