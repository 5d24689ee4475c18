//! Spectral analysis of a single sample block.
//!
//! Two strategies are supported. `Transform` takes the magnitude spectrum of
//! the whole block and folds the mirrored half onto the positive bins.
//! `Correlation` correlates the block against precomputed sine/cosine
//! references for an explicit list of frequencies, which works for any block
//! length and for musically spaced (non-harmonic) lists.
use rustfft::num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftPlanner};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use crate::error::StripError;

pub enum Analyzer {
    Transform(Transform),
    Correlation(Correlation),
}

impl Analyzer {
    /// Number of entries in every vector produced by `analyze`.
    pub fn output_len(&self) -> usize {
        match self {
            Analyzer::Transform(t) => t.block_len / 2,
            Analyzer::Correlation(c) => c.frequencies.len(),
        }
    }
    pub fn block_len(&self) -> usize {
        match self {
            Analyzer::Transform(t) => t.block_len,
            Analyzer::Correlation(c) => c.block_len,
        }
    }
    /// Empty and silent blocks come back as all zeros.
    pub fn analyze(&mut self, block: &[f32]) -> Vec<f32> {
        if block.is_empty() || block.iter().all(|s| *s == 0.0) {
            return vec![0.0; self.output_len()];
        }
        match self {
            Analyzer::Transform(t) => t.magnitudes(block),
            Analyzer::Correlation(c) => c.magnitudes(block),
        }
    }
}

impl fmt::Debug for Analyzer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Analyzer::Transform(t) => write!(f, "Transform({} samples)", t.block_len),
            Analyzer::Correlation(c) => write!(f, "Correlation({} samples, {} frequencies)",
                c.block_len, c.frequencies.len()),
        }
    }
}

pub struct Transform {
    block_len: usize,
    fft: Arc<dyn Fft<f32>>,
    buffer: Vec<Complex<f32>>,
}

impl Transform {
    pub fn new(block_len: usize) -> Result<Self, StripError> {
        if block_len < 2 {
            return Err(StripError::config("transform needs a block of at least 2 samples"));
        }
        let mut planner = FftPlanner::new();
        Ok(Transform {
            block_len,
            fft: planner.plan_fft_forward(block_len),
            buffer: vec![Complex::zero(); block_len],
        })
    }
    /// Short blocks are zero-padded and long ones truncated to the planned length.
    fn magnitudes(&mut self, block: &[f32]) -> Vec<f32> {
        for (i, c) in self.buffer.iter_mut().enumerate() {
            *c = Complex::new(block.get(i).cloned().unwrap_or(0.0), 0.0);
        }
        self.fft.process(&mut self.buffer);

        let half = self.block_len / 2;
        let mut out: Vec<f32> = self.buffer[..half].iter().map(|c| c.norm()).collect();
        // fold the negative frequencies back onto their positive twins, DC stays alone
        for k in 1..half {
            out[k] += self.buffer[self.block_len - k].norm();
        }
        out
    }
}

pub struct Correlation {
    block_len: usize,
    frequencies: Vec<f32>,
    sines: Vec<Vec<f32>>,
    cosines: Vec<Vec<f32>>,
}

impl Correlation {
    pub fn new(frequencies: &[f32], block_len: usize, sample_rate: u32) -> Result<Self, StripError> {
        if frequencies.is_empty() {
            return Err(StripError::config("correlation needs at least one target frequency"));
        }
        if sample_rate == 0 {
            return Err(StripError::config("sample rate must be positive"));
        }
        let nyquist = sample_rate as f32 / 2.0;
        if let Some(f) = frequencies.iter().find(|f| !(**f >= 0.0 && **f <= nyquist)) {
            return Err(StripError::Config(format!(
                "target frequency {} Hz is outside 0..={} Hz", f, nyquist)));
        }
        let reference = |f: f32, wave: fn(f64) -> f64| -> Vec<f32> {
            let step = 2.0 * PI * f as f64 / sample_rate as f64;
            (0..block_len).map(|i| wave(step * i as f64) as f32).collect()
        };
        Ok(Correlation {
            block_len,
            frequencies: frequencies.to_vec(),
            sines: frequencies.iter().map(|f| reference(*f, f64::sin)).collect(),
            cosines: frequencies.iter().map(|f| reference(*f, f64::cos)).collect(),
        })
    }
    pub fn frequencies(&self) -> &[f32] {
        &self.frequencies
    }
    fn magnitudes(&self, block: &[f32]) -> Vec<f32> {
        self.sines.iter().zip(&self.cosines).map(|(sin, cos)| {
            let s = dot(sin, block);
            let c = dot(cos, block);
            (s * s + c * c).sqrt()
        }).collect()
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Frequency of piano key `n` (key 49 is A4 at 440 Hz).
pub fn note_frequency(n: i32) -> f32 {
    440.0 * 2_f32.powf((n - 49) as f32 / 12.0)
}

/// `count` notes spaced a whole step apart, starting at piano key `first`.
pub fn whole_steps(first: i32, count: usize) -> Vec<f32> {
    (0..count as i32).map(|i| note_frequency(first + 2 * i)).collect()
}

pub fn linear_frequencies(step: f32, count: usize) -> Vec<f32> {
    (0..count).map(|i| i as f32 * step).collect()
}
