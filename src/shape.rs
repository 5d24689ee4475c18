//! Perceptual shaping of normalized channel energies.
use std::fmt;

use crate::agc::check_falloff;
use crate::error::StripError;
use crate::pipeline::Stage;
use crate::smooth::Smoother;

/// Rough equal-loudness control points, (frequency in Hz, weight in dB).
pub const HEARING_POINTS: [(f32, f32); 11] = [
    (0.0, -10.0), (50.0, -8.0), (100.0, -4.0), (200.0, 0.0), (500.0, 2.0),
    (1000.0, 0.0), (2000.0, 2.0), (5000.0, 4.0), (10000.0, -4.0),
    (15000.0, 0.0), (20000.0, -4.0)];

/// Piecewise-linear weight curve in decibel space.
#[derive(Clone, Debug)]
pub struct WeightCurve {
    points: Vec<(f32, f32)>,
}

impl WeightCurve {
    pub fn new(points: &[(f32, f32)]) -> Result<Self, StripError> {
        if points.is_empty() {
            return Err(StripError::config("weight curve needs at least one point"));
        }
        if points.windows(2).any(|w| !(w[0].0 < w[1].0)) {
            return Err(StripError::config("weight curve frequencies must be strictly increasing"));
        }
        Ok(WeightCurve { points: points.to_vec() })
    }
    pub fn hearing() -> Self {
        WeightCurve { points: HEARING_POINTS.to_vec() }
    }
    /// Weight at `freq`, held flat beyond the first and last points.
    pub fn decibels(&self, freq: f32) -> f32 {
        let first = self.points[0];
        let last = self.points[self.points.len() - 1];
        if freq <= first.0 {
            return first.1;
        }
        if freq >= last.0 {
            return last.1;
        }
        let i = self.points.iter().position(|p| p.0 > freq).unwrap_or(self.points.len() - 1);
        let (x1, y1) = self.points[i - 1];
        let (x2, y2) = self.points[i];
        ((x2 - freq) * y1 + (freq - x1) * y2) / (x2 - x1)
    }
    pub fn multiplier(&self, freq: f32) -> f32 {
        10_f32.powf(self.decibels(freq) / 10.0)
    }
}

/// Fixed per-channel multiplier table.
#[derive(Debug)]
pub struct Weighting {
    multipliers: Vec<f32>,
}

impl Weighting {
    pub fn new(curve: &WeightCurve, frequencies: &[f32]) -> Self {
        Weighting { multipliers: frequencies.iter().map(|f| curve.multiplier(*f)).collect() }
    }
    pub fn multipliers(&self) -> &[f32] {
        &self.multipliers
    }
}

impl Stage for Weighting {
    fn update(&mut self, mut v: Vec<f32>) -> Vec<f32> {
        debug_assert_eq!(v.len(), self.multipliers.len());
        for (x, m) in v.iter_mut().zip(&self.multipliers) {
            *x *= m;
        }
        v
    }
}

/// Contrast curve mapping normalized energy to brightness.
pub enum Curve {
    /// `x^exponent / expected_max`
    Power { exponent: f32, expected_max: f32 },
    /// `x * compression_factor(x)`, lifts quiet channels and tames loud ones.
    Compress,
    Custom(Box<dyn Fn(f32) -> f32 + Send>),
}

impl Curve {
    pub fn apply(&self, x: f32) -> f32 {
        let x = x.max(0.0);
        match self {
            Curve::Power { exponent, expected_max } => x.powf(*exponent) / expected_max,
            Curve::Compress => x * compression_factor(x),
            Curve::Custom(f) => f(x),
        }
    }
    fn check(&self) -> Result<(), StripError> {
        match self {
            Curve::Power { exponent, expected_max } => {
                if !(*exponent > 0.0) || !(*expected_max > 0.0) {
                    return Err(StripError::Config(format!(
                        "power curve needs positive exponent and expected max, got {} and {}",
                        exponent, expected_max)));
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Curve::Power { exponent, expected_max } =>
                write!(f, "Power(x^{} / {})", exponent, expected_max),
            Curve::Compress => write!(f, "Compress"),
            Curve::Custom(_) => write!(f, "Custom"),
        }
    }
}

/// `sqrt(2 / (1 + e^(5 * (atan(1.55x) - 1))))`: about 1.41 near zero, falling
/// towards 0.33 for large inputs.
pub fn compression_factor(x: f32) -> f32 {
    let exponent = ((1.55 * x).atan() - 1.0) * 5.0;
    (2.0 / (1.0 + exponent.exp())).sqrt()
}

#[derive(Debug)]
pub struct Exaggerate {
    curve: Curve,
}

impl Exaggerate {
    pub fn new(curve: Curve) -> Result<Self, StripError> {
        curve.check()?;
        Ok(Exaggerate { curve })
    }
}

impl Stage for Exaggerate {
    fn update(&mut self, mut v: Vec<f32>) -> Vec<f32> {
        for x in v.iter_mut() {
            let y = self.curve.apply(*x);
            // an overflowing channel is as bright as it gets, only NaN goes dark
            *x = if y.is_nan() { 0.0 } else { y.max(0.0).min(f32::MAX) };
        }
        v
    }
}

/// Evens out a microphone that hears some bands much louder than others.
///
/// Each channel is compared with a rolling average of the per-frame mean; the
/// smoothed ratio goes through `compression_factor` and the result scales the
/// channel, so habitually loud channels are pulled down and quiet ones lifted.
#[derive(Debug)]
pub struct Compensator {
    falloff: f32,
    average: Option<f32>,
    ratios: Smoother,
}

impl Compensator {
    pub fn new(falloff: f32) -> Result<Self, StripError> {
        check_falloff("compensation", falloff)?;
        Ok(Compensator { falloff, average: None, ratios: Smoother::new(falloff)? })
    }
}

impl Stage for Compensator {
    fn update(&mut self, mut v: Vec<f32>) -> Vec<f32> {
        if v.is_empty() {
            return v;
        }
        let mean = v.iter().sum::<f32>() / v.len() as f32;
        let f = self.falloff;
        let avg = match self.average {
            Some(a) => a * f + mean * (1.0 - f),
            None => mean,
        };
        self.average = Some(avg);
        let ratio: Vec<f32> = if avg > 0.0 {
            v.iter().map(|x| x / avg).collect()
        } else {
            vec![0.0; v.len()]
        };
        let ratio = self.ratios.update(ratio);
        for (x, r) in v.iter_mut().zip(ratio) {
            *x *= compression_factor(r);
        }
        v
    }
}
