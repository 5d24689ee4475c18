//! Slowly drifting per-LED colors, independent of the audio.
//!
//! Colors are a pure function of wall-clock time and LED index; `ColorTicker`
//! only reads the clock.
use std::f64::consts::PI;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::StripError;

/// Relative R, G, B weights. Not necessarily normalized.
pub type ColorTriple = [f32; 3];

/// `sin(spatial * n + sin(t * rate) * depth)` for LED `n` at time `t`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Oscillator {
    pub spatial: f64,
    pub rate: f64,
    pub depth: f64,
}

impl Oscillator {
    pub fn new(spatial: f64, rate: f64, depth: f64) -> Self {
        Oscillator { spatial, rate, depth }
    }
    fn at(&self, t: f64, n: f64) -> f64 {
        (self.spatial * n + (t * self.rate).sin() * self.depth).sin()
    }
}

#[derive(Clone, Debug)]
pub enum ColorField {
    /// Hue from the mean of the oscillators, full saturation and value.
    Hue { oscillators: Vec<Oscillator>, led_offset: f64 },
    /// Two oscillator-driven angles on the positive octant of the unit sphere,
    /// the Cartesian coordinates used directly as R, G, B. Frequencies in Hz.
    Sphere { theta: Vec<f64>, phi: Vec<f64>, led_offset: f64 },
}

impl Default for ColorField {
    fn default() -> Self {
        ColorField::Hue {
            oscillators: vec![Oscillator::new(0.1, 0.27, 4.0), Oscillator::new(0.3, 0.17, 3.0)],
            led_offset: 0.0,
        }
    }
}

impl ColorField {
    pub fn sphere() -> Self {
        ColorField::Sphere {
            theta: vec![2.0 / 60.0, 3.0 / 60.0],
            phi: vec![5.0 / 60.0, 7.0 / 60.0],
            // each LED runs one second ahead of the last
            led_offset: 1.0,
        }
    }
    pub fn check(&self) -> Result<(), StripError> {
        let ok = match self {
            ColorField::Hue { oscillators, .. } => !oscillators.is_empty(),
            ColorField::Sphere { theta, phi, .. } => !theta.is_empty() && !phi.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(StripError::config("color field needs at least one oscillator per angle"))
        }
    }
    pub fn color_at(&self, t: f64, n: usize) -> ColorTriple {
        match self {
            ColorField::Hue { oscillators, led_offset } => {
                let t = t + led_offset * n as f64;
                let total: f64 = oscillators.iter().map(|o| o.at(t, n as f64)).sum();
                let hue = (total / oscillators.len() as f64 + 1.0) / 2.0;
                hsv_to_rgb(hue as f32, 1.0, 1.0)
            }
            ColorField::Sphere { theta, phi, led_offset } => {
                let t = 2.0 * PI * (t + led_offset * n as f64);
                let angle = |freqs: &[f64]| -> f64 {
                    freqs.iter().map(|f| (t * f).sin() * PI / 4.0 + PI / 4.0).sum::<f64>()
                        / freqs.len() as f64
                };
                let (theta, phi) = (angle(theta.as_slice()), angle(phi.as_slice()));
                [
                    (theta.sin() * phi.cos()).max(0.0) as f32,
                    (theta.sin() * phi.sin()).max(0.0) as f32,
                    theta.cos().max(0.0) as f32,
                ]
            }
        }
    }
    pub fn frame(&self, t: f64, leds: usize) -> Vec<ColorTriple> {
        (0..leds).map(|n| self.color_at(t, n)).collect()
    }
}

/// Standard HSV to RGB, every component in [0, 1].
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> ColorTriple {
    if s == 0.0 {
        return [v, v, v];
    }
    let h = h.rem_euclid(1.0) * 6.0;
    let sector = (h.floor() as i32).rem_euclid(6);
    let f = h - h.floor();
    let p = v * (1.0 - s);
    let q = v * (1.0 - s * f);
    let t = v * (1.0 - s * (1.0 - f));
    match sector {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Samples a `ColorField` at the current wall-clock time.
#[derive(Debug)]
pub struct ColorTicker {
    field: ColorField,
    leds: usize,
}

impl ColorTicker {
    pub fn new(field: ColorField, leds: usize) -> Result<Self, StripError> {
        field.check()?;
        Ok(ColorTicker { field, leds })
    }
    pub fn tick(&self) -> Vec<ColorTriple> {
        self.at(now())
    }
    pub fn at(&self, t: f64) -> Vec<ColorTriple> {
        self.field.frame(t, self.leds)
    }
}

pub(crate) fn now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0)[1], 1.0);
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0)[2], 1.0);
        assert_eq!(hsv_to_rgb(1.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.25), [0.25, 0.25, 0.25]);
    }

    #[test]
    fn colors_are_nonnegative_and_nonzero() {
        for field in [ColorField::default(), ColorField::sphere()].iter() {
            for step in 0..200 {
                let t = 1.6e9 + step as f64 * 0.37;
                for c in field.frame(t, 32) {
                    assert!(c.iter().all(|x| *x >= 0.0), "{:?}", c);
                    assert!(c.iter().sum::<f32>() > 0.0, "{:?}", c);
                }
            }
        }
    }

    #[test]
    fn sphere_points_lie_on_unit_sphere() {
        let field = ColorField::sphere();
        for n in 0..16 {
            let c = field.color_at(12345.6, n);
            let r2: f32 = c.iter().map(|x| x * x).sum();
            assert!((r2 - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn same_time_and_index_give_same_color() {
        let field = ColorField::default();
        assert_eq!(field.color_at(100.0, 3), field.color_at(100.0, 3));
        assert_ne!(field.color_at(100.0, 3), field.color_at(100.0, 4));
    }

    #[test]
    fn led_offset_shifts_time() {
        let osc = vec![Oscillator::new(0.0, 0.5, 2.0)];
        let shifted = ColorField::Hue { oscillators: osc.clone(), led_offset: 1.0 };
        let plain = ColorField::Hue { oscillators: osc, led_offset: 0.0 };
        // with no spatial term, LED 2 sees the plain field two seconds later
        assert_eq!(shifted.color_at(10.0, 2), plain.color_at(12.0, 0));
    }

    #[test]
    fn empty_oscillators_rejected() {
        let field = ColorField::Hue { oscillators: vec![], led_offset: 0.0 };
        assert!(ColorTicker::new(field, 8).is_err());
        let ticker = ColorTicker::new(ColorField::default(), 8).unwrap();
        assert_eq!(ticker.tick().len(), 8);
    }
}
