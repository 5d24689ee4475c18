use crate::agc::check_falloff;
use crate::error::StripError;
use crate::pipeline::Stage;

/// Per-channel exponential moving average.
///
/// The first vector seen becomes the starting state, so a fresh smoother has
/// no ramp-up from zero.
#[derive(Debug)]
pub struct Smoother {
    falloff: f32,
    smoothed: Option<Vec<f32>>,
}

impl Smoother {
    pub fn new(falloff: f32) -> Result<Self, StripError> {
        check_falloff("smoothing", falloff)?;
        Ok(Smoother { falloff, smoothed: None })
    }
}

impl Stage for Smoother {
    fn update(&mut self, v: Vec<f32>) -> Vec<f32> {
        let f = self.falloff;
        if let Some(s) = self.smoothed.as_mut() {
            debug_assert_eq!(s.len(), v.len());
            for (acc, x) in s.iter_mut().zip(&v) {
                *acc = *acc * f + x * (1.0 - f);
            }
            return s.clone();
        }
        self.smoothed = Some(v.clone());
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn seeds_from_first_vector() {
        let mut s = Smoother::new(0.8).unwrap();
        assert_eq!(s.update(vec![3.0, 7.0]), vec![3.0, 7.0]);
    }

    #[test]
    fn step_response() {
        let f = 0.7_f32;
        let v = 10.0_f32;
        let mut s = Smoother::new(f).unwrap();
        s.update(vec![0.0]);
        for k in 1..=20 {
            let out = s.update(vec![v])[0];
            let expected = v * (1.0 - f.powi(k));
            assert!((out - expected).abs() < 1e-4, "tick {}: {} vs {}", k, out, expected);
        }
    }

    #[test]
    fn output_is_between_previous_and_current() {
        let mut s = Smoother::new(0.5).unwrap();
        s.update(vec![1.0, 8.0]);
        let out = s.update(vec![5.0, 2.0]);
        assert_eq!(out, vec![3.0, 5.0]);
    }

    #[test]
    fn fresh_instance_reseeds() {
        let mut s = Smoother::new(0.9).unwrap();
        s.update(vec![100.0]);
        s.update(vec![0.0]);
        let mut s = Smoother::new(0.9).unwrap();
        assert_eq!(s.update(vec![4.0]), vec![4.0]);
    }
}
