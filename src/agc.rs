//! Adaptive gain control.
//!
//! Every policy keeps a recursive estimate of how loud things have been
//! recently and divides the incoming vector by it, so the output is a
//! unitless ratio no matter how hot the microphone is. `falloff` is the weight
//! given to history on each tick: closer to 1 adapts more slowly.
use crate::error::StripError;
use crate::pipeline::Stage;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Policy {
    /// Track the total energy of the vector.
    Average,
    /// Track each channel separately, rising slowly and dropping at once.
    PerChannel,
    /// Track the loudest channel, snapping up to new peaks.
    Peak,
}

#[derive(Debug)]
enum Estimate {
    Average(Option<f32>),
    PerChannel(Option<Vec<f32>>),
    Peak(f32),
}

#[derive(Debug)]
pub struct AdaptiveGain {
    falloff: f32,
    estimate: Estimate,
}

impl AdaptiveGain {
    pub fn new(policy: Policy, falloff: f32) -> Result<Self, StripError> {
        check_falloff("AGC", falloff)?;
        let estimate = match policy {
            Policy::Average => Estimate::Average(None),
            Policy::PerChannel => Estimate::PerChannel(None),
            Policy::Peak => Estimate::Peak(0.0),
        };
        Ok(AdaptiveGain { falloff, estimate })
    }
    pub fn policy(&self) -> Policy {
        match self.estimate {
            Estimate::Average(_) => Policy::Average,
            Estimate::PerChannel(_) => Policy::PerChannel,
            Estimate::Peak(_) => Policy::Peak,
        }
    }
}

impl Stage for AdaptiveGain {
    fn update(&mut self, mut v: Vec<f32>) -> Vec<f32> {
        let f = self.falloff;
        match &mut self.estimate {
            Estimate::Average(avg) => {
                let total: f32 = v.iter().sum();
                let a = match *avg {
                    Some(a) => a * f + total * (1.0 - f),
                    None => total,
                };
                *avg = Some(a);
                let d = divisor(a);
                v.iter_mut().for_each(|x| *x /= d);
            }
            Estimate::PerChannel(norm) => {
                let norm = norm.get_or_insert_with(|| v.clone());
                debug_assert_eq!(norm.len(), v.len());
                for (n, x) in norm.iter_mut().zip(v.iter_mut()) {
                    let diff = *x - *n;
                    if diff > 0.0 {
                        // damped step, never past the target
                        *n += (diff.sqrt() * (1.0 - f)).min(diff);
                    } else {
                        *n = *x;
                    }
                    *x /= divisor(*n);
                }
            }
            Estimate::Peak(peak) => {
                let max = v.iter().cloned().fold(0.0, f32::max);
                if max > *peak {
                    *peak = max;
                } else {
                    *peak = *peak * f + max * (1.0 - f);
                }
                let d = divisor(*peak);
                v.iter_mut().for_each(|x| *x /= d);
            }
        }
        v
    }
}

/// Estimates too small to divide by leave the vector unscaled.
fn divisor(estimate: f32) -> f32 {
    if estimate.is_finite() && estimate >= std::f32::MIN_POSITIVE {
        estimate
    } else {
        1.0
    }
}

pub(crate) fn check_falloff(what: &str, falloff: f32) -> Result<(), StripError> {
    if falloff > 0.0 && falloff < 1.0 {
        Ok(())
    } else {
        Err(StripError::Config(format!("{} falloff must be in (0, 1), got {}", what, falloff)))
    }
}

/// Adds a constant to every entry so the quiet hiss of an empty room does not
/// get amplified into flicker. Silent (all zero) vectors pass untouched.
#[derive(Debug)]
pub struct NoiseFloor {
    amount: f32,
}

impl NoiseFloor {
    pub fn new(amount: f32) -> Result<Self, StripError> {
        if !(amount >= 0.0 && amount.is_finite()) {
            return Err(StripError::Config(format!("noise floor must be >= 0, got {}", amount)));
        }
        Ok(NoiseFloor { amount })
    }
}

impl Stage for NoiseFloor {
    fn update(&mut self, mut v: Vec<f32>) -> Vec<f32> {
        if v.iter().any(|x| *x != 0.0) {
            v.iter_mut().for_each(|x| *x += self.amount);
        }
        v
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    const POLICIES: [Policy; 3] = [Policy::Average, Policy::PerChannel, Policy::Peak];

    fn settle(agc: &mut AdaptiveGain, v: &[f32], falloff: f32) -> Vec<f32> {
        let ticks = (5.0 / (1.0 - falloff)).ceil() as usize;
        let mut out = Vec::new();
        for _ in 0..ticks {
            out = agc.update(v.to_vec());
        }
        out
    }

    #[test]
    fn constant_stream_is_scale_invariant() {
        let shape = [1.0, 4.0, 2.0, 0.5, 3.0];
        for policy in POLICIES.iter() {
            let mut reference: Option<Vec<f32>> = None;
            for scale in [0.01_f32, 1.0, 250.0, 1.0e5].iter() {
                let v: Vec<f32> = shape.iter().map(|x| x * scale).collect();
                let mut agc = AdaptiveGain::new(*policy, 0.9).unwrap();
                let out = settle(&mut agc, &v, 0.9);
                match &reference {
                    None => reference = Some(out),
                    Some(r) => {
                        for (a, b) in r.iter().zip(&out) {
                            assert!((a - b).abs() < 1e-4, "{:?}: {:?} vs {:?}", policy, r, out);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn settled_values_per_policy() {
        let v = [2.0, 6.0, 0.0, 2.0];
        let mut avg = AdaptiveGain::new(Policy::Average, 0.8).unwrap();
        let out = settle(&mut avg, &v, 0.8);
        for (got, want) in out.iter().zip(&[0.2, 0.6, 0.0, 0.2]) {
            assert!((got - want).abs() < 1e-6, "{:?}", out);
        }

        let mut peak = AdaptiveGain::new(Policy::Peak, 0.8).unwrap();
        let out = settle(&mut peak, &v, 0.8);
        assert!((out[1] - 1.0).abs() < 1e-6);

        // the zero channel has a zero norm and is divided by 1
        let mut each = AdaptiveGain::new(Policy::PerChannel, 0.8).unwrap();
        assert_eq!(settle(&mut each, &v, 0.8), vec![1.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn average_converges_after_a_jump() {
        let mut agc = AdaptiveGain::new(Policy::Average, 0.5).unwrap();
        agc.update(vec![1.0, 1.0]);
        let out = settle(&mut agc, &[10.0, 10.0], 0.5);
        assert!((out[0] - 0.5).abs() < 0.01, "{:?}", out);
    }

    #[test]
    fn per_channel_rises_slowly_and_drops_at_once() {
        let mut agc = AdaptiveGain::new(Policy::PerChannel, 0.9).unwrap();
        agc.update(vec![1.0]);
        let loud = agc.update(vec![101.0]);
        // norm moved by sqrt(100) * 0.1 = 1, so the burst shows as ~50x
        assert!((loud[0] - 50.5).abs() < 1e-3, "{:?}", loud);
        let quiet = agc.update(vec![0.5]);
        assert_eq!(quiet, vec![1.0]);
    }

    #[test]
    fn peak_snaps_up_and_decays() {
        let mut agc = AdaptiveGain::new(Policy::Peak, 0.5).unwrap();
        assert_eq!(agc.update(vec![2.0, 4.0]), vec![0.5, 1.0]);
        // peak decays halfway from 4 to 2
        assert_eq!(agc.update(vec![1.0, 2.0]), vec![1.0 / 3.0, 2.0 / 3.0]);
    }

    #[test]
    fn silence_never_divides_by_zero() {
        for policy in POLICIES.iter() {
            let mut agc = AdaptiveGain::new(*policy, 0.7).unwrap();
            for _ in 0..10 {
                assert_eq!(agc.update(vec![0.0; 8]), vec![0.0; 8]);
            }
        }
    }

    #[test]
    fn random_input_stays_finite() {
        let mut rng = rand::thread_rng();
        for policy in POLICIES.iter() {
            let mut agc = AdaptiveGain::new(*policy, 0.95).unwrap();
            for _ in 0..500 {
                let v: Vec<f32> = (0..16)
                    .map(|_| if rng.gen_bool(0.3) { 0.0 } else { rng.gen_range(0.0, 1.0e4) })
                    .collect();
                let out = agc.update(v);
                assert!(out.iter().all(|x| x.is_finite() && *x >= 0.0), "{:?}", out);
            }
        }
    }

    #[test]
    fn rejects_bad_falloff() {
        assert!(AdaptiveGain::new(Policy::Average, 0.0).is_err());
        assert!(AdaptiveGain::new(Policy::Peak, 1.0).is_err());
        assert!(AdaptiveGain::new(Policy::PerChannel, std::f32::NAN).is_err());
    }

    #[test]
    fn noise_floor_skips_silence() {
        let mut floor = NoiseFloor::new(5.0).unwrap();
        assert_eq!(floor.update(vec![0.0; 3]), vec![0.0; 3]);
        assert_eq!(floor.update(vec![0.0, 1.0, 0.0]), vec![5.0, 6.0, 5.0]);
        assert!(NoiseFloor::new(-1.0).is_err());
    }
}
