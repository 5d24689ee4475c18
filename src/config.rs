use crate::agc::{check_falloff, Policy};
use crate::color::ColorField;
use crate::error::StripError;
use crate::shape::{Curve, WeightCurve};
use crate::transport::Encoding;

#[derive(Clone, Debug, PartialEq)]
pub enum Strategy {
    /// Magnitude spectrum of the whole block.
    Transform,
    /// Correlation against each of these frequencies, in Hz.
    Correlation(Vec<f32>),
}

/// Every tunable of the light show. All of it is fixed once the pipeline is
/// built.
#[derive(Debug)]
pub struct Config {
    pub sample_rate: u32,
    pub block_len: usize,
    pub leds: usize,
    pub strategy: Strategy,
    /// Only the lowest `1/decimation` of the spectral vector is used.
    pub decimation: usize,
    /// Added to every channel of a non-silent frame before normalization.
    pub noise_floor: f32,
    /// Falloff of the imbalanced-mic compensation, off when `None`.
    pub compensation: Option<f32>,
    pub agc: Policy,
    pub agc_falloff: f32,
    pub smoothing: f32,
    pub weighting: Option<WeightCurve>,
    pub curve: Curve,
    pub gain: f32,
    pub cap: u8,
    pub colors: ColorField,
    pub encoding: Encoding,
    /// Capacity of the queue between capture and render, 0 to read inline.
    pub capture_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        let leds = 32;
        Config {
            sample_rate: 44100,
            block_len: 512,
            leds,
            strategy: Strategy::Transform,
            decimation: 8,
            noise_floor: 5.0,
            compensation: None,
            agc: Policy::Average,
            agc_falloff: 0.8,
            smoothing: 0.8,
            weighting: None,
            curve: Curve::Power { exponent: 2.0, expected_max: 1.0 / leds as f32 },
            gain: 127.0 * 5.0,
            cap: 127,
            colors: ColorField::default(),
            encoding: Encoding::Addressed,
            capture_queue: 2,
        }
    }
}

impl Config {
    /// Number of entries the analyzer produces per block.
    pub fn spectral_len(&self) -> usize {
        match &self.strategy {
            Strategy::Transform => self.block_len / 2,
            Strategy::Correlation(freqs) => freqs.len(),
        }
    }

    /// Rejects anything the pipeline could not run with. The stage
    /// constructors repeat their own checks when the pipeline is built.
    pub fn validate(&self) -> Result<(), StripError> {
        if self.sample_rate == 0 {
            return Err(StripError::config("sample rate must be positive"));
        }
        if self.block_len == 0 {
            return Err(StripError::config("block length must be positive"));
        }
        if self.leds == 0 {
            return Err(StripError::config("LED count must be positive"));
        }
        if self.decimation == 0 {
            return Err(StripError::config("decimation must be at least 1"));
        }
        if self.spectral_len() / self.decimation < self.leds {
            return Err(StripError::Config(format!(
                "{} spectral entries / decimation {} cannot cover {} LEDs",
                self.spectral_len(), self.decimation, self.leds)));
        }
        check_falloff("AGC", self.agc_falloff)?;
        check_falloff("smoothing", self.smoothing)?;
        if let Some(f) = self.compensation {
            check_falloff("compensation", f)?;
        }
        if !(self.noise_floor >= 0.0) {
            return Err(StripError::Config(format!("noise floor must be >= 0, got {}", self.noise_floor)));
        }
        if !(self.gain >= 0.0 && self.gain.is_finite()) {
            return Err(StripError::Config(format!("gain must be >= 0, got {}", self.gain)));
        }
        if self.cap == 0 {
            return Err(StripError::config("brightness cap must be positive"));
        }
        if self.capture_queue > 2 {
            return Err(StripError::Config(format!(
                "capture queue holds at most 2 blocks, got {}", self.capture_queue)));
        }
        self.encoding.check(self.leds, self.cap)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn rejects_obvious_mistakes() {
        let cases: Vec<Box<dyn Fn(&mut Config)>> = vec![
            Box::new(|c: &mut Config| c.sample_rate = 0),
            Box::new(|c: &mut Config| c.block_len = 0),
            Box::new(|c: &mut Config| c.leds = 0),
            Box::new(|c: &mut Config| c.leds = 33),
            Box::new(|c: &mut Config| c.cap = 200),
            Box::new(|c: &mut Config| c.capture_queue = 8),
            Box::new(|c: &mut Config| c.decimation = 0),
            Box::new(|c: &mut Config| c.decimation = 16),
            Box::new(|c: &mut Config| c.agc_falloff = 1.0),
            Box::new(|c: &mut Config| c.smoothing = 0.0),
            Box::new(|c: &mut Config| c.compensation = Some(1.5)),
            Box::new(|c: &mut Config| c.noise_floor = -1.0),
            Box::new(|c: &mut Config| c.gain = -2.0),
            Box::new(|c: &mut Config| c.cap = 0),
            Box::new(|c: &mut Config| c.strategy = Strategy::Correlation(vec![440.0; 16])),
        ];
        for tweak in cases.iter() {
            let mut config = Config::default();
            tweak(&mut config);
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn spectral_len_follows_strategy() {
        assert_eq!(Config::default().spectral_len(), 256);
        let notes = Config { strategy: Strategy::Correlation(vec![100.0; 40]), ..Config::default() };
        assert_eq!(notes.spectral_len(), 40);
    }

    #[test]
    fn plain_encoding_lifts_led_and_cap_limits() {
        let config = Config {
            leds: 300,
            block_len: 4800,
            cap: 255,
            encoding: Encoding::Plain,
            ..Config::default()
        };
        config.validate().unwrap();
    }
}
