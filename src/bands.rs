use crate::error::StripError;

/// Sums contiguous runs of spectral bins into one value per LED.
///
/// Only the lowest `spectral_len / decimation` bins are used; the high end of
/// the spectrum is dropped and any remainder that does not fill a whole group
/// is truncated.
#[derive(Clone, Debug)]
pub struct BandMapper {
    leds: usize,
    group: usize,
}

impl BandMapper {
    pub fn new(spectral_len: usize, leds: usize, decimation: usize) -> Result<Self, StripError> {
        if leds == 0 {
            return Err(StripError::config("LED count must be positive"));
        }
        if decimation == 0 {
            return Err(StripError::config("decimation must be at least 1"));
        }
        let kept = spectral_len / decimation;
        if kept < leds {
            return Err(StripError::Config(format!(
                "{} spectral bins / decimation {} leaves {} bins for {} LEDs",
                spectral_len, decimation, kept, leds)));
        }
        Ok(BandMapper { leds, group: kept / leds })
    }
    /// Bins summed into each output channel.
    pub fn group(&self) -> usize {
        self.group
    }
    pub fn map(&self, spectrum: &[f32]) -> Vec<f32> {
        debug_assert!(spectrum.len() >= self.group * self.leds);
        spectrum[..self.group * self.leds]
            .chunks(self.group)
            .map(|bins| bins.iter().sum())
            .collect()
    }
    /// Centre frequency of each band, given the width of one spectral bin.
    pub fn band_frequencies(&self, bin_hz: f32) -> Vec<f32> {
        (0..self.leds)
            .map(|i| (i * self.group) as f32 * bin_hz + (self.group - 1) as f32 * bin_hz / 2.0)
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn groups_and_truncates() {
        // 256 bins, keep 32, 4 LEDs of 8 bins each
        let mapper = BandMapper::new(256, 4, 8).unwrap();
        assert_eq!(mapper.group(), 8);
        let spectrum: Vec<f32> = (0..256).map(|i| i as f32).collect();
        let out = mapper.map(&spectrum);
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], (0..8).sum::<i32>() as f32);
        assert_eq!(out[3], (24..32).sum::<i32>() as f32);
    }

    #[test]
    fn conserves_energy_of_used_bins() {
        // 50 bins / 2 = 25 kept, 3 LEDs of 8 bins, bin 24 is truncated
        let mapper = BandMapper::new(50, 3, 2).unwrap();
        let spectrum: Vec<f32> = (0..50).map(|i| (i % 7) as f32 + 0.5).collect();
        let expected: f32 = spectrum[..24].iter().sum();
        let got: f32 = mapper.map(&spectrum).iter().sum();
        assert!((expected - got).abs() < 1e-4);
    }

    #[test]
    fn rejects_too_few_bins() {
        assert!(BandMapper::new(256, 32, 16).is_err());
        assert!(BandMapper::new(256, 0, 1).is_err());
        assert!(BandMapper::new(256, 4, 0).is_err());
        assert!(BandMapper::new(32, 32, 1).is_ok());
    }

    #[test]
    fn band_centres() {
        let mapper = BandMapper::new(8, 2, 1).unwrap();
        // groups of 4 bins at 10 Hz each: centres at 15 and 55 Hz
        assert_eq!(mapper.band_frequencies(10.0), vec![15.0, 55.0]);
    }
}
