use crate::color::ColorTriple;
use crate::error::StripError;

/// One LED worth of integer color, every component within the hardware cap.
pub type Rgb = [u8; 3];

/// Combines per-LED color proportions with per-LED brightness.
#[derive(Clone, Debug)]
pub struct Compositor {
    gain: f32,
    cap: u8,
}

impl Compositor {
    /// `gain` scales every brightness; `cap` bounds `r + g + b` for each LED.
    pub fn new(gain: f32, cap: u8) -> Result<Self, StripError> {
        if !(gain >= 0.0 && gain.is_finite()) {
            return Err(StripError::Config(format!("gain must be >= 0, got {}", gain)));
        }
        if cap == 0 {
            return Err(StripError::config("brightness cap must be positive"));
        }
        Ok(Compositor { gain, cap })
    }
    pub fn cap(&self) -> u8 {
        self.cap
    }
    pub fn compose(&self, colors: &[ColorTriple], brightness: &[f32]) -> Vec<Rgb> {
        debug_assert_eq!(colors.len(), brightness.len());
        colors.iter().zip(brightness).map(|(c, b)| self.pixel(*c, *b)).collect()
    }
    fn pixel(&self, color: ColorTriple, brightness: f32) -> Rgb {
        let [r, g, b] = normalize(color);
        let level = brightness * self.gain;
        // zero, negative and NaN are off
        if !(level > 0.0) {
            return [0, 0, 0];
        }
        let cap = self.cap as f32;
        // the color sums to 1, so anything past the cap (infinity too) saturates
        let level = level.min(cap);
        let (mut r, mut g, mut b) = (r * level, g * level, b * level);
        let total = r + g + b;
        if total > cap {
            r = r / total * cap;
            g = g / total * cap;
            b = b / total * cap;
        }
        let px = [trunc(r, self.cap), trunc(g, self.cap), trunc(b, self.cap)];
        debug_assert!(px.iter().map(|x| *x as u16).sum::<u16>() <= self.cap as u16,
            "{:?} over cap {}", px, self.cap);
        px
    }
}

/// Scales a color so its components sum to 1; black stays black.
pub fn normalize(color: ColorTriple) -> ColorTriple {
    let [r, g, b] = color;
    let (r, g, b) = (r.max(0.0), g.max(0.0), b.max(0.0));
    let sum = r + g + b;
    if sum > 0.0 && sum.is_finite() {
        [r / sum, g / sum, b / sum]
    } else {
        [0.0, 0.0, 0.0]
    }
}

fn trunc(x: f32, cap: u8) -> u8 {
    x.max(0.0).min(cap as f32) as u8
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::Rng;

    fn sum(px: &Rgb) -> u16 {
        px.iter().map(|x| *x as u16).sum()
    }

    #[test]
    fn normalizes_color_proportions() {
        let c = normalize([1.0, 3.0, 0.0]);
        assert_eq!(c, [0.25, 0.75, 0.0]);
        assert_eq!(normalize([0.0, 0.0, 0.0]), [0.0, 0.0, 0.0]);
    }

    #[test]
    fn scales_by_brightness_and_gain() {
        let comp = Compositor::new(10.0, 127).unwrap();
        let out = comp.compose(&[[1.0, 1.0, 2.0]], &[2.0]);
        assert_eq!(out, vec![[5, 5, 10]]);
    }

    #[test]
    fn clamps_total_to_cap() {
        let comp = Compositor::new(1000.0, 127).unwrap();
        let out = comp.compose(&[[1.0, 1.0, 2.0], [1.0, 0.0, 0.0]], &[5.0, 5.0]);
        assert_eq!(out[1], [127, 0, 0]);
        assert!(sum(&out[0]) <= 127);
        assert!(sum(&out[0]) >= 125);
        assert_eq!(out[0][0], out[0][1]);
    }

    #[test]
    fn black_or_silent_leds_are_off() {
        let comp = Compositor::new(635.0, 127).unwrap();
        let out = comp.compose(
            &[[0.0, 0.0, 0.0], [1.0, 0.5, 0.2], [1.0, 0.5, 0.2], [1.0, 0.5, 0.2]],
            &[10.0, 0.0, std::f32::NAN, -3.0]);
        assert_eq!(out, vec![[0, 0, 0]; 4]);
    }

    #[test]
    fn overflowing_brightness_is_full_not_dark() {
        let comp = Compositor::new(635.0, 127).unwrap();
        let out = comp.compose(&[[1.0, 0.0, 0.0], [1.0, 0.0, 0.0]], &[std::f32::INFINITY, 1.0e-3]);
        assert_eq!(out[0], [127, 0, 0]);
        assert!(sum(&out[0]) > sum(&out[1]));
        let comp = Compositor::new(1.0, 127).unwrap();
        assert_eq!(comp.compose(&[[1.0, 0.0, 0.0]], &[std::f32::MAX]), vec![[127, 0, 0]]);
    }

    #[test]
    fn random_frames_respect_cap() {
        let mut rng = rand::thread_rng();
        for cap in [1_u8, 7, 127, 255].iter() {
            let comp = Compositor::new(rng.gen_range(0.0, 5000.0), *cap).unwrap();
            let colors: Vec<ColorTriple> = (0..64)
                .map(|_| [rng.gen_range(0.0, 1.0), rng.gen_range(0.0, 1.0), rng.gen_range(0.0, 1.0)])
                .collect();
            let levels: Vec<f32> = (0..64).map(|_| rng.gen_range(0.0, 10.0)).collect();
            for px in comp.compose(&colors, &levels) {
                assert!(sum(&px) <= *cap as u16, "{:?} over {}", px, cap);
            }
        }
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(Compositor::new(-1.0, 127).is_err());
        assert!(Compositor::new(1.0, 0).is_err());
    }
}
