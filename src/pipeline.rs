//! Chains the stages from sample block to RGB frame.
//!
//! ```text
//! block -> analyzer -> band mapper -> noise floor -> [compensation]
//!       -> AGC -> smoother -> [weighting] -> exaggeration -> compositor -> frame
//!                                          colors (clock) ---^
//! ```
use std::io::Write;
use std::time::{Duration, Instant};

use crate::agc::{AdaptiveGain, NoiseFloor};
use crate::audio::BlockSource;
use crate::bands::BandMapper;
use crate::color::{self, ColorTicker};
use crate::config::{Config, Strategy};
use crate::error::StripError;
use crate::led::{Compositor, Rgb};
use crate::shape::{Compensator, Exaggerate, Weighting};
use crate::smooth::Smoother;
use crate::spectrum::{Analyzer, Correlation, Transform};
use crate::transport::{self, Transport};

/// One step of the brightness chain. Each stage owns whatever state it needs
/// and keeps it between calls.
pub trait Stage {
    fn update(&mut self, v: Vec<f32>) -> Vec<f32>;
}

/// Stages run in the order they were added.
#[derive(Default)]
pub struct Chain {
    stages: Vec<Box<dyn Stage>>,
}

impl Chain {
    pub fn new() -> Self {
        Chain { stages: Vec::new() }
    }
    pub fn then<S: Stage + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
    pub fn len(&self) -> usize {
        self.stages.len()
    }
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl Stage for Chain {
    fn update(&mut self, v: Vec<f32>) -> Vec<f32> {
        self.stages.iter_mut().fold(v, |v, stage| stage.update(v))
    }
}

pub struct Pipeline {
    sample_rate: u32,
    analyzer: Analyzer,
    mapper: BandMapper,
    chain: Chain,
    colors: ColorTicker,
    compositor: Compositor,
    leds: usize,
    capture_queue: usize,
}

impl Pipeline {
    /// Validates the whole configuration and builds every stage, so any
    /// mistake surfaces before audio is read.
    pub fn new(config: Config) -> Result<Self, StripError> {
        config.validate()?;
        let analyzer = match &config.strategy {
            Strategy::Transform => Analyzer::Transform(Transform::new(config.block_len)?),
            Strategy::Correlation(freqs) =>
                Analyzer::Correlation(Correlation::new(freqs, config.block_len, config.sample_rate)?),
        };
        let mapper = BandMapper::new(analyzer.output_len(), config.leds, config.decimation)?;
        log::info!("{:?} -> {} LEDs, {} bins each", analyzer, config.leds, mapper.group());

        let mut chain = Chain::new().then(NoiseFloor::new(config.noise_floor)?);
        if let Some(falloff) = config.compensation {
            chain = chain.then(Compensator::new(falloff)?);
        }
        chain = chain
            .then(AdaptiveGain::new(config.agc, config.agc_falloff)?)
            .then(Smoother::new(config.smoothing)?);
        if let Some(curve) = &config.weighting {
            let freqs = band_frequencies(&config, &mapper);
            log::debug!("band centres {:?}", freqs);
            chain = chain.then(Weighting::new(curve, &freqs));
        }
        chain = chain.then(Exaggerate::new(config.curve)?);

        Ok(Pipeline {
            sample_rate: config.sample_rate,
            analyzer,
            mapper,
            chain,
            colors: ColorTicker::new(config.colors, config.leds)?,
            compositor: Compositor::new(config.gain, config.cap)?,
            leds: config.leds,
            capture_queue: config.capture_queue,
        })
    }

    pub fn leds(&self) -> usize {
        self.leds
    }
    pub fn capture_queue(&self) -> usize {
        self.capture_queue
    }

    /// Per-LED brightness for one block, before color is applied.
    pub fn brightness(&mut self, block: &[f32]) -> Result<Vec<f32>, StripError> {
        let expected = self.analyzer.block_len();
        if !block.is_empty() && block.len() != expected {
            return Err(StripError::BlockLength { expected, got: block.len() });
        }
        let spectrum = self.analyzer.analyze(block);
        let channels = self.mapper.map(&spectrum);
        let out = self.chain.update(channels);
        debug_assert_eq!(out.len(), self.leds);
        Ok(out)
    }

    /// Frame for one block with colors sampled at time `t` (seconds).
    pub fn tick_at(&mut self, block: &[f32], t: f64) -> Result<Vec<Rgb>, StripError> {
        let levels = self.brightness(block)?;
        Ok(self.compositor.compose(&self.colors.at(t), &levels))
    }

    pub fn tick(&mut self, block: &[f32]) -> Result<Vec<Rgb>, StripError> {
        self.tick_at(block, color::now())
    }

    /// Pulls blocks from `source` and pushes frames to `transport` until the
    /// source runs dry (`Ok` with the frame count) or either side fails.
    pub fn run<S, W>(&mut self, source: &mut S, transport: &mut Transport<W>, preview: bool)
        -> Result<u64, StripError>
        where S: BlockSource, W: Write
    {
        if source.sample_rate() != self.sample_rate {
            return Err(StripError::Config(format!(
                "source runs at {} Hz, pipeline expects {} Hz", source.sample_rate(), self.sample_rate)));
        }
        if source.block_len() != self.analyzer.block_len() {
            return Err(StripError::BlockLength {
                expected: self.analyzer.block_len(), got: source.block_len() });
        }
        let period = Duration::from_secs_f64(source.block_len() as f64 / self.sample_rate as f64);
        let mut frames: u64 = 0;
        let mut slow: u64 = 0;
        loop {
            let block = match source.next_block() {
                Ok(b) => b,
                Err(StripError::SourceClosed) => {
                    log::info!("frame source closed after {} frames", frames);
                    return Ok(frames);
                }
                Err(e) => return Err(e),
            };
            let start = Instant::now();
            let frame = self.tick(&block)?;
            if preview {
                eprintln!("{}", transport::preview(&frame));
            }
            transport.send(&frame)?;
            frames += 1;
            if start.elapsed() > period {
                slow += 1;
                if slow % 100 == 1 {
                    log::warn!("led render taking too long ({:?} > {:?}, {} slow frames)",
                        start.elapsed(), period, slow);
                }
            }
        }
    }
}

/// Centre frequency of every band, for the weighting table.
fn band_frequencies(config: &Config, mapper: &BandMapper) -> Vec<f32> {
    match &config.strategy {
        Strategy::Transform => {
            mapper.band_frequencies(config.sample_rate as f32 / config.block_len as f32)
        }
        Strategy::Correlation(freqs) => {
            let group = mapper.group() as f32;
            mapper.map(freqs).into_iter().map(|sum| sum / group).collect()
        }
    }
}
