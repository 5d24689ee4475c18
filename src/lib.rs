//! Ambient LED light show driven by live audio.
//!
//! Sample blocks are turned into per-LED brightness (spectrum, band mapping,
//! adaptive gain, smoothing, shaping), combined with a slowly drifting color
//! field, capped to what the strip can take, and written to the controller.

pub mod agc;
pub mod audio;
pub mod bands;
pub mod color;
pub mod config;
pub mod error;
pub mod led;
pub mod pipeline;
pub mod shape;
pub mod smooth;
pub mod spectrum;
pub mod transport;

pub use config::{Config, Strategy};
pub use error::StripError;
pub use pipeline::{Chain, Pipeline, Stage};
