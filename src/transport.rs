//! Wire encodings and the link to the LED controller.
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::StripError;
use crate::led::Rgb;

/// Highest LED index the addressed encoding can carry (5 index bits).
pub const ADDRESSED_MAX_LEDS: usize = 32;
/// Values must keep the high bit clear so they never look like command bytes.
pub const ADDRESSED_MAX_VALUE: u8 = 0x7F;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Encoding {
    /// `r, g, b` per LED in index order, no framing.
    Plain,
    /// `(i<<2)|0x80, r, (i<<2)|0x81, g, (i<<2)|0x82, b` per LED `i`.
    Addressed,
}

impl Encoding {
    pub fn check(self, leds: usize, cap: u8) -> Result<(), StripError> {
        if self != Encoding::Addressed {
            return Ok(());
        }
        if leds > ADDRESSED_MAX_LEDS {
            return Err(StripError::Config(format!(
                "addressed encoding supports at most {} LEDs, got {}", ADDRESSED_MAX_LEDS, leds)));
        }
        if cap > ADDRESSED_MAX_VALUE {
            return Err(StripError::Config(format!(
                "addressed encoding needs a cap of at most {}, got {}", ADDRESSED_MAX_VALUE, cap)));
        }
        Ok(())
    }
    pub fn encode(self, frame: &[Rgb]) -> Vec<u8> {
        match self {
            Encoding::Plain => frame.iter().flat_map(|px| px.iter().cloned()).collect(),
            Encoding::Addressed => {
                let mut out = Vec::with_capacity(frame.len() * 6);
                for (i, px) in frame.iter().enumerate() {
                    let index = ((i as u8) << 2) | 0x80;
                    for (channel, value) in px.iter().enumerate() {
                        out.push(index | channel as u8);
                        out.push(*value);
                    }
                }
                out
            }
        }
    }
}

/// Writes encoded frames to any byte sink, typically the serial device.
pub struct Transport<W: Write> {
    writer: W,
    encoding: Encoding,
}

impl<W: Write> Transport<W> {
    pub fn new(writer: W, encoding: Encoding) -> Self {
        Transport { writer, encoding }
    }
    /// Blocks until the whole frame is handed to the writer.
    pub fn send(&mut self, frame: &[Rgb]) -> Result<(), StripError> {
        let bytes = self.encoding.encode(frame);
        self.writer.write_all(&bytes)?;
        self.writer.flush()?;
        Ok(())
    }
    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Opens a serial device node for writing. Line settings (baud rate and so on)
/// are left as the device has them; USB CDC controllers ignore them anyway.
pub fn open_serial<P: AsRef<Path>>(path: P) -> Result<File, StripError> {
    let file = OpenOptions::new().write(true).open(path.as_ref())?;
    log::info!("opened {}", path.as_ref().display());
    Ok(file)
}

/// Terminal rendering of a frame: one line per LED, each channel drawn as a
/// run of `r`, `g` or `b` characters.
pub fn preview(frame: &[Rgb]) -> String {
    let mut out = String::new();
    for [r, g, b] in frame.iter() {
        out.extend(std::iter::repeat('r').take(*r as usize));
        out.extend(std::iter::repeat('g').take(*g as usize));
        out.extend(std::iter::repeat('b').take(*b as usize));
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn plain_encoding() {
        let bytes = Encoding::Plain.encode(&[[1, 2, 3], [4, 5, 6]]);
        assert_eq!(bytes, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn addressed_encoding_tags_index_and_channel() {
        let frame = [[0, 0, 0], [0, 0, 0], [0, 0, 0], [10, 20, 30]];
        let bytes = Encoding::Addressed.encode(&frame);
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[18..], &[0x8C, 10, 0x8D, 20, 0x8E, 30]);
        assert_eq!(&bytes[..6], &[0x80, 0, 0x81, 0, 0x82, 0]);
    }

    #[test]
    fn addressed_encoding_last_led() {
        let frame = vec![[1, 1, 1]; 32];
        let bytes = Encoding::Addressed.encode(&frame);
        assert_eq!(&bytes[31 * 6..], &[0xFC, 1, 0xFD, 1, 0xFE, 1]);
    }

    #[test]
    fn addressed_limits() {
        assert!(Encoding::Addressed.check(32, 127).is_ok());
        assert!(Encoding::Addressed.check(33, 127).is_err());
        assert!(Encoding::Addressed.check(32, 128).is_err());
        assert!(Encoding::Plain.check(300, 255).is_ok());
    }

    #[test]
    fn transport_writes_whole_frames() {
        let mut t = Transport::new(Vec::new(), Encoding::Plain);
        t.send(&[[7, 8, 9]]).unwrap();
        t.send(&[[1, 2, 3]]).unwrap();
        assert_eq!(t.into_inner(), vec![7, 8, 9, 1, 2, 3]);
    }

    #[test]
    fn preview_draws_bars() {
        assert_eq!(preview(&[[2, 1, 0], [0, 0, 3]]), "rrg\nbbb\n");
    }
}
