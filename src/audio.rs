//! Frame sources: where the sample blocks come from.
//!
//! Everything here hands the pipeline mono blocks of a fixed length, already
//! mixed down and at 16-bit integer scale.
use std::io::{self, Read};
use std::sync::mpsc::{self, Receiver, TrySendError};
use std::thread::{self, JoinHandle};

use crate::error::StripError;

#[cfg(feature = "jack")]
pub use self::jack_source::JackSource;

pub type SampleBlock = Vec<f32>;

pub trait BlockSource {
    fn sample_rate(&self) -> u32;
    fn block_len(&self) -> usize;
    /// Blocks until a whole block is available.
    fn next_block(&mut self) -> Result<SampleBlock, StripError>;
}

impl<S: BlockSource + ?Sized> BlockSource for Box<S> {
    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }
    fn block_len(&self) -> usize {
        (**self).block_len()
    }
    fn next_block(&mut self) -> Result<SampleBlock, StripError> {
        (**self).next_block()
    }
}

/// Interleaved signed 16-bit little-endian PCM from any reader, e.g. the
/// stdout of `arecord -f S16_LE`. Channels are summed into one.
pub struct PcmReader<R: Read> {
    reader: R,
    channels: usize,
    block_len: usize,
    sample_rate: u32,
    buf: Vec<u8>,
}

impl<R: Read> PcmReader<R> {
    pub fn new(reader: R, channels: usize, block_len: usize, sample_rate: u32) -> Result<Self, StripError> {
        if channels == 0 {
            return Err(StripError::config("PCM input needs at least one channel"));
        }
        Ok(PcmReader {
            reader,
            channels,
            block_len,
            sample_rate,
            buf: vec![0; block_len * channels * 2],
        })
    }
}

impl<R: Read> BlockSource for PcmReader<R> {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn block_len(&self) -> usize {
        self.block_len
    }
    fn next_block(&mut self) -> Result<SampleBlock, StripError> {
        if let Err(e) = self.reader.read_exact(&mut self.buf) {
            return Err(match e.kind() {
                io::ErrorKind::UnexpectedEof => StripError::SourceClosed,
                _ => StripError::Io(e),
            });
        }
        let frame_bytes = self.channels * 2;
        Ok(self.buf
            .chunks(frame_bytes)
            .map(|frame| {
                frame.chunks(2).map(|s| i16::from_le_bytes([s[0], s[1]]) as f32).sum()
            })
            .collect())
    }
}

/// Runs a source on its own thread so a slow render never stalls capture.
///
/// Blocks go through a small bounded queue. When the queue is full the new
/// block is dropped rather than waiting, which keeps the lights at most a
/// block or two behind the room. The first source error is forwarded and ends
/// the thread.
pub struct Capture {
    sample_rate: u32,
    block_len: usize,
    recv: Receiver<Result<SampleBlock, StripError>>,
    thread: Option<JoinHandle<()>>,
}

impl Capture {
    pub fn spawn<S>(mut source: S, capacity: usize) -> Self
        where S: BlockSource + Send + 'static
    {
        let sample_rate = source.sample_rate();
        let block_len = source.block_len();
        let (sender, recv) = mpsc::sync_channel(capacity.max(1));
        let thread = thread::spawn(move || {
            let mut dropped: u64 = 0;
            loop {
                match source.next_block() {
                    Ok(block) => match sender.try_send(Ok(block)) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            dropped += 1;
                            log::debug!("render behind, dropped block ({} total)", dropped);
                        }
                        Err(TrySendError::Disconnected(_)) => break,
                    },
                    Err(e) => {
                        let _ = sender.send(Err(e));
                        break;
                    }
                }
            }
        });
        Capture { sample_rate, block_len, recv, thread: Some(thread) }
    }
}

impl BlockSource for Capture {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
    fn block_len(&self) -> usize {
        self.block_len
    }
    fn next_block(&mut self) -> Result<SampleBlock, StripError> {
        match self.recv.recv() {
            Ok(res) => res,
            Err(_) => Err(StripError::SourceClosed),
        }
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        // a source blocked on a read may never return, so only reap finished threads
        if let Some(t) = self.thread.take() {
            if t.is_finished() {
                let _ = t.join();
            }
        }
    }
}

#[cfg(feature = "jack")]
mod jack_source {
    use std::mem;
    use std::sync::mpsc;

    use super::{BlockSource, SampleBlock};
    use crate::error::StripError;

    // jack hands out floats in [-1, 1]; scale them to match 16-bit PCM
    const FULL_SCALE: f32 = 32768.0;

    /// Live input from a JACK server through `left` and `right` ports.
    pub struct JackSource {
        sample_rate: u32,
        block_len: usize,
        recv: mpsc::Receiver<SampleBlock>,
        _client: jack::AsyncClient<Notifications, BlockHandler>,
    }

    impl JackSource {
        pub fn open(name: &str, block_len: usize) -> Result<Self, StripError> {
            let (client, _status) = jack::Client::new(name, jack::ClientOptions::NO_START_SERVER)
                .map_err(StripError::Jack)?;
            let left = client.register_port("left", jack::AudioIn::default())
                .map_err(StripError::Jack)?;
            let right = client.register_port("right", jack::AudioIn::default())
                .map_err(StripError::Jack)?;
            let sample_rate = client.sample_rate() as u32;
            let (sender, recv) = mpsc::sync_channel((sample_rate as usize / block_len).max(1));
            let handler = BlockHandler {
                block: Vec::with_capacity(block_len),
                block_len,
                sender,
                left,
                right,
            };
            let active = client.activate_async(Notifications, handler).map_err(StripError::Jack)?;
            log::info!("jack client '{}' running at {} Hz", name, sample_rate);
            Ok(JackSource { sample_rate, block_len, recv, _client: active })
        }
    }

    impl BlockSource for JackSource {
        fn sample_rate(&self) -> u32 {
            self.sample_rate
        }
        fn block_len(&self) -> usize {
            self.block_len
        }
        fn next_block(&mut self) -> Result<SampleBlock, StripError> {
            self.recv.recv().map_err(|_| StripError::SourceClosed)
        }
    }

    pub struct BlockHandler {
        block: SampleBlock,
        block_len: usize,
        sender: mpsc::SyncSender<SampleBlock>,
        left: jack::Port<jack::AudioIn>,
        right: jack::Port<jack::AudioIn>,
    }

    impl jack::ProcessHandler for BlockHandler {
        fn process(&mut self, _: &jack::Client, ps: &jack::ProcessScope) -> jack::Control {
            let left = self.left.as_slice(ps);
            let right = self.right.as_slice(ps);
            for (l, r) in left.iter().zip(right) {
                self.block.push((l + r) * FULL_SCALE);
                if self.block.len() == self.block_len {
                    let block = mem::replace(&mut self.block, Vec::with_capacity(self.block_len));
                    // never block the realtime thread, a full queue just loses the block
                    let _ = self.sender.try_send(block);
                }
            }
            jack::Control::Continue
        }
    }

    pub struct Notifications;

    impl jack::NotificationHandler for Notifications {
        fn xrun(&mut self, _: &jack::Client) -> jack::Control {
            log::debug!("xrun occurred");
            jack::Control::Continue
        }
    }
}
