use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StripError {
    /// Rejected while building the pipeline, before any audio is read.
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("sample block has {got} samples, expected {expected}")]
    BlockLength { expected: usize, got: usize },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("frame source closed")]
    SourceClosed,
    #[cfg(feature = "jack")]
    #[error("jack error: {0:?}")]
    Jack(jack::Error),
}

impl StripError {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        StripError::Config(msg.into())
    }
}
