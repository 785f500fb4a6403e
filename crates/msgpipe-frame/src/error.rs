/// Errors raised while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame magic (expected 0x4D50 \"MP\")")]
    InvalidMagic,

    #[error("unknown frame kind {0}")]
    UnknownKind(u16),

    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// EOF arrived before a complete frame.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

impl From<msgpipe_transport::TransportError> for FrameError {
    fn from(err: msgpipe_transport::TransportError) -> Self {
        Self::Io(err.into_io())
    }
}

pub type Result<T> = std::result::Result<T, FrameError>;
