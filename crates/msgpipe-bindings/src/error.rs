use msgpipe_system::{ResultCode, SystemError};

/// Errors that can occur while building or decoding binding messages.
#[derive(Debug, thiserror::Error)]
pub enum BindingsError {
    /// Message-pipe level error.
    #[error("system error: {0}")]
    System(#[from] SystemError),

    /// The message does not start with a valid header.
    #[error("invalid message header: {0}")]
    InvalidHeader(String),
}

pub type Result<T> = std::result::Result<T, BindingsError>;

/// A terminal channel fault, as delivered to a connection error handler.
///
/// The code is passed through unmodified from the pipe; a vanished peer is
/// reported as `FAILED_PRECONDITION`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("connection error: {code}")]
pub struct ConnectionError {
    code: ResultCode,
}

impl ConnectionError {
    pub fn new(code: ResultCode) -> Self {
        Self { code }
    }

    pub fn code(&self) -> ResultCode {
        self.code
    }

    /// True when the peer endpoint has gone away.
    pub fn is_peer_closed(&self) -> bool {
        self.code == ResultCode::FailedPrecondition
    }
}
