use std::time::Duration;

use crate::result::ResultCode;

/// Errors that can occur in message-pipe operations.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// The handle was closed or never valid.
    #[error("invalid or closed handle")]
    InvalidHandle,

    /// The peer endpoint has been closed.
    #[error("peer endpoint closed")]
    PeerClosed,

    /// No message is queued yet.
    #[error("no message available")]
    ShouldWait,

    /// The requested signals can never be satisfied.
    #[error("signals can no longer be satisfied")]
    Unsatisfiable,

    /// Waiting for signals timed out.
    #[error("wait timed out after {0:?}")]
    DeadlineExceeded(Duration),

    /// The message exceeds the pipe's configured limits.
    #[error("message too large ({size} bytes / {handles} handles, max {max_bytes} bytes / {max_handles} handles)")]
    MessageTooLarge {
        size: usize,
        handles: usize,
        max_bytes: usize,
        max_handles: usize,
    },

    /// The caller's buffer cannot hold the next message.
    #[error("buffer too small for next message ({message_size} bytes, {handles_count} handles)")]
    BufferTooSmall {
        message_size: usize,
        handles_count: usize,
    },
}

impl SystemError {
    /// The result code this error is reported as.
    pub fn code(&self) -> ResultCode {
        match self {
            SystemError::InvalidHandle => ResultCode::InvalidArgument,
            SystemError::PeerClosed | SystemError::Unsatisfiable => ResultCode::FailedPrecondition,
            SystemError::ShouldWait => ResultCode::ShouldWait,
            SystemError::DeadlineExceeded(_) => ResultCode::DeadlineExceeded,
            SystemError::MessageTooLarge { .. } | SystemError::BufferTooSmall { .. } => {
                ResultCode::ResourceExhausted
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SystemError>;
