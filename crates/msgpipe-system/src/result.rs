use std::fmt;

/// Classification of every outcome reported by the message-pipe layer.
///
/// Codes travel unmodified from the pipe up through connectors to error
/// handlers, so callers can match on them regardless of which layer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    /// The operation cannot proceed in the current state, e.g. the peer
    /// endpoint is gone.
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Busy,
    /// Nothing is available yet; retry once the handle is signalled.
    ShouldWait,
}

impl ResultCode {
    pub fn is_ok(self) -> bool {
        self == ResultCode::Ok
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResultCode::Ok => "OK",
            ResultCode::Cancelled => "CANCELLED",
            ResultCode::Unknown => "UNKNOWN",
            ResultCode::InvalidArgument => "INVALID_ARGUMENT",
            ResultCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            ResultCode::NotFound => "NOT_FOUND",
            ResultCode::AlreadyExists => "ALREADY_EXISTS",
            ResultCode::PermissionDenied => "PERMISSION_DENIED",
            ResultCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            ResultCode::FailedPrecondition => "FAILED_PRECONDITION",
            ResultCode::Aborted => "ABORTED",
            ResultCode::OutOfRange => "OUT_OF_RANGE",
            ResultCode::Unimplemented => "UNIMPLEMENTED",
            ResultCode::Internal => "INTERNAL",
            ResultCode::Unavailable => "UNAVAILABLE",
            ResultCode::DataLoss => "DATA_LOSS",
            ResultCode::Busy => "BUSY",
            ResultCode::ShouldWait => "SHOULD_WAIT",
        }
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_screaming_snake_names() {
        assert_eq!(ResultCode::FailedPrecondition.to_string(), "FAILED_PRECONDITION");
        assert_eq!(ResultCode::ShouldWait.to_string(), "SHOULD_WAIT");
        assert_eq!(ResultCode::Ok.to_string(), "OK");
    }

    #[test]
    fn only_ok_is_ok() {
        assert!(ResultCode::Ok.is_ok());
        assert!(!ResultCode::Cancelled.is_ok());
    }
}
