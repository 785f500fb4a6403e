use std::path::PathBuf;

/// Errors raised while binding, connecting or using a stream.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `sockaddr_un.sun_path` cannot hold the path.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

impl TransportError {
    /// The underlying I/O error, for layers that only speak `std::io`.
    pub fn into_io(self) -> std::io::Error {
        match self {
            Self::Bind { source, .. } | Self::Connect { source, .. } => source,
            Self::Accept(err) | Self::Io(err) => err,
            other @ Self::PathTooLong { .. } => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, other.to_string())
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_io_keeps_kind() {
        let err = TransportError::Connect {
            path: PathBuf::from("/tmp/x.sock"),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        };
        assert_eq!(err.into_io().kind(), std::io::ErrorKind::NotFound);

        let err = TransportError::PathTooLong {
            path: PathBuf::from("/long"),
            len: 200,
            max: 108,
        };
        assert_eq!(err.into_io().kind(), std::io::ErrorKind::InvalidInput);
    }
}
