use msgpipe_frame::FrameError;
use msgpipe_system::SystemError;
use msgpipe_transport::TransportError;

/// Errors raised while setting up a bridged connection.
///
/// Faults after setup are not returned anywhere: they close the local
/// endpoint, which the caller observes as its peer going away.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("message pipe error: {0}")]
    System(#[from] SystemError),

    /// A pump thread could not be spawned.
    #[error("failed to start bridge pump: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
