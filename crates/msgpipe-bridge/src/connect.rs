use std::path::Path;

use msgpipe_system::MessagePipeHandle;
use msgpipe_transport::UnixDomainSocket;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::pump::{bridge_stream, Bridge};

/// Connect to a bridge listener and return the local end of the pipe.
pub fn connect(path: impl AsRef<Path>) -> Result<MessagePipeHandle> {
    Ok(connect_with_config(path, &BridgeConfig::default())?.into_handle())
}

/// Connect with explicit settings, keeping the pump threads.
pub fn connect_with_config(path: impl AsRef<Path>, config: &BridgeConfig) -> Result<Bridge> {
    let stream = UnixDomainSocket::connect(path)?;
    bridge_stream(stream, config)
}
