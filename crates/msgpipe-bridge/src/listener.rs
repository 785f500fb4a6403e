use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use msgpipe_system::MessagePipeHandle;
use msgpipe_transport::UnixDomainSocket;
use tracing::info;

use crate::config::BridgeConfig;
use crate::error::Result;
use crate::pump::{bridge_stream, Bridge};

/// Accepts bridged connections on a Unix domain socket.
#[derive(Debug)]
pub struct BridgeListener {
    socket: UnixDomainSocket,
    config: BridgeConfig,
    accepted: AtomicU64,
}

impl BridgeListener {
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_config(path, BridgeConfig::default())
    }

    pub fn bind_with_config(path: impl AsRef<Path>, config: BridgeConfig) -> Result<Self> {
        Ok(Self {
            socket: UnixDomainSocket::bind(path)?,
            config,
            accepted: AtomicU64::new(0),
        })
    }

    /// Block for the next client and return the local end of its pipe.
    pub fn accept(&self) -> Result<MessagePipeHandle> {
        Ok(self.accept_bridge()?.into_handle())
    }

    /// Like `accept`, but keep the pump threads and peer identity.
    pub fn accept_bridge(&self) -> Result<Bridge> {
        let stream = self.socket.accept()?;
        let bridge = bridge_stream(stream, &self.config)?;
        let seq = self.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        match bridge.peer_credentials() {
            Some(peer) => info!(
                seq,
                pid = peer.pid,
                uid = peer.uid,
                handle = %bridge.handle().id(),
                "accepted bridged connection"
            ),
            None => info!(seq, handle = %bridge.handle().id(), "accepted bridged connection"),
        }
        Ok(bridge)
    }

    /// Connections accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn path(&self) -> &Path {
        self.socket.path()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }
}
