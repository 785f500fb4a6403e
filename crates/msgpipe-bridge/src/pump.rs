use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use msgpipe_frame::{FrameKind, FrameReader, FrameWriter};
use msgpipe_system::{
    Core, HandleSignals, MessagePipeHandle, ReadFlags, SystemError, WriteFlags,
};
use msgpipe_transport::{IpcStream, PeerCredentials};
use tracing::{debug, trace, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// A live bridged connection.
#[derive(Debug)]
pub struct Bridge {
    handle: MessagePipeHandle,
    pumps: Pumps,
    peer: Option<PeerCredentials>,
}

impl Bridge {
    /// The caller's endpoint.
    pub fn handle(&self) -> &MessagePipeHandle {
        &self.handle
    }

    /// The remote process, where the platform reports it.
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        self.peer
    }

    /// Keep only the endpoint; the pumps run until the connection ends.
    pub fn into_handle(self) -> MessagePipeHandle {
        self.handle
    }

    pub fn into_parts(self) -> (MessagePipeHandle, Pumps) {
        (self.handle, self.pumps)
    }
}

/// The two pump threads of a bridged connection.
#[derive(Debug)]
pub struct Pumps {
    inbound: JoinHandle<()>,
    outbound: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
}

impl Pumps {
    /// Wait for both pumps to finish.
    ///
    /// After the caller's endpoint is closed this returns once every message
    /// written before the close has been handed to the stream.
    pub fn join(self) {
        for pump in [self.inbound, self.outbound] {
            if pump.join().is_err() {
                warn!("bridge pump panicked");
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.inbound.is_finished() && self.outbound.is_finished()
    }

    /// Ask both pumps to stop without draining.
    pub fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);
    }
}

/// Bridge an already-connected stream to a fresh local pipe.
pub fn bridge_stream(stream: IpcStream, config: &BridgeConfig) -> Result<Bridge> {
    let peer = stream.peer_credentials();
    let (handle, local) = Core::global().create_message_pipe(&config.create_options())?;
    let local = Arc::new(local);

    let frame_config = config.frame_config();
    let reader = FrameReader::with_config_ipc(stream.try_clone()?, frame_config.clone())?;
    let writer = FrameWriter::with_config_ipc(stream, frame_config)?;
    let stopping = Arc::new(AtomicBool::new(false));

    let inbound = {
        let local = Arc::clone(&local);
        let stopping = Arc::clone(&stopping);
        thread::Builder::new()
            .name("msgpipe-bridge-in".to_string())
            .spawn(move || pump_inbound(local, reader, stopping))
            .map_err(BridgeError::Spawn)?
    };
    let outbound = {
        let stopping = Arc::clone(&stopping);
        let poll = config.poll_interval;
        thread::Builder::new()
            .name("msgpipe-bridge-out".to_string())
            .spawn(move || pump_outbound(local, writer, stopping, poll))
            .map_err(BridgeError::Spawn)?
    };

    debug!(handle = %handle.id(), ?peer, "bridge established");
    Ok(Bridge {
        handle,
        pumps: Pumps {
            inbound,
            outbound,
            stopping,
        },
        peer,
    })
}

/// Stream to pipe.
fn pump_inbound(
    local: Arc<MessagePipeHandle>,
    mut reader: FrameReader<IpcStream>,
    stopping: Arc<AtomicBool>,
) {
    loop {
        let frame = match reader.read_frame_or_eof() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                debug!("bridge stream reached EOF");
                break;
            }
            Err(err) => {
                if !stopping.load(Ordering::SeqCst) {
                    warn!(error = %err, "bridge read failed");
                }
                break;
            }
        };

        match frame.kind {
            FrameKind::Message => {
                trace!(size = frame.payload.len(), "bridging inbound message");
                match local.write_message(&frame.payload, Vec::new(), WriteFlags::empty()) {
                    Ok(()) => {}
                    // The caller closed its endpoint; the outbound pump drains and
                    // reports the close to the remote.
                    Err(SystemError::PeerClosed) => return,
                    Err(err) => {
                        warn!(error = %err, "bridged message rejected by local pipe");
                        break;
                    }
                }
            }
            FrameKind::Close => {
                debug!("remote endpoint closed");
                break;
            }
        }
    }

    stopping.store(true, Ordering::SeqCst);
    let _ = reader.get_ref().shutdown();
}

/// Pipe to stream.
fn pump_outbound(
    local: Arc<MessagePipeHandle>,
    mut writer: FrameWriter<IpcStream>,
    stopping: Arc<AtomicBool>,
    poll: Duration,
) {
    while !stopping.load(Ordering::SeqCst) {
        match local.read_message(ReadFlags::empty()) {
            Ok(message) => {
                if !message.handles.is_empty() {
                    warn!(
                        handles = message.handles.len(),
                        "handles cannot cross a bridge; closing connection"
                    );
                    break;
                }
                trace!(size = message.bytes.len(), "bridging outbound message");
                if let Err(err) = writer.send_message(&message.bytes) {
                    warn!(error = %err, "bridge write failed");
                    break;
                }
            }
            Err(SystemError::ShouldWait) => {
                let _ = local.wait(HandleSignals::READABLE, Some(poll));
            }
            Err(SystemError::PeerClosed) => {
                debug!("local endpoint closed; closing bridge");
                if let Err(err) = writer.send_close() {
                    debug!(error = %err, "could not send close frame");
                }
                break;
            }
            Err(err) => {
                warn!(error = %err, "bridge pipe read failed");
                break;
            }
        }
    }

    stopping.store(true, Ordering::SeqCst);
    let _ = writer.get_ref().shutdown();
}
