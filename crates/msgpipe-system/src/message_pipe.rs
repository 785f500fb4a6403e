use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::{Result, SystemError};
use crate::handle::{Handle, HandleId};
use crate::signals::{CreateFlags, HandleSignals, HandleSignalsState, ReadFlags, WriteFlags};

/// Default maximum message body size: 4 MiB.
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Default maximum number of handles attached to one message.
pub const DEFAULT_MAX_MESSAGE_HANDLES: usize = 64;

/// Limits enforced when writing to a pipe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeConfig {
    /// Maximum message body size in bytes. Default: 4 MiB.
    pub max_message_bytes: usize,
    /// Maximum number of handles per message. Default: 64.
    pub max_message_handles: usize,
}

impl Default for PipeConfig {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            max_message_handles: DEFAULT_MAX_MESSAGE_HANDLES,
        }
    }
}

/// Options for `Core::create_message_pipe`.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub flags: CreateFlags,
    pub config: PipeConfig,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            flags: CreateFlags::empty(),
            config: PipeConfig::default(),
        }
    }
}

/// A message as stored in a pipe: body bytes plus transferred handles.
#[derive(Debug)]
pub struct RawMessage {
    pub bytes: Bytes,
    pub handles: Vec<Handle>,
}

/// Outcome of `MessagePipeHandle::read_message_into`.
#[derive(Debug)]
pub struct ReadMessageResult {
    /// Size of the message body copied into the caller's buffer.
    pub message_size: usize,
    /// Number of handles that travelled with the message.
    pub handles_count: usize,
    /// The transferred handles, in order.
    pub handles: Vec<Handle>,
}

pub(crate) type Observer = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Endpoint {
    open: bool,
    inbound: VecDeque<RawMessage>,
    observers: Vec<(u64, Observer)>,
}

impl Endpoint {
    fn observers(&self) -> Vec<Observer> {
        self.observers.iter().map(|(_, obs)| Arc::clone(obs)).collect()
    }
}

struct PipeState {
    endpoints: [Endpoint; 2],
}

/// State shared by both endpoints of one pipe.
pub(crate) struct Pipe {
    config: PipeConfig,
    state: Mutex<PipeState>,
    changed: Condvar,
}

impl Pipe {
    fn new(config: PipeConfig) -> Arc<Self> {
        let endpoint = || Endpoint {
            open: true,
            ..Endpoint::default()
        };
        Arc::new(Self {
            config,
            state: Mutex::new(PipeState {
                endpoints: [endpoint(), endpoint()],
            }),
            changed: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PipeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake blocked waiters and run observers. Called without the lock held.
    fn notify(&self, observers: Vec<Observer>) {
        self.changed.notify_all();
        for observer in observers {
            observer();
        }
    }

    pub(crate) fn signals_state(&self, side: usize) -> Option<HandleSignalsState> {
        let state = self.lock();
        signals_of(&state, side)
    }

    pub(crate) fn add_observer(&self, side: usize, id: u64, observer: Observer) -> bool {
        let mut state = self.lock();
        let endpoint = &mut state.endpoints[side];
        if !endpoint.open {
            return false;
        }
        endpoint.observers.push((id, observer));
        true
    }

    pub(crate) fn remove_observer(&self, side: usize, id: u64) {
        let mut state = self.lock();
        state.endpoints[side].observers.retain(|(obs_id, _)| *obs_id != id);
    }

    #[cfg(test)]
    pub(crate) fn observer_count(&self, side: usize) -> usize {
        self.lock().endpoints[side].observers.len()
    }

    fn close_side(&self, side: usize) {
        let (discarded, observers) = {
            let mut state = self.lock();
            let endpoint = &mut state.endpoints[side];
            if !endpoint.open {
                return;
            }
            endpoint.open = false;
            let discarded = std::mem::take(&mut endpoint.inbound);
            let mut observers = endpoint.observers();
            endpoint.observers.clear();
            observers.extend(state.endpoints[peer_of(side)].observers());
            (discarded, observers)
        };
        // Queued messages may carry handles into this very pipe; drop them unlocked.
        drop(discarded);
        self.notify(observers);
    }
}

fn peer_of(side: usize) -> usize {
    1 - side
}

fn signals_of(state: &PipeState, side: usize) -> Option<HandleSignalsState> {
    let own = &state.endpoints[side];
    if !own.open {
        return None;
    }
    let peer_open = state.endpoints[peer_of(side)].open;
    let has_message = !own.inbound.is_empty();

    let mut satisfied = HandleSignals::empty();
    let mut satisfiable = HandleSignals::PEER_CLOSED;
    if has_message {
        satisfied |= HandleSignals::READABLE;
    }
    if peer_open {
        satisfied |= HandleSignals::WRITABLE;
        satisfiable |= HandleSignals::READABLE | HandleSignals::WRITABLE;
    } else {
        satisfied |= HandleSignals::PEER_CLOSED;
        if has_message {
            satisfiable |= HandleSignals::READABLE;
        }
    }

    Some(HandleSignalsState {
        satisfied,
        satisfiable,
    })
}

/// One endpoint of a bidirectional message pipe.
///
/// Messages written here become readable on the peer endpoint, in order.
/// Closing (or dropping) an endpoint makes the peer's subsequent reads fail
/// with `FAILED_PRECONDITION` once its queue is drained.
pub struct MessagePipeHandle {
    id: HandleId,
    pipe: Option<Arc<Pipe>>,
    side: usize,
}

impl MessagePipeHandle {
    pub(crate) fn pair(config: PipeConfig) -> (Self, Self) {
        let pipe = Pipe::new(config);
        let first = Self {
            id: HandleId::next(),
            pipe: Some(Arc::clone(&pipe)),
            side: 0,
        };
        let second = Self {
            id: HandleId::next(),
            pipe: Some(pipe),
            side: 1,
        };
        (first, second)
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn is_valid(&self) -> bool {
        self.pipe.is_some()
    }

    fn pipe(&self) -> Result<&Arc<Pipe>> {
        self.pipe.as_ref().ok_or(SystemError::InvalidHandle)
    }

    pub(crate) fn watch_target(&self) -> Option<(Arc<Pipe>, usize)> {
        self.pipe.as_ref().map(|pipe| (Arc::clone(pipe), self.side))
    }

    /// Write one message to the peer. Never blocks.
    ///
    /// Ownership of `handles` moves into the message; if the write fails they
    /// are closed.
    pub fn write_message(&self, bytes: &[u8], handles: Vec<Handle>, _flags: WriteFlags) -> Result<()> {
        let pipe = self.pipe()?;
        let config = &pipe.config;
        if bytes.len() > config.max_message_bytes || handles.len() > config.max_message_handles {
            return Err(SystemError::MessageTooLarge {
                size: bytes.len(),
                handles: handles.len(),
                max_bytes: config.max_message_bytes,
                max_handles: config.max_message_handles,
            });
        }

        let peer = peer_of(self.side);
        let mut rejected = None;
        let observers = {
            let mut state = pipe.lock();
            if !state.endpoints[peer].open {
                rejected = Some(handles);
                Vec::new()
            } else {
                let endpoint = &mut state.endpoints[peer];
                endpoint.inbound.push_back(RawMessage {
                    bytes: Bytes::copy_from_slice(bytes),
                    handles,
                });
                endpoint.observers()
            }
        };

        if let Some(handles) = rejected {
            drop(handles);
            return Err(SystemError::PeerClosed);
        }

        trace!(handle = %self.id, size = bytes.len(), "message written");
        pipe.notify(observers);
        Ok(())
    }

    /// Dequeue the oldest message.
    ///
    /// Fails with `ShouldWait` if the queue is empty and the peer is open, or
    /// `PeerClosed` if it is empty and the peer is gone.
    pub fn read_message(&self, _flags: ReadFlags) -> Result<RawMessage> {
        let pipe = self.pipe()?;
        let mut state = pipe.lock();
        let peer_open = state.endpoints[peer_of(self.side)].open;
        match state.endpoints[self.side].inbound.pop_front() {
            Some(message) => Ok(message),
            None if peer_open => Err(SystemError::ShouldWait),
            None => Err(SystemError::PeerClosed),
        }
    }

    /// Copy the oldest message into `buf`, taking up to `max_handles` handles.
    ///
    /// If the message does not fit it stays queued and `BufferTooSmall`
    /// reports the sizes needed; with `MAY_DISCARD` it is dropped instead.
    pub fn read_message_into(
        &self,
        buf: &mut [u8],
        max_handles: usize,
        flags: ReadFlags,
    ) -> Result<ReadMessageResult> {
        let pipe = self.pipe()?;
        let (outcome, discarded) = {
            let mut state = pipe.lock();
            let peer_open = state.endpoints[peer_of(self.side)].open;
            let inbound = &mut state.endpoints[self.side].inbound;
            match inbound.front() {
                None if peer_open => (Err(SystemError::ShouldWait), None),
                None => (Err(SystemError::PeerClosed), None),
                Some(next) if next.bytes.len() > buf.len() || next.handles.len() > max_handles => {
                    let err = SystemError::BufferTooSmall {
                        message_size: next.bytes.len(),
                        handles_count: next.handles.len(),
                    };
                    let discarded = if flags.contains(ReadFlags::MAY_DISCARD) {
                        inbound.pop_front()
                    } else {
                        None
                    };
                    (Err(err), discarded)
                }
                Some(_) => (Ok(inbound.pop_front()), None),
            }
        };
        drop(discarded);

        let message = outcome?.ok_or(SystemError::ShouldWait)?;
        let size = message.bytes.len();
        buf[..size].copy_from_slice(&message.bytes);
        Ok(ReadMessageResult {
            message_size: size,
            handles_count: message.handles.len(),
            handles: message.handles,
        })
    }

    /// Current signals, or `InvalidHandle` if this endpoint is closed.
    pub fn signals_state(&self) -> Result<HandleSignalsState> {
        let pipe = self.pipe()?;
        pipe.signals_state(self.side).ok_or(SystemError::InvalidHandle)
    }

    /// Block until any of `signals` is satisfied.
    ///
    /// Fails with `Unsatisfiable` once none of them can ever hold, and with
    /// `DeadlineExceeded` when `deadline` elapses first. `None` waits forever.
    pub fn wait(&self, signals: HandleSignals, deadline: Option<Duration>) -> Result<HandleSignalsState> {
        let pipe = self.pipe()?;
        let expires = deadline.map(|d| Instant::now() + d);
        let mut state = pipe.lock();
        loop {
            let current = signals_of(&state, self.side).ok_or(SystemError::InvalidHandle)?;
            if current.satisfies_any(signals) {
                return Ok(current);
            }
            if current.never_satisfies(signals) {
                return Err(SystemError::Unsatisfiable);
            }

            state = match expires {
                None => pipe.changed.wait(state).unwrap_or_else(PoisonError::into_inner),
                Some(expires) => {
                    let now = Instant::now();
                    if now >= expires {
                        return Err(SystemError::DeadlineExceeded(deadline.unwrap_or_default()));
                    }
                    pipe.changed
                        .wait_timeout(state, expires - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };
        }
    }

    /// Close this endpoint. Idempotent.
    pub fn close(&mut self) {
        if let Some(pipe) = self.pipe.take() {
            debug!(handle = %self.id, "closing message pipe endpoint");
            pipe.close_side(self.side);
        }
    }
}

impl Drop for MessagePipeHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for MessagePipeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessagePipeHandle")
            .field("id", &self.id)
            .field("side", &self.side)
            .field("valid", &self.is_valid())
            .finish()
    }
}
