use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::message_pipe::MessagePipeHandle;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a handle, for logging and diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u64);

impl HandleId {
    pub(crate) fn next() -> Self {
        Self(NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}

/// An owned capability that can be transferred inside a message.
///
/// Dropping a `Handle` closes the object it refers to.
#[derive(Debug)]
pub enum Handle {
    MessagePipe(MessagePipeHandle),
}

impl Handle {
    pub fn id(&self) -> HandleId {
        match self {
            Handle::MessagePipe(pipe) => pipe.id(),
        }
    }

    pub fn is_valid(&self) -> bool {
        match self {
            Handle::MessagePipe(pipe) => pipe.is_valid(),
        }
    }

    /// Close the underlying object now rather than on drop.
    pub fn close(&mut self) {
        match self {
            Handle::MessagePipe(pipe) => pipe.close(),
        }
    }

    /// Recover the message-pipe endpoint this handle wraps.
    pub fn into_message_pipe(self) -> Option<MessagePipeHandle> {
        match self {
            Handle::MessagePipe(pipe) => Some(pipe),
        }
    }
}

impl From<MessagePipeHandle> for Handle {
    fn from(pipe: MessagePipeHandle) -> Self {
        Handle::MessagePipe(pipe)
    }
}
