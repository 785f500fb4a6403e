//! Message pipes, transferable handles and a single-threaded run loop.
//!
//! This is the lowest layer of msgpipe. A [`Core`] creates linked pairs of
//! [`MessagePipeHandle`]s; each endpoint can write messages (bytes plus
//! transferred [`Handle`]s) that become readable on its peer. A [`RunLoop`]
//! watches handles for readability and dispatches callbacks on the thread
//! that pumps it.

pub mod core;
pub mod error;
pub mod handle;
pub mod message_pipe;
pub mod result;
pub mod run_loop;
pub mod signals;

pub use crate::core::Core;
pub use error::{Result, SystemError};
pub use handle::{Handle, HandleId};
pub use message_pipe::{
    CreateOptions, MessagePipeHandle, PipeConfig, RawMessage, ReadMessageResult,
    DEFAULT_MAX_MESSAGE_BYTES, DEFAULT_MAX_MESSAGE_HANDLES,
};
pub use result::ResultCode;
pub use run_loop::{QuitHandle, RunLoop, WatchId};
pub use signals::{CreateFlags, HandleSignals, HandleSignalsState, ReadFlags, WriteFlags};
