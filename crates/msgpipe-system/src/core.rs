use std::sync::OnceLock;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::Result;
use crate::message_pipe::{CreateOptions, MessagePipeHandle};

static GLOBAL: OnceLock<Core> = OnceLock::new();

/// Factory for message pipes.
#[derive(Debug)]
pub struct Core {
    started: Instant,
}

impl Core {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// The process-wide core.
    pub fn global() -> &'static Core {
        GLOBAL.get_or_init(Core::new)
    }

    /// Create two linked endpoints. A message written to either one becomes
    /// readable on the other.
    pub fn create_message_pipe(
        &self,
        options: &CreateOptions,
    ) -> Result<(MessagePipeHandle, MessagePipeHandle)> {
        let (first, second) = MessagePipeHandle::pair(options.config.clone());
        debug!(first = %first.id(), second = %second.id(), "created message pipe");
        Ok((first, second))
    }

    /// Monotonic time elapsed since this core was created.
    pub fn time_ticks_now(&self) -> Duration {
        self.started.elapsed()
    }
}

impl Default for Core {
    fn default() -> Self {
        Self::new()
    }
}
