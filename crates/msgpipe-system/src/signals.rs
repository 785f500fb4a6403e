use bitflags::bitflags;

bitflags! {
    /// Conditions a handle can be observed in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct HandleSignals: u32 {
        /// At least one message is queued for reading.
        const READABLE = 1 << 0;
        /// The peer is open, so writes can succeed.
        const WRITABLE = 1 << 1;
        /// The peer endpoint has been closed.
        const PEER_CLOSED = 1 << 2;
    }
}

bitflags! {
    /// Flags for `MessagePipeHandle::read_message_into`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ReadFlags: u32 {
        /// Drop a message that does not fit instead of leaving it queued.
        const MAY_DISCARD = 1 << 0;
    }
}

bitflags! {
    /// Flags for `MessagePipeHandle::write_message`. None are defined yet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct WriteFlags: u32 {}
}

bitflags! {
    /// Flags for `Core::create_message_pipe`. None are defined yet.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CreateFlags: u32 {}
}

/// Snapshot of a handle's signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleSignalsState {
    /// Signals that hold right now.
    pub satisfied: HandleSignals,
    /// Signals that may still hold at some point in the future.
    pub satisfiable: HandleSignals,
}

impl HandleSignalsState {
    /// True if any of `signals` is currently satisfied.
    pub fn satisfies_any(&self, signals: HandleSignals) -> bool {
        self.satisfied.intersects(signals)
    }

    /// True if none of `signals` can ever be satisfied again.
    pub fn never_satisfies(&self, signals: HandleSignals) -> bool {
        !self.satisfiable.intersects(signals)
    }
}
