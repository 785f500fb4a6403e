//! Message pipes with connector bindings, bridgeable across processes.
//!
//! # Crate Structure
//!
//! - [`system`]: message pipes, handles, signals and the run loop
//! - [`bindings`]: `Connector`, `Router` and the receiver traits
//! - [`frame`]: wire framing for pipe messages (behind `bridge` feature)
//! - [`transport`]: Unix domain socket streams (behind `bridge` feature)
//! - [`bridge`]: pipes that span processes (behind `bridge` feature)

/// Re-export message-pipe types.
pub mod system {
    pub use msgpipe_system::*;
}

/// Re-export binding types.
pub mod bindings {
    pub use msgpipe_bindings::*;
}

/// Re-export frame types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod frame {
    pub use msgpipe_frame::*;
}

/// Re-export transport types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod transport {
    pub use msgpipe_transport::*;
}

/// Re-export bridge types (requires `bridge` feature).
#[cfg(feature = "bridge")]
pub mod bridge {
    pub use msgpipe_bridge::*;
}
