//! Message pipes that span processes.
//!
//! A bridged connection pairs a Unix domain socket stream with a local
//! message pipe. The caller gets one endpoint; two pump threads move
//! messages between the other endpoint and the stream as MESSAGE frames.
//! Closing either side tears the whole connection down: the remote end
//! sees its endpoint's peer close, just as with an in-process pipe.
//!
//! Handles cannot cross the stream. A message carrying handles closes the
//! connection.

pub mod config;
#[cfg(unix)]
pub mod connect;
pub mod error;
#[cfg(unix)]
pub mod listener;
#[cfg(unix)]
pub mod pump;

pub use config::BridgeConfig;
#[cfg(unix)]
pub use connect::{connect, connect_with_config};
pub use error::{BridgeError, Result};
#[cfg(unix)]
pub use listener::BridgeListener;
#[cfg(unix)]
pub use pump::{bridge_stream, Bridge, Pumps};
