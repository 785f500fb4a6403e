//! Byte-stream transport for carrying message pipes across processes.
//!
//! A listener binds a filesystem Unix domain socket; both sides end up with
//! an [`IpcStream`], a blocking `Read + Write` stream that can be cloned so
//! one thread reads while another writes.

pub mod error;
#[cfg(unix)]
pub mod stream;
#[cfg(unix)]
pub mod uds;

pub use error::{Result, TransportError};
#[cfg(unix)]
pub use stream::{IpcStream, PeerCredentials};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
