//! Length-prefixed framing for carrying pipe messages over byte streams.
//!
//! Every frame is:
//! - a 2-byte magic number ("MP") for stream synchronization
//! - a 4-byte little-endian payload length
//! - a 2-byte little-endian frame kind
//!
//! Readers always hand back complete frames.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod writer;

pub use codec::{
    decode_frame, encode_frame, Frame, FrameConfig, DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAGIC,
};
pub use error::{FrameError, Result};
pub use kind::FrameKind;
pub use reader::FrameReader;
pub use writer::FrameWriter;
