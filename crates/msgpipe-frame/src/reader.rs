use std::io::{ErrorKind, Read};

use bytes::BytesMut;
#[cfg(unix)]
use msgpipe_transport::IpcStream;
use tracing::trace;

use crate::codec::{decode_frame, Frame, FrameConfig};
use crate::error::{FrameError, Result};

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Reads complete frames from a blocking stream.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK_SIZE),
            config,
        }
    }

    /// Block until one whole frame has arrived.
    ///
    /// EOF on a frame boundary or mid-frame both yield
    /// `FrameError::ConnectionClosed`; use [`read_frame_or_eof`] to tell
    /// them apart.
    ///
    /// [`read_frame_or_eof`]: FrameReader::read_frame_or_eof
    pub fn read_frame(&mut self) -> Result<Frame> {
        self.read_frame_or_eof()?
            .ok_or(FrameError::ConnectionClosed)
    }

    /// Like `read_frame`, but a clean EOF between frames is `Ok(None)`.
    pub fn read_frame_or_eof(&mut self) -> Result<Option<Frame>> {
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            if let Some(frame) = decode_frame(&mut self.buf, self.config.max_payload_size)? {
                trace!(kind = %frame.kind, size = frame.payload.len(), "frame read");
                return Ok(Some(frame));
            }

            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };
            if read == 0 {
                return if self.buf.is_empty() {
                    Ok(None)
                } else {
                    Err(FrameError::ConnectionClosed)
                };
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(unix)]
impl FrameReader<IpcStream> {
    /// Apply the configured read timeout to `inner` first.
    pub fn with_config_ipc(inner: IpcStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BufMut;

    use super::*;
    use crate::codec::{encode_frame, MAGIC};
    use crate::kind::FrameKind;
    use crate::writer::FrameWriter;

    fn wire(frames: &[(FrameKind, &[u8])]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        for (kind, payload) in frames {
            encode_frame(*kind, payload, &mut buf).unwrap();
        }
        buf.to_vec()
    }

    /// Hands out one byte per read, with an `Interrupted` before the first.
    struct Trickle {
        bytes: Vec<u8>,
        pos: usize,
        interrupted: bool,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if !self.interrupted {
                self.interrupted = true;
                return Err(ErrorKind::Interrupted.into());
            }
            if self.pos >= self.bytes.len() || buf.is_empty() {
                return Ok(0);
            }
            buf[0] = self.bytes[self.pos];
            self.pos += 1;
            Ok(1)
        }
    }

    #[test]
    fn reads_frames_in_order() {
        let bytes = wire(&[(FrameKind::Message, &b"one"[..]), (FrameKind::Close, &[][..])]);
        let mut reader = FrameReader::new(Cursor::new(bytes));

        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"one");
        assert_eq!(reader.read_frame().unwrap().kind, FrameKind::Close);
        assert!(reader.read_frame_or_eof().unwrap().is_none());
    }

    #[test]
    fn reassembles_byte_at_a_time() {
        let bytes = wire(&[(FrameKind::Message, &b"slow"[..])]);
        let mut reader = FrameReader::new(Trickle {
            bytes,
            pos: 0,
            interrupted: false,
        });
        assert_eq!(reader.read_frame().unwrap().payload.as_ref(), b"slow");
    }

    #[test]
    fn large_payload_spans_chunks() {
        let payload = vec![0xAB; 3 * READ_CHUNK_SIZE + 17];
        let mut reader = FrameReader::new(Cursor::new(wire(&[(FrameKind::Message, payload.as_slice())])));
        assert_eq!(reader.read_frame().unwrap().payload.len(), payload.len());
    }

    #[test]
    fn clean_eof_versus_truncated_frame() {
        let mut empty = FrameReader::new(Cursor::new(Vec::<u8>::new()));
        assert!(empty.read_frame_or_eof().unwrap().is_none());
        assert!(matches!(
            empty.read_frame(),
            Err(FrameError::ConnectionClosed)
        ));

        let mut partial = BytesMut::new();
        partial.put_slice(&MAGIC);
        partial.put_u32_le(16);
        partial.put_u16_le(0);
        partial.put_slice(b"only-part");
        let mut reader = FrameReader::new(Cursor::new(partial.to_vec()));
        assert!(matches!(
            reader.read_frame_or_eof(),
            Err(FrameError::ConnectionClosed)
        ));
    }

    #[test]
    fn respects_configured_limit() {
        let bytes = wire(&[(FrameKind::Message, &[0u8; 64][..])]);
        let config = FrameConfig {
            max_payload_size: 16,
            ..FrameConfig::default()
        };
        let mut reader = FrameReader::with_config(Cursor::new(bytes), config);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::PayloadTooLarge { size: 64, max: 16 })
        ));
    }

    #[test]
    fn io_errors_propagate() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> std::io::Result<usize> {
                Err(ErrorKind::ConnectionReset.into())
            }
        }
        let mut reader = FrameReader::new(Broken);
        assert!(matches!(
            reader.read_frame(),
            Err(FrameError::Io(e)) if e.kind() == ErrorKind::ConnectionReset
        ));
    }

    #[cfg(unix)]
    #[test]
    fn across_ipc_stream_pair() {
        let (left, right) = IpcStream::pair().unwrap();
        let mut writer = FrameWriter::with_config_ipc(left, FrameConfig::default()).unwrap();
        let mut reader = FrameReader::with_config_ipc(right, FrameConfig::default()).unwrap();

        let sender = std::thread::spawn(move || {
            for i in 0..32u32 {
                writer.send_message(&i.to_le_bytes()).unwrap();
            }
            writer.send_close().unwrap();
        });

        for i in 0..32u32 {
            let frame = reader.read_frame().unwrap();
            assert_eq!(frame.kind, FrameKind::Message);
            assert_eq!(frame.payload.as_ref(), &i.to_le_bytes());
        }
        assert_eq!(reader.read_frame().unwrap().kind, FrameKind::Close);
        sender.join().unwrap();
    }
}
