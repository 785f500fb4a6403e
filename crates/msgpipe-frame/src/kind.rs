use crate::error::{FrameError, Result};

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum FrameKind {
    /// One pipe message; the payload is the message body.
    Message = 0,
    /// The sender closed its pipe endpoint. No payload.
    Close = 1,
}

impl FrameKind {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn from_u16(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(Self::Message),
            1 => Ok(Self::Close),
            other => Err(FrameError::UnknownKind(other)),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::Close => "CLOSE",
        }
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_kinds_map_both_ways() {
        for kind in [FrameKind::Message, FrameKind::Close] {
            assert_eq!(FrameKind::from_u16(kind.as_u16()).unwrap(), kind);
        }
        assert_eq!(FrameKind::Close.to_string(), "CLOSE");
    }

    #[test]
    fn unknown_kind_rejected() {
        assert!(matches!(
            FrameKind::from_u16(7),
            Err(FrameError::UnknownKind(7))
        ));
    }
}
