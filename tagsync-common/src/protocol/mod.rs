//! Wire protocol shared by the server and the client
//!
//! Every frame is `0xFF, <command>, <payload>` with big-endian integers. The
//! same command byte is used for a request and its response; the payload
//! layout depends on the direction.
//!
//! | cmd | request payload | response payload |
//! |---|---|---|
//! | 0x01 | `u32 row` | `u8 status, u32 row, u32 len, bytes[len]` (bytes are the image, or a UTF-8 error when status != 0) |
//! | 0x02 | none | `u8 status, u32 tag_cnt, {u32 len, utf8[len]} * tag_cnt` |
//! | 0x03 | `u32 begin, u32 end, u32 tag_cnt, u8[tag_cnt]` | `u8 status` |
//! | 0x04 | none | `u8 status` |
//! | 0x05 | none | `u8 status` then, when ok, `u32 clip_cnt, {u32 begin, u32 end, u32 view_count} * clip_cnt` |
//! | 0x06 | none | `u8 status, u32 len, utf8[len]` |
//!
//! Decoding scans for the sentinel one byte at a time and silently drops
//! anything else, so a peer that sent garbage resynchronizes on the next frame.

mod frame;
mod message;

pub use frame::{FrameReader, FrameWriter};
pub use message::{Request, Response};

use std::time::Duration;
use thiserror::Error;

/// Marker byte that starts every frame
pub const SENTINEL: u8 = 0xFF;

/// Image payloads are written in chunks of this size
pub const CHUNK_SIZE: usize = 4096;

/// Upper bound for any length-prefixed payload
pub const MAX_PAYLOAD_BYTES: u32 = 256 * 1024 * 1024;

/// Upper bound for the tag count carried by a mutation or alias list
pub const MAX_TAG_COUNT: u32 = 4096;

/// Default stall bound for fixed-size reads
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Command byte following the sentinel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    Image = 0x01,
    TagList = 0x02,
    SetTags = 0x03,
    Save = 0x04,
    ClipLayout = 0x05,
    RowTable = 0x06,
}

impl Command {
    pub fn as_byte(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0x01 => Ok(Command::Image),
            0x02 => Ok(Command::TagList),
            0x03 => Ok(Command::SetTags),
            0x04 => Ok(Command::Save),
            0x05 => Ok(Command::ClipLayout),
            0x06 => Ok(Command::RowTable),
            other => Err(other),
        }
    }
}

/// Status byte leading every response payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Failed,
}

impl Status {
    pub fn as_byte(self) -> u8 {
        match self {
            Status::Ok => 0x00,
            Status::Failed => 0x01,
        }
    }

    /// Any non-zero byte is a failure
    pub fn from_byte(byte: u8) -> Self {
        if byte == 0 {
            Status::Ok
        } else {
            Status::Failed
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<bool> for Status {
    fn from(ok: bool) -> Self {
        if ok {
            Status::Ok
        } else {
            Status::Failed
        }
    }
}

/// Result type for protocol operations
pub type ProtocolResult<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while reading or writing frames
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Transport failure (reset, broken pipe, ...)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream in the middle of a frame
    #[error("Connection closed mid-frame")]
    Closed,

    /// A fixed-size read made no progress within the read timeout
    #[error("Timed out after receiving {received} of {expected} bytes")]
    Timeout { expected: usize, received: usize },

    /// Declared length exceeds the protocol limit
    #[error("{field} length {len} exceeds limit {limit}")]
    PayloadTooLarge {
        field: &'static str,
        len: u32,
        limit: u32,
    },

    /// String payload is not valid UTF-8
    #[error("Invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
}

impl ProtocolError {
    /// Whether the session can drop the current frame and resume scanning
    ///
    /// Transport failures end the session; everything else only spoils the
    /// frame being decoded.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProtocolError::Io(_) | ProtocolError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        for byte in 0x01..=0x06u8 {
            let cmd = Command::try_from(byte).unwrap();
            assert_eq!(cmd.as_byte(), byte);
        }
        assert_eq!(Command::try_from(0x07), Err(0x07));
        assert_eq!(Command::try_from(SENTINEL), Err(SENTINEL));
    }

    #[test]
    fn test_status_nonzero_is_failure() {
        assert_eq!(Status::from_byte(0), Status::Ok);
        assert_eq!(Status::from_byte(1), Status::Failed);
        assert_eq!(Status::from_byte(7), Status::Failed);
        assert_eq!(Status::from(false).as_byte(), 0x01);
    }

    #[test]
    fn test_timeout_is_recoverable() {
        assert!(ProtocolError::Timeout {
            expected: 4,
            received: 1
        }
        .is_recoverable());
        assert!(!ProtocolError::Closed.is_recoverable());
    }
}
