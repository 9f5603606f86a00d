use bytes::{BufMut, Bytes, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use strum_macros::Display;

use crate::error::WulpusError;

/// Magic token opening every frame header.
pub const MAGIC: &[u8; 6] = b"wulpus";

/// Size of the fixed frame header: magic (6) + command (1) + length (2).
pub const HEADER_SIZE: usize = 9;

/// Largest payload expressible by the 16-bit length field.
pub const MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Command codes understood by the probe firmware.
///
/// The numeric values are part of the wire contract with the firmware and
/// must not be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum Command {
    SetConfig = 0x57,
    GetData = 0x58,
    Ping = 0x59,
    Pong = 0x5A,
    Reset = 0x5B,
    Close = 0x5C,
    StartRx = 0x5D,
    StopRx = 0x5E,
}

/// Wire variant spoken by the connected firmware revision.
///
/// V1 firmware predates the streaming control commands and does not prefix
/// data payloads with the reserved byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum ProtocolVersion {
    #[strum(to_string = "v1")]
    V1,
    #[default]
    #[strum(to_string = "v2")]
    V2,
}

impl ProtocolVersion {
    /// Number of payload bytes preceding the sample run in a data frame.
    pub fn data_prefix_len(self) -> usize {
        match self {
            ProtocolVersion::V1 => 3,
            ProtocolVersion::V2 => 4,
        }
    }

    /// Whether data payloads carry the leading reserved byte.
    pub fn has_reserved_byte(self) -> bool {
        matches!(self, ProtocolVersion::V2)
    }

    /// Whether this firmware revision accepts `command`.
    pub fn supports(self, command: Command) -> bool {
        match self {
            ProtocolVersion::V2 => true,
            ProtocolVersion::V1 => matches!(
                command,
                Command::SetConfig | Command::GetData | Command::Ping | Command::Reset
            ),
        }
    }
}

/// Decoded 9-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: Command,
    /// Exact number of payload bytes following the header on the wire.
    pub length: u16,
}

impl FrameHeader {
    /// Total on-wire size of the frame this header opens.
    pub fn frame_len(&self) -> usize {
        HEADER_SIZE + self.length as usize
    }
}

/// Encode a command frame: magic, command byte, payload length (LE), payload.
///
/// Payloads longer than [`MAX_PAYLOAD_SIZE`] are a caller error.
pub fn encode(command: Command, payload: &[u8]) -> Bytes {
    debug_assert!(payload.len() <= MAX_PAYLOAD_SIZE);

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    frame.put_slice(MAGIC);
    frame.put_u8(command.into());
    frame.put_u16_le(payload.len() as u16);
    frame.put_slice(payload);
    frame.freeze()
}

/// Decode a frame header from exactly [`HEADER_SIZE`] bytes.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, WulpusError> {
    if bytes.len() != HEADER_SIZE {
        return Err(WulpusError::Framing(format!(
            "expected {HEADER_SIZE} header bytes, got {}",
            bytes.len()
        )));
    }
    if &bytes[..MAGIC.len()] != MAGIC {
        return Err(WulpusError::Framing("bad magic token".to_string()));
    }

    let command =
        Command::try_from(bytes[6]).map_err(|_| WulpusError::UnknownCommand(bytes[6]))?;
    let length = u16::from_le_bytes([bytes[7], bytes[8]]);

    Ok(FrameHeader { command, length })
}

/// Offset of the first occurrence of the magic token inside `haystack`.
pub fn find_magic(haystack: &[u8]) -> Option<usize> {
    if haystack.len() < MAGIC.len() {
        return None;
    }
    haystack.windows(MAGIC.len()).position(|window| window == MAGIC)
}
