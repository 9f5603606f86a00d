use std::io;
use std::time::Duration;
use thiserror::Error;

use crate::frame::{Command, ProtocolVersion};

/// The primary error type for the `wulpus-lib` library.
#[derive(Error, Debug)]
pub enum WulpusError {
    #[error("no probe available, run discovery first")]
    NoDevice,

    #[error("device connection is not open")]
    NotOpen,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("connection closed by the device")]
    Disconnected,

    #[error("timed out after {0:?} waiting for the device")]
    Timeout(Duration),

    #[error("invalid frame: {0}")]
    Framing(String),

    #[error("unknown command byte 0x{0:02X}")]
    UnknownCommand(u8),

    #[error("command mismatch: expected {expected}, got {actual}")]
    CommandMismatch { expected: Command, actual: Command },

    #[error("command {command} is not available in protocol {version}")]
    UnsupportedCommand {
        command: Command,
        version: ProtocolVersion,
    },

    #[error("short read: expected {expected} payload bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("configuration echo does not match the package sent")]
    ConfigMismatch,
}
