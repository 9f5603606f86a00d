use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::WulpusError;

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default timeout for steady-state reads.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout used while draining stale bytes before a mode change.
const DRAIN_READ_TIMEOUT: Duration = Duration::from_millis(100);

const DRAIN_CHUNK_SIZE: usize = 1024;

fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

fn map_io(err: io::Error) -> WulpusError {
    match err.kind() {
        io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::BrokenPipe
        | io::ErrorKind::UnexpectedEof => WulpusError::Disconnected,
        _ => WulpusError::Io(err),
    }
}

/// Blocking TCP transport to the probe.
///
/// Every read is bounded by the configured timeout, so a silent device
/// surfaces as [`WulpusError::Timeout`] instead of wedging the caller.
pub struct Connection {
    stream: TcpStream,
    read_timeout: Duration,
}

impl Connection {
    /// Connect to `addr`.
    ///
    /// A refused or unreachable device comes back as an error value for the
    /// caller to act on (retry discovery, report), never as a panic.
    pub fn open(
        addr: SocketAddr,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, WulpusError> {
        debug!(%addr, ?connect_timeout, "connecting");
        let stream = TcpStream::connect_timeout(&addr, connect_timeout).map_err(map_io)?;
        stream.set_read_timeout(Some(read_timeout))?;
        stream.set_nodelay(true)?;
        Ok(Self {
            stream,
            read_timeout,
        })
    }

    /// Write the full buffer to the socket.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), WulpusError> {
        trace!(bytes = hex::encode(bytes), "tcp write");
        self.stream.write_all(bytes).map_err(map_io)
    }

    /// One underlying read of at most `n` bytes.
    ///
    /// Used when the exact frame boundary is not yet known; returns whatever
    /// arrived in a single read.
    pub fn read_upto(&mut self, n: usize) -> Result<Bytes, WulpusError> {
        if n == 0 {
            return Ok(Bytes::new());
        }
        let mut buf = vec![0u8; n];
        loop {
            match self.stream.read(&mut buf) {
                Ok(0) => return Err(WulpusError::Disconnected),
                Ok(read) => {
                    buf.truncate(read);
                    trace!(bytes = hex::encode(&buf), "tcp read");
                    return Ok(Bytes::from(buf));
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => {
                    return Err(WulpusError::Timeout(self.read_timeout));
                }
                Err(err) => return Err(map_io(err)),
            }
        }
    }

    /// Read exactly `n` bytes, looping over partial reads until the timeout
    /// budget is spent.
    pub fn read_exact(&mut self, n: usize) -> Result<Bytes, WulpusError> {
        if n == 0 {
            return Ok(Bytes::new());
        }
        let deadline = Instant::now() + self.read_timeout;
        let mut buf = vec![0u8; n];
        let mut filled = 0usize;
        while filled < n {
            if Instant::now() >= deadline {
                return Err(WulpusError::Timeout(self.read_timeout));
            }
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => return Err(WulpusError::Disconnected),
                Ok(read) => filled += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => {
                    return Err(WulpusError::Timeout(self.read_timeout));
                }
                Err(err) => return Err(map_io(err)),
            }
        }
        trace!(bytes = hex::encode(&buf), "tcp read");
        Ok(Bytes::from(buf))
    }

    /// Discard whatever the device has already pushed into the socket.
    ///
    /// Returns the number of bytes dropped.
    pub fn drain(&mut self) -> Result<usize, WulpusError> {
        self.stream.set_read_timeout(Some(DRAIN_READ_TIMEOUT))?;
        let mut discarded = 0usize;
        let mut chunk = [0u8; DRAIN_CHUNK_SIZE];
        let result = loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break Err(WulpusError::Disconnected),
                Ok(read) => discarded += read,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) if is_timeout(&err) => break Ok(discarded),
                Err(err) => break Err(map_io(err)),
            }
        };
        self.stream.set_read_timeout(Some(self.read_timeout))?;
        result
    }

    /// Shut the socket down. Closing an already-closed connection is a no-op.
    pub fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
    }
}
