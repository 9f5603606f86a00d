use bytes::BytesMut;
use tracing::{debug, warn};

use crate::frame::{self, HEADER_SIZE, ProtocolVersion};
use crate::record::DataRecord;

/// Bytes read off the socket beyond the frame currently being consumed.
///
/// When acquisitions outpace the reader, the device interleaves the next
/// frame's header into a payload window; the tail of such a read is parked
/// here and served before any new socket read.
#[derive(Debug, Default)]
pub struct Backlog {
    buf: BytesMut,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_pending(&self) -> bool {
        !self.buf.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Try to carve one complete data frame out of the buffered bytes.
    ///
    /// Anything that is not a complete frame behind a valid header is
    /// discarded wholesale: corrupt leftovers cannot be resynchronized
    /// byte-by-byte, and holding a partial fragment would stall the next
    /// receive. A truncated tail therefore costs one record.
    pub fn try_take_record(
        &mut self,
        acq_length: usize,
        version: ProtocolVersion,
    ) -> Option<DataRecord> {
        if self.buf.len() < HEADER_SIZE {
            warn!(len = self.buf.len(), "backlog shorter than a header, discarding");
            self.buf.clear();
            return None;
        }

        let header = match frame::decode_header(&self.buf[..HEADER_SIZE]) {
            Ok(header) => header,
            Err(err) => {
                warn!(error = %err, "backlog does not start with a valid header, discarding");
                self.buf.clear();
                return None;
            }
        };

        let frame_len = header.frame_len();
        if self.buf.len() < frame_len {
            warn!(
                have = self.buf.len(),
                need = frame_len,
                "backlog holds an incomplete frame, discarding"
            );
            self.buf.clear();
            return None;
        }

        debug!(
            command = %header.command,
            length = header.length,
            remainder = self.buf.len() - frame_len,
            "taking frame from backlog"
        );
        let frame_bytes = self.buf.split_to(frame_len);
        DataRecord::decode(&frame_bytes[HEADER_SIZE..], acq_length, version)
    }
}
