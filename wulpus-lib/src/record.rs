use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::warn;
use zerocopy::byteorder::little_endian::{I16, U16};
use zerocopy::{FromBytes, Immutable, KnownLayout, Unaligned};

use crate::frame::ProtocolVersion;

/// Fixed prefix of a data-frame payload, after the revision-dependent
/// reserved byte has been stripped.
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, Unaligned)]
#[repr(C)]
pub struct RecordPrefix {
    /// Active TX/RX channel configuration the frame was acquired with.
    pub tx_rx_id: u8,
    /// Acquisition sequence number, wraps at 65535.
    pub acq_number: U16,
}

/// One decoded measurement frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataRecord {
    pub samples: Vec<i16>,
    pub acq_number: u16,
    pub tx_rx_id: u8,
}

impl DataRecord {
    /// Decode a data-frame payload.
    ///
    /// Returns `None` when the payload is malformed or the sample run does
    /// not match `acq_length`: the frame is dropped and the stream continues.
    pub fn decode(
        payload: &[u8],
        acq_length: usize,
        version: ProtocolVersion,
    ) -> Option<DataRecord> {
        if payload.len() < version.data_prefix_len() {
            warn!(
                len = payload.len(),
                "data payload shorter than the record prefix, dropping"
            );
            return None;
        }

        let body = if version.has_reserved_byte() {
            &payload[1..]
        } else {
            payload
        };
        let (prefix, sample_bytes) = RecordPrefix::ref_from_prefix(body).ok()?;

        // Fails on an odd trailing byte count.
        let samples = <[I16]>::ref_from_bytes(sample_bytes).ok()?;
        if samples.len() != acq_length {
            warn!(
                expected = acq_length,
                got = samples.len(),
                "unexpected sample count, dropping record"
            );
            return None;
        }

        Some(DataRecord {
            samples: samples.iter().map(|sample| sample.get()).collect(),
            acq_number: prefix.acq_number.get(),
            tx_rx_id: prefix.tx_rx_id,
        })
    }
}

impl fmt::Display for DataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "acq #{} (TX/RX config {}, {} samples)",
            self.acq_number,
            self.tx_rx_id,
            self.samples.len()
        )
    }
}
