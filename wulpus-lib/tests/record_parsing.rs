//! Tests for data-record decoding

mod common;

use common::*;
use wulpus_lib::frame::ProtocolVersion;
use wulpus_lib::record::DataRecord;

#[test]
fn decode_v2_record() {
    let samples: Vec<i16> = (0..400).map(|i| i as i16 - 200).collect();
    let payload = data_payload(2, 7, &samples);

    let record =
        DataRecord::decode(&payload, 400, ProtocolVersion::V2).expect("payload must decode");
    assert_eq!(record.tx_rx_id, 2);
    assert_eq!(record.acq_number, 7);
    assert_eq!(record.samples, samples);
}

#[test]
fn decode_v1_record_has_no_reserved_byte() {
    let samples: Vec<i16> = vec![-1, 0, 1, i16::MAX, i16::MIN];
    // V1 payload: tx_rx_id, acq_number, samples.
    let mut payload = Vec::new();
    payload.push(9u8);
    payload.extend_from_slice(&513u16.to_le_bytes());
    for sample in &samples {
        payload.extend_from_slice(&sample.to_le_bytes());
    }

    let record =
        DataRecord::decode(&payload, 5, ProtocolVersion::V1).expect("payload must decode");
    assert_eq!(record.tx_rx_id, 9);
    assert_eq!(record.acq_number, 513);
    assert_eq!(record.samples, samples);

    // The same bytes under V2 lose one byte to the reserved slot; the
    // shifted sample run no longer decodes.
    assert_eq!(DataRecord::decode(&payload, 5, ProtocolVersion::V2), None);
}

#[test]
fn sample_count_mismatch_is_dropped() {
    let samples: Vec<i16> = vec![1; 399];
    let payload = data_payload(1, 1, &samples);
    assert_eq!(DataRecord::decode(&payload, 400, ProtocolVersion::V2), None);

    let samples: Vec<i16> = vec![1; 401];
    let payload = data_payload(1, 1, &samples);
    assert_eq!(DataRecord::decode(&payload, 400, ProtocolVersion::V2), None);
}

#[test]
fn odd_sample_run_is_dropped() {
    let mut payload = data_payload(1, 1, &[0i16; 400]);
    payload.push(0x42);
    assert_eq!(DataRecord::decode(&payload, 400, ProtocolVersion::V2), None);
}

#[test]
fn truncated_prefix_is_dropped() {
    for len in 0..4 {
        let payload = vec![0u8; len];
        assert_eq!(DataRecord::decode(&payload, 400, ProtocolVersion::V2), None);
    }
}

#[test]
fn record_serializes_for_storage_consumers() {
    let payload = data_payload(1, 12, &[-5i16, 5]);
    let record =
        DataRecord::decode(&payload, 2, ProtocolVersion::V2).expect("payload must decode");

    let json = serde_json::to_string(&record).expect("record must serialize");
    let back: DataRecord = serde_json::from_str(&json).expect("record must deserialize");
    assert_eq!(back, record);
}

#[test]
fn empty_sample_run_decodes_when_configured() {
    // A zero-length acquisition is degenerate but consistent.
    let payload = data_payload(0, 0, &[]);
    let record =
        DataRecord::decode(&payload, 0, ProtocolVersion::V2).expect("empty run must decode");
    assert!(record.samples.is_empty());
}
