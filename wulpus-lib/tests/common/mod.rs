//! Shared fixtures for the protocol tests.

// Not every helper is used by every test file.
#![allow(dead_code)]

use std::net::{TcpListener, TcpStream};
use std::thread::JoinHandle;
use std::time::Duration;

use wulpus_lib::device::{DeviceConfig, WulpusDevice};
use wulpus_lib::discovery::NetworkDevice;

pub const MAGIC: &[u8; 6] = b"wulpus";

/// Install a subscriber so `RUST_LOG=debug cargo test` shows protocol flow.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub const SET_CONFIG: u8 = 0x57;
pub const GET_DATA: u8 = 0x58;
pub const PING: u8 = 0x59;
pub const PONG: u8 = 0x5A;

/// Build a raw wire frame: header plus payload.
pub fn raw_frame(command: u8, payload: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(9 + payload.len());
    frame.extend_from_slice(MAGIC);
    frame.push(command);
    frame.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    frame.extend_from_slice(payload);
    frame
}

/// Data-frame payload in the current wire variant: reserved byte, tx_rx_id,
/// acquisition number, then the samples.
pub fn data_payload(tx_rx_id: u8, acq_number: u16, samples: &[i16]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + samples.len() * 2);
    payload.push(0xAA); // reserved
    payload.push(tx_rx_id);
    payload.extend_from_slice(&acq_number.to_le_bytes());
    for sample in samples {
        payload.extend_from_slice(&sample.to_le_bytes());
    }
    payload
}

/// A complete data frame carrying one record.
pub fn data_frame(tx_rx_id: u8, acq_number: u16, samples: &[i16]) -> Vec<u8> {
    raw_frame(GET_DATA, &data_payload(tx_rx_id, acq_number, samples))
}

/// Session config with timeouts short enough for tests.
pub fn test_config(acq_length: usize) -> DeviceConfig {
    DeviceConfig {
        acq_length,
        connect_timeout: Duration::from_secs(1),
        read_timeout: Duration::from_millis(300),
        ..DeviceConfig::default()
    }
}

/// Spawn a one-shot fake probe running `script` against the accepted
/// connection, and return an opened session against it.
pub fn loopback<F>(config: DeviceConfig, script: F) -> (WulpusDevice, JoinHandle<()>)
where
    F: FnOnce(TcpStream) + Send + 'static,
{
    init_tracing();

    let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");
    let server = std::thread::spawn(move || {
        let (stream, _) = listener.accept().expect("accept client");
        script(stream);
    });

    let mut device = WulpusDevice::new(config);
    device
        .open(Some(NetworkDevice::new(
            "test-probe",
            "loopback.local.",
            addr.ip(),
            addr.port(),
        )))
        .expect("open session");
    (device, server)
}
