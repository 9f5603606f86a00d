use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tracing::{debug, error, info, trace, warn};

use crate::backlog::Backlog;
use crate::connection::{Connection, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::discovery::{Discovery, NetworkDevice};
use crate::error::WulpusError;
use crate::frame::{self, Command, FrameHeader, HEADER_SIZE, ProtocolVersion};
use crate::record::DataRecord;

/// Samples per data record unless configured otherwise.
pub const DEFAULT_ACQ_LENGTH: usize = 400;

/// Size of the acquisition configuration package the firmware expects.
pub const CONFIG_PACKAGE_SIZE: usize = 68;

/// Session parameters fixed at construction time.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Samples per data record; must match the acquisition length configured
    /// on the probe.
    pub acq_length: usize,
    /// Wire variant of the connected firmware revision.
    pub version: ProtocolVersion,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            acq_length: DEFAULT_ACQ_LENGTH,
            version: ProtocolVersion::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// A session with a WULPUS probe.
///
/// Owns at most one TCP connection at a time; every protocol operation is a
/// blocking call made from the thread driving the acquisition loop. The
/// socket must never be shared across threads: `send_command` performs a
/// write immediately followed by a correlated read, which is only safe while
/// no other thread interleaves its own reads.
pub struct WulpusDevice {
    config: DeviceConfig,
    conn: Option<Connection>,
    device: Option<NetworkDevice>,
    devices: Vec<NetworkDevice>,
    backlog: Backlog,
    receiving: bool,
}

impl Default for WulpusDevice {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}

impl WulpusDevice {
    pub fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            conn: None,
            device: None,
            devices: Vec::new(),
            backlog: Backlog::new(),
            receiving: false,
        }
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    /// Whether streaming has been enabled with [`WulpusDevice::toggle_rx`].
    pub fn is_receiving(&self) -> bool {
        self.receiving
    }

    /// The device the current connection was opened against.
    pub fn device(&self) -> Option<&NetworkDevice> {
        self.device.as_ref()
    }

    /// Probes found by the last scan.
    pub fn available_devices(&self) -> &[NetworkDevice] {
        &self.devices
    }

    /// Run a discovery scan and retain the results for [`WulpusDevice::open`].
    pub fn refresh_devices(
        &mut self,
        scanner: &mut dyn Discovery,
    ) -> Result<&[NetworkDevice], WulpusError> {
        info!("scanning for probes");
        self.devices = scanner.find()?;
        info!(found = self.devices.len(), "scan finished");
        for device in &self.devices {
            debug!(%device, "found probe");
        }
        Ok(&self.devices)
    }

    /// Open a connection to `device`, or to the first probe from the last
    /// scan when none is given.
    ///
    /// A no-op when the session is already open.
    pub fn open(&mut self, device: Option<NetworkDevice>) -> Result<(), WulpusError> {
        if self.conn.is_some() {
            warn!("device connection already open");
            return Ok(());
        }

        let target = match device.or_else(|| self.devices.first().cloned()) {
            Some(target) => target,
            None => {
                error!("no probe to open, none given and none scanned");
                return Err(WulpusError::NoDevice);
            }
        };

        info!(device = %target, "opening device connection");
        let conn = Connection::open(
            SocketAddr::new(target.ip, target.port),
            self.config.connect_timeout,
            self.config.read_timeout,
        )?;

        self.backlog.clear();
        self.receiving = false;
        self.conn = Some(conn);
        self.device = Some(target);
        info!("device connection open");
        Ok(())
    }

    /// Close the session.
    ///
    /// Drains pending bytes best-effort, fires a CLOSE command without
    /// waiting for the round-trip, and shuts the socket down. The session
    /// always ends up closed; delivery failures are logged, not fatal.
    pub fn close(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            warn!("device connection already closed");
            return;
        };
        self.device = None;
        self.receiving = false;

        info!("closing device connection");
        if let Err(err) = conn.drain() {
            warn!(error = %err, "could not drain connection before close");
        }
        self.backlog.clear();

        if self.config.version.supports(Command::Close) {
            let close_frame = frame::encode(Command::Close, &[]);
            if let Err(err) = conn.write_all(&close_frame) {
                warn!(error = %err, "close command not delivered");
            }
        }
        conn.close();
        info!("device connection closed");
    }

    fn conn_mut(&mut self) -> Result<&mut Connection, WulpusError> {
        self.conn.as_mut().ok_or(WulpusError::NotOpen)
    }

    fn send_frame(&mut self, command: Command, payload: &[u8]) -> Result<(), WulpusError> {
        if !self.config.version.supports(command) {
            return Err(WulpusError::UnsupportedCommand {
                command,
                version: self.config.version,
            });
        }
        debug!(%command, len = payload.len(), "sending frame");
        let frame = frame::encode(command, payload);
        self.conn_mut()?.write_all(&frame)
    }

    /// Send a command and await the correlated response.
    ///
    /// The firmware echoes the command code of every request; an echo that
    /// does not match is a protocol desynchronization and always surfaces.
    pub fn send_command(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> Result<(FrameHeader, Bytes), WulpusError> {
        self.send_frame(command, payload)?;
        let (header, data) = self.receive_command(true)?;
        if header.command != command {
            return Err(WulpusError::CommandMismatch {
                expected: command,
                actual: header.command,
            });
        }
        Ok((header, data))
    }

    /// Fire-and-forget send for commands whose effect arrives asynchronously
    /// on the data path. Never reads the socket.
    pub fn send_command_no_response(
        &mut self,
        command: Command,
        payload: &[u8],
    ) -> Result<(), WulpusError> {
        self.send_frame(command, payload)
    }

    /// Push a configuration package and verify the firmware echoes it back
    /// byte-identical as acknowledgment.
    pub fn send_config(&mut self, package: &[u8]) -> Result<(), WulpusError> {
        info!(len = package.len(), "sending configuration package");
        trace!(bytes = hex::encode(package), "configuration package");

        self.flush()?;
        let (_, echo) = self.send_command(Command::SetConfig, package)?;
        if echo != package {
            return Err(WulpusError::ConfigMismatch);
        }
        info!("configuration acknowledged");
        Ok(())
    }

    /// Receive one frame: exactly 9 header bytes, then the declared payload.
    ///
    /// In strict mode a payload shorter than declared is a
    /// [`WulpusError::ShortRead`]; lenient callers get whatever arrived and
    /// may top up themselves.
    pub fn receive_command(
        &mut self,
        strict_length: bool,
    ) -> Result<(FrameHeader, Bytes), WulpusError> {
        let conn = self.conn.as_mut().ok_or(WulpusError::NotOpen)?;

        let header_bytes = conn.read_exact(HEADER_SIZE)?;
        let header = frame::decode_header(&header_bytes)?;
        debug!(command = %header.command, length = header.length, "received header");

        let payload = conn.read_upto(header.length as usize)?;
        if strict_length && payload.len() != header.length as usize {
            return Err(WulpusError::ShortRead {
                expected: header.length as usize,
                actual: payload.len(),
            });
        }
        Ok((header, payload))
    }

    /// Receive one measurement frame.
    ///
    /// The hot path of an acquisition run. Returns `Ok(None)` when no record
    /// could be produced this call (timeout, stray non-data frame, payload
    /// that fails to decode); the caller skips the slot and tries again.
    /// Connection and framing faults still propagate as errors.
    pub fn receive_data(&mut self) -> Result<Option<DataRecord>, WulpusError> {
        // Over-read bytes from a previous call are consumed before the
        // socket is touched again.
        if self.backlog.has_pending() {
            debug!(pending = self.backlog.len(), "serving receive_data from backlog");
            return Ok(self
                .backlog
                .try_take_record(self.config.acq_length, self.config.version));
        }

        if !self.receiving {
            debug!("receive_data called while streaming is disabled");
        }

        let (header, mut payload) = match self.receive_command(false) {
            Ok(received) => received,
            Err(WulpusError::Timeout(timeout)) => {
                warn!(?timeout, "timed out waiting for a data frame");
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let declared = header.length as usize;
        if payload.len() < declared {
            debug!(
                declared,
                received = payload.len(),
                "topping up short data payload"
            );
            let rest = match self.conn_mut()?.read_exact(declared - payload.len()) {
                Ok(rest) => rest,
                Err(WulpusError::Timeout(timeout)) => {
                    warn!(?timeout, "timed out topping up a data payload");
                    return Ok(None);
                }
                Err(err) => return Err(err),
            };
            let mut merged = BytesMut::with_capacity(declared);
            merged.extend_from_slice(&payload);
            merged.extend_from_slice(&rest);
            payload = merged.freeze();
        }

        if header.command != Command::GetData {
            warn!(command = %header.command, "non-data frame on the data path, skipping");
            return Ok(None);
        }

        // The device occasionally starts the next frame before the declared
        // payload window is exhausted; everything from the magic token on
        // belongs to that next frame.
        if let Some(offset) = frame::find_magic(&payload) {
            debug!(offset, "magic token inside payload, deferring tail to backlog");
            let tail = payload.split_off(offset);
            self.backlog.push(&tail);
        }

        Ok(DataRecord::decode(
            &payload,
            self.config.acq_length,
            self.config.version,
        ))
    }

    /// Round-trip a PING.
    pub fn ping(&mut self) -> Result<(FrameHeader, Bytes), WulpusError> {
        info!("pinging device");
        let (header, data) = self.send_command(Command::Ping, &[])?;
        debug!(response = hex::encode(&data), "ping response");
        Ok((header, data))
    }

    /// Round-trip a RESET, restarting the acquisition firmware.
    pub fn reset(&mut self) -> Result<(), WulpusError> {
        info!("resetting device");
        self.send_command(Command::Reset, &[])?;
        Ok(())
    }

    /// Enable or disable streaming.
    ///
    /// Streaming replies arrive asynchronously on the data path, so the
    /// command is not correlated with a response here.
    pub fn set_rx(&mut self, enable: bool) -> Result<(), WulpusError> {
        self.flush()?;
        let command = if enable {
            Command::StartRx
        } else {
            Command::StopRx
        };
        self.send_command_no_response(command, &[])?;
        self.receiving = enable;
        Ok(())
    }

    /// [`WulpusDevice::set_rx`] with failures folded into the return value;
    /// returns whether the send succeeded.
    pub fn toggle_rx(&mut self, enable: bool) -> bool {
        info!(enable, "toggling receive streaming");
        match self.set_rx(enable) {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, enable, "failed to toggle receive streaming");
                false
            }
        }
    }

    /// Drop whatever the device has already pushed into the socket and clear
    /// the backlog. Used before mode changes so stale frames cannot be
    /// mistaken for a response.
    pub fn flush(&mut self) -> Result<(), WulpusError> {
        let conn = self.conn.as_mut().ok_or(WulpusError::NotOpen)?;
        let discarded = conn.drain()?;
        if discarded > 0 {
            debug!(bytes = discarded, "drained stale bytes");
        }
        self.backlog.clear();
        Ok(())
    }
}
