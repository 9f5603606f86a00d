//! Acquisition-loop runner.
//!
//! One worker thread owns the device and all socket I/O for the duration of
//! a run; the consumer (rendering, storage) only ever touches the
//! latest-record cell and the stop flag.

use std::ptr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicPtr, Ordering};
use std::thread::{self, JoinHandle};

use tracing::{error, info, warn};

use crate::device::WulpusDevice;
use crate::error::WulpusError;
use crate::record::DataRecord;

/// Lock-free single-slot handoff holding the most recently published value.
///
/// Last write wins; there is no queue and no backpressure. One producer and
/// one consumer may race freely from different threads.
pub struct LatestCell<T> {
    slot: AtomicPtr<T>,
}

impl<T> LatestCell<T> {
    pub fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Publish a value, replacing and dropping any unconsumed predecessor.
    pub fn publish(&self, value: T) {
        let fresh = Box::into_raw(Box::new(value));
        let stale = self.slot.swap(fresh, Ordering::AcqRel);
        if !stale.is_null() {
            // The swap transferred sole ownership of the stale pointer.
            drop(unsafe { Box::from_raw(stale) });
        }
    }

    /// Take the latest value, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        let current = self.slot.swap(ptr::null_mut(), Ordering::AcqRel);
        if current.is_null() {
            None
        } else {
            Some(*unsafe { Box::from_raw(current) })
        }
    }
}

impl<T> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LatestCell<T> {
    fn drop(&mut self) {
        let current = *self.slot.get_mut();
        if !current.is_null() {
            drop(unsafe { Box::from_raw(current) });
        }
    }
}

unsafe impl<T: Send> Send for LatestCell<T> {}
unsafe impl<T: Send> Sync for LatestCell<T> {}

/// Tuning knobs for an acquisition run.
#[derive(Debug, Clone)]
pub struct AcquisitionOptions {
    /// Consecutive empty receives tolerated before the run is aborted and
    /// the device reported disconnected. Each empty receive is bounded by
    /// the session read timeout.
    pub max_consecutive_misses: u32,
}

impl Default for AcquisitionOptions {
    fn default() -> Self {
        Self {
            max_consecutive_misses: 3,
        }
    }
}

/// Handle to a running acquisition.
pub struct Acquisition {
    latest: Arc<LatestCell<DataRecord>>,
    stop: Arc<AtomicBool>,
    worker: JoinHandle<(WulpusDevice, Result<(), WulpusError>)>,
}

impl Acquisition {
    /// Start streaming on an open device and spawn the acquisition worker.
    ///
    /// The device moves into the worker thread; it comes back out of
    /// [`Acquisition::stop`].
    pub fn spawn(mut device: WulpusDevice, options: AcquisitionOptions) -> Self {
        let latest = Arc::new(LatestCell::new());
        let stop = Arc::new(AtomicBool::new(false));
        let worker = thread::spawn({
            let latest = Arc::clone(&latest);
            let stop = Arc::clone(&stop);
            move || {
                let outcome = run_loop(&mut device, &latest, &stop, &options);
                if let Err(err) = &outcome {
                    error!(error = %err, "acquisition aborted");
                }
                (device, outcome)
            }
        });
        Self {
            latest,
            stop,
            worker,
        }
    }

    /// The most recently decoded record, if a new one arrived since the last
    /// take.
    pub fn latest(&self) -> Option<DataRecord> {
        self.latest.take()
    }

    /// Whether the worker has wound down (stopped or aborted).
    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Request a cooperative stop and wait for the worker to wind down.
    ///
    /// The flag is checked between records, never mid-read, so this may
    /// block up to one read timeout while an in-flight receive completes.
    pub fn stop(self) -> (WulpusDevice, Result<(), WulpusError>) {
        self.stop.store(true, Ordering::Release);
        match self.worker.join() {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }
}

fn run_loop(
    device: &mut WulpusDevice,
    latest: &LatestCell<DataRecord>,
    stop: &AtomicBool,
    options: &AcquisitionOptions,
) -> Result<(), WulpusError> {
    device.set_rx(true)?;
    info!("acquisition loop started");

    let mut misses = 0u32;
    let mut produced = 0u64;
    let result = loop {
        if stop.load(Ordering::Acquire) {
            break Ok(());
        }
        match device.receive_data() {
            Ok(Some(record)) => {
                misses = 0;
                produced += 1;
                latest.publish(record);
            }
            Ok(None) => {
                misses += 1;
                if misses >= options.max_consecutive_misses {
                    warn!(misses, "no records from the device, reporting disconnected");
                    break Err(WulpusError::Disconnected);
                }
            }
            Err(err) => break Err(err),
        }
    };

    info!(records = produced, "acquisition loop finished");
    if !device.toggle_rx(false) {
        warn!("could not stop receive streaming cleanly");
    }
    result
}
