pub mod acquisition;
pub mod backlog;
pub mod connection;
pub mod device;
pub mod discovery;
pub mod error;
pub mod frame;
pub mod record;

// Re-export the session type for easy access
pub use device::WulpusDevice;
