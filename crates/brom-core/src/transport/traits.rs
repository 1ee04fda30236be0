//! USB Transport layer abstraction.
//!
//! Defines the `UsbTransport` trait for the physical bulk link,
//! allowing different implementations (nusb, mock, etc.).

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Device not found: VID={vid:04X} PID={pid:04X}")]
    DeviceNotFound { vid: u16, pid: u16 },

    #[error("Failed to open device: {0}")]
    OpenFailed(String),

    #[error("Failed to claim interface {interface}: {message}")]
    ClaimInterfaceFailed { interface: u8, message: String },

    #[error("Failed to configure device: {0}")]
    ConfigurationFailed(String),

    #[error("Endpoint not found: type={ep_type}, direction={direction}")]
    EndpointNotFound { ep_type: String, direction: String },

    #[error("Control transfer failed: {0}")]
    ControlTransferFailed(String),

    #[error("Write failed: {0}")]
    WriteFailed(String),

    #[error("Read failed: {0}")]
    ReadFailed(String),

    #[error("Link reset: {0}")]
    LinkReset(String),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Abstract USB transport interface.
///
/// One call is one physical transfer; buffering and chunking live in
/// [`ByteStream`](super::ByteStream).
pub trait UsbTransport: Send + Sync {
    /// Write raw bytes to the OUT endpoint.
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError>;

    /// Read up to `max_len` raw bytes from the IN endpoint.
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Reset the device handle after a link-level fault.
    fn reset(&self) -> Result<(), TransportError>;

    /// Request size for one IN transfer.
    fn max_packet_size(&self) -> usize;

    /// Get the current VID.
    fn vendor_id(&self) -> u16;

    /// Get the current PID.
    fn product_id(&self) -> u16;
}
