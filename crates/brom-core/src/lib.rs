//! BROM-Core: MediaTek boot ROM download protocol in Rust.
//!
//! This crate replays the bring-up traffic a vendor flashing tool sends to a
//! MediaTek SoC in BROM download mode, then uploads an arbitrary download
//! agent (DA) and jumps to it.
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! - **Transport**: physical USB link (nusb, mock) and a buffered byte stream
//! - **Protocol**: opcodes, handshake state machine, register widths
//! - **Brom**: byte-exact command codec on top of the stream
//! - **Platform**: per-chip bring-up recipes
//! - **Manager**: identification, platform selection and replay order
//! - **Capture**: data sent by the payload after the jump
//! - **Events**: Observer pattern for UI decoupling
//! - **Session**: High-level orchestrator
//!
//! # Example
//!
//! ```no_run
//! use brom_core::capture::MemorySink;
//! use brom_core::session::{BromSession, SessionConfig, SessionMode};
//!
//! let config = SessionConfig {
//!     mode: SessionMode::Replay,
//!     payload_path: Some("payload.bin".into()),
//!     ..Default::default()
//! };
//!
//! let mut session = BromSession::new(config);
//! session.run(&mut MemorySink::default()).expect("Replay failed");
//! ```

pub mod brom;
pub mod capture;
pub mod error;
pub mod events;
pub mod manager;
pub mod platform;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use brom::{Brom, HwSwVersion};
pub use capture::{CaptureSink, MemorySink};
pub use error::BromError;
pub use events::{BromEvent, BromObserver, LogLevel, ReplayStep, TracingObserver};
pub use manager::{ChipVersion, DeviceIdentity, DeviceManager};
pub use platform::{Platform, PlatformKind};
pub use protocol::TargetConfig;
pub use session::{BromSession, CaptureMode, SessionConfig, SessionMode, SessionOutcome};
pub use transport::{ByteStream, MockTransport, NusbTransport, TransportError, UsbTransport};
