//! Event system for UI decoupling.
//!
//! The transport, the protocol engine and the device manager report what
//! they do through an injected [`BromObserver`] instead of configuring a
//! process-wide logger. The CLI decides how events are rendered.

use std::fmt;

use crate::protocol::hex;

/// Log level for events.
///
/// Finer grained than info/debug: replay narration, replayed commands and
/// raw I/O are separate streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// General session information.
    Info,
    /// One line per BROM command issued.
    Command,
    /// Raw bytes moved over the link.
    Io,
    /// High-level narration of the bring-up sequence.
    Replay,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Command => write!(f, "BROM CMD"),
            LogLevel::Io => write!(f, "BROM I/O"),
            LogLevel::Replay => write!(f, "REPLAY"),
        }
    }
}

/// Bring-up steps, in replay order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayStep {
    IdentifyChip,
    InitPmic,
    DisableWatchdog,
    InitRtc,
    IdentifySoftware,
    InitEmi,
    SendPayload,
    JumpToPayload,
    RecvRemainingData,
}

impl fmt::Display for ReplayStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplayStep::IdentifyChip => write!(f, "Identifying chip"),
            ReplayStep::InitPmic => write!(f, "Setting up PMIC"),
            ReplayStep::DisableWatchdog => write!(f, "Disabling watchdog"),
            ReplayStep::InitRtc => write!(f, "Setting up RTC"),
            ReplayStep::IdentifySoftware => write!(f, "Identifying software"),
            ReplayStep::InitEmi => write!(f, "Setting up EMI"),
            ReplayStep::SendPayload => write!(f, "Sending payload"),
            ReplayStep::JumpToPayload => write!(f, "Jumping to payload"),
            ReplayStep::RecvRemainingData => write!(f, "Receiving remaining data"),
        }
    }
}

/// Events emitted while talking to the BROM.
#[derive(Debug, Clone)]
pub enum BromEvent {
    /// Device opened.
    DeviceConnected { vid: u16, pid: u16 },
    /// Handshake completed.
    Synchronized,
    /// Replay step started.
    StepStarted(ReplayStep),
    /// Upload progress for a multi-chunk write.
    Progress { sent: usize, total: usize },
    /// Log message.
    Log { level: LogLevel, message: String },
    /// Observed value differs from the vendor capture reference. Never fatal.
    Warning { message: String },
    /// USB data sent/received.
    Packet {
        direction: PacketDirection,
        data: Vec<u8>,
    },
    /// Replay finished, payload is running.
    Complete,
}

/// USB packet direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDirection {
    Tx, // Transmit (Host -> Device)
    Rx, // Receive (Device -> Host)
}

impl fmt::Display for PacketDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PacketDirection::Tx => write!(f, "->"),
            PacketDirection::Rx => write!(f, "<-"),
        }
    }
}

/// Observer trait for receiving BROM events.
///
/// Implement this trait in your UI layer to receive updates.
pub trait BromObserver: Send + Sync {
    /// Called when an event occurs.
    fn on_event(&self, event: &BromEvent);
}

/// No-op observer that discards all events.
pub struct NullObserver;

impl BromObserver for NullObserver {
    fn on_event(&self, _event: &BromEvent) {}
}

/// Observer that logs events using tracing.
pub struct TracingObserver;

impl BromObserver for TracingObserver {
    fn on_event(&self, event: &BromEvent) {
        match event {
            BromEvent::DeviceConnected { vid, pid } => {
                tracing::info!(vid = %format!("{:04X}", vid), pid = %format!("{:04X}", pid), "Device connected");
            }
            BromEvent::Synchronized => {
                tracing::info!("Handshake completed");
            }
            BromEvent::StepStarted(step) => {
                tracing::info!(target: "replay", "{}", step);
            }
            BromEvent::Progress { sent, total } => {
                let pct = if *total > 0 { sent * 100 / total } else { 0 };
                tracing::info!("Uploaded {} out of {} bytes ({}%)", sent, total, pct);
            }
            BromEvent::Log { level, message } => match level {
                LogLevel::Info => tracing::info!("{}", message),
                LogLevel::Replay => tracing::info!(target: "replay", "{}", message),
                LogLevel::Command => tracing::debug!(target: "brom::cmd", "{}", message),
                LogLevel::Io => tracing::trace!(target: "brom::io", "{}", message),
            },
            BromEvent::Warning { message } => {
                tracing::warn!("{}", message);
            }
            BromEvent::Packet { direction, data } => {
                tracing::trace!(target: "brom::io", "{} {}", direction, hex(data));
            }
            BromEvent::Complete => {
                tracing::info!("Replay complete");
            }
        }
    }
}
