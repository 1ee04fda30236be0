//! Protocol module - BROM wire definitions.

pub mod constants;
pub mod handshake;
pub mod register;
pub mod target_config;

pub use constants::*;
pub use handshake::{Handshake, HandshakeState};
pub use register::RegWidth;
pub use target_config::TargetConfig;

/// Upper-case hex rendering used in logs.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect()
}
