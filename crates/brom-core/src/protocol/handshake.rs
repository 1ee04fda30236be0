//! BROM synchronization state machine.
//!
//! The host sends the four sync bytes one at a time and the BROM answers
//! each one with its bitwise complement. Any other reply (or no reply)
//! means the device is not aligned with us, so we start over from the
//! first byte.

use std::fmt;

use super::constants::HANDSHAKE_SEQUENCE;

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the complement of `HANDSHAKE_SEQUENCE[index]`.
    Syncing { index: usize },
    /// All four complements received in order.
    Synchronized,
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandshakeState::Syncing { index } => write!(f, "SYNC[{}]", index),
            HandshakeState::Synchronized => write!(f, "SYNCHRONIZED"),
        }
    }
}

/// Synchronization index tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    index: usize,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    pub const fn new() -> Self {
        Self { index: 0 }
    }

    /// Byte to send next, or `None` once synchronized.
    pub fn next_byte(&self) -> Option<u8> {
        HANDSHAKE_SEQUENCE.get(self.index).copied()
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn state(&self) -> HandshakeState {
        if self.is_synchronized() {
            HandshakeState::Synchronized
        } else {
            HandshakeState::Syncing { index: self.index }
        }
    }

    pub fn is_synchronized(&self) -> bool {
        self.index >= HANDSHAKE_SEQUENCE.len()
    }

    /// Feed the device's reply to the byte returned by `next_byte`.
    ///
    /// `None` stands for a missing reply (timeout).
    pub fn feed(&mut self, reply: Option<u8>) -> HandshakeState {
        let Some(sent) = self.next_byte() else {
            return HandshakeState::Synchronized;
        };

        match reply {
            Some(byte) if byte == !sent => self.index += 1,
            _ => self.index = 0,
        }
        self.state()
    }
}
