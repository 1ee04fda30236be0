//! Error types for the protocol engine and the platform recipes.

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum BromError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The device did not reflect what we sent; its state is now unknown.
    #[error("Unexpected output, expected {expected} got {actual}")]
    Desync { expected: String, actual: String },

    #[error("Short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },

    #[error("{command}: status is {status:04X}")]
    Status { command: &'static str, status: u16 },

    #[error("{command}: expected response {expected:04X}, got {actual:04X}")]
    UnexpectedResponse {
        command: &'static str,
        expected: u16,
        actual: u16,
    },

    #[error("Bad ME ID length")]
    BadMeIdLength,

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Unsupported hardware: HW code {hw_code:04X}")]
    UnsupportedHardware { hw_code: u16 },

    #[error("Unsupported revision of HW code {hw_code:04X}: {probe}")]
    UnsupportedRevision { hw_code: u16, probe: String },

    #[error("{platform} needs a bootstrap download agent")]
    MissingBootstrap { platform: &'static str },

    #[error("Interrupted")]
    Interrupted,
}

pub type Result<T> = std::result::Result<T, BromError>;
