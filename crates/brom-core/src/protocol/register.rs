//! Register access widths and opcode selection.

use std::fmt;

use super::constants::*;

/// Width of a register word on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegWidth {
    Bits16,
    Bits32,
}

impl RegWidth {
    /// Bytes per word.
    pub const fn size(self) -> usize {
        match self {
            RegWidth::Bits16 => 2,
            RegWidth::Bits32 => 4,
        }
    }

    /// Opcode for a register read, with or without status framing.
    pub const fn read_opcode(self, check_status: bool) -> u8 {
        match (self, check_status) {
            (RegWidth::Bits16, true) => CMD_READ16,
            (RegWidth::Bits16, false) => CMD_READ16_NO_STATUS,
            (RegWidth::Bits32, true) => CMD_READ32,
            (RegWidth::Bits32, false) => CMD_READ32_NO_STATUS,
        }
    }

    /// Opcode for a register write, with or without status framing.
    pub const fn write_opcode(self, check_status: bool) -> u8 {
        match (self, check_status) {
            (RegWidth::Bits16, true) => CMD_WRITE16,
            (RegWidth::Bits16, false) => CMD_WRITE16_NO_STATUS,
            (RegWidth::Bits32, true) => CMD_WRITE32,
            (RegWidth::Bits32, false) => CMD_WRITE32_NO_STATUS,
        }
    }
}

impl fmt::Display for RegWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegWidth::Bits16 => write!(f, "16"),
            RegWidth::Bits32 => write!(f, "32"),
        }
    }
}
