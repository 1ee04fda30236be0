//! MT6252, a legacy feature phone part.
//!
//! The BROM predates `get_hw_code` and checksummed uploads, and it cannot
//! take a large payload directly. A small bootstrap DA goes to SRAM first;
//! it serves the same legacy upload commands for the payload in external
//! memory.
//!
//! No watchdog register is known for this part, so `disable_watchdog` keeps
//! the no-op default.

use super::{Platform, PlatformKind};
use crate::brom::Brom;
use crate::error::{BromError, Result};
use crate::transport::UsbTransport;

const BOOTSTRAP_ADDRESS: u32 = 0x4000_5000;
const DA_ADDRESS: u32 = 0x0810_0000;

pub struct Mt6252 {
    bootstrap: Vec<u8>,
}

impl Mt6252 {
    pub fn new(bootstrap: Vec<u8>) -> Self {
        Self { bootstrap }
    }

    /// Legacy upload followed by the checksum query for the same region.
    fn upload<T: UsbTransport>(brom: &mut Brom<T>, address: u32, data: &[u8]) -> Result<()> {
        brom.send_da_legacy(address, data)?;
        // Odd trailing byte is not sent
        let size = u32::try_from(data.len() & !1)
            .map_err(|_| BromError::PayloadTooLarge(data.len()))?;
        let checksum = brom.checksum_legacy(address, size)?;
        brom.replay(format!(
            "Checksum of 0x{:08X} bytes at 0x{:08X}: {:04X}",
            size, address, checksum
        ));
        Ok(())
    }
}

impl<T: UsbTransport> Platform<T> for Mt6252 {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Mt6252
    }

    fn send_payload(&self, brom: &mut Brom<T>, payload: &[u8]) -> Result<()> {
        brom.replay("Sending bootstrap DA");
        Self::upload(brom, BOOTSTRAP_ADDRESS, &self.bootstrap)?;
        brom.jump_da(BOOTSTRAP_ADDRESS, false)?;

        brom.replay("Sending payload through bootstrap DA");
        Self::upload(brom, DA_ADDRESS, payload)
    }

    fn jump_to_payload(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.jump_da(DA_ADDRESS, false)
    }
}
