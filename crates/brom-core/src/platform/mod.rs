//! Per-chip bring-up recipes.
//!
//! Each family replays the exact register traffic the vendor flashing tool
//! produces for it. Steps that have no counterpart on a family are no-ops.

mod mt6252;
mod mt6573;
mod mt6577;
mod mt6589;

use std::fmt;

pub use mt6252::Mt6252;
pub use mt6573::Mt6573;
pub use mt6577::Mt6577;
pub use mt6589::Mt6589;

use crate::brom::{Brom, HwSwVersion};
use crate::error::{BromError, Result};
use crate::protocol::constants::{
    HW_CODE_LEGACY, HW_CODE_MT6573, HW_CODE_MT6575, HW_CODE_MT6589,
};
use crate::transport::UsbTransport;

/// Chip-id register probed on parts that do not answer `get_hw_code`.
pub const LEGACY_CHIP_ID_REG: u32 = 0x8001_0008;

/// Bring-up interface shared by all families, in replay order.
pub trait Platform<T: UsbTransport> {
    fn kind(&self) -> PlatformKind;

    fn identify_chip(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }

    fn init_pmic(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }

    fn disable_watchdog(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }

    fn init_rtc(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }

    /// ME ID, target config and version probes.
    fn identify_software(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }

    /// External memory interface.
    fn init_emi(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }

    fn send_payload(&self, brom: &mut Brom<T>, payload: &[u8]) -> Result<()>;

    fn jump_to_payload(&self, brom: &mut Brom<T>) -> Result<()>;

    /// Drain what the DA emits right after the jump, before a piggybacked
    /// payload gets control.
    fn recv_remaining_data(&self, _brom: &mut Brom<T>) -> Result<()> {
        Ok(())
    }
}

/// Secondary identification read after the hardware code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// No probe needed for this hardware code.
    None,
    /// `get_hw_sw_ver` reply.
    HwSwVer(HwSwVersion),
    /// Chip-id register of a legacy part.
    ChipId(u16),
}

impl fmt::Display for Probe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Probe::None => write!(f, "no probe"),
            Probe::HwSwVer(v) => write!(
                f,
                "HW subcode {:04X}, HW version {:04X}, SW version {:04X}",
                v.hw_sub_code, v.hw_ver, v.sw_ver
            ),
            Probe::ChipId(id) => write!(f, "chip id {:04X}", id),
        }
    }
}

/// Supported chip families.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformKind {
    Mt6252,
    Mt6573,
    Mt6577,
    Mt6589,
}

impl fmt::Display for PlatformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlatformKind::Mt6252 => write!(f, "MT6252"),
            PlatformKind::Mt6573 => write!(f, "MT6573"),
            PlatformKind::Mt6577 => write!(f, "MT6577"),
            PlatformKind::Mt6589 => write!(f, "MT6589"),
        }
    }
}

impl PlatformKind {
    /// Map a hardware code and its probe result to a family.
    pub fn select(hw_code: u16, probe: Probe) -> Result<Self> {
        match (hw_code, probe) {
            (HW_CODE_LEGACY, Probe::ChipId(0x6252)) => Ok(PlatformKind::Mt6252),
            (HW_CODE_MT6573, _) => Ok(PlatformKind::Mt6573),
            (HW_CODE_MT6575, Probe::HwSwVer(Mt6577::VERSION)) => Ok(PlatformKind::Mt6577),
            (HW_CODE_MT6589, _) => Ok(PlatformKind::Mt6589),
            (HW_CODE_LEGACY | HW_CODE_MT6575, probe) => Err(BromError::UnsupportedRevision {
                hw_code,
                probe: probe.to_string(),
            }),
            (hw_code, _) => Err(BromError::UnsupportedHardware { hw_code }),
        }
    }

    /// Query the device and pick its family. Issues no register writes.
    pub fn detect<T: UsbTransport>(brom: &mut Brom<T>) -> Result<Self> {
        let hw_code = brom.get_hw_code()?;
        brom.replay(format!("HW code: {:04X}", hw_code));

        let probe = match hw_code {
            HW_CODE_LEGACY => Probe::ChipId(brom.read16_unchecked(LEGACY_CHIP_ID_REG)?),
            HW_CODE_MT6575 => Probe::HwSwVer(brom.get_hw_sw_ver()?),
            _ => Probe::None,
        };

        let kind = Self::select(hw_code, probe)?;
        brom.replay(format!("Platform: {}", kind));
        Ok(kind)
    }

    /// Recipe for this family. Two-stage families need the bootstrap DA.
    pub fn instantiate<T: UsbTransport>(
        self,
        bootstrap: Option<Vec<u8>>,
    ) -> Result<Box<dyn Platform<T>>> {
        Ok(match self {
            PlatformKind::Mt6252 => {
                let bootstrap =
                    bootstrap.ok_or(BromError::MissingBootstrap { platform: "MT6252" })?;
                Box::new(Mt6252::new(bootstrap))
            }
            PlatformKind::Mt6573 => Box::new(Mt6573),
            PlatformKind::Mt6577 => Box::new(Mt6577),
            PlatformKind::Mt6589 => Box::new(Mt6589),
        })
    }
}

/// Shared by MT6573 and MT6577: same RTC block at a different base.
pub(crate) fn init_rtc_at<T: UsbTransport>(brom: &mut Brom<T>, base: u32) -> Result<()> {
    const IRQ_EN: u32 = 0x08;
    const CII_EN: u32 = 0x0C;
    const AL_MASK: u32 = 0x10;
    const POWERKEY1: u32 = 0x50;
    const POWERKEY2: u32 = 0x54;
    const PROT: u32 = 0x68;
    const WRTGR: u32 = 0x74;

    for offset in [0, POWERKEY1, POWERKEY2] {
        let addr = base + offset;
        let val = brom.read16(addr)?;
        brom.replay(format!("RTC register 0x{:08X} == {:04X}", addr, val));
    }

    fn commit<T: UsbTransport>(brom: &mut Brom<T>, base: u32) -> Result<()> {
        brom.write16(base + WRTGR, 0x0001)?;
        brom.read16(base)?;
        Ok(())
    }

    brom.write16(base + AL_MASK, 0x0000)?;
    brom.write16(base + IRQ_EN, 0x0000)?;
    brom.write16(base + CII_EN, 0x0000)?;
    commit(brom, base)?;

    brom.write16(base + POWERKEY1, 0xA357)?;
    brom.write16(base + POWERKEY2, 0x67D2)?;
    commit(brom, base)?;

    // Two-part protection unlock
    brom.write16(base + PROT, 0x586A)?;
    commit(brom, base)?;
    brom.write16(base + PROT, 0x9136)?;
    commit(brom, base)?;

    // Bus writes, PMIC RTC, auto mode
    brom.write16(base, 0x430E)?;
    commit(brom, base)
}

/// ME ID, target config and version probes, each issued the way the
/// vendor tool does it.
pub(crate) fn identify_software_full<T: UsbTransport>(brom: &mut Brom<T>) -> Result<()> {
    let me_id = brom.get_me_id()?;
    brom.replay(format!("ME ID: {}", crate::protocol::hex(&me_id)));
    brom.get_me_id()?;

    let config = brom.get_target_config()?;
    for line in config.describe() {
        brom.replay(line);
    }
    brom.get_target_config()?;

    let ver = brom.get_brom_version()?;
    brom.replay(format!("BROM version: {:02X}", ver));
    brom.get_preloader_version()?;
    Ok(())
}

/// EMI_GENA setup, identical apart from the register address.
pub(crate) fn init_emi_at<T: UsbTransport>(brom: &mut Brom<T>, emi_gena: u32) -> Result<()> {
    let old = brom.read32(emi_gena)?;
    brom.write32(emi_gena, 0x0000_0002)?;
    brom.replay(format!(
        "EMI_GENA (0x{:08X}) set to {:08X}, was {:08X}",
        emi_gena, 0x0000_0002, old
    ));
    Ok(())
}

/// Upload through the checksummed path; the checksum is informational.
pub(crate) fn send_da_at<T: UsbTransport>(
    brom: &mut Brom<T>,
    address: u32,
    payload: &[u8],
) -> Result<()> {
    let checksum = brom.send_da(address, payload, 0)?;
    brom.replay(format!("Received DA checksum: {:04X}", checksum));
    Ok(())
}

/// Drain the fixed-size blobs the DA sends after the jump.
pub(crate) fn drain_bytes<T: UsbTransport>(
    brom: &mut Brom<T>,
    sizes: &[(usize, &str)],
) -> Result<()> {
    brom.replay("Waiting for device to send remaining data");
    for &(size, what) in sizes {
        let data = brom.just_read(size)?;
        brom.replay(format!("<- DA: ({}) {}", what, crate::protocol::hex(&data)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brom::tests::brom;
    use crate::protocol::constants::*;
    use crate::transport::MockTransport;

    fn queue_hw_code(mock: &MockTransport, hw_code: u16) {
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(hw_code);
        mock.queue_u16(0);
    }

    fn queue_hw_sw_ver(mock: &MockTransport, v: HwSwVersion) {
        mock.queue_u8(CMD_GET_HW_SW_VER);
        mock.queue_u16(v.hw_sub_code);
        mock.queue_u16(v.hw_ver);
        mock.queue_u16(v.sw_ver);
        mock.queue_u16(0);
    }

    #[test]
    fn test_select_is_total() {
        assert_eq!(
            PlatformKind::select(0x6573, Probe::None).unwrap(),
            PlatformKind::Mt6573
        );
        assert_eq!(
            PlatformKind::select(0x6583, Probe::None).unwrap(),
            PlatformKind::Mt6589
        );
        assert_eq!(
            PlatformKind::select(0x0000, Probe::ChipId(0x6252)).unwrap(),
            PlatformKind::Mt6252
        );
        assert!(matches!(
            PlatformKind::select(0x0000, Probe::ChipId(0x6250)),
            Err(BromError::UnsupportedRevision { hw_code: 0, .. })
        ));
        assert!(matches!(
            PlatformKind::select(0x6572, Probe::None),
            Err(BromError::UnsupportedHardware { hw_code: 0x6572 })
        ));
    }

    #[test]
    fn test_detect_mt6573_unconditionally() {
        let mock = MockTransport::new();
        queue_hw_code(&mock, 0x6573);
        let mut brom = brom(&mock);

        assert_eq!(PlatformKind::detect(&mut brom).unwrap(), PlatformKind::Mt6573);
        assert_eq!(mock.written_bytes(), vec![CMD_GET_HW_CODE]);
    }

    #[test]
    fn test_detect_mt6577_revision() {
        let mock = MockTransport::new();
        queue_hw_code(&mock, 0x6575);
        queue_hw_sw_ver(&mock, HwSwVersion::new(0x8B00, 0xCB00, 0xE201));
        let mut brom = brom(&mock);
        assert_eq!(PlatformKind::detect(&mut brom).unwrap(), PlatformKind::Mt6577);

        let mock = MockTransport::new();
        queue_hw_code(&mock, 0x6575);
        queue_hw_sw_ver(&mock, HwSwVersion::new(0x8A00, 0xCA00, 0xE100));
        let mut brom = crate::brom::tests::brom(&mock);
        assert!(matches!(
            PlatformKind::detect(&mut brom),
            Err(BromError::UnsupportedRevision { hw_code: 0x6575, .. })
        ));
    }

    #[test]
    fn test_detect_unknown_issues_nothing_else() {
        let mock = MockTransport::new();
        queue_hw_code(&mock, 0x6580);
        let mut brom = brom(&mock);

        assert!(matches!(
            PlatformKind::detect(&mut brom),
            Err(BromError::UnsupportedHardware { hw_code: 0x6580 })
        ));
        assert_eq!(mock.get_writes(), vec![vec![CMD_GET_HW_CODE]]);
    }

    #[test]
    fn test_detect_legacy_reads_chip_id() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_timeout();
        mock.queue_u8(CMD_READ16_NO_STATUS);
        mock.queue_u32(LEGACY_CHIP_ID_REG);
        mock.queue_u32(1);
        mock.queue_u16(0x6252);
        let mut brom = brom(&mock);

        assert_eq!(PlatformKind::detect(&mut brom).unwrap(), PlatformKind::Mt6252);
    }

    #[test]
    fn test_mt6252_needs_bootstrap() {
        assert!(matches!(
            PlatformKind::Mt6252.instantiate::<MockTransport>(None),
            Err(BromError::MissingBootstrap { .. })
        ));
        let platform = PlatformKind::Mt6252
            .instantiate::<MockTransport>(Some(vec![0; 4]))
            .unwrap();
        assert_eq!(platform.kind(), PlatformKind::Mt6252);
    }
}
