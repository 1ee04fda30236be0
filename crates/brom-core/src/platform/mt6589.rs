//! MT6589, which reports hardware code 0x6583.
//!
//! The PMIC sits behind the BROM's power sub-protocol instead of being
//! memory mapped, and the DA expects an acknowledgment after its greeting.

use super::{Platform, PlatformKind, drain_bytes, init_emi_at, send_da_at};
use crate::brom::Brom;
use crate::error::Result;
use crate::transport::UsbTransport;

const PMIC_INIT_REG: u32 = 0x8000_0000;
const CHR_CON7: u16 = 0x000E;
const TOPRGU_BASE: u32 = 0x1000_0000;
const TOPRGU_LAST: u32 = 0x1000_0018;
const EMI_GENA: u32 = 0x1020_3070;
const DA_ADDRESS: u32 = 0x1200_0000;

/// Sent once the DA has reported in.
const DA_ACK: u8 = 0x5A;

/// (register, new value, reference value)
const PMIC_SEQUENCE: [(u16, u16, u16); 6] = [
    (0x000E, 0x1001, 0x1001), // CHR_CON7
    (0x000C, 0x0049, 0x0041), // CHR_CON6
    (0x0008, 0x000C, 0x000F), // CHR_CON4
    (0x001A, 0x0000, 0x0010), // CHR_CON13
    (0x0000, 0x007B, 0x0063), // CHR_CON0
    (0x0020, 0x0009, 0x0001), // CHR_CON16
];

pub struct Mt6589;

impl<T: UsbTransport> Platform<T> for Mt6589 {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Mt6589
    }

    fn identify_chip(&self, brom: &mut Brom<T>) -> Result<()> {
        let ver = brom.get_hw_sw_ver()?;
        brom.replay(format!("HW subcode: {:04X}", ver.hw_sub_code));
        brom.replay(format!("HW version: {:04X}", ver.hw_ver));
        brom.replay(format!("SW version: {:04X}", ver.sw_ver));
        brom.uart1_log_enable()
    }

    fn init_pmic(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.power_init(PMIC_INIT_REG, 0)?;
        brom.power_read16(CHR_CON7)?;
        for (reg, value, reference) in PMIC_SEQUENCE {
            brom.set_power_reg(reg, value, reference)?;
        }
        brom.power_deinit()
    }

    fn disable_watchdog(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.write32(TOPRGU_BASE, 0x2200_2224)?;
        brom.get_preloader_version()?;

        for addr in (TOPRGU_BASE..=TOPRGU_LAST).step_by(4) {
            let val = brom.read32(addr)?;
            brom.replay(format!("TOPRGU register 0x{:08X} == {:08X}", addr, val));
        }
        Ok(())
    }

    fn identify_software(&self, brom: &mut Brom<T>) -> Result<()> {
        let ver = brom.get_brom_version()?;
        brom.replay(format!("BROM version: {:02X}", ver));
        brom.get_preloader_version()?;
        Ok(())
    }

    fn init_emi(&self, brom: &mut Brom<T>) -> Result<()> {
        init_emi_at(brom, EMI_GENA)
    }

    fn send_payload(&self, brom: &mut Brom<T>, payload: &[u8]) -> Result<()> {
        send_da_at(brom, DA_ADDRESS, payload)
    }

    fn jump_to_payload(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.uart1_log_enable()?;
        brom.jump_da(DA_ADDRESS, true)
    }

    fn recv_remaining_data(&self, brom: &mut Brom<T>) -> Result<()> {
        drain_bytes(
            brom,
            &[
                (1, "unknown"),
                (4, "unknown"),
                (2, "unknown"),
                (10, "unknown"),
                (4, "unknown"),
                (16, "EMMC CID"),
            ],
        )?;
        brom.replay(format!("-> DA: (OK) {:02X}", DA_ACK));
        brom.just_write(&[DA_ACK])
    }
}
