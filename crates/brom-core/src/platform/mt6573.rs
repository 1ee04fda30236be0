//! MT6573: integrated PMIC behind plain 16-bit registers.

use super::{
    Platform, PlatformKind, drain_bytes, identify_software_full, init_emi_at, init_rtc_at,
    send_da_at,
};
use crate::brom::Brom;
use crate::error::Result;
use crate::transport::UsbTransport;

const HW_VER_REG: u32 = 0x7002_6000;
const SW_VER_REG: u32 = 0x7002_6004;
const WDT_MODE: u32 = 0x7002_5000;
const RTC_BASE: u32 = 0x7001_4000;
const EMI_GENA: u32 = 0x7000_0000;
const DA_ADDRESS: u32 = 0x9000_5000;

/// (register, new value, reference value) for the charger and keypad LED
/// setup, in the vendor tool's order.
const PMIC_SEQUENCE: [(u32, u16, u16); 9] = [
    (0x7002_FE84, 0xFF04, 0xFF00), // KPLED_CON1
    (0x7002_FA0C, 0x2079, 0x3079), // CHR_CON3
    (0x7002_FA0C, 0x20F9, 0x2079), // CHR_CON3
    (0x7002_FA08, 0x5200, 0x4700), // CHR_CON2
    (0x7002_FA18, 0x0000, 0x0010), // CHR_CON6
    (0x7002_FA00, 0x7AB2, 0x62B2), // CHR_CON0
    (0x7002_FA20, 0x0800, 0x0000), // CHR_CON8
    (0x7002_FA28, 0x0100, 0x0000), // CHR_CON10
    (0x7002_FA24, 0x0180, 0x0080), // CHR_CON9
];

pub struct Mt6573;

impl Mt6573 {
    /// Version registers, used instead of `get_hw_sw_ver` on this part.
    pub fn read_versions<T: UsbTransport>(brom: &mut Brom<T>) -> Result<(u16, u16)> {
        let hw_ver = brom.read16_unchecked(HW_VER_REG)?;
        let sw_ver = brom.read16_unchecked(SW_VER_REG)?;
        Ok((hw_ver, sw_ver))
    }
}

impl<T: UsbTransport> Platform<T> for Mt6573 {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Mt6573
    }

    fn identify_chip(&self, brom: &mut Brom<T>) -> Result<()> {
        // The vendor tool asks twice
        brom.get_hw_code()?;
        let (hw_ver, sw_ver) = Self::read_versions(brom)?;
        brom.replay(format!("HW version: {:04X}", hw_ver));
        brom.replay(format!("SW version: {:04X}", sw_ver));
        Ok(())
    }

    fn init_pmic(&self, brom: &mut Brom<T>) -> Result<()> {
        for (reg, value, reference) in PMIC_SEQUENCE {
            brom.write16_verify(reg, value, reference)?;
        }
        Ok(())
    }

    fn disable_watchdog(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.write16(WDT_MODE, 0x2200)?;
        brom.get_preloader_version()?;
        Ok(())
    }

    fn init_rtc(&self, brom: &mut Brom<T>) -> Result<()> {
        init_rtc_at(brom, RTC_BASE)
    }

    fn identify_software(&self, brom: &mut Brom<T>) -> Result<()> {
        identify_software_full(brom)
    }

    fn init_emi(&self, brom: &mut Brom<T>) -> Result<()> {
        init_emi_at(brom, EMI_GENA)
    }

    fn send_payload(&self, brom: &mut Brom<T>, payload: &[u8]) -> Result<()> {
        send_da_at(brom, DA_ADDRESS, payload)
    }

    fn jump_to_payload(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.jump_da(DA_ADDRESS, true)
    }

    fn recv_remaining_data(&self, brom: &mut Brom<T>) -> Result<()> {
        drain_bytes(
            brom,
            &[(1, "unknown"), (1, "unknown"), (1, "unknown"), (1, "unknown")],
        )
    }
}
