//! MT6577, which reports the MT6575 hardware code.

use super::{
    Platform, PlatformKind, drain_bytes, identify_software_full, init_emi_at, init_rtc_at,
    send_da_at,
};
use crate::brom::{Brom, HwSwVersion};
use crate::error::Result;
use crate::transport::UsbTransport;

const PWR_CTL1: u32 = 0xC000_9024;
const RST_CTL0: u32 = 0xC000_9010;
const TOPRGU_BASE: u32 = 0xC000_0000;
const TOPRGU_LAST: u32 = 0xC000_0018;
const RTC_BASE: u32 = 0xC100_3000;
const EMI_GENA: u32 = 0xC000_3070;
const DA_ADDRESS: u32 = 0xC200_0000;

pub struct Mt6577;

impl Mt6577 {
    /// Only this revision of the 0x6575 code is known to work.
    pub const VERSION: HwSwVersion = HwSwVersion::new(0x8B00, 0xCB00, 0xE201);
}

impl<T: UsbTransport> Platform<T> for Mt6577 {
    fn kind(&self) -> PlatformKind {
        PlatformKind::Mt6577
    }

    fn identify_chip(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.get_hw_code()?;
        let ver = brom.get_hw_sw_ver()?;
        brom.replay(format!("HW subcode: {:04X}", ver.hw_sub_code));
        brom.replay(format!("HW version: {:04X}", ver.hw_ver));
        brom.replay(format!("SW version: {:04X}", ver.sw_ver));
        Ok(())
    }

    /// Second CPU core reset control.
    fn init_pmic(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.read32(PWR_CTL1)?;
        brom.read32(RST_CTL0)?;
        brom.write32(RST_CTL0, 0x0300_0002)?;
        brom.write32(RST_CTL0, 0x0300_0000)?;
        brom.read32(RST_CTL0)?;
        Ok(())
    }

    fn disable_watchdog(&self, brom: &mut Brom<T>) -> Result<()> {
        brom.read16(TOPRGU_BASE)?;
        brom.write16(TOPRGU_BASE, 0x2264)?;
        brom.get_preloader_version()?;

        for addr in (TOPRGU_BASE..=TOPRGU_LAST).step_by(4) {
            let val = brom.read16(addr)?;
            brom.replay(format!("TOPRGU register 0x{:08X} == {:04X}", addr, val));
        }
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
