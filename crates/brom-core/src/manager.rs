//! Device manager: identification and the replay sequence.

use std::fmt;

use crate::brom::{Brom, HwSwVersion};
use crate::error::Result;
use crate::events::{BromEvent, LogLevel, ReplayStep};
use crate::platform::{LEGACY_CHIP_ID_REG, Mt6573, Platform, PlatformKind};
use crate::protocol::constants::{HW_CODE_LEGACY, HW_CODE_MT6573};
use crate::protocol::{TargetConfig, hex};
use crate::transport::UsbTransport;

/// Version information, whose layout depends on the chip generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipVersion {
    /// Legacy part identified by its chip-id register.
    Legacy { chip_id: u16 },
    /// Versions read from registers (MT6573).
    Registers { hw_ver: u16, sw_ver: u16 },
    /// `get_hw_sw_ver` reply.
    HwSw(HwSwVersion),
}

/// Result of `identify`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub hw_code: u16,
    pub version: ChipVersion,
    /// Absent on legacy parts.
    pub brom_version: Option<u8>,
    pub me_id: Option<Vec<u8>>,
    pub target_config: Option<TargetConfig>,
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HW code {:04X}", self.hw_code)?;
        match self.version {
            ChipVersion::Legacy { chip_id } => write!(f, ", chip id {:04X}", chip_id)?,
            ChipVersion::Registers { hw_ver, sw_ver } => {
                write!(f, ", HW version {:04X}, SW version {:04X}", hw_ver, sw_ver)?
            }
            ChipVersion::HwSw(v) => write!(
                f,
                ", HW subcode {:04X}, HW version {:04X}, SW version {:04X}",
                v.hw_sub_code, v.hw_ver, v.sw_ver
            )?,
        }
        if let Some(ver) = self.brom_version {
            write!(f, ", BROM version {:02X}", ver)?;
        }
        Ok(())
    }
}

/// Orchestrates identification, platform selection and the replay.
pub struct DeviceManager<T: UsbTransport> {
    brom: Brom<T>,
    bootstrap: Option<Vec<u8>>,
}

impl<T: UsbTransport> DeviceManager<T> {
    pub fn new(brom: Brom<T>) -> Self {
        Self {
            brom,
            bootstrap: None,
        }
    }

    /// First-stage DA for families that cannot take the payload directly.
    pub fn with_bootstrap(mut self, bootstrap: Vec<u8>) -> Self {
        self.bootstrap = Some(bootstrap);
        self
    }

    pub fn brom(&mut self) -> &mut Brom<T> {
        &mut self.brom
    }

    pub fn into_inner(self) -> Brom<T> {
        self.brom
    }

    fn info(&self, message: impl Into<String>) {
        self.brom.observer().on_event(&BromEvent::Log {
            level: LogLevel::Info,
            message: message.into(),
        });
    }

    /// Print chip and software identifiers. Read-only.
    pub fn identify(&mut self) -> Result<DeviceIdentity> {
        let brom = &mut self.brom;
        let hw_code = brom.get_hw_code()?;

        let version = match hw_code {
            HW_CODE_LEGACY => ChipVersion::Legacy {
                chip_id: brom.read16_unchecked(LEGACY_CHIP_ID_REG)?,
            },
            HW_CODE_MT6573 => {
                let (hw_ver, sw_ver) = Mt6573::read_versions(brom)?;
                ChipVersion::Registers { hw_ver, sw_ver }
            }
            _ => ChipVersion::HwSw(brom.get_hw_sw_ver()?),
        };

        // Legacy BROMs know none of the commands below
        let (brom_version, me_id, target_config) = if hw_code == HW_CODE_LEGACY {
            (None, None, None)
        } else {
            (
                Some(brom.get_brom_version()?),
                Some(brom.get_me_id()?),
                Some(brom.get_target_config()?),
            )
        };

        let identity = DeviceIdentity {
            hw_code,
            version,
            brom_version,
            me_id,
            target_config,
        };

        self.info(identity.to_string());
        if let Some(me_id) = &identity.me_id {
            self.info(format!("ME ID: {}", hex(me_id)));
        }
        if let Some(config) = identity.target_config {
            for line in config.describe() {
                self.info(line);
            }
        }
        Ok(identity)
    }

    fn step(
        &mut self,
        platform: &dyn Platform<T>,
        step: ReplayStep,
        payload: &[u8],
    ) -> Result<()> {
        self.brom.observer().on_event(&BromEvent::StepStarted(step));
        let brom = &mut self.brom;
        match step {
            ReplayStep::IdentifyChip => platform.identify_chip(brom),
            ReplayStep::InitPmic => platform.init_pmic(brom),
            ReplayStep::DisableWatchdog => platform.disable_watchdog(brom),
            ReplayStep::InitRtc => platform.init_rtc(brom),
            ReplayStep::IdentifySoftware => platform.identify_software(brom),
            ReplayStep::InitEmi => platform.init_emi(brom),
            ReplayStep::SendPayload => platform.send_payload(brom, payload),
            ReplayStep::JumpToPayload => platform.jump_to_payload(brom),
            ReplayStep::RecvRemainingData => platform.recv_remaining_data(brom),
        }
    }

    /// Bring the device up the way the vendor tool does, upload `payload`
    /// and jump to it. Simple mode only disables the watchdog beforehand.
    ///
    /// Steps run once each, in order; the first error aborts the replay.
    pub fn replay(
        &mut self,
        payload: &[u8],
        simple_mode: bool,
        skip_remaining_data: bool,
    ) -> Result<PlatformKind> {
        let kind = PlatformKind::detect(&mut self.brom)?;
        let platform = kind.instantiate::<T>(self.bootstrap.clone())?;

        let steps = Self::steps(simple_mode, skip_remaining_data);
        for step in steps {
            self.step(platform.as_ref(), step, payload)?;
        }

        self.brom.observer().on_event(&BromEvent::Complete);
        Ok(kind)
    }

    /// Replay order.
    pub fn steps(simple_mode: bool, skip_remaining_data: bool) -> Vec<ReplayStep> {
        let mut steps = if simple_mode {
            vec![
                ReplayStep::DisableWatchdog,
                ReplayStep::SendPayload,
                ReplayStep::JumpToPayload,
            ]
        } else {
            vec![
                ReplayStep::IdentifyChip,
                ReplayStep::InitPmic,
                ReplayStep::DisableWatchdog,
                ReplayStep::InitRtc,
                ReplayStep::IdentifySoftware,
                ReplayStep::InitEmi,
                ReplayStep::SendPayload,
                ReplayStep::JumpToPayload,
            ]
        };
        if !skip_remaining_data {
            steps.push(ReplayStep::RecvRemainingData);
        }
        steps
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::brom::tests::{queue_header, queue_read16, queue_write16};
    use crate::error::BromError;
    use crate::events::testing::RecordingObserver;
    use crate::protocol::constants::*;
    use crate::transport::{ByteStream, MockTransport};

    fn manager(mock: &MockTransport) -> (DeviceManager<MockTransport>, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::default());
        let stream = ByteStream::new(mock.clone(), observer.clone());
        (DeviceManager::new(Brom::new(stream)), observer)
    }

    fn started_steps(observer: &RecordingObserver) -> Vec<ReplayStep> {
        observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BromEvent::StepStarted(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_step_order() {
        let full = DeviceManager::<MockTransport>::steps(false, false);
        assert_eq!(
            full,
            vec![
                ReplayStep::IdentifyChip,
                ReplayStep::InitPmic,
                ReplayStep::DisableWatchdog,
                ReplayStep::InitRtc,
                ReplayStep::IdentifySoftware,
                ReplayStep::InitEmi,
                ReplayStep::SendPayload,
                ReplayStep::JumpToPayload,
                ReplayStep::RecvRemainingData,
            ]
        );

        let simple = DeviceManager::<MockTransport>::steps(true, true);
        assert_eq!(
            simple,
            vec![
                ReplayStep::DisableWatchdog,
                ReplayStep::SendPayload,
                ReplayStep::JumpToPayload
            ]
        );
    }

    #[test]
    fn test_identify_mt6573_register_layout() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(0x6573);
        mock.queue_u16(0);
        queue_header(&mock, CMD_READ16_NO_STATUS, 0x7002_6000, 1);
        mock.queue_u16(0x8A00);
        queue_header(&mock, CMD_READ16_NO_STATUS, 0x7002_6004, 1);
        mock.queue_u16(0xE100);
        mock.queue_u8(0x01);
        mock.queue_u8(CMD_GET_ME_ID);
        mock.queue_u32(2);
        mock.queue_bytes(&[0xAB, 0xCD]);
        mock.queue_u16(0);
        mock.queue_u8(CMD_GET_TARGET_CONFIG);
        mock.queue_u32(0);
        mock.queue_u16(0);

        let (mut manager, observer) = manager(&mock);
        let identity = manager.identify().unwrap();

        assert_eq!(
            identity.version,
            ChipVersion::Registers {
                hw_ver: 0x8A00,
                sw_ver: 0xE100
            }
        );
        assert_eq!(identity.brom_version, Some(0x01));
        assert_eq!(identity.me_id, Some(vec![0xAB, 0xCD]));
        assert!(
            observer
                .messages(LogLevel::Info)
                .contains(&"ME ID: ABCD".to_string())
        );

        // Read-only: no write opcodes on the wire
        let writes = mock.get_writes();
        for opcode in [CMD_WRITE16, CMD_WRITE32, CMD_WRITE16_NO_STATUS, CMD_WRITE32_NO_STATUS] {
            assert!(!writes.contains(&vec![opcode]));
        }
    }

    #[test]
    fn test_identify_legacy() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_timeout();
        queue_header(&mock, CMD_READ16_NO_STATUS, LEGACY_CHIP_ID_REG, 1);
        mock.queue_u16(0x6252);

        let (mut manager, _) = manager(&mock);
        let identity = manager.identify().unwrap();
        assert_eq!(identity.version, ChipVersion::Legacy { chip_id: 0x6252 });
        assert_eq!(identity.brom_version, None);
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test]
    fn test_replay_unsupported_aborts_before_steps() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(0x6592);
        mock.queue_u16(0);

        let (mut manager, observer) = manager(&mock);
        let err = manager.replay(b"payload", false, false).unwrap_err();
        assert!(matches!(err, BromError::UnsupportedHardware { hw_code: 0x6592 }));
        assert!(started_steps(&observer).is_empty());
    }

    #[test]
    fn test_simple_replay_mt6589() {
        let mock = MockTransport::new();
        let payload = b"DA".to_vec();

        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(0x6583);
        mock.queue_u16(0);
        // disable_watchdog
        queue_header(&mock, CMD_WRITE32, 0x1000_0000, 1);
        mock.queue_u16(0);
        mock.queue_u32(0x2200_2224);
        mock.queue_u16(0);
        mock.queue_u8(CMD_GET_PRELOADER_VERSION);
        for addr in (0x1000_0000u32..=0x1000_0018).step_by(4) {
            queue_header(&mock, CMD_READ32, addr, 1);
            mock.queue_u16(0);
            mock.queue_u32(0);
            mock.queue_u16(0);
        }
        // send_payload
        mock.queue_u8(CMD_SEND_DA);
        mock.queue_u32(0x1200_0000);
        mock.queue_u32(2);
        mock.queue_u32(0);
        mock.queue_u16(0);
        mock.queue_u16(0x4441);
        mock.queue_u16(0);
        // jump_to_payload
        mock.queue_u8(CMD_UART1_LOG_EN);
        mock.queue_u16(0);
        mock.queue_u8(CMD_JUMP_DA);
        mock.queue_u32(0x1200_0000);
        mock.queue_u16(0);

        let (mut manager, observer) = manager(&mock);
        let kind = manager.replay(&payload, true, true).unwrap();

        assert_eq!(kind, PlatformKind::Mt6589);
        assert_eq!(
            started_steps(&observer),
            DeviceManager::<MockTransport>::steps(true, true)
        );
        assert!(
            observer
                .events()
                .iter()
                .any(|e| matches!(e, BromEvent::Complete))
        );
        assert_eq!(mock.pending_replies(), 0);
    }

    fn queue_read32(mock: &MockTransport, addr: u32, value: u32) {
        queue_header(mock, CMD_READ32, addr, 1);
        mock.queue_u16(0);
        mock.queue_u32(value);
        mock.queue_u16(0);
    }

    fn queue_write32(mock: &MockTransport, addr: u32, value: u32) {
        queue_header(mock, CMD_WRITE32, addr, 1);
        mock.queue_u16(0);
        mock.queue_u32(value);
        mock.queue_u16(0);
    }

    #[test]
    fn test_full_replay_mt6573() {
        const RTC: u32 = 0x7001_4000;
        let mock = MockTransport::new();
        let payload = b"PAYLOAD!".to_vec();

        // detect
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(0x6573);
        mock.queue_u16(0);
        // identify_chip
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(0x6573);
        mock.queue_u16(0);
        queue_header(&mock, CMD_READ16_NO_STATUS, 0x7002_6000, 1);
        mock.queue_u16(0x8A00);
        queue_header(&mock, CMD_READ16_NO_STATUS, 0x7002_6004, 1);
        mock.queue_u16(0xE100);
        // init_pmic
        let pmic: [(u32, u16, u16); 9] = [
            (0x7002_FE84, 0xFF04, 0xFF00),
            (0x7002_FA0C, 0x2079, 0x3079),
            (0x7002_FA0C, 0x20F9, 0x2079),
            (0x7002_FA08, 0x5200, 0x4700),
            (0x7002_FA18, 0x0000, 0x0010),
            (0x7002_FA00, 0x7AB2, 0x62B2),
            (0x7002_FA20, 0x0800, 0x0000),
            (0x7002_FA28, 0x0100, 0x0000),
            (0x7002_FA24, 0x0180, 0x0080),
        ];
        for (reg, value, reference) in pmic {
            queue_read16(&mock, reg, reference);
            queue_write16(&mock, reg, value);
            queue_read16(&mock, reg, value);
        }
        // disable_watchdog
        queue_write16(&mock, 0x7002_5000, 0x2200);
        mock.queue_u8(CMD_GET_PRELOADER_VERSION);
        // init_rtc
        for addr in [RTC, RTC + 0x50, RTC + 0x54] {
            queue_read16(&mock, addr, 0);
        }
        let rtc: [&[(u32, u16)]; 5] = [
            &[(0x10, 0), (0x08, 0), (0x0C, 0)],
            &[(0x50, 0xA357), (0x54, 0x67D2)],
            &[(0x68, 0x586A)],
            &[(0x68, 0x9136)],
            &[(0x00, 0x430E)],
        ];
        for writes in rtc {
            for &(offset, value) in writes {
                queue_write16(&mock, RTC + offset, value);
            }
            queue_write16(&mock, RTC + 0x74, 1);
            queue_read16(&mock, RTC, 0);
        }
        // identify_software
        for _ in 0..2 {
            mock.queue_u8(CMD_GET_ME_ID);
            mock.queue_u32(4);
            mock.queue_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]);
            mock.queue_u16(0);
        }
        for _ in 0..2 {
            mock.queue_u8(CMD_GET_TARGET_CONFIG);
            mock.queue_u32(0);
            mock.queue_u16(0);
        }
        mock.queue_u8(0x01);
        mock.queue_u8(CMD_GET_PRELOADER_VERSION);
        // init_emi
        queue_read32(&mock, 0x7000_0000, 0);
        queue_write32(&mock, 0x7000_0000, 0x0000_0002);
        // send_payload
        mock.queue_u8(CMD_SEND_DA);
        mock.queue_u32(0x9000_5000);
        mock.queue_u32(payload.len() as u32);
        mock.queue_u32(0);
        mock.queue_u16(0);
        mock.queue_u16(0x1234);
        mock.queue_u16(0);
        // jump_to_payload
        mock.queue_u8(CMD_JUMP_DA);
        mock.queue_u32(0x9000_5000);
        mock.queue_u16(0);
        // recv_remaining_data
        mock.queue_bytes(&[0xC0, 0x03, 0x00, 0x00]);

        let (mut manager, observer) = manager(&mock);
        let kind = manager.replay(&payload, false, false).unwrap();

        assert_eq!(kind, PlatformKind::Mt6573);
        assert_eq!(
            started_steps(&observer),
            DeviceManager::<MockTransport>::steps(false, false)
        );
        assert!(mock.get_writes().contains(&payload));
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test]
    fn test_replay_error_stops_sequence() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_CODE);
        mock.queue_u16(0x6583);
        mock.queue_u16(0);
        // Watchdog write is echoed wrong
        mock.queue_u8(CMD_READ32);

        let (mut manager, observer) = manager(&mock);
        let err = manager.replay(b"x", true, false).unwrap_err();
        assert!(matches!(err, BromError::Desync { .. }));
        assert_eq!(started_steps(&observer), vec![ReplayStep::DisableWatchdog]);
    }
}
