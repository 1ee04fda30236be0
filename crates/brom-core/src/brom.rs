//! BROM protocol engine.
//!
//! Translates protocol-level operations into framed command exchanges over
//! a [`ByteStream`]. Every opcode and argument is echoed back by the device
//! before it starts executing; a mismatch means we are out of sync and the
//! command is abandoned. Nothing here retries, except the handshake.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use byteorder::{BigEndian, ByteOrder};

use crate::error::{BromError, Result};
use crate::events::{BromEvent, BromObserver, LogLevel};
use crate::protocol::constants::*;
use crate::protocol::{Handshake, RegWidth, TargetConfig, hex};
use crate::transport::{ByteStream, UsbTransport};

/// Reply to `get_hw_sw_ver`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HwSwVersion {
    pub hw_sub_code: u16,
    pub hw_ver: u16,
    pub sw_ver: u16,
}

impl HwSwVersion {
    pub const fn new(hw_sub_code: u16, hw_ver: u16, sw_ver: u16) -> Self {
        Self {
            hw_sub_code,
            hw_ver,
            sw_ver,
        }
    }
}

/// Legacy firmware expects 16-bit words in the opposite byte order.
/// A trailing odd byte is dropped.
pub fn swap_halfwords(data: &[u8]) -> Vec<u8> {
    data.chunks_exact(2).flat_map(|pair| [pair[1], pair[0]]).collect()
}

/// Protocol engine wrapping the byte stream.
pub struct Brom<T: UsbTransport> {
    stream: ByteStream<T>,
}

impl<T: UsbTransport> Brom<T> {
    pub fn new(stream: ByteStream<T>) -> Self {
        Self { stream }
    }

    pub fn stream(&self) -> &ByteStream<T> {
        &self.stream
    }

    pub fn into_inner(self) -> ByteStream<T> {
        self.stream
    }

    pub fn observer(&self) -> Arc<dyn BromObserver> {
        self.stream.observer().clone()
    }

    pub(crate) fn emit(&self, event: BromEvent) {
        self.stream.observer().on_event(&event);
    }

    pub(crate) fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.emit(BromEvent::Log {
            level,
            message: message.into(),
        });
    }

    /// Replay narration.
    pub fn replay(&self, message: impl Into<String>) {
        self.log(LogLevel::Replay, message);
    }

    /// Advisory mismatch. Logged, never raised.
    pub fn advise(&self, message: impl Into<String>) {
        self.emit(BromEvent::Warning {
            message: message.into(),
        });
    }

    // ------------------------------------------------------------------
    // Framing primitives
    // ------------------------------------------------------------------

    /// Synchronize with the BROM. Loops until the device answers all four
    /// sync bytes with their complements, in order.
    pub fn handshake(&mut self) -> Result<()> {
        self.handshake_until(&AtomicBool::new(false))
    }

    /// Like [`Brom::handshake`], but gives up with `Interrupted` once `stop`
    /// is raised. Checked before every sync byte.
    pub fn handshake_until(&mut self, stop: &AtomicBool) -> Result<()> {
        let mut hs = Handshake::new();
        while let Some(byte) = hs.next_byte() {
            if stop.load(Ordering::SeqCst) {
                return Err(BromError::Interrupted);
            }
            self.stream.write(&[byte], None)?;
            let reply = self.stream.read(1, Some(HANDSHAKE_TIMEOUT))?;
            hs.feed(reply.first().copied());
        }
        self.emit(BromEvent::Synchronized);
        Ok(())
    }

    /// Write `data` and require the device to reflect it unchanged.
    pub fn echo_bytes(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write(data, None)?;
        let reply = self.stream.read(data.len(), None)?;
        if reply != data {
            return Err(BromError::Desync {
                expected: hex(data),
                actual: hex(&reply),
            });
        }
        Ok(())
    }

    pub fn echo_u8(&mut self, value: u8) -> Result<()> {
        self.echo_bytes(&[value])
    }

    pub fn echo_u16(&mut self, value: u16) -> Result<()> {
        self.echo_bytes(&value.to_be_bytes())
    }

    pub fn echo_u32(&mut self, value: u32) -> Result<()> {
        self.echo_bytes(&value.to_be_bytes())
    }

    fn read_exact(&mut self, size: usize, timeout: Option<Duration>) -> Result<Vec<u8>> {
        let data = self.stream.read(size, timeout)?;
        if data.len() != size {
            return Err(BromError::ShortRead {
                expected: size,
                actual: data.len(),
            });
        }
        Ok(data)
    }

    fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_exact(1, None)?[0])
    }

    fn read_u16(&mut self) -> Result<u16> {
        Ok(BigEndian::read_u16(&self.read_exact(2, None)?))
    }

    fn read_u32(&mut self) -> Result<u32> {
        Ok(BigEndian::read_u32(&self.read_exact(4, None)?))
    }

    fn read_word(&mut self, width: RegWidth) -> Result<u32> {
        match width {
            RegWidth::Bits16 => self.read_u16().map(u32::from),
            RegWidth::Bits32 => self.read_u32(),
        }
    }

    fn echo_word(&mut self, width: RegWidth, word: u32) -> Result<()> {
        match width {
            RegWidth::Bits16 => self.echo_u16(word as u16),
            RegWidth::Bits32 => self.echo_u32(word),
        }
    }

    /// Read a status word; anything but zero aborts the command.
    fn check_status(&mut self, command: &'static str) -> Result<()> {
        let status = self.read_u16()?;
        if status != STATUS_OK {
            return Err(BromError::Status { command, status });
        }
        Ok(())
    }

    /// Read a word that must equal `expected`.
    fn check_response(&mut self, command: &'static str, expected: u16) -> Result<()> {
        let actual = self.read_u16()?;
        if actual != expected {
            return Err(BromError::UnexpectedResponse {
                command,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn to_u32_len(len: usize) -> Result<u32> {
        u32::try_from(len).map_err(|_| BromError::PayloadTooLarge(len))
    }

    /// Bytes from the link without issuing a command. May be short.
    pub fn just_read(&mut self, size: usize) -> Result<Vec<u8>> {
        Ok(self.stream.read(size, None)?)
    }

    /// Bytes to the link without issuing a command.
    pub fn just_write(&mut self, data: &[u8]) -> Result<()> {
        Ok(self.stream.write(data, None)?)
    }

    // ------------------------------------------------------------------
    // Register access
    // ------------------------------------------------------------------

    fn read_reg(
        &mut self,
        width: RegWidth,
        addr: u32,
        amount: u32,
        check_status: bool,
    ) -> Result<Vec<u32>> {
        self.log(
            LogLevel::Command,
            format!("read{}(0x{:08X}, {})", width, addr, amount),
        );
        self.echo_u8(width.read_opcode(check_status))?;
        self.echo_u32(addr)?;
        self.echo_u32(amount)?;

        if check_status {
            let status = self.read_u16()?;
            if status > STATUS_READ_MAX {
                return Err(BromError::Status {
                    command: "read register",
                    status,
                });
            }
        }

        let mut words = Vec::with_capacity(amount as usize);
        for _ in 0..amount {
            words.push(self.read_word(width)?);
        }

        if check_status {
            let status = self.read_u16()?;
            if status > STATUS_READ_MAX {
                return Err(BromError::Status {
                    command: "read register",
                    status,
                });
            }
        }

        Ok(words)
    }

    /// Read `amount` contiguous 16-bit registers.
    pub fn read16_words(&mut self, addr: u32, amount: u32, check_status: bool) -> Result<Vec<u16>> {
        let words = self.read_reg(RegWidth::Bits16, addr, amount, check_status)?;
        Ok(words.into_iter().map(|w| w as u16).collect())
    }

    /// Read `amount` contiguous 32-bit registers.
    pub fn read32_words(&mut self, addr: u32, amount: u32, check_status: bool) -> Result<Vec<u32>> {
        self.read_reg(RegWidth::Bits32, addr, amount, check_status)
    }

    pub fn read16(&mut self, addr: u32) -> Result<u16> {
        Ok(self.read16_words(addr, 1, true)?[0])
    }

    pub fn read16_unchecked(&mut self, addr: u32) -> Result<u16> {
        Ok(self.read16_words(addr, 1, false)?[0])
    }

    pub fn read32(&mut self, addr: u32) -> Result<u32> {
        Ok(self.read32_words(addr, 1, true)?[0])
    }

    pub fn read32_unchecked(&mut self, addr: u32) -> Result<u32> {
        Ok(self.read32_words(addr, 1, false)?[0])
    }

    /// Some SoCs acknowledge with 0x0000, others with 0x0001; the caller
    /// says which.
    fn write_reg(
        &mut self,
        width: RegWidth,
        addr: u32,
        words: &[u32],
        expected_response: u16,
        check_status: bool,
    ) -> Result<()> {
        let rendered: Vec<String> = words
            .iter()
            .map(|w| format!("{:0w$X}", w, w = width.size() * 2))
            .collect();
        self.log(
            LogLevel::Command,
            format!("write{}(0x{:08X}, [{}])", width, addr, rendered.join(", ")),
        );

        self.echo_u8(width.write_opcode(check_status))?;
        self.echo_u32(addr)?;
        self.echo_u32(Self::to_u32_len(words.len())?)?;

        if check_status {
            self.check_response("write register arguments", expected_response)?;
        }

        for &word in words {
            self.echo_word(width, word)?;
        }

        if check_status {
            self.check_response("write register", expected_response)?;
        }
        Ok(())
    }

    pub fn write16_words(
        &mut self,
        addr: u32,
        words: &[u16],
        expected_response: u16,
        check_status: bool,
    ) -> Result<()> {
        let words: Vec<u32> = words.iter().map(|&w| u32::from(w)).collect();
        self.write_reg(RegWidth::Bits16, addr, &words, expected_response, check_status)
    }

    pub fn write32_words(
        &mut self,
        addr: u32,
        words: &[u32],
        expected_response: u16,
        check_status: bool,
    ) -> Result<()> {
        self.write_reg(RegWidth::Bits32, addr, words, expected_response, check_status)
    }

    pub fn write16(&mut self, addr: u32, value: u16) -> Result<()> {
        self.write16_words(addr, &[value], STATUS_OK, true)
    }

    pub fn write16_unchecked(&mut self, addr: u32, value: u16) -> Result<()> {
        self.write16_words(addr, &[value], STATUS_OK, false)
    }

    pub fn write32(&mut self, addr: u32, value: u32) -> Result<()> {
        self.write32_words(addr, &[value], STATUS_OK, true)
    }

    // ------------------------------------------------------------------
    // Identification
    // ------------------------------------------------------------------

    pub fn get_target_config(&mut self) -> Result<TargetConfig> {
        self.log(LogLevel::Command, "Get target config");
        self.echo_u8(CMD_GET_TARGET_CONFIG)?;
        let raw = self.read_u32()?;
        self.check_status("get target config")?;
        Ok(TargetConfig::from_raw(raw))
    }

    /// Hardware code, or `HW_CODE_LEGACY` when the device never answers.
    pub fn get_hw_code(&mut self) -> Result<u16> {
        self.log(LogLevel::Command, "Get HW code");
        self.echo_u8(CMD_GET_HW_CODE)?;

        let hw_code = self.stream.read(2, Some(LEGACY_PROBE_TIMEOUT))?;
        if hw_code.is_empty() {
            self.advise("No response to get_hw_code! Is it a legacy device?");
            return Ok(HW_CODE_LEGACY);
        }
        if hw_code.len() != 2 {
            return Err(BromError::ShortRead {
                expected: 2,
                actual: hw_code.len(),
            });
        }

        self.check_status("get hw code")?;
        Ok(BigEndian::read_u16(&hw_code))
    }

    pub fn get_hw_sw_ver(&mut self) -> Result<HwSwVersion> {
        self.log(LogLevel::Command, "Get HW/SW version");
        self.echo_u8(CMD_GET_HW_SW_VER)?;
        let hw_sub_code = self.read_u16()?;
        let hw_ver = self.read_u16()?;
        let sw_ver = self.read_u16()?;
        self.check_status("get hw/sw version")?;
        Ok(HwSwVersion::new(hw_sub_code, hw_ver, sw_ver))
    }

    pub fn get_me_id(&mut self) -> Result<Vec<u8>> {
        self.log(LogLevel::Command, "Get ME ID");
        self.echo_u8(CMD_GET_ME_ID)?;
        let len = self.read_u32()?;
        if len == 0 {
            return Err(BromError::BadMeIdLength);
        }
        let me_id = self.read_exact(len as usize, None)?;
        self.check_status("get me id")?;
        Ok(me_id)
    }

    /// Single byte probe. Reflected opcode means the preloader is not running.
    pub fn get_preloader_version(&mut self) -> Result<u8> {
        self.log(LogLevel::Command, "Get PRELOADER version");
        self.stream.write(&[CMD_GET_PRELOADER_VERSION], None)?;
        let ver = self.read_u8()?;
        if ver == CMD_GET_PRELOADER_VERSION {
            self.advise("Cannot get PRELOADER version in BROM mode");
        }
        Ok(ver)
    }

    /// Single byte probe. Reflected opcode means we are talking to a preloader.
    pub fn get_brom_version(&mut self) -> Result<u8> {
        self.log(LogLevel::Command, "Get BROM version");
        self.stream.write(&[CMD_GET_BROM_VERSION], None)?;
        let ver = self.read_u8()?;
        if ver == CMD_GET_BROM_VERSION {
            self.advise("Cannot get BROM version in PRELOADER mode");
        }
        Ok(ver)
    }

    // ------------------------------------------------------------------
    // Download agent
    // ------------------------------------------------------------------

    /// Upload a download agent. Returns the device's checksum, which is
    /// informational only.
    pub fn send_da(&mut self, address: u32, payload: &[u8], sig_len: u32) -> Result<u16> {
        let len = Self::to_u32_len(payload.len())?;
        self.log(
            LogLevel::Command,
            format!(
                "Send Download Agent to 0x{:08X} ({} bytes, {} byte signature)",
                address, len, sig_len
            ),
        );
        self.echo_u8(CMD_SEND_DA)?;
        self.echo_u32(address)?;
        self.echo_u32(len)?;
        self.echo_u32(sig_len)?;
        self.check_status("send da")?;

        self.stream.write(payload, None)?;

        let checksum = self.read_u16()?;
        self.check_status("send da")?;
        Ok(checksum)
    }

    /// Upload for pre-checksum firmware: halfword-swapped, length in
    /// 16-bit words, no status.
    pub fn send_da_legacy(&mut self, address: u32, payload: &[u8]) -> Result<()> {
        let data = swap_halfwords(payload);
        let words = Self::to_u32_len(data.len() / 2)?;
        self.log(
            LogLevel::Command,
            format!(
                "Send Download Agent to 0x{:08X} ({} bytes)",
                address,
                data.len()
            ),
        );
        self.echo_u8(CMD_SEND_DA_LEGACY)?;
        self.echo_u32(address)?;
        self.echo_u32(words)?;
        self.stream.write(&data, None)?;
        Ok(())
    }

    /// Running checksum over `size` bytes previously uploaded at `address`.
    pub fn checksum_legacy(&mut self, address: u32, size: u32) -> Result<u16> {
        self.log(
            LogLevel::Command,
            format!("Calculating checksum for {} bytes at 0x{:08X}", size, address),
        );
        self.echo_u8(CMD_CHECKSUM_LEGACY)?;
        self.echo_u32(address)?;
        self.echo_u32(size / 2)?;
        self.read_u16()
    }

    pub fn jump_da(&mut self, address: u32, check_status: bool) -> Result<()> {
        self.log(
            LogLevel::Command,
            format!("Jump to Download Agent at 0x{:08X}", address),
        );
        let opcode = if check_status {
            CMD_JUMP_DA
        } else {
            CMD_JUMP_DA_NO_STATUS
        };
        self.echo_u8(opcode)?;
        self.echo_u32(address)?;
        if check_status {
            self.check_status("jump da")?;
        }
        Ok(())
    }

    pub fn uart1_log_enable(&mut self) -> Result<()> {
        self.log(LogLevel::Command, "Enable UART1 logging");
        self.echo_u8(CMD_UART1_LOG_EN)?;
        self.check_status("uart1 log enable")
    }

    // ------------------------------------------------------------------
    // PMIC sub-protocol
    // ------------------------------------------------------------------

    pub fn power_init(&mut self, reg: u32, val: u32) -> Result<()> {
        self.log(
            LogLevel::Command,
            format!("Init PMIC at 0x{:08X} ({:08X})", reg, val),
        );
        self.echo_u8(CMD_PWR_INIT)?;
        self.echo_u32(reg)?;
        self.echo_u32(val)?;
        self.check_status("power init")
    }

    pub fn power_deinit(&mut self) -> Result<()> {
        self.log(LogLevel::Command, "Deinit PMIC");
        self.echo_u8(CMD_PWR_DEINIT)?;
        self.check_status("power deinit")
    }

    pub fn power_read16(&mut self, reg: u16) -> Result<u16> {
        self.log(LogLevel::Command, format!("PMIC read16(0x{:04X})", reg));
        self.echo_u8(CMD_PWR_READ16)?;
        self.echo_u16(reg)?;
        self.check_response("power read16 ack", STATUS_OK)?;
        self.check_response("power read16", STATUS_OK)?;
        self.read_u16()
    }

    pub fn power_write16(&mut self, reg: u16, val: u16) -> Result<()> {
        self.log(
            LogLevel::Command,
            format!("PMIC write16(0x{:04X}, {:04X})", reg, val),
        );
        self.echo_u8(CMD_PWR_WRITE16)?;
        self.echo_u16(reg)?;
        self.echo_u16(val)?;
        self.check_response("power write16 ack", STATUS_OK)?;
        self.check_response("power write16", STATUS_OK)
    }

    // ------------------------------------------------------------------
    // Verified writes
    // ------------------------------------------------------------------

    /// Read, write, read back a PMIC register. `reference` is the value seen
    /// in the vendor capture; divergence is only reported.
    pub fn set_power_reg(&mut self, reg: u16, new_value: u16, reference: u16) -> Result<()> {
        let current = self.power_read16(reg)?;
        if current != reference {
            self.advise(format!(
                "PMIC reg 0x{:04X} is {:04X} but reference is {:04X}",
                reg, current, reference
            ));
        }

        // Written even when already set
        self.power_write16(reg, new_value)?;

        let check = self.power_read16(reg)?;
        if check != new_value {
            self.advise(format!(
                "Could not set PMIC reg 0x{:04X} to {:04X}, got {:04X}",
                reg, new_value, check
            ));
        }
        Ok(())
    }

    /// Read, write, read back a 16-bit register against a reference value.
    pub fn write16_verify(&mut self, addr: u32, new_value: u16, reference: u16) -> Result<()> {
        let old = self.read16(addr)?;
        if old != reference {
            self.advise(format!(
                "Read 0x{:08X}, got {:04X} but reference is {:04X}",
                addr, old, reference
            ));
        }

        self.write16(addr, new_value)?;

        let check = self.read16(addr)?;
        if check != new_value {
            self.advise(format!(
                "Set 0x{:08X} to {:04X} but it is {:04X}",
                addr, new_value, check
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::events::testing::RecordingObserver;
    use crate::transport::MockTransport;

    pub(crate) fn brom(mock: &MockTransport) -> Brom<MockTransport> {
        Brom::new(ByteStream::new(mock.clone(), Arc::new(NullObserver)))
    }

    /// Script the reflection of a register command header.
    pub(crate) fn queue_header(mock: &MockTransport, opcode: u8, addr: u32, count: u32) {
        mock.queue_u8(opcode);
        mock.queue_u32(addr);
        mock.queue_u32(count);
    }

    pub(crate) fn queue_read16(mock: &MockTransport, addr: u32, value: u16) {
        queue_header(mock, CMD_READ16, addr, 1);
        mock.queue_u16(0);
        mock.queue_u16(value);
        mock.queue_u16(0);
    }

    pub(crate) fn queue_write16(mock: &MockTransport, addr: u32, value: u16) {
        queue_header(mock, CMD_WRITE16, addr, 1);
        mock.queue_u16(0);
        mock.queue_u16(value);
        mock.queue_u16(0);
    }

    #[test]
    fn test_handshake_resyncs() {
        let mock = MockTransport::new();
        // Second byte is echoed instead of complemented
        mock.queue_u8(0x5F);
        mock.queue_u8(0x0A);
        // Garbage on the restart
        mock.queue_u8(0x00);
        for b in HANDSHAKE_SEQUENCE {
            mock.queue_u8(!b);
        }
        let mut brom = brom(&mock);
        brom.handshake().unwrap();

        let sent: Vec<u8> = mock.written_bytes();
        assert_eq!(sent, vec![0xA0, 0x0A, 0xA0, 0xA0, 0x0A, 0x50, 0x05]);
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test]
    fn test_handshake_stops_when_interrupted() {
        let mock = MockTransport::new();
        let mut brom = brom(&mock);
        let stop = AtomicBool::new(true);

        let err = brom.handshake_until(&stop).unwrap_err();
        assert!(matches!(err, BromError::Interrupted));
        assert!(mock.get_writes().is_empty());
    }

    #[test]
    fn test_echo() {
        let mock = MockTransport::new();
        mock.queue_u32(0x12345678);
        mock.queue_u32(0x12345679);
        let mut brom = brom(&mock);

        brom.echo_u32(0x12345678).unwrap();
        let err = brom.echo_u32(0x12345678).unwrap_err();
        assert!(matches!(err, BromError::Desync { .. }));
        assert_eq!(
            err.to_string(),
            "Unexpected output, expected 12345678 got 12345679"
        );
    }

    #[test]
    fn test_read16_checked() {
        let mock = MockTransport::new();
        queue_read16(&mock, 0xC1003000, 0x0008);
        let mut brom = brom(&mock);

        assert_eq!(brom.read16(0xC1003000).unwrap(), 0x0008);
        assert_eq!(
            mock.written_bytes(),
            vec![0xD0, 0xC1, 0x00, 0x30, 0x00, 0x00, 0x00, 0x00, 0x01]
        );
    }

    #[test]
    fn test_read32_vector_unchecked() {
        let mock = MockTransport::new();
        queue_header(&mock, CMD_READ32_NO_STATUS, 0x10000000, 2);
        mock.queue_u32(0x22002224);
        mock.queue_u32(0x00000FFF);
        let mut brom = brom(&mock);

        let words = brom.read32_words(0x10000000, 2, false).unwrap();
        assert_eq!(words, vec![0x22002224, 0x00000FFF]);
        assert_eq!(mock.pending_replies(), 0);
    }

    #[test]
    fn test_read_status_above_ff_is_error() {
        let mock = MockTransport::new();
        queue_header(&mock, CMD_READ16, 0x70026000, 1);
        mock.queue_u16(0x1D0C);
        let mut brom = brom(&mock);

        assert!(matches!(
            brom.read16(0x70026000),
            Err(BromError::Status { status: 0x1D0C, .. })
        ));
    }

    #[test]
    fn test_write16_expected_response() {
        let mock = MockTransport::new();
        queue_header(&mock, CMD_WRITE16, 0x70025000, 1);
        mock.queue_u16(0x0001);
        mock.queue_u16(0x2200);
        mock.queue_u16(0x0001);
        let mut brom = brom(&mock);
        brom.write16_words(0x70025000, &[0x2200], 0x0001, true)
            .unwrap();
    }

    #[test]
    fn test_write_rejects_other_response() {
        // Expecting 0x0001, device says 0x0000
        let mock = MockTransport::new();
        queue_header(&mock, CMD_WRITE32, 0x10000000, 1);
        mock.queue_u16(0x0000);
        let mut brom = brom(&mock);
        let err = brom
            .write32_words(0x10000000, &[0x22002224], 0x0001, true)
            .unwrap_err();
        assert!(matches!(
            err,
            BromError::UnexpectedResponse {
                expected: 0x0001,
                actual: 0x0000,
                ..
            }
        ));

        // Expecting 0x0000, device says 0x0001
        let mock = MockTransport::new();
        queue_header(&mock, CMD_WRITE32, 0x10000000, 1);
        mock.queue_u16(0x0001);
        let mut brom = self::brom(&mock);
        assert!(
            brom.write32_words(0x10000000, &[0x22002224], 0x0000, true)
                .is_err()
        );
    }

    #[test]
    fn test_hw_code_legacy_sentinel() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_CODE);
        let mut brom = brom(&mock);
        assert_eq!(brom.get_hw_code().unwrap(), HW_CODE_LEGACY);
    }

    #[test]
    fn test_hw_sw_ver() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_HW_SW_VER);
        mock.queue_u16(0x8B00);
        mock.queue_u16(0xCB00);
        mock.queue_u16(0xE201);
        mock.queue_u16(0);
        let mut brom = brom(&mock);
        assert_eq!(
            brom.get_hw_sw_ver().unwrap(),
            HwSwVersion::new(0x8B00, 0xCB00, 0xE201)
        );
    }

    #[test]
    fn test_me_id() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_ME_ID);
        mock.queue_u32(4);
        mock.queue_bytes(&[0xDE, 0xAD, 0xBE, 0xEF]);
        mock.queue_u16(0);
        let mut brom = brom(&mock);
        assert_eq!(brom.get_me_id().unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);

        mock.queue_u8(CMD_GET_ME_ID);
        mock.queue_u32(0);
        assert!(matches!(brom.get_me_id(), Err(BromError::BadMeIdLength)));
    }

    #[test]
    fn test_target_config_status() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_TARGET_CONFIG);
        mock.queue_u32(0x0000_0006);
        mock.queue_u16(0);
        let mut brom = brom(&mock);
        let cfg = brom.get_target_config().unwrap();
        assert!(cfg.secure_boot());
        assert!(cfg.serial_link_auth());
    }

    #[test]
    fn test_send_da_returns_device_checksum() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_SEND_DA);
        mock.queue_u32(0x12000000);
        mock.queue_u32(5);
        mock.queue_u32(0);
        mock.queue_u16(0);
        mock.queue_u16(0xBEEF);
        mock.queue_u16(0);
        let mut brom = brom(&mock);

        assert_eq!(brom.send_da(0x12000000, b"hello", 0).unwrap(), 0xBEEF);
        assert!(mock.get_writes().contains(&b"hello".to_vec()));
    }

    #[test]
    fn test_swap_halfwords() {
        assert_eq!(swap_halfwords(&[1, 2, 3, 4, 5]), vec![2, 1, 4, 3]);
        assert!(swap_halfwords(&[9]).is_empty());
    }

    #[test]
    fn test_send_da_legacy() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_SEND_DA_LEGACY);
        mock.queue_u32(0x40005000);
        mock.queue_u32(2);
        let mut brom = brom(&mock);

        brom.send_da_legacy(0x40005000, &[0x11, 0x22, 0x33, 0x44, 0x55])
            .unwrap();
        let writes = mock.get_writes();
        assert_eq!(writes.last().unwrap(), &vec![0x22, 0x11, 0x44, 0x33]);
    }

    #[test]
    fn test_checksum_legacy_halves_size() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_CHECKSUM_LEGACY);
        mock.queue_u32(0x40005000);
        mock.queue_u32(0x10);
        mock.queue_u16(0x5A5A);
        let mut brom = brom(&mock);
        assert_eq!(brom.checksum_legacy(0x40005000, 0x20).unwrap(), 0x5A5A);
    }

    #[test]
    fn test_jump_unchecked_reads_no_status() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_JUMP_DA_NO_STATUS);
        mock.queue_u32(0x08100000);
        let mut brom = brom(&mock);
        brom.jump_da(0x08100000, false).unwrap();
        assert_eq!(mock.read_count(), 2);
    }

    #[test]
    fn test_power_read16_two_status_words() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_PWR_READ16);
        mock.queue_u16(0x000E);
        mock.queue_u16(0);
        mock.queue_u16(0);
        mock.queue_u16(0x1001);
        let mut brom = brom(&mock);
        assert_eq!(brom.power_read16(0x000E).unwrap(), 0x1001);

        mock.queue_u8(CMD_PWR_READ16);
        mock.queue_u16(0x000E);
        mock.queue_u16(0);
        mock.queue_u16(0x0003);
        assert!(matches!(
            brom.power_read16(0x000E),
            Err(BromError::UnexpectedResponse { actual: 3, .. })
        ));
    }

    #[test]
    fn test_write16_verify_is_advisory() {
        let mock = MockTransport::new();
        // Reads back something other than the reference, and the write
        // does not stick; neither is fatal
        queue_read16(&mock, 0x7002FE84, 0x1234);
        queue_write16(&mock, 0x7002FE84, 0xFF04);
        queue_read16(&mock, 0x7002FE84, 0xFF00);

        let observer = Arc::new(RecordingObserver::default());
        let mut brom = Brom::new(ByteStream::new(mock.clone(), observer.clone()));
        brom.write16_verify(0x7002FE84, 0xFF04, 0xFF00).unwrap();

        let warnings = observer.warnings();
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("reference is FF00"));
        assert!(warnings[1].contains("but it is FF00"));
    }

    #[test]
    fn test_version_probes() {
        let mock = MockTransport::new();
        mock.queue_u8(0x05);
        mock.queue_u8(CMD_GET_PRELOADER_VERSION);
        let observer = Arc::new(RecordingObserver::default());
        let mut brom = Brom::new(ByteStream::new(mock.clone(), observer.clone()));
        assert_eq!(brom.get_brom_version().unwrap(), 0x05);
        assert_eq!(brom.get_preloader_version().unwrap(), 0xFE);
        assert_eq!(mock.written_bytes(), vec![0xFF, 0xFE]);
        assert_eq!(
            observer.warnings(),
            vec!["Cannot get PRELOADER version in BROM mode".to_string()]
        );
    }

    #[test]
    fn test_reflected_brom_version_warns() {
        let mock = MockTransport::new();
        mock.queue_u8(CMD_GET_BROM_VERSION);
        let observer = Arc::new(RecordingObserver::default());
        let mut brom = Brom::new(ByteStream::new(mock.clone(), observer.clone()));

        assert_eq!(brom.get_brom_version().unwrap(), CMD_GET_BROM_VERSION);
        assert_eq!(
            observer.warnings(),
            vec!["Cannot get BROM version in PRELOADER mode".to_string()]
        );
    }
}
