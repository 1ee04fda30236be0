//! Protocol constants for the MediaTek boot ROM download protocol.
//!
//! Opcodes and magic values as observed on the wire between SP Flash Tool
//! and the BROM of MT62xx/MT65xx parts.

use std::time::Duration;

// ============================================================================
// Device Identification
// ============================================================================

/// MediaTek Inc. Vendor ID
pub const MEDIATEK_VENDOR_ID: u16 = 0x0E8D;

/// Product ID exposed while the SoC is in BROM download mode
pub const BROM_PRODUCT_ID: u16 = 0x0003;

/// USB interface class of the CDC data interface carrying bulk traffic
pub const CDC_DATA_CLASS: u8 = 0x0A;

/// Interfaces claimed for the session (CDC control + CDC data)
pub const BROM_INTERFACES: [u8; 2] = [0, 1];

// ============================================================================
// Link setup
// ============================================================================

/// CDC SET_LINE_CODING request
pub const CDC_SET_LINE_CODING: u8 = 0x20;

/// Nominal line rate put into the line coding. The link is not a UART.
pub const BROM_BAUDRATE: u32 = 115_200;

/// Stop bits (1), parity (none), data bits (8)
pub const LINE_CODING_TAIL: [u8; 3] = [0x00, 0x00, 0x08];

// ============================================================================
// Timing & Sizes
// ============================================================================

/// Default timeout for a single physical transfer
pub const BROM_TIMEOUT: Duration = Duration::from_millis(3000);

/// Short timeout used when probing legacy parts that may never answer
pub const LEGACY_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Timeout for one handshake reply byte
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_millis(100);

/// Back-off between device discovery attempts
pub const DEVICE_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settling delay after the device has been released
pub const STOP_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Write chunk ceiling. SP Flash Tool ignores wMaxPacketSize and uses this.
pub const MAX_WRITE_CHUNK: usize = 1024;

/// Writes shorter than this are not reported as uploads
pub const PROGRESS_MIN_SIZE: usize = 16;

/// Minimum interval between two progress reports
pub const PROGRESS_INTERVAL: Duration = Duration::from_millis(300);

// ============================================================================
// Handshake
// ============================================================================

/// Sync sequence; the BROM answers each byte with its complement
pub const HANDSHAKE_SEQUENCE: [u8; 4] = [0xA0, 0x0A, 0x50, 0x05];

// ============================================================================
// Opcodes (Host -> Device)
// ============================================================================

pub const CMD_READ16: u8 = 0xD0;
pub const CMD_READ16_NO_STATUS: u8 = 0xA2;
pub const CMD_READ32: u8 = 0xD1;
pub const CMD_READ32_NO_STATUS: u8 = 0xAF;

pub const CMD_WRITE16: u8 = 0xD2;
pub const CMD_WRITE16_NO_STATUS: u8 = 0xA1;
pub const CMD_WRITE32: u8 = 0xD4;
pub const CMD_WRITE32_NO_STATUS: u8 = 0xAE;

pub const CMD_GET_TARGET_CONFIG: u8 = 0xD8;
pub const CMD_GET_HW_CODE: u8 = 0xFD;
pub const CMD_GET_HW_SW_VER: u8 = 0xFC;
pub const CMD_GET_ME_ID: u8 = 0xE1;
pub const CMD_GET_PRELOADER_VERSION: u8 = 0xFE;
pub const CMD_GET_BROM_VERSION: u8 = 0xFF;

pub const CMD_SEND_DA: u8 = 0xD7;
pub const CMD_SEND_DA_LEGACY: u8 = 0xAD;
pub const CMD_CHECKSUM_LEGACY: u8 = 0xA4;
pub const CMD_JUMP_DA: u8 = 0xD5;
pub const CMD_JUMP_DA_NO_STATUS: u8 = 0xA8;

pub const CMD_UART1_LOG_EN: u8 = 0xDB;

pub const CMD_PWR_INIT: u8 = 0xC4;
pub const CMD_PWR_DEINIT: u8 = 0xC5;
pub const CMD_PWR_READ16: u8 = 0xC6;
pub const CMD_PWR_WRITE16: u8 = 0xC7;

// ============================================================================
// Status words (Device -> Host)
// ============================================================================

/// Status words above this value signal a rejected register read
pub const STATUS_READ_MAX: u16 = 0x00FF;

/// Generic OK status
pub const STATUS_OK: u16 = 0x0000;

// ============================================================================
// Hardware codes
// ============================================================================

/// Reported in place of a hardware code by parts that never answer 0xFD
pub const HW_CODE_LEGACY: u16 = 0x0000;
pub const HW_CODE_MT6573: u16 = 0x6573;
/// Shared by MT6575 and MT6577 silicon
pub const HW_CODE_MT6575: u16 = 0x6575;
/// MT6589 reports 0x6583
pub const HW_CODE_MT6589: u16 = 0x6583;

// ============================================================================
// Post-jump capture framing
// ============================================================================

/// '>Mtk' sent by a payload before its first record
pub const CAPTURE_HELLO: u32 = 0x3E4D746B;

/// '<Mtk' sent in place of a record size once the payload is done
pub const CAPTURE_GOODBYE: u32 = 0x4D746B3C;
