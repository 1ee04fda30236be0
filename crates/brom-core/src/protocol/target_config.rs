//! Target configuration decoding.

use std::fmt;

/// Security policy bitmask returned by `get_target_config`.
///
/// Advisory only: nothing in the replay depends on these flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetConfig {
    raw: u32,
}

impl TargetConfig {
    const SECURE_BOOT: u32 = 1 << 1;
    const SERIAL_LINK_AUTH: u32 = 1 << 2;
    const DA_AUTH: u32 = 1 << 3;

    pub const fn from_raw(raw: u32) -> Self {
        Self { raw }
    }

    pub fn raw(&self) -> u32 {
        self.raw
    }

    pub fn secure_boot(&self) -> bool {
        self.raw & Self::SECURE_BOOT != 0
    }

    pub fn serial_link_auth(&self) -> bool {
        self.raw & Self::SERIAL_LINK_AUTH != 0
    }

    pub fn da_auth(&self) -> bool {
        self.raw & Self::DA_AUTH != 0
    }

    /// Human readable summary, one line per flag.
    pub fn describe(&self) -> Vec<String> {
        let yes_no = |b: bool| if b { "YES" } else { "NO" };
        vec![
            format!("Raw target config value: {:08X}", self.raw),
            format!("Secure boot: {}", yes_no(self.secure_boot())),
            format!("Serial link auth: {}", yes_no(self.serial_link_auth())),
            format!("Download agent auth: {}", yes_no(self.da_auth())),
        ]
    }
}

impl fmt::Display for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "0x{:08X} (SBC={}, SLA={}, DAA={})",
            self.raw,
            self.secure_boot(),
            self.serial_link_auth(),
            self.da_auth()
        )
    }
}
