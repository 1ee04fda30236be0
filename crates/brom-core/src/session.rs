//! BROM Session - High-level orchestrator for one device connection.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::brom::Brom;
use crate::capture::{CaptureSink, receive_greedy, receive_records};
use crate::error::BromError;
use crate::events::{BromEvent, BromObserver, TracingObserver};
use crate::manager::{DeviceIdentity, DeviceManager};
use crate::platform::PlatformKind;
use crate::protocol::constants::{BROM_PRODUCT_ID, MEDIATEK_VENDOR_ID};
use crate::transport::{ByteStream, NusbTransport, TransportError, UsbTransport};

/// What to do once the handshake is done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    /// Print hardware info and exit.
    #[default]
    Identify,
    /// Full vendor bring-up, then upload and jump.
    Replay,
    /// Disable the watchdog, upload and jump.
    SimpleReplay,
}

/// How to treat data the payload sends after the jump.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaptureMode {
    #[default]
    None,
    /// Framed records, saved through a `CaptureSink`.
    Receive,
    /// Log everything, 4 bytes at a time.
    Greedy,
}

/// Configuration for a BROM session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub mode: SessionMode,
    /// Payload uploaded and started on the device.
    pub payload_path: Option<PathBuf>,
    /// First-stage DA for two-stage families.
    pub bootstrap_path: Option<PathBuf>,
    /// Do not drain the DA's greeting after the jump. Breaks piggyback
    /// payloads, useful for standalone ones.
    pub skip_remaining_data: bool,
    pub capture: CaptureMode,
    /// Where numbered dump files are written.
    pub capture_dir: PathBuf,
    pub vendor_id: u16,
    pub product_id: u16,
    /// Per-transfer timeout.
    pub read_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// 0 waits forever.
    pub wait_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            mode: SessionMode::default(),
            payload_path: None,
            bootstrap_path: None,
            skip_remaining_data: false,
            capture: CaptureMode::default(),
            capture_dir: PathBuf::from("."),
            vendor_id: MEDIATEK_VENDOR_ID,
            product_id: BROM_PRODUCT_ID,
            read_timeout_ms: 3000,
            poll_interval_ms: 250,
            wait_timeout_secs: 0,
        }
    }
}

impl SessionConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: SessionConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// What a session did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Identified(DeviceIdentity),
    Replayed {
        platform: PlatformKind,
        /// Records (receive mode) or words (greedy mode) captured.
        captured: usize,
    },
}

/// BROM Session - one connection from discovery to teardown.
///
/// The transport is owned by the session's stack frame; it is released and
/// the device reset however `run` returns.
pub struct BromSession<O: BromObserver> {
    config: SessionConfig,
    observer: Arc<O>,
    stop: Arc<AtomicBool>,
}

impl BromSession<TracingObserver> {
    /// Create a new session with default tracing observer.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_observer(config, Arc::new(TracingObserver))
    }
}

impl<O: BromObserver + 'static> BromSession<O> {
    /// Create a new session with a custom observer.
    pub fn with_observer(config: SessionConfig, observer: Arc<O>) -> Self {
        Self {
            config,
            observer,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Raised from outside to abandon the device wait, the handshake or
    /// greedy capture.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    fn load(path: &Option<PathBuf>, what: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = path else {
            return Ok(None);
        };
        let data = std::fs::read(path)
            .with_context(|| format!("Cannot read {} {}", what, path.display()))?;
        info!(
            path = %path.display(),
            "{} size {} bytes (0x{:X})",
            what,
            data.len(),
            data.len()
        );
        Ok(Some(data))
    }

    /// Run the session against the real device.
    #[instrument(skip(self, sink))]
    pub fn run(&mut self, sink: &mut dyn CaptureSink) -> Result<SessionOutcome> {
        // Read everything up front; a missing file should not cost a replug
        let payload = Self::load(&self.config.payload_path, "Payload")?;
        let bootstrap = Self::load(&self.config.bootstrap_path, "Bootstrap")?;

        let transport = self.wait_for_device()?;
        self.observer.on_event(&BromEvent::DeviceConnected {
            vid: transport.vendor_id(),
            pid: transport.product_id(),
        });

        self.run_with(transport, payload, bootstrap, sink)
    }

    /// Run the session over an already opened link.
    pub fn run_with<T: UsbTransport>(
        &self,
        link: T,
        payload: Option<Vec<u8>>,
        bootstrap: Option<Vec<u8>>,
        sink: &mut dyn CaptureSink,
    ) -> Result<SessionOutcome> {
        let observer: Arc<dyn BromObserver> = self.observer.clone();
        let stream = ByteStream::new(link, observer)
            .with_timeout(Duration::from_millis(self.config.read_timeout_ms));
        let mut brom = Brom::new(stream);

        brom.handshake_until(&self.stop).context("Handshake error")?;

        let mut manager = DeviceManager::new(brom);
        if let Some(bootstrap) = bootstrap {
            manager = manager.with_bootstrap(bootstrap);
        }

        let simple_mode = match self.config.mode {
            SessionMode::Identify => {
                let identity = manager.identify().context("Identification error")?;
                return Ok(SessionOutcome::Identified(identity));
            }
            SessionMode::Replay => false,
            SessionMode::SimpleReplay => true,
        };

        let payload = payload.ok_or_else(|| anyhow!("Replay needs a payload"))?;
        let platform = manager
            .replay(&payload, simple_mode, self.config.skip_remaining_data)
            .context("Replay error")?;

        let captured = match self.config.capture {
            CaptureMode::None => 0,
            CaptureMode::Receive => receive_records(manager.brom(), sink)?,
            CaptureMode::Greedy => receive_greedy(manager.brom(), &self.stop)?,
        };

        Ok(SessionOutcome::Replayed { platform, captured })
    }

    fn wait_for_device(&self) -> Result<NusbTransport> {
        info!("Waiting for device...");
        let timeout = match self.config.wait_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let start = Instant::now();
        let mut poll_count = 0u64;

        loop {
            if self.stop.load(Ordering::SeqCst) {
                return Err(BromError::Interrupted.into());
            }
            poll_count += 1;

            match NusbTransport::open_with_ids(self.config.vendor_id, self.config.product_id) {
                Ok(t) => {
                    info!(
                        vid = format!("{:04X}", t.vendor_id()),
                        pid = format!("{:04X}", t.product_id()),
                        "Device found after {} polls",
                        poll_count
                    );
                    return Ok(t);
                }
                Err(TransportError::DeviceNotFound { .. }) => {
                    if let Some(timeout) = timeout
                        && start.elapsed() > timeout
                    {
                        return Err(anyhow!(
                            "Timeout waiting for device after {}s",
                            timeout.as_secs()
                        ));
                    }
                    thread::sleep(interval);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}
