//! nusb-based USB transport implementation.
//!
//! The BROM enumerates as a CDC ACM device: interface 0 is the control
//! interface, the bulk pair lives on the CDC data interface.

use std::thread;
use std::time::Duration;

use nusb::transfer::{
    Buffer, Bulk, ControlOut, ControlType, Direction, In, Out, Recipient, TransferError,
};
use nusb::{Device, Interface, MaybeFuture, list_devices};
use tracing::{debug, info, instrument, warn};

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{
    BROM_BAUDRATE, BROM_INTERFACES, CDC_DATA_CLASS, CDC_SET_LINE_CODING, LINE_CODING_TAIL,
    STOP_SETTLE_DELAY,
};

/// nusb-based USB transport.
///
/// Dropping the transport releases the interfaces, resets the device and
/// hands it back to the kernel driver.
#[derive(Debug)]
pub struct NusbTransport {
    device: Device,
    interfaces: Vec<Interface>,
    data_interface: u8,
    in_endpoint: u8,
    out_endpoint: u8,
    max_packet_size: usize,
    vid: u16,
    pid: u16,
    stopped: bool,
}

fn map_transfer_error(e: TransferError, timeout: Duration) -> TransportError {
    match e {
        TransferError::Cancelled => TransportError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        },
        TransferError::Disconnected => TransportError::Disconnected,
        TransferError::Stall | TransferError::Fault => TransportError::LinkReset(e.to_string()),
        other => TransportError::ReadFailed(other.to_string()),
    }
}

fn reattach_drivers(device: &Device) {
    #[cfg(target_os = "linux")]
    for &iface in &BROM_INTERFACES {
        if let Err(e) = device.attach_kernel_driver(iface) {
            debug!(interface = iface, error = %e, "Could not reattach kernel driver");
        }
    }
    #[cfg(not(target_os = "linux"))]
    let _ = device;
}

/// Runs `restore` on drop unless disarmed.
struct RestoreGuard<F: FnOnce()> {
    restore: Option<F>,
}

impl<F: FnOnce()> RestoreGuard<F> {
    fn new(restore: F) -> Self {
        Self {
            restore: Some(restore),
        }
    }

    fn disarm(mut self) {
        self.restore = None;
    }
}

impl<F: FnOnce()> Drop for RestoreGuard<F> {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            restore();
        }
    }
}

impl NusbTransport {
    /// Open the device with specific VID/PID and put the link into a known state.
    #[instrument(level = "info", fields(vid = format!("{:04X}", vid), pid = format!("{:04X}", pid)))]
    pub fn open_with_ids(vid: u16, pid: u16) -> Result<Self, TransportError> {
        let device_info = list_devices()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?
            .find(|d| d.vendor_id() == vid && d.product_id() == pid)
            .ok_or(TransportError::DeviceNotFound { vid, pid })?;

        info!(
            vendor_id = %format!("{:04X}", vid),
            product_id = %format!("{:04X}", pid),
            "Found device"
        );

        let device = device_info
            .open()
            .wait()
            .map_err(|e| TransportError::OpenFailed(e.to_string()))?;

        #[cfg(target_os = "linux")]
        for &iface in &BROM_INTERFACES {
            // Fails harmlessly when no driver is bound
            if let Err(e) = device.detach_kernel_driver(iface) {
                debug!(interface = iface, error = %e, "No kernel driver detached");
            }
        }

        // Until the transport exists, its Drop cannot hand the device back
        let restore = device.clone();
        let guard = RestoreGuard::new(move || reattach_drivers(&restore));

        let transport = Self::setup(device, vid, pid)?;
        guard.disarm();
        Ok(transport)
    }

    /// Configure, claim and start the link on a device whose drivers are
    /// already detached.
    fn setup(device: Device, vid: u16, pid: u16) -> Result<Self, TransportError> {
        let active = device
            .active_configuration()
            .map_err(|e| TransportError::ConfigurationFailed(e.to_string()))?;
        if active.configuration_value() != 1 {
            device
                .set_configuration(1)
                .wait()
                .map_err(|e| TransportError::ConfigurationFailed(e.to_string()))?;
        }

        let mut interfaces = Vec::with_capacity(BROM_INTERFACES.len());
        for &iface in &BROM_INTERFACES {
            let interface = device.claim_interface(iface).wait().map_err(|e| {
                TransportError::ClaimInterfaceFailed {
                    interface: iface,
                    message: e.to_string(),
                }
            })?;
            interfaces.push(interface);
        }

        // Find BULK endpoints on the CDC data interface
        let config = device
            .active_configuration()
            .map_err(|e| TransportError::ConfigurationFailed(e.to_string()))?;

        let mut data_interface: Option<u8> = None;
        let mut in_endpoint: u8 = 0;
        let mut out_endpoint: u8 = 0;
        let mut max_packet_size: usize = 0;

        for alt in config.interface_alt_settings() {
            if alt.class() != CDC_DATA_CLASS {
                continue;
            }
            data_interface = Some(alt.interface_number());
            for ep in alt.endpoints() {
                if ep.transfer_type() == nusb::descriptors::TransferType::Bulk {
                    if ep.direction() == Direction::In {
                        in_endpoint = ep.address();
                        max_packet_size = ep.max_packet_size();
                    } else {
                        out_endpoint = ep.address();
                    }
                }
            }
            break;
        }

        let data_interface = data_interface.ok_or_else(|| {
            TransportError::ConfigurationFailed("No CDC data interface".into())
        })?;
        if in_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "In".into(),
            });
        }
        if out_endpoint == 0 {
            return Err(TransportError::EndpointNotFound {
                ep_type: "Bulk".into(),
                direction: "Out".into(),
            });
        }

        let transport = Self {
            device,
            interfaces,
            data_interface,
            in_endpoint,
            out_endpoint,
            max_packet_size,
            vid,
            pid,
            stopped: false,
        };
        transport.set_line_coding()?;

        info!(
            in_ep = %format!("0x{:02X}", in_endpoint),
            out_ep = %format!("0x{:02X}", out_endpoint),
            max_packet_size,
            "USB transport started"
        );

        Ok(transport)
    }

    fn interface(&self, number: u8) -> Result<&Interface, TransportError> {
        self.interfaces
            .iter()
            .find(|i| i.interface_number() == number)
            .ok_or(TransportError::ClaimInterfaceFailed {
                interface: number,
                message: "interface not claimed".into(),
            })
    }

    /// CDC SET_LINE_CODING. Purely conventional, the BROM ignores the rate.
    fn set_line_coding(&self) -> Result<(), TransportError> {
        let mut line_coding = Vec::with_capacity(7);
        line_coding.extend_from_slice(&BROM_BAUDRATE.to_le_bytes());
        line_coding.extend_from_slice(&LINE_CODING_TAIL);

        self.interface(BROM_INTERFACES[0])?
            .control_out(
                ControlOut {
                    control_type: ControlType::Class,
                    recipient: Recipient::Interface,
                    request: CDC_SET_LINE_CODING,
                    value: 0,
                    index: 0,
                    data: &line_coding,
                },
                Duration::from_secs(1),
            )
            .wait()
            .map_err(|e| TransportError::ControlTransferFailed(e.to_string()))?;

        debug!(baudrate = BROM_BAUDRATE, "Line coding set");
        Ok(())
    }

    /// Release interfaces, reset the device and reattach kernel drivers.
    ///
    /// Errors are logged and swallowed; this runs on every exit path.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.interfaces.clear();

        if let Err(e) = self.device.reset().wait() {
            debug!(error = %e, "Could not reset device");
        }

        reattach_drivers(&self.device);

        thread::sleep(STOP_SETTLE_DELAY);
        info!("USB transport stopped");
    }
}

impl Drop for NusbTransport {
    fn drop(&mut self) {
        self.stop();
    }
}

impl UsbTransport for NusbTransport {
    #[instrument(skip(self, data), fields(len = data.len()))]
    fn write(&self, data: &[u8], timeout: Duration) -> Result<usize, TransportError> {
        let mut ep = self
            .interface(self.data_interface)?
            .endpoint::<Bulk, Out>(self.out_endpoint)
            .map_err(|e| TransportError::WriteFailed(e.to_string()))?;

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);

        ep.transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| match map_transfer_error(e, timeout) {
                TransportError::ReadFailed(msg) => TransportError::WriteFailed(msg),
                other => other,
            })?;

        Ok(data.len())
    }

    #[instrument(skip(self), fields(max_len))]
    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let mut ep = self
            .interface(self.data_interface)?
            .endpoint::<Bulk, In>(self.in_endpoint)
            .map_err(|e| TransportError::ReadFailed(e.to_string()))?;

        let mut buf = Buffer::new(max_len);
        buf.set_requested_len(max_len);

        let data = ep
            .transfer_blocking(buf, timeout)
            .into_result()
            .map_err(|e| map_transfer_error(e, timeout))?;

        Ok(data.to_vec())
    }

    fn reset(&self) -> Result<(), TransportError> {
        warn!("Resetting device");
        self.device
            .reset()
            .wait()
            .map_err(|e| TransportError::LinkReset(e.to_string()))
    }

    fn max_packet_size(&self) -> usize {
        self.max_packet_size
    }

    fn vendor_id(&self) -> u16 {
        self.vid
    }

    fn product_id(&self) -> u16 {
        self.pid
    }
}
