//! Post-jump data capture.
//!
//! A cooperating payload frames what it sends: a HELLO magic, then records
//! of `u32 size` followed by `size` bytes, until the GOODBYE magic shows up
//! where the next size would be. Greedy mode ignores framing and logs
//! everything four bytes at a time.

use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{BigEndian, ByteOrder};

use crate::brom::Brom;
use crate::error::{BromError, Result};
use crate::events::LogLevel;
use crate::protocol::constants::{CAPTURE_GOODBYE, CAPTURE_HELLO};
use crate::protocol::hex;
use crate::transport::UsbTransport;

/// Destination for captured records.
pub trait CaptureSink {
    /// `index` counts from 1.
    fn record(&mut self, index: usize, data: &[u8]) -> anyhow::Result<()>;
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    pub records: Vec<Vec<u8>>,
}

impl CaptureSink for MemorySink {
    fn record(&mut self, _index: usize, data: &[u8]) -> anyhow::Result<()> {
        self.records.push(data.to_vec());
        Ok(())
    }
}

fn read_exact<T: UsbTransport>(brom: &mut Brom<T>, size: usize) -> Result<Vec<u8>> {
    let data = brom.just_read(size)?;
    if data.len() != size {
        return Err(BromError::ShortRead {
            expected: size,
            actual: data.len(),
        });
    }
    Ok(data)
}

fn read_word<T: UsbTransport>(brom: &mut Brom<T>) -> Result<u32> {
    let data = read_exact(brom, 4)?;
    Ok(BigEndian::read_u32(&data))
}

/// Receive framed records until GOODBYE. Returns the number of records.
pub fn receive_records<T: UsbTransport>(
    brom: &mut Brom<T>,
    sink: &mut dyn CaptureSink,
) -> anyhow::Result<usize> {
    brom.log(LogLevel::Info, "Waiting for custom payload response");

    let hello = read_word(brom)?;
    if hello == CAPTURE_HELLO {
        brom.log(LogLevel::Info, "Received HELLO sequence");
    } else {
        brom.advise(format!(
            "Received invalid data {:08X}, expected HELLO sequence",
            hello
        ));
    }

    let mut count = 0;
    loop {
        let size = read_word(brom)?;
        if size == CAPTURE_GOODBYE {
            break;
        }
        brom.log(LogLevel::Info, format!("Reading {} bytes", size));
        let data = read_exact(brom, size as usize)?;
        count += 1;
        sink.record(count, &data)?;
    }

    brom.log(LogLevel::Info, "Received GOODBYE sequence");
    Ok(count)
}

/// Log incoming words until the link goes quiet or `stop` is raised.
pub fn receive_greedy<T: UsbTransport>(brom: &mut Brom<T>, stop: &AtomicBool) -> Result<usize> {
    brom.log(LogLevel::Info, "Greedy mode! Waiting for incoming data...");
    let mut words = 0;

    while !stop.load(Ordering::SeqCst) {
        let data = brom.just_read(4)?;
        if data.is_empty() {
            brom.advise("Cannot receive data!");
            return Ok(words);
        }
        words += 1;
        brom.log(LogLevel::Info, format!("<- DA: {}", hex(&data)));
    }

    brom.log(LogLevel::Info, "Stopped reading");
    Ok(words)
}
