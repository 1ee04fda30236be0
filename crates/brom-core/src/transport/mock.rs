//! Mock USB transport for testing.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::{TransportError, UsbTransport};
use crate::protocol::constants::{BROM_PRODUCT_ID, MEDIATEK_VENDOR_ID};

/// One scripted reply.
#[derive(Debug, Clone)]
enum Reply {
    Data(Vec<u8>),
    LinkReset,
    Timeout,
}

/// Mock transport for unit testing protocol logic.
///
/// Clones share state, so a test can keep a handle while the engine owns
/// another one.
#[derive(Clone)]
pub struct MockTransport {
    /// Queued replies to return on read.
    replies: Arc<Mutex<VecDeque<Reply>>>,
    /// Captured writes.
    write_log: Arc<Mutex<Vec<Vec<u8>>>>,
    /// Number of `reset()` calls.
    resets: Arc<Mutex<usize>>,
    /// Number of `read()` calls.
    reads: Arc<Mutex<usize>>,
    max_packet_size: usize,
    vid: u16,
    pid: u16,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            write_log: Arc::new(Mutex::new(Vec::new())),
            resets: Arc::new(Mutex::new(0)),
            reads: Arc::new(Mutex::new(0)),
            max_packet_size: 64,
            vid: MEDIATEK_VENDOR_ID,
            pid: BROM_PRODUCT_ID,
        }
    }

    /// Same mock, but IN transfers return at most `size` bytes.
    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size;
        self
    }

    /// Queue raw bytes to be returned as one packet.
    pub fn queue_bytes(&self, bytes: &[u8]) {
        self.replies
            .lock()
            .unwrap()
            .push_back(Reply::Data(bytes.to_vec()));
    }

    pub fn queue_u8(&self, value: u8) {
        self.queue_bytes(&[value]);
    }

    pub fn queue_u16(&self, value: u16) {
        self.queue_bytes(&value.to_be_bytes());
    }

    pub fn queue_u32(&self, value: u32) {
        self.queue_bytes(&value.to_be_bytes());
    }

    /// Queue a link fault; the next read fails with `LinkReset`.
    pub fn queue_link_reset(&self) {
        self.replies.lock().unwrap().push_back(Reply::LinkReset);
    }

    /// Queue a silent read; the next read times out even if more replies follow.
    pub fn queue_timeout(&self) {
        self.replies.lock().unwrap().push_back(Reply::Timeout);
    }

    /// Number of replies not consumed yet.
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }

    /// Get all captured writes.
    pub fn get_writes(&self) -> Vec<Vec<u8>> {
        self.write_log.lock().unwrap().clone()
    }

    /// All captured writes concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.get_writes().concat()
    }

    /// Clear captured writes.
    pub fn clear_writes(&self) {
        self.write_log.lock().unwrap().clear();
    }

    pub fn reset_count(&self) -> usize {
        *self.resets.lock().unwrap()
    }

    pub fn read_count(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl UsbTransport for MockTransport {
    fn write(&self, data: &[u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.write_log.lock().unwrap().push(data.to_vec());
        Ok(data.len())
    }

    fn read(&self, max_len: usize, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        *self.reads.lock().unwrap() += 1;
        let mut replies = self.replies.lock().unwrap();
        match replies.pop_front() {
            Some(Reply::Data(mut data)) => {
                if data.len() > max_len {
                    let rest = data.split_off(max_len);
                    replies.push_front(Reply::Data(rest));
                }
                Ok(data)
            }
            Some(Reply::LinkReset) => Err(TransportError::LinkReset("mock fault".into())),
            Some(Reply::Timeout) | None => Err(TransportError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    fn reset(&self) -> Result<(), TransportError> {
        *self.resets.lock().unwrap() += 1;
        Ok(())
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
