//! Buffered byte stream over a physical USB transport.
//!
//! The BROM protocol is byte oriented while USB moves packets. Received
//! packets are appended to an owned FIFO and handed out in exactly the
//! sizes the protocol asks for; outgoing data is cut into fixed-size chunks.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::traits::{TransportError, UsbTransport};
use crate::events::{BromEvent, BromObserver, PacketDirection};
use crate::protocol::constants::{
    BROM_TIMEOUT, MAX_WRITE_CHUNK, PROGRESS_INTERVAL, PROGRESS_MIN_SIZE,
};

/// Decide whether an upload progress line is due.
fn progress_due(percent: usize, since_last: Option<Duration>) -> bool {
    percent == 0 || percent == 100 || since_last.is_none_or(|d| d >= PROGRESS_INTERVAL)
}

/// Ordered byte stream with durable receive buffering.
pub struct ByteStream<T: UsbTransport> {
    link: T,
    rx: VecDeque<u8>,
    observer: Arc<dyn BromObserver>,
    timeout: Duration,
    last_progress: Option<Instant>,
}

impl<T: UsbTransport> ByteStream<T> {
    pub fn new(link: T, observer: Arc<dyn BromObserver>) -> Self {
        Self {
            link,
            rx: VecDeque::new(),
            observer,
            timeout: BROM_TIMEOUT,
            last_progress: None,
        }
    }

    /// Override the default per-transfer timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn link(&self) -> &T {
        &self.link
    }

    pub fn observer(&self) -> &Arc<dyn BromObserver> {
        &self.observer
    }

    /// Bytes received but not consumed yet.
    pub fn buffered(&self) -> usize {
        self.rx.len()
    }

    /// Drop everything buffered so far.
    pub fn clear(&mut self) {
        self.rx.clear();
    }

    pub fn into_inner(self) -> T {
        self.link
    }

    /// Read exactly `size` bytes.
    ///
    /// Returns fewer bytes only when a physical transfer times out; `timeout`
    /// bounds each transfer, not the whole call. A link reset is answered
    /// with one device reset, the second one is propagated.
    pub fn read(
        &mut self,
        size: usize,
        timeout: Option<Duration>,
    ) -> Result<Vec<u8>, TransportError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let mut reset_done = false;

        while self.rx.len() < size {
            match self.link.read(self.link.max_packet_size(), timeout) {
                Ok(packet) => self.rx.extend(packet),
                Err(TransportError::Timeout { timeout_ms }) => {
                    debug!(timeout_ms, wanted = size, have = self.rx.len(), "Read timed out");
                    break;
                }
                Err(TransportError::LinkReset(msg)) if !reset_done => {
                    warn!(error = %msg, "Link reset, resetting device and retrying");
                    self.link.reset()?;
                    reset_done = true;
                }
                Err(e) => return Err(e),
            }
        }

        let n = size.min(self.rx.len());
        let data: Vec<u8> = self.rx.drain(..n).collect();
        self.observer.on_event(&BromEvent::Packet {
            direction: PacketDirection::Rx,
            data: data.clone(),
        });
        Ok(data)
    }

    /// Write `data` in chunks of at most `MAX_WRITE_CHUNK` bytes.
    pub fn write(&mut self, data: &[u8], timeout: Option<Duration>) -> Result<(), TransportError> {
        let timeout = timeout.unwrap_or(self.timeout);
        let total = data.len();
        let mut sent = 0;

        for chunk in data.chunks(MAX_WRITE_CHUNK) {
            self.observer.on_event(&BromEvent::Packet {
                direction: PacketDirection::Tx,
                data: chunk.to_vec(),
            });
            self.link.write(chunk, timeout)?;
            sent += chunk.len();
            self.report_progress(sent, total);
        }
        Ok(())
    }

    fn report_progress(&mut self, sent: usize, total: usize) {
        if total < PROGRESS_MIN_SIZE {
            return;
        }
        let percent = sent * 100 / total;
        let since_last = self.last_progress.map(|t| t.elapsed());
        if progress_due(percent, since_last) {
            self.observer
                .on_event(&BromEvent::Progress { sent, total });
            self.last_progress = Some(Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NullObserver;
    use crate::events::testing::RecordingObserver;
    use crate::transport::MockTransport;

    fn stream(mock: &MockTransport) -> ByteStream<MockTransport> {
        ByteStream::new(mock.clone(), Arc::new(NullObserver))
    }

    #[test]
    fn test_chunking_roundtrip() {
        let mock = MockTransport::new();
        let mut s = stream(&mock);
        let data: Vec<u8> = (0..3000u32).map(|i| (i * 7) as u8).collect();

        s.write(&data, None).unwrap();

        let writes = mock.get_writes();
        assert_eq!(writes.len(), 3);
        assert!(writes.iter().all(|w| w.len() <= MAX_WRITE_CHUNK));
        assert_eq!(writes[2].len(), 3000 - 2 * MAX_WRITE_CHUNK);
        assert_eq!(mock.written_bytes(), data);
    }

    #[test]
    fn test_read_reassembles_packets() {
        let mock = MockTransport::new().with_max_packet_size(3);
        mock.queue_bytes(&[1, 2, 3, 4, 5, 6, 7]);
        let mut s = stream(&mock);

        assert_eq!(s.read(2, None).unwrap(), vec![1, 2]);
        // Third byte of the first packet stays buffered
        assert_eq!(s.buffered(), 1);
        assert_eq!(s.read(5, None).unwrap(), vec![3, 4, 5, 6, 7]);
        assert_eq!(s.buffered(), 0);
    }

    #[test]
    fn test_short_read_on_timeout() {
        let mock = MockTransport::new();
        mock.queue_bytes(&[0xAA]);
        let mut s = stream(&mock);

        assert_eq!(s.read(4, None).unwrap(), vec![0xAA]);
        assert!(s.read(1, None).unwrap().is_empty());
    }

    #[test]
    fn test_single_reset_retry() {
        let mock = MockTransport::new();
        mock.queue_link_reset();
        mock.queue_u16(0x1234);
        let mut s = stream(&mock);

        assert_eq!(s.read(2, None).unwrap(), vec![0x12, 0x34]);
        assert_eq!(mock.reset_count(), 1);
    }

    #[test]
    fn test_second_reset_is_propagated() {
        let mock = MockTransport::new();
        mock.queue_link_reset();
        mock.queue_link_reset();
        let mut s = stream(&mock);

        assert!(matches!(s.read(2, None), Err(TransportError::LinkReset(_))));
        assert_eq!(mock.reset_count(), 1);
    }

    #[test]
    fn test_progress_due() {
        assert!(progress_due(0, Some(Duration::ZERO)));
        assert!(progress_due(100, Some(Duration::ZERO)));
        assert!(progress_due(42, None));
        assert!(!progress_due(42, Some(Duration::from_millis(10))));
        assert!(progress_due(42, Some(Duration::from_millis(300))));
    }

    #[test]
    fn test_progress_reported_for_uploads_only() {
        let mock = MockTransport::new();
        let observer = Arc::new(RecordingObserver::default());
        let mut s = ByteStream::new(mock.clone(), observer.clone());

        s.write(&[0xD7], None).unwrap();
        assert!(
            !observer
                .events()
                .iter()
                .any(|e| matches!(e, BromEvent::Progress { .. }))
        );

        s.write(&vec![0u8; 2048], None).unwrap();
        let progress: Vec<(usize, usize)> = observer
            .events()
            .into_iter()
            .filter_map(|e| match e {
                BromEvent::Progress { sent, total } => Some((sent, total)),
                _ => None,
            })
            .collect();
        assert_eq!(progress.last(), Some(&(2048, 2048)));
    }
}
