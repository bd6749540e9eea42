//! Half-duplex stream transfer for an open brick link
//!
//! The driver owns both halves of the transport stream, the write queue, and
//! the `can_write` flag. It is only ever touched from the link task, which is
//! the sole mutual-exclusion mechanism for all stream state, including the
//! 2-byte header scratch buffer used by resumable header reads.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::codec::{self, HEADER_LEN};
use crate::connection::queue::WriteQueue;

pub(crate) struct StreamDriver<R, W> {
    reader: R,
    writer: W,
    queue: WriteQueue,
    can_write: bool,
    read_open: bool,
    inter_write_delay: Duration,
    header: [u8; HEADER_LEN],
    header_filled: usize,
}

impl<R, W> StreamDriver<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        max_pending_writes: usize,
        inter_write_delay: Duration,
    ) -> Self {
        Self {
            reader,
            writer,
            queue: WriteQueue::new(max_pending_writes),
            can_write: true,
            read_open: true,
            inter_write_delay,
            header: [0; HEADER_LEN],
            header_filled: 0,
        }
    }

    /// Whether the read side should still be polled.
    pub fn wants_read(&self) -> bool {
        self.read_open
    }

    /// Frame and enqueue a command, then drive a write attempt if the
    /// transport is writable. Returns true when a transfer completed and a
    /// space-available signal should be posted.
    pub async fn submit(&mut self, command: Bytes) -> bool {
        let frame = match codec::encode_frame(&command) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping command: {e}");
                return false;
            }
        };

        let evicted = self.queue.enqueue(frame);
        if evicted > 0 {
            warn!(
                evicted,
                pending = self.queue.len(),
                "write backlog full, dropped oldest commands"
            );
        }

        if self.can_write {
            self.attempt_write().await
        } else {
            false
        }
    }

    /// Mark the transport writable again and drive the next pending write.
    pub async fn space_available(&mut self) -> bool {
        self.can_write = true;
        self.attempt_write().await
    }

    /// Transfer the head of the queue. No-op when the queue is empty. The
    /// head is restored un-consumed when the transport accepts nothing; a
    /// short write keeps the unwritten remainder at the head, in-flight.
    async fn attempt_write(&mut self) -> bool {
        let Some(frame) = self.queue.dequeue_front() else {
            return false;
        };
        self.can_write = false;

        match self.writer.write(&frame).await {
            Ok(0) => {
                warn!("transport accepted no bytes, keeping command queued");
                self.queue.requeue_front(frame);
                false
            }
            Ok(n) => {
                if n < frame.len() {
                    debug!(
                        offered = frame.len(),
                        accepted = n,
                        "short write, remainder stays at head"
                    );
                    self.queue.requeue_front(frame.slice(n..));
                }
                // The brick drops frames written back-to-back; the pause runs
                // on the link task, so no other stream op proceeds during it.
                tokio::time::sleep(self.inter_write_delay).await;
                true
            }
            Err(e) => {
                warn!("write failed: {e}");
                self.queue.requeue_front(frame);
                false
            }
        }
    }

    /// Read into the 2-byte header buffer. Resumable: progress persists in
    /// the driver, so a cancelled poll loses nothing. Returns the payload
    /// length once a complete header with a non-zero length has arrived.
    pub async fn fill_header(&mut self) -> Option<u16> {
        match self.reader.read(&mut self.header[self.header_filled..]).await {
            Ok(0) => {
                debug!("input stream closed by peer");
                self.read_open = false;
                None
            }
            Ok(n) => {
                self.header_filled += n;
                if self.header_filled < HEADER_LEN {
                    return None;
                }
                self.header_filled = 0;

                let len = codec::decode_length(self.header[0], self.header[1]);
                if len == 0 {
                    warn!("zero-length frame header, discarding");
                    return None;
                }
                Some(len)
            }
            Err(e) => {
                warn!("header read failed: {e}");
                self.read_open = false;
                None
            }
        }
    }

    /// Read the payload declared by a frame header. A truncated or failed
    /// payload read discards the frame and stops read polling; the
    /// connection itself stays open.
    pub async fn read_payload(&mut self, len: u16) -> Option<Bytes> {
        let mut payload = vec![0u8; len as usize];
        match self.reader.read_exact(&mut payload).await {
            Ok(_) => Some(Bytes::from(payload)),
            Err(e) => {
                warn!(expected = len, "truncated frame payload: {e}");
                self.read_open = false;
                None
            }
        }
    }

    /// Flush and shut the write half down.
    pub async fn shutdown(&mut self) {
        if let Err(e) = self.writer.shutdown().await {
            debug!("shutdown failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    /// Accepts at most the next cap from `caps` per write call (unlimited
    /// once exhausted), recording each accepted chunk.
    struct ChunkWriter {
        caps: VecDeque<usize>,
        chunks: Vec<Vec<u8>>,
    }

    impl ChunkWriter {
        fn new(caps: &[usize]) -> Self {
            Self {
                caps: caps.iter().copied().collect(),
                chunks: Vec::new(),
            }
        }

        fn sent(&self) -> Vec<u8> {
            self.chunks.concat()
        }
    }

    impl AsyncWrite for ChunkWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            let this = self.get_mut();
            let cap = this.caps.pop_front().unwrap_or(usize::MAX);
            let n = buf.len().min(cap);
            if n > 0 {
                this.chunks.push(buf[..n].to_vec());
            }
            Poll::Ready(Ok(n))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct FailingWriter;

    impl AsyncWrite for FailingWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "gone")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    const FAST: Duration = Duration::from_millis(1);

    fn write_driver(caps: &[usize]) -> StreamDriver<tokio::io::Empty, ChunkWriter> {
        StreamDriver::new(tokio::io::empty(), ChunkWriter::new(caps), 2, FAST)
    }

    #[tokio::test]
    async fn completed_write_carries_frame_and_signals_space() {
        let mut driver = write_driver(&[]);
        assert!(driver.submit(Bytes::from_static(&[1, 2, 3])).await);

        assert_eq!(driver.writer.sent(), vec![3, 0, 1, 2, 3]);
        assert!(driver.queue.is_empty());
    }

    #[tokio::test]
    async fn short_write_retries_remainder_once_in_order() {
        let mut driver = write_driver(&[3]);
        let payload = Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]);

        // First attempt: transport accepts 3 of the 10 framed bytes
        assert!(driver.submit(payload).await);
        assert_eq!(driver.writer.chunks, vec![vec![8, 0, 1]]);
        assert_eq!(driver.queue.len(), 1);

        // Exactly one further attempt carries the remaining 7 bytes
        assert!(driver.space_available().await);
        assert_eq!(driver.writer.chunks.len(), 2);
        assert_eq!(driver.writer.chunks[1], vec![2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(driver.writer.sent(), vec![8, 0, 1, 2, 3, 4, 5, 6, 7, 8]);
        assert!(driver.queue.is_empty());
    }

    #[tokio::test]
    async fn zero_byte_write_preserves_head() {
        let mut driver = write_driver(&[0]);
        assert!(!driver.submit(Bytes::from_static(&[9, 9])).await);

        assert!(driver.writer.chunks.is_empty());
        assert_eq!(driver.queue.len(), 1);
        assert!(!driver.can_write);

        assert!(driver.space_available().await);
        assert_eq!(driver.writer.sent(), vec![2, 0, 9, 9]);
    }

    #[tokio::test]
    async fn write_error_preserves_head_and_blocks_writes() {
        let mut driver = StreamDriver::new(tokio::io::empty(), FailingWriter, 2, FAST);
        assert!(!driver.submit(Bytes::from_static(&[1])).await);

        assert_eq!(driver.queue.len(), 1);
        assert!(!driver.can_write);

        // Without a space signal, further submits only queue up
        assert!(!driver.submit(Bytes::from_static(&[2])).await);
        assert_eq!(driver.queue.len(), 2);
    }

    #[tokio::test]
    async fn submits_while_unwritable_evict_stale_commands() {
        let mut driver = write_driver(&[]);
        driver.can_write = false;

        for byte in [1u8, 2, 3] {
            assert!(!driver.submit(Bytes::copy_from_slice(&[byte])).await);
        }
        assert_eq!(driver.queue.len(), 2);

        // Drain: only the two most recent commands reach the wire
        assert!(driver.space_available().await);
        assert!(driver.space_available().await);
        assert!(!driver.space_available().await);
        assert_eq!(driver.writer.chunks, vec![vec![1, 0, 2], vec![1, 0, 3]]);
    }

    #[tokio::test]
    async fn oversized_command_dropped() {
        let mut driver = write_driver(&[]);
        let huge = Bytes::from(vec![0u8; codec::MAX_PAYLOAD_LEN + 1]);
        assert!(!driver.submit(huge).await);
        assert!(driver.queue.is_empty());
        assert!(driver.writer.chunks.is_empty());
    }

    fn read_driver(
        link: tokio::io::DuplexStream,
    ) -> StreamDriver<tokio::io::DuplexStream, tokio::io::Sink> {
        StreamDriver::new(link, tokio::io::sink(), 2, FAST)
    }

    #[tokio::test]
    async fn decodes_frame_from_wire() {
        let (mut brick, link) = tokio::io::duplex(64);
        let mut driver = read_driver(link);

        brick
            .write_all(&[0x05, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05])
            .await
            .unwrap();

        let len = driver.fill_header().await.expect("header");
        assert_eq!(len, 5);
        let payload = driver.read_payload(len).await.expect("payload");
        assert_eq!(&payload[..], &[0x01, 0x02, 0x03, 0x04, 0x05]);
        assert!(driver.wants_read());
    }

    #[tokio::test]
    async fn header_read_resumes_across_partial_delivery() {
        let (mut brick, link) = tokio::io::duplex(64);
        let mut driver = read_driver(link);

        brick.write_all(&[0x02]).await.unwrap();
        assert_eq!(driver.fill_header().await, None);

        brick.write_all(&[0x00, 0xAA, 0xBB]).await.unwrap();
        let len = driver.fill_header().await.expect("header");
        assert_eq!(len, 2);
        let payload = driver.read_payload(len).await.expect("payload");
        assert_eq!(&payload[..], &[0xAA, 0xBB]);
    }

    #[tokio::test]
    async fn zero_length_header_discarded_and_recovers() {
        let (mut brick, link) = tokio::io::duplex(64);
        let mut driver = read_driver(link);

        brick.write_all(&[0x00, 0x00, 0x01, 0x00, 0x7F]).await.unwrap();

        assert_eq!(driver.fill_header().await, None);
        assert!(driver.wants_read());

        let len = driver.fill_header().await.expect("header");
        assert_eq!(len, 1);
        let payload = driver.read_payload(len).await.expect("payload");
        assert_eq!(&payload[..], &[0x7F]);
    }

    #[tokio::test]
    async fn truncated_payload_discards_frame() {
        let (mut brick, link) = tokio::io::duplex(1024);
        let mut driver = read_driver(link);

        // Header declares 500 bytes but only 400 arrive before the peer goes away
        brick.write_all(&[0xF4, 0x01]).await.unwrap();
        brick.write_all(&vec![0u8; 400]).await.unwrap();
        drop(brick);

        let len = driver.fill_header().await.expect("header");
        assert_eq!(len, 500);
        assert_eq!(driver.read_payload(len).await, None);
        assert!(!driver.wants_read());
    }

    #[tokio::test]
    async fn end_of_stream_stops_read_polling() {
        let (brick, link) = tokio::io::duplex(64);
        let mut driver = read_driver(link);

        drop(brick);
        assert_eq!(driver.fill_header().await, None);
        assert!(!driver.wants_read());
    }
}
