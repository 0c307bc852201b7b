//! Protocol engine: send a frame, then await its ack or data.
//!
//! The engine owns the transport. On start it splits the stream and spawns
//! two tasks:
//! 1. a writer task that serializes frames onto the write half
//! 2. a read loop that feeds every received byte into the pending queue
//!
//! A request cycle registers its slot in the queue *before* writing the
//! frame, so a fast reply can never race past its owner, and then suspends
//! on the slot's receiver until the read loop resolves it or the timeout
//! expires. Expired or dropped cycles remove their slot, so whatever the
//! sensor still sends for them is discarded rather than handed to the next
//! request.
//!
//! Only one cycle is in flight at a time (a single-permit semaphore); the
//! busy policy decides whether a second caller waits or fails with `Busy`.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{oneshot, Semaphore, SemaphorePermit};
use tokio::task::JoinHandle;

use crate::config::{BusyPolicy, DriverConfig};
use crate::error::{Bno055Error, Result};
use crate::mode::ModeState;
use crate::protocol::{
    decode_ack, decode_read_header, Command, ExpectedReply, PendingQueue, ResponseStatus, SlotId,
};
use crate::registers::{OperationMode, RegisterPage};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, WriterHandle, DEFAULT_CHANNEL_CAPACITY};

/// Size of the transport read buffer. Replies never exceed 130 bytes.
const READ_BUFFER_SIZE: usize = 256;

/// Protocol engine bound to one transport.
///
/// Dropping the engine stops both I/O tasks and releases the transport.
pub struct ProtocolEngine {
    queue: Arc<Mutex<PendingQueue>>,
    writer: WriterHandle,
    gate: Semaphore,
    pub(crate) state: Mutex<ModeState>,
    ack_timeout: Duration,
    data_timeout: Duration,
    settle_delay: Duration,
    busy_policy: BusyPolicy,
    strict_desync: bool,
    reader_task: JoinHandle<()>,
    writer_task: JoinHandle<()>,
}

impl ProtocolEngine {
    /// Take ownership of `transport` and start the I/O tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<T: Transport>(transport: T, config: &DriverConfig) -> Self {
        let (reader, write_half) = tokio::io::split(transport);
        let (writer, writer_task) = spawn_writer_task(write_half, DEFAULT_CHANNEL_CAPACITY);

        let queue = Arc::new(Mutex::new(PendingQueue::new()));
        let reader_task = tokio::spawn(read_loop(reader, queue.clone()));

        tracing::debug!(
            "Protocol engine started (ack {:?}, data {:?}, {:?})",
            config.ack_timeout,
            config.data_timeout,
            config.busy_policy
        );

        Self {
            queue,
            writer,
            gate: Semaphore::new(1),
            state: Mutex::new(ModeState::default()),
            ack_timeout: config.ack_timeout,
            data_timeout: config.data_timeout,
            settle_delay: config.effective_settle_delay(),
            busy_policy: config.busy_policy,
            strict_desync: config.strict_desync,
            reader_task,
            writer_task,
        }
    }

    /// Write one register. With `expect_ack` the sensor's `EE 01` is awaited
    /// for up to `T_ack`; without it the call returns once the frame is out.
    pub async fn write_register(&self, address: u8, value: u8, expect_ack: bool) -> Result<()> {
        let _permit = self.acquire().await?;
        self.write_cycle(address, value, expect_ack).await
    }

    /// Read `length` bytes starting at `address`.
    ///
    /// Returns exactly as many bytes as the sensor's read header declares.
    pub async fn read_register(&self, address: u8, length: usize) -> Result<Bytes> {
        let command = Command::read(address, length)?;
        let _permit = self.acquire().await?;
        self.read_cycle(command).await
    }

    /// Mode recorded from the last successful `OPR_MODE` write.
    pub fn mode(&self) -> OperationMode {
        self.state.lock().mode()
    }

    /// Page recorded from the last successful `PAGE_ID` write.
    pub fn page(&self) -> RegisterPage {
        self.state.lock().page()
    }

    /// Bytes discarded because no request was waiting for them.
    pub fn desync_count(&self) -> u64 {
        self.queue.lock().discarded_total()
    }

    /// Number of requests currently waiting on the transport.
    pub fn pending_requests(&self) -> usize {
        self.queue.lock().len()
    }

    /// Returns `true` once the read loop has stopped.
    pub fn is_closed(&self) -> bool {
        self.queue.lock().is_closed()
    }

    /// Take the in-flight permit according to the busy policy.
    pub(crate) async fn acquire(&self) -> Result<SemaphorePermit<'_>> {
        match self.busy_policy {
            BusyPolicy::Queue => self
                .gate
                .acquire()
                .await
                .map_err(|_| Bno055Error::TransportClosed),
            BusyPolicy::FailFast => self.gate.try_acquire().map_err(|_| Bno055Error::Busy),
        }
    }

    /// Work every cycle does before touching the transport: honor the
    /// settle deadline and account for bytes nobody claimed.
    async fn prepare(&self) -> Result<()> {
        let deadline = self.state.lock().settle_deadline();
        if let Some(deadline) = deadline {
            if deadline > tokio::time::Instant::now() {
                tracing::trace!("Waiting for mode settle");
                tokio::time::sleep_until(deadline).await;
            }
        }

        let discarded = self.queue.lock().take_discarded();
        if discarded > 0 {
            let after_unacked = self.state.lock().take_unacked_write();
            if self.strict_desync && !after_unacked {
                return Err(Bno055Error::ProtocolDesync { discarded });
            }
            tracing::debug!("{} stray bytes discarded before this request", discarded);
        } else {
            self.state.lock().take_unacked_write();
        }

        if self.is_closed() {
            return Err(Bno055Error::TransportClosed);
        }
        Ok(())
    }

    /// One write cycle. Caller holds the permit.
    pub(crate) async fn write_cycle(&self, address: u8, value: u8, expect_ack: bool) -> Result<()> {
        self.prepare().await?;
        self.state.lock().check_writable(address)?;

        let command = Command::write(address, value);
        tracing::debug!(
            "Write 0x{:02X} <- 0x{:02X} (ack: {})",
            address,
            value,
            expect_ack
        );

        match command.expected_reply(expect_ack) {
            ExpectedReply::Nothing => {
                self.writer.send(command.encode()).await?;
            }
            _ => {
                let (id, mut rx) = self.queue.lock().enqueue_ack();
                let slot = SlotGuard::new(&self.queue, id);
                self.writer.send(command.encode()).await?;

                let response = match wait_for(&mut rx, self.ack_timeout, &slot).await? {
                    Wait::Reply(bytes) => bytes,
                    Wait::Expired { .. } => {
                        tracing::warn!("No ack for write to 0x{:02X}", address);
                        return Err(Bno055Error::AckTimeout { address });
                    }
                };

                let status = match decode_ack(response) {
                    Ok(ack) if ack.is_success() => None,
                    Ok(ack) => Some(ack.status),
                    Err(_) => Some(ResponseStatus::Unknown(response[0])),
                };
                if let Some(status) = status {
                    tracing::warn!(
                        "Write to 0x{:02X} rejected: {:02X?} ({})",
                        address,
                        response,
                        status
                    );
                    return Err(Bno055Error::WriteRejected {
                        address,
                        response,
                        status,
                    });
                }
            }
        }

        self.state
            .lock()
            .record_write(address, value, expect_ack, self.settle_delay);
        Ok(())
    }

    /// One read cycle. Caller holds the permit.
    pub(crate) async fn read_cycle(&self, command: Command) -> Result<Bytes> {
        self.prepare().await?;

        let address = command.address();
        tracing::debug!("Read 0x{:02X} ({:?})", address, command);

        let (id, mut rx) = self.queue.lock().enqueue_read();
        let slot = SlotGuard::new(&self.queue, id);
        self.writer.send(command.encode()).await?;

        let header = match wait_for(&mut rx.header, self.ack_timeout, &slot).await? {
            Wait::Reply(bytes) => bytes,
            Wait::Expired { .. } => {
                tracing::warn!("No read header from 0x{:02X}", address);
                return Err(Bno055Error::ReadTimeout { address });
            }
        };

        let header = decode_read_header(header).inspect_err(|e| {
            tracing::warn!("Read of 0x{:02X} rejected: {}", address, e);
        })?;

        if let Command::Read { length, .. } = command {
            if header.length != length {
                tracing::debug!(
                    "Sensor declared {} bytes for a {}-byte read of 0x{:02X}",
                    header.length,
                    length,
                    address
                );
            }
        }

        if header.length == 0 {
            return Ok(Bytes::new());
        }

        match wait_for(&mut rx.data, self.data_timeout, &slot).await? {
            Wait::Reply(data) => Ok(data),
            Wait::Expired { received: 0 } => {
                tracing::warn!("No data from 0x{:02X}", address);
                Err(Bno055Error::ReadTimeout { address })
            }
            Wait::Expired { received } => {
                tracing::warn!(
                    "Short read from 0x{:02X}: {} of {} bytes",
                    address,
                    received,
                    header.length
                );
                Err(Bno055Error::ReadLengthMismatch {
                    expected: header.length as usize,
                    received,
                })
            }
        }
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        self.reader_task.abort();
        self.writer_task.abort();
        self.queue.lock().close();
        tracing::debug!("Protocol engine stopped");
    }
}

/// Read loop - feeds transport bytes into the pending queue.
async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, queue: Arc<Mutex<PendingQueue>>) {
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("Transport reached end of stream");
                break;
            }
            Ok(n) => {
                tracing::trace!("Received {:02X?}", &buf[..n]);
                queue.lock().push(&buf[..n]);
            }
            Err(e) => {
                tracing::error!("Transport read error: {}", e);
                break;
            }
        }
    }

    queue.lock().close();
}

/// Removes its slot from the queue when dropped, covering both timeouts
/// and callers that abandon the request future.
struct SlotGuard<'a> {
    queue: &'a Mutex<PendingQueue>,
    id: SlotId,
}

impl<'a> SlotGuard<'a> {
    fn new(queue: &'a Mutex<PendingQueue>, id: SlotId) -> Self {
        Self { queue, id }
    }

    /// Remove the slot now. `None` if it was already resolved.
    fn cancel(&self) -> Option<usize> {
        self.queue.lock().cancel(self.id)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.cancel();
    }
}

enum Wait<T> {
    Reply(T),
    Expired { received: usize },
}

/// Await one phase of a slot for at most `limit`.
async fn wait_for<T>(
    rx: &mut oneshot::Receiver<T>,
    limit: Duration,
    slot: &SlotGuard<'_>,
) -> Result<Wait<T>> {
    match tokio::time::timeout(limit, &mut *rx).await {
        Ok(Ok(value)) => Ok(Wait::Reply(value)),
        Ok(Err(_)) => Err(Bno055Error::TransportClosed),
        Err(_) => match slot.cancel() {
            Some(received) => Ok(Wait::Expired { received }),
            // Resolved between the deadline and the cancel
            None => rx
                .try_recv()
                .map(Wait::Reply)
                .map_err(|_| Bno055Error::TransportClosed),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncWriteExt, DuplexStream};

    fn engine(config: DriverConfig) -> (ProtocolEngine, DuplexStream) {
        let (host, device) = duplex(256);
        (ProtocolEngine::start(host, &config), device)
    }

    async fn expect_frame(device: &mut DuplexStream, frame: &[u8]) {
        let mut buf = vec![0u8; frame.len()];
        device.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, frame);
    }

    #[tokio::test]
    async fn test_write_with_ack() {
        let (engine, mut device) = engine(DriverConfig::default());

        let (result, _) = tokio::join!(engine.write_register(0x07, 0x00, true), async {
            expect_frame(&mut device, &[0xAA, 0x00, 0x07, 0x01, 0x00]).await;
            device.write_all(&[0xEE, 0x01]).await.unwrap();
        });

        assert!(result.is_ok());
        assert_eq!(engine.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_write_without_ack_returns_after_send() {
        let (engine, mut device) = engine(DriverConfig::default());

        engine.write_register(0x07, 0x01, false).await.unwrap();
        expect_frame(&mut device, &[0xAA, 0x00, 0x07, 0x01, 0x01]).await;

        assert_eq!(engine.page(), RegisterPage::Page1);
        assert_eq!(engine.pending_requests(), 0);
    }

    #[tokio::test]
    async fn test_error_sentinel_rejects_write() {
        let (engine, mut device) = engine(DriverConfig::default());

        let (result, _) = tokio::join!(engine.write_register(0x3F, 0x20, true), async {
            expect_frame(&mut device, &[0xAA, 0x00, 0x3F, 0x01, 0x20]).await;
            device.write_all(&[0xEE, 0x07]).await.unwrap();
        });

        match result {
            Err(Bno055Error::WriteRejected {
                address, status, ..
            }) => {
                assert_eq!(address, 0x3F);
                assert_eq!(status, ResponseStatus::WrongStartByte);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_read_returns_declared_bytes() {
        let (engine, mut device) = engine(DriverConfig::default());

        let (result, _) = tokio::join!(engine.read_register(0x00, 1), async {
            expect_frame(&mut device, &[0xAA, 0x01, 0x00, 0x01]).await;
            device.write_all(&[0xBB, 0x01, 0xA0]).await.unwrap();
        });

        assert_eq!(&result.unwrap()[..], &[0xA0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_timeout_leaves_no_slot() {
        let (engine, mut device) = engine(DriverConfig::default());

        let (result, _) = tokio::join!(engine.read_register(0x35, 1), async {
            expect_frame(&mut device, &[0xAA, 0x01, 0x35, 0x01]).await;
        });

        assert!(matches!(
            result,
            Err(Bno055Error::ReadTimeout { address: 0x35 })
        ));
        assert_eq!(engine.pending_requests(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_reports_busy() {
        let config = DriverConfig {
            busy_policy: BusyPolicy::FailFast,
            ..Default::default()
        };
        let (engine, _device) = engine(config);

        let first = engine.read_register(0x00, 1);
        tokio::pin!(first);

        // Drive the first cycle until it is waiting on the sensor
        tokio::select! {
            _ = &mut first => panic!("first read should still be waiting"),
            _ = tokio::time::sleep(Duration::from_millis(1)) => {}
        }

        let second = engine.read_register(0x00, 1).await;
        assert!(matches!(second, Err(Bno055Error::Busy)));
    }

    #[tokio::test]
    async fn test_closed_transport_fails_requests() {
        let (engine, device) = engine(DriverConfig::default());
        drop(device);

        // Let the read loop observe end of stream
        while !engine.is_closed() {
            tokio::task::yield_now().await;
        }

        let result = engine.read_register(0x00, 1).await;
        assert!(matches!(result, Err(Bno055Error::TransportClosed)));
    }
}
