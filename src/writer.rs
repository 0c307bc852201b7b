//! Dedicated writer task owning the transport's write half.
//!
//! The engine never touches the write half directly. Frames travel over an
//! mpsc channel to a single task that writes and flushes them in order, and
//! each frame carries a completion channel so the sender learns when its
//! bytes have left the process.
//!
//! # Architecture
//!
//! ```text
//! Engine ─► mpsc::Sender<OutboundFrame> ─► Writer Task ─► Transport
//!   ▲                                         │
//!   └──────────── oneshot (io result) ◄───────┘
//! ```

use std::io;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{Bno055Error, Result};

/// Default channel capacity. One request is in flight at a time, so a small
/// queue is plenty.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 8;

/// A frame ready to be written to the transport.
#[derive(Debug)]
pub struct OutboundFrame {
    pub bytes: Bytes,
    done: oneshot::Sender<io::Result<()>>,
}

/// Handle for sending frames to the writer task.
///
/// Cheaply cloneable.
#[derive(Clone, Debug)]
pub struct WriterHandle {
    tx: mpsc::Sender<OutboundFrame>,
}

impl WriterHandle {
    /// Send a frame and wait until it has been written and flushed.
    pub async fn send(&self, bytes: Bytes) -> Result<()> {
        let (done, written) = oneshot::channel();
        self.tx
            .send(OutboundFrame { bytes, done })
            .await
            .map_err(|_| Bno055Error::TransportClosed)?;

        match written.await {
            Ok(result) => result.map_err(Bno055Error::Io),
            // Writer task exited before reporting
            Err(_) => Err(Bno055Error::TransportClosed),
        }
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// The task ends when every handle is dropped or the first write fails.
pub fn spawn_writer_task<W>(writer: W, channel_capacity: usize) -> (WriterHandle, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

async fn writer_loop<W>(mut rx: mpsc::Receiver<OutboundFrame>, mut writer: W)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = rx.recv().await {
        tracing::trace!("Writing frame {:02X?}", &frame.bytes[..]);
        let result = write_frame(&mut writer, &frame.bytes).await;
        let failed = result.is_err();
        if let Err(e) = &result {
            tracing::error!("Transport write failed: {}", e);
        }
        let _ = frame.done.send(result);
        if failed {
            break;
        }
    }
    let _ = writer.shutdown().await;
    tracing::debug!("Writer task stopped");
}

async fn write_frame<W>(writer: &mut W, bytes: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(bytes).await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{duplex, AsyncReadExt};

    #[tokio::test]
    async fn test_send_writes_bytes() {
        let (client, mut server) = duplex(64);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        handle
            .send(Bytes::from_static(&[0xAA, 0x01, 0x00, 0x01]))
            .await
            .unwrap();

        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xAA, 0x01, 0x00, 0x01]);
    }

    #[tokio::test]
    async fn test_frames_keep_order() {
        let (client, mut server) = duplex(64);
        let (handle, _task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        handle.send(Bytes::from_static(&[1, 2])).await.unwrap();
        handle.send(Bytes::from_static(&[3])).await.unwrap();

        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_shutdown_on_handle_drop() {
        let (client, _server) = duplex(64);
        let (handle, task) = spawn_writer_task(client, DEFAULT_CHANNEL_CAPACITY);

        drop(handle);

        assert!(task.await.is_ok());
    }

    struct BrokenPipe;

    impl AsyncWrite for BrokenPipe {
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

    #[tokio::test]
    async fn test_write_error_is_reported_and_stops_task() {
        let (handle, task) = spawn_writer_task(BrokenPipe, DEFAULT_CHANNEL_CAPACITY);

        let result = handle.send(Bytes::from_static(&[0xAA])).await;
        assert!(matches!(result, Err(Bno055Error::Io(_))));

        task.await.unwrap();
        let result = handle.send(Bytes::from_static(&[0xAA])).await;
        assert!(matches!(result, Err(Bno055Error::TransportClosed)));
    }
}
