//! Duplex byte streams.
//!
//! [`Stream`] is the capability the handshake and sync layers need from a
//! transport: exact reads, whole writes and teardown. Transports are
//! pluggable, so this is a trait object rather than a closed enum.

use std::io::ErrorKind;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex};

use crate::error::StreamError;

/// A bidirectional byte channel to one peer.
///
/// Methods take `&self` so one task can read while another writes. Once
/// [`close`](Stream::close) is called, pending and future reads and writes
/// fail with [`StreamError::Closed`] instead of hanging.
#[async_trait]
pub trait Stream: Send + Sync {
    /// Fill `buf` completely, or fail.
    async fn read(&self, buf: &mut [u8]) -> Result<(), StreamError>;

    /// Write all of `buf`, or fail.
    async fn write(&self, buf: &[u8]) -> Result<(), StreamError>;

    /// False once the stream was closed or hit an I/O error.
    fn is_valid(&self) -> bool;

    async fn close(&self);
}

/// A [`Stream`] over any tokio I/O object.
pub struct IoStream<T> {
    reader: Mutex<ReadHalf<T>>,
    writer: Mutex<WriteHalf<T>>,
    valid: AtomicBool,
    closed: watch::Sender<bool>,
}

impl<T: AsyncRead + AsyncWrite + Send + 'static> IoStream<T> {
    pub fn new(io: T) -> Self {
        let (reader, writer) = tokio::io::split(io);
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            valid: AtomicBool::new(true),
            closed: watch::channel(false).0,
        }
    }

    fn fail(&self, err: std::io::Error) -> StreamError {
        self.valid.store(false, Ordering::Release);
        match err.kind() {
            ErrorKind::UnexpectedEof
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted => StreamError::Closed,
            _ => StreamError::Io(err),
        }
    }
}

/// Resolves once `close` has been called.
async fn closed(mut rx: watch::Receiver<bool>) {
    // The sender lives as long as the stream, so an error means teardown.
    let _ = rx.wait_for(|closed| *closed).await;
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Send + 'static> Stream for IoStream<T> {
    async fn read(&self, buf: &mut [u8]) -> Result<(), StreamError> {
        let closing = self.closed.subscribe();
        if !self.is_valid() {
            return Err(StreamError::Closed);
        }

        tokio::select! {
            _ = closed(closing) => Err(StreamError::Closed),
            result = async {
                let mut reader = self.reader.lock().await;
                reader.read_exact(buf).await
            } => result.map(|_| ()).map_err(|e| self.fail(e)),
        }
    }

    async fn write(&self, buf: &[u8]) -> Result<(), StreamError> {
        let closing = self.closed.subscribe();
        if !self.is_valid() {
            return Err(StreamError::Closed);
        }

        tokio::select! {
            _ = closed(closing) => Err(StreamError::Closed),
            result = async {
                let mut writer = self.writer.lock().await;
                writer.write_all(buf).await?;
                writer.flush().await
            } => result.map_err(|e| self.fail(e)),
        }
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    async fn close(&self) {
        self.valid.store(false, Ordering::Release);
        self.closed.send_replace(true);
        // Pending I/O has released the halves after observing `closed`.
        let _ = self.writer.lock().await.shutdown().await;
    }
}

/// In-memory streams.
pub mod memory {
    use super::*;
    pub use tokio::io::DuplexStream;

    /// Bytes buffered in each direction before writes wait for the reader.
    pub const PIPE_CAPACITY: usize = 64 * 1024;

    /// A connected pair of in-memory streams.
    pub fn pair() -> (IoStream<DuplexStream>, IoStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(PIPE_CAPACITY);
        (IoStream::new(a), IoStream::new(b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_exact_read_and_write() {
        let (a, b) = memory::pair();
        a.write(b"hello ").await.unwrap();
        a.write(b"world").await.unwrap();

        let mut buf = [0u8; 11];
        b.read(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello world");
    }

    #[tokio::test]
    async fn test_remote_close_fails_read() {
        let (a, b) = memory::pair();
        a.write(b"ab").await.unwrap();
        a.close().await;

        let mut buf = [0u8; 4];
        assert!(matches!(b.read(&mut buf).await, Err(StreamError::Closed)));
        assert!(!b.is_valid());
    }

    #[tokio::test]
    async fn test_local_close_wakes_pending_read() {
        let (a, _b) = memory::pair();
        let a = Arc::new(a);

        let reader = {
            let a = a.clone();
            tokio::spawn(async move {
                let mut buf = [0u8; 1];
                a.read(&mut buf).await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        a.close().await;

        let result = tokio::time::timeout(Duration::from_secs(1), reader)
            .await
            .expect("read should not hang")
            .unwrap();
        assert!(matches!(result, Err(StreamError::Closed)));
    }

    #[tokio::test]
    async fn test_closed_stream_rejects_io() {
        let (a, _b) = memory::pair();
        a.close().await;
        assert!(!a.is_valid());
        assert!(matches!(a.write(b"x").await, Err(StreamError::Closed)));
    }
}
