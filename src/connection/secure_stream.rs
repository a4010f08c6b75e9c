//! Cipher-wrapped byte streams.
//!
//! A [`SecureStream`] owns one raw connection and shares one cipher. Reads
//! decrypt, writes encrypt. Closing is idempotent and wakes any read or
//! write blocked on the stream, which is how a tunnel tears down the
//! direction that did not fail.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::watch;

use crate::cipher::Cipher;
use crate::connection::buffer_pool::BufferPool;
use crate::error::{Error, Result};

/// Shared close flag for one stream.
///
/// Cloned into both halves of a split stream and into anyone who needs to
/// tear the stream down from outside.
#[derive(Clone)]
pub struct CloseHandle {
    inner: Arc<CloseState>,
}

struct CloseState {
    closed: AtomicBool,
    tx: watch::Sender<bool>,
}

impl CloseHandle {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            inner: Arc::new(CloseState {
                closed: AtomicBool::new(false),
                tx,
            }),
        }
    }

    /// Mark the stream closed. Returns `true` only for the call that closed it.
    pub fn close(&self) -> bool {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.tx.send_replace(true);
        true
    }

    /// Whether the stream has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Resolves once the stream is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.tx.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl std::fmt::Debug for CloseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloseHandle")
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Read half of a [`SecureStream`]: raw bytes in, decrypted bytes out.
pub struct SecureReader<R> {
    inner: R,
    cipher: Arc<dyn Cipher>,
    close: CloseHandle,
}

impl<R: AsyncRead + Unpin> SecureReader<R> {
    /// Read raw bytes, racing against close. `Ok(0)` is end of stream.
    async fn read_raw(&mut self, buf: &mut [u8]) -> Result<usize> {
        if self.close.is_closed() {
            return Err(Error::Closed);
        }

        let close = &self.close;
        let inner = &mut self.inner;
        tokio::select! {
            biased;
            _ = close.closed() => Err(Error::Closed),
            read = inner.read(buf) => Ok(read?),
        }
    }

    /// Read one raw chunk into `scratch` and decrypt it.
    ///
    /// Returns `None` at end of stream.
    pub async fn recv_chunk(&mut self, scratch: &mut [u8]) -> Result<Option<Vec<u8>>> {
        let n = self.read_raw(scratch).await?;
        if n == 0 {
            return Ok(None);
        }
        self.cipher.decrypt(&scratch[..n]).map(Some)
    }

    /// Read and decrypt into `buf`, returning the decrypted byte count.
    ///
    /// At most as many raw bytes are read as the cipher needs to encode
    /// `buf.len()` plaintext bytes. `Ok(0)` is end of stream.
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        let pool = BufferPool::global();
        let mut scratch = pool.get();
        let limit = self.cipher.max_encoded_len(buf.len()).min(scratch.len());

        let plain = match self.recv_chunk(&mut scratch[..limit]).await? {
            Some(plain) => plain,
            None => return Ok(0),
        };
        if plain.len() > buf.len() {
            return Err(Error::Buffer {
                expected: buf.len(),
                actual: plain.len(),
            });
        }

        buf[..plain.len()].copy_from_slice(&plain);
        Ok(plain.len())
    }

    /// Relay decrypted chunks into `to` (which encrypts with its own cipher)
    /// until end of stream. Returns the number of plaintext bytes moved.
    pub async fn relay_to<W>(&mut self, to: &mut SecureWriter<W>) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let pool = BufferPool::global();
        let mut scratch = pool.get();
        let mut total = 0u64;

        while let Some(chunk) = self.recv_chunk(&mut scratch).await? {
            if chunk.is_empty() {
                continue;
            }
            total += to.send(&chunk).await? as u64;
        }

        Ok(total)
    }

    /// Handle that closes the whole stream.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }
}

/// Write half of a [`SecureStream`]: plaintext in, encrypted bytes out.
pub struct SecureWriter<W> {
    inner: W,
    cipher: Arc<dyn Cipher>,
    close: CloseHandle,
}

impl<W: AsyncWrite + Unpin> SecureWriter<W> {
    /// Encrypt `data` and write all of it.
    ///
    /// Returns `data.len()`: the count of logical bytes delivered, not the
    /// number of bytes that hit the wire.
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        if self.close.is_closed() {
            return Err(Error::Closed);
        }

        let wire = self.cipher.encrypt(data)?;

        let close = &self.close;
        let inner = &mut self.inner;
        let written = tokio::select! {
            biased;
            _ = close.closed() => Err(Error::Closed),
            written = inner.write_all(&wire) => written.map_err(Error::from),
        };
        written?;

        Ok(data.len())
    }

    /// Handle that closes the whole stream.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }
}

/// A raw connection wrapped with a cipher.
pub struct SecureStream<S> {
    /// Taken by [`SecureStream::close`], which drops the connection
    halves: Option<(SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>)>,
    close: CloseHandle,
    cipher_name: &'static str,
}

impl<S> SecureStream<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Wrap `stream`, taking ownership of it.
    pub fn new(stream: S, cipher: Arc<dyn Cipher>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        let close = CloseHandle::new();
        let cipher_name = cipher.name();

        let reader = SecureReader {
            inner: read_half,
            cipher: Arc::clone(&cipher),
            close: close.clone(),
        };
        let writer = SecureWriter {
            inner: write_half,
            cipher,
            close: close.clone(),
        };

        Self {
            halves: Some((reader, writer)),
            close,
            cipher_name,
        }
    }

    /// Read and decrypt into `buf`. See [`SecureReader::recv`].
    pub async fn recv(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.halves {
            Some((reader, _)) => reader.recv(buf).await,
            None => Err(Error::Closed),
        }
    }

    /// Encrypt and write `data`. See [`SecureWriter::send`].
    pub async fn send(&mut self, data: &[u8]) -> Result<usize> {
        match &mut self.halves {
            Some((_, writer)) => writer.send(data).await,
            None => Err(Error::Closed),
        }
    }

    /// Close the stream and release the connection. Repeated calls are no-ops.
    ///
    /// The peer sees end of stream. Halves already split off keep their own
    /// connection but fail with [`Error::Closed`] from then on.
    pub fn close(&mut self) {
        self.close.close();
        if self.halves.take().is_some() {
            tracing::trace!(cipher = self.cipher_name, "connection released");
        }
    }

    /// Whether the stream has been closed, here or through a [`CloseHandle`].
    pub fn is_closed(&self) -> bool {
        self.close.is_closed()
    }

    /// Handle that can close this stream from elsewhere.
    pub fn close_handle(&self) -> CloseHandle {
        self.close.clone()
    }

    /// Name of the cipher this stream uses.
    pub fn cipher_name(&self) -> &'static str {
        self.cipher_name
    }

    /// Split into independently usable halves sharing one close flag.
    ///
    /// Fails with [`Error::Closed`] once the connection has been released.
    pub fn into_split(self) -> Result<(SecureReader<ReadHalf<S>>, SecureWriter<WriteHalf<S>>)> {
        self.halves.ok_or(Error::Closed)
    }

    /// Give back the raw connection, dropping the cipher.
    pub fn into_inner(self) -> Result<S>
    where
        S: Unpin,
    {
        let (reader, writer) = self.into_split()?;
        Ok(reader.inner.unsplit(writer.inner))
    }
}
