//! Bidirectional relay between two connections.
//!
//! Each direction runs in its own task. Whichever direction finishes first,
//! for any reason, closes both streams so the other direction stops
//! promptly. The coordinator then joins both tasks before returning, so a
//! finished tunnel has released both connections.
//!
//! Errors are classified before they reach the caller:
//!
//! | outcome                                   | reported |
//! |-------------------------------------------|----------|
//! | end of stream, I/O on our own closed side | no       |
//! | connection reset by peer                  | no (warn)|
//! | anything else                             | yes      |

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::connection::secure_stream::{CloseHandle, SecureReader, SecureStream, SecureWriter};
use crate::error::{Error, Result};

/// Capacity of the per-tunnel error channel (one slot per direction)
const ERROR_SLOTS: usize = 2;

/// Decide whether a relay error is worth surfacing.
///
/// Returns `None` for the outcomes of a normal teardown.
pub fn classify(err: Error) -> Option<Error> {
    if err.is_recoverable() {
        return None;
    }
    if err.is_reset() {
        tracing::warn!(error = %err, "connection reset by peer");
        return None;
    }
    Some(err)
}

/// Relay between two cipher-wrapped streams until either side stops.
///
/// Each direction decrypts with the source stream's cipher and encrypts with
/// the sink's. Blocks until both directions have finished and returns the
/// first error that was not part of a normal teardown. A stream that was
/// already closed fails with [`Error::Closed`] before anything is relayed.
pub async fn tunnel<A, B>(a: SecureStream<A>, b: SecureStream<B>) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let closers = [a.close_handle(), b.close_handle()];
    let (a_reader, a_writer) = a.into_split()?;
    let (b_reader, b_writer) = b.into_split()?;

    let (tx, rx) = mpsc::channel(ERROR_SLOTS);
    let forward = tokio::spawn(secure_pipe("forward", a_reader, b_writer, closers.clone(), tx.clone()));
    let backward = tokio::spawn(secure_pipe("backward", b_reader, a_writer, closers, tx));

    join(rx, forward, backward).await
}

/// Relay between two raw connections until either side stops.
///
/// Same teardown and error policy as [`tunnel`], without any cipher.
pub async fn copy_raw<A, B>(a: A, b: B) -> Result<()>
where
    A: AsyncRead + AsyncWrite + Send + 'static,
    B: AsyncRead + AsyncWrite + Send + 'static,
{
    let closers = [CloseHandle::new(), CloseHandle::new()];
    let (a_reader, a_writer) = tokio::io::split(a);
    let (b_reader, b_writer) = tokio::io::split(b);

    let (tx, rx) = mpsc::channel(ERROR_SLOTS);
    let forward = tokio::spawn(raw_pipe("forward", a_reader, b_writer, closers.clone(), tx.clone()));
    let backward = tokio::spawn(raw_pipe("backward", b_reader, a_writer, closers, tx));

    join(rx, forward, backward).await
}

async fn secure_pipe<R, W>(
    direction: &'static str,
    mut from: SecureReader<R>,
    mut to: SecureWriter<W>,
    closers: [CloseHandle; 2],
    errors: mpsc::Sender<Error>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = from.relay_to(&mut to).await;
    if let Ok(bytes) = result {
        tracing::trace!(direction, bytes, "relay reached end of stream");
    }
    finish(direction, result.map(drop), &closers, &errors);
}

async fn raw_pipe<R, W>(
    direction: &'static str,
    mut from: R,
    mut to: W,
    closers: [CloseHandle; 2],
    errors: mpsc::Sender<Error>,
) where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = tokio::select! {
        biased;
        _ = either_closed(&closers) => Err(Error::Closed),
        copied = tokio::io::copy(&mut from, &mut to) => copied.map_err(Error::from),
    };
    if let Ok(bytes) = result {
        tracing::trace!(direction, bytes, "copy reached end of stream");
    }
    finish(direction, result.map(drop), &closers, &errors);
}

async fn either_closed(closers: &[CloseHandle; 2]) {
    tokio::select! {
        _ = closers[0].closed() => {}
        _ = closers[1].closed() => {}
    }
}

/// Close both sides and report the direction's outcome.
fn finish(
    direction: &'static str,
    result: Result<()>,
    closers: &[CloseHandle; 2],
    errors: &mpsc::Sender<Error>,
) {
    for closer in closers {
        closer.close();
    }

    if let Err(err) = result {
        match classify(err) {
            Some(err) => {
                tracing::debug!(direction, error = %err, "relay failed");
                // Two slots, at most one error per direction
                let _ = errors.try_send(err);
            }
            None => tracing::trace!(direction, "relay torn down"),
        }
    }
}

/// Wait for both directions, then surface the first reported error.
async fn join(
    mut errors: mpsc::Receiver<Error>,
    forward: JoinHandle<()>,
    backward: JoinHandle<()>,
) -> Result<()> {
    let (forward, backward) = tokio::join!(forward, backward);

    if let Ok(err) = errors.try_recv() {
        return Err(err);
    }
    for joined in [forward, backward] {
        if let Err(e) = joined {
            return Err(Error::Task(e.to_string()));
        }
    }
    Ok(())
}
