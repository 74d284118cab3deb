//! Stream Channel (§4.3): the half-duplex handle shared by the Client and
//! Server Stream Handlers for a single HTTP/2 stream once HEADERS have
//! been exchanged.
//!
//! Grounded on the teacher's `server::Stream<B>` / the `Body<B>` it hands
//! back to callers (`server.rs`): a writable flag that latches closed on
//! the first error or RST_STREAM, a slot for "the last protocol exception
//! seen on this stream" that callers can inspect after a write fails, and
//! a bounded inbound body channel standing in for the teacher's
//! `ReleaseCapacity`-driven `Body<B>` stream.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};

use crate::error::{Error, Reason};
use crate::stream_id::StreamId;

/// §5.1: inbound DATA frames are buffered up to `request_buffer_size`
/// bytes before the engine stops reading further frames for this stream,
/// applying backpressure to the peer via HTTP/2 flow control.
pub struct InboundBody {
    receiver: mpsc::Receiver<Bytes>,
    semaphore: Arc<Semaphore>,
}

impl InboundBody {
    /// Pulls the next chunk, releasing its byte-weighted permits back to
    /// the producer side so more DATA frames can be admitted.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        let chunk = self.receiver.recv().await?;
        self.semaphore.add_permits(chunk.len().max(1));
        Some(chunk)
    }
}

/// The producer half of [`InboundBody`], held by whichever side is
/// receiving DATA frames for this stream (the server for requests, the
/// client for responses).
#[derive(Clone)]
pub struct InboundBodySender {
    sender: mpsc::Sender<Bytes>,
    semaphore: Arc<Semaphore>,
}

impl InboundBodySender {
    /// Waits for enough buffer budget and forwards `chunk` to the
    /// consumer. Mirrors the capacity semantics of §5.1: a slow consumer
    /// throttles how fast this side keeps admitting DATA frames.
    pub async fn push(&self, chunk: Bytes) -> Result<(), Error> {
        let permits = chunk.len().max(1);
        let acquired = self
            .semaphore
            .clone()
            .acquire_many_owned(permits as u32)
            .await
            .map_err(|_| Error::connection(Reason::InternalError, crate::error::ShutdownHint::Hard))?;
        acquired.forget();
        self.sender
            .send(chunk)
            .await
            .map_err(|_| Error::connection(Reason::InternalError, crate::error::ShutdownHint::Hard))
    }
}

/// Builds a bounded inbound body channel sized to `capacity` bytes (§6
/// `request-buffer-size`).
pub fn inbound_body(capacity: u32) -> (InboundBodySender, InboundBody) {
    let semaphore = Arc::new(Semaphore::new(capacity.max(1) as usize));
    let (tx, rx) = mpsc::channel(128);
    (
        InboundBodySender {
            sender: tx,
            semaphore: semaphore.clone(),
        },
        InboundBody {
            receiver: rx,
            semaphore,
        },
    )
}

/// Tracks the writable/exception state of one stream (§4.3: "a stream
/// latches closed the first time a write fails or a RST_STREAM is
/// observed; later writes and reads surface the latched exception rather
/// than attempting the operation again").
pub struct StreamChannel {
    id: StreamId,
    writable: AtomicBool,
    last_exception: Mutex<Option<Error>>,
}

impl StreamChannel {
    pub fn new(id: StreamId) -> StreamChannel {
        StreamChannel {
            id,
            writable: AtomicBool::new(true),
            last_exception: Mutex::new(None),
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    /// True until the first call to [`StreamChannel::latch`].
    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    /// Records `err` as the terminal state for this stream and flips
    /// `writable` false, permanently (§4.3 invariant: one-way transition).
    pub fn latch(&self, err: Error) {
        self.writable.store(false, Ordering::Release);
        let mut slot = self.last_exception.lock();
        if slot.is_none() {
            *slot = Some(err);
        }
    }

    /// Returns the latched exception, if any, cloned out as a fresh
    /// [`Error`] of the same shape. Used so a caller that observes
    /// `is_writable() == false` can report why.
    pub fn last_exception(&self) -> Option<Reason> {
        self.last_exception
            .lock()
            .as_ref()
            .and_then(Error::as_stream_reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_writable() {
        let chan = StreamChannel::new(StreamId::new(1));
        assert!(chan.is_writable());
        assert!(chan.last_exception().is_none());
    }

    #[test]
    fn latch_is_one_way() {
        let chan = StreamChannel::new(StreamId::new(1));
        chan.latch(Error::stream(StreamId::new(1), Reason::Cancel));
        assert!(!chan.is_writable());
        assert_eq!(chan.last_exception(), Some(Reason::Cancel));

        // A second latch must not overwrite the first recorded exception.
        chan.latch(Error::stream(StreamId::new(1), Reason::InternalError));
        assert!(!chan.is_writable());
        assert_eq!(chan.last_exception(), Some(Reason::Cancel));
    }

    #[tokio::test]
    async fn inbound_body_roundtrips_and_releases_capacity() {
        let (tx, mut rx) = inbound_body(8);
        tx.push(Bytes::from_static(b"abcd")).await.unwrap();
        let chunk = rx.next_chunk().await.unwrap();
        assert_eq!(&chunk[..], b"abcd");
    }
}
