//! Connection Pipeline (§4.6): the driving loop shared by the client and
//! server sides once a handshake has produced an `h2` connection, plus
//! the inbound-body adapter both sides use to turn an `h2::RecvStream`
//! into a [`Body`].
//!
//! Grounded on the teacher's `Connection<T, B>` (`client.rs`/`server.rs`):
//! a `Future`/`Stream` the embedder is expected to poll to completion (or,
//! per the teacher's own doc comments, hand to an executor), and on its
//! `ReleaseCapacity` type, which this module's [`recv_body`] generalizes
//! from a single `futures::Stream<Item = Bytes>` sink into the bounded
//! channel described in SPEC_FULL.md §5.1.

use bytes::Bytes;
use futures_util::stream;

use crate::body::Body;
use crate::config::ResetStreamHandler;
use crate::error::{Error, Reason, ShutdownHint};
use crate::stream::inbound_body;
use crate::stream_id::StreamId;

/// Resolves to `true` ("connection must shut down") or `false` ("stream
/// closed cleanly") once an inbound body has finished (§4.4/§5: "the
/// `complete` promise resolves after either END_STREAM, RST_STREAM,
/// GOAWAY, channel-inactive, or exception"). A dropped sender (e.g. the
/// body never started pumping at all) resolves to `true`, the same as
/// any other exception.
pub struct Complete(tokio::sync::oneshot::Receiver<bool>);

impl Complete {
    pub async fn wait(self) -> bool {
        self.0.await.unwrap_or(true)
    }
}

/// Adapts an `h2::RecvStream` into a [`Body::Streaming`], buffering up to
/// `buffer_size` bytes ahead of the consumer (§5.1: "buffers inbound DATA
/// up to request-buffer-size bytes before applying backpressure").
///
/// HTTP/2 flow-control capacity is released back to the peer as soon as a
/// chunk is admitted into the bounded buffer, not when the application
/// finally consumes it (SPEC_FULL.md §9.1): the buffer's own byte cap is
/// what throttles the peer once it fills, which keeps the peer streaming
/// at full window size while the buffer has room.
///
/// The pump task that drives `recv` is always spawned directly onto the
/// Tokio runtime rather than through the embedder's configured handler
/// [`crate::executor::Executor`]: that executor exists to bound
/// *handler* fan-out (§6 `executor`, e.g. `BoundedExecutor`), and sharing
/// it here would mean unrelated handler-pool saturation could silently
/// truncate a stream's inbound body for a reason that has nothing to do
/// with that stream's own backpressure. Body reception has its own
/// failure domain: the bounded channel in `stream::inbound_body`.
pub fn recv_body(
    recv: h2::RecvStream,
    buffer_size: u32,
    raw_stream: bool,
    stream_id: StreamId,
    reset_stream_handler: Option<ResetStreamHandler>,
) -> Body {
    recv_body_inner(recv, buffer_size, raw_stream, stream_id, reset_stream_handler, None)
}

/// Like [`recv_body`], but also returns the §4.4/§5 `complete` promise
/// the client side hands back alongside every response.
pub fn recv_body_with_complete(
    recv: h2::RecvStream,
    buffer_size: u32,
    raw_stream: bool,
    stream_id: StreamId,
    reset_stream_handler: Option<ResetStreamHandler>,
) -> (Body, Complete) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let body = recv_body_inner(recv, buffer_size, raw_stream, stream_id, reset_stream_handler, Some(tx));
    (body, Complete(rx))
}

fn recv_body_inner(
    mut recv: h2::RecvStream,
    buffer_size: u32,
    raw_stream: bool,
    stream_id: StreamId,
    reset_stream_handler: Option<ResetStreamHandler>,
    complete_tx: Option<tokio::sync::oneshot::Sender<bool>>,
) -> Body {
    let (tx, mut rx) = inbound_body(buffer_size);

    let pump = async move {
        let mut shutdown = false;
        loop {
            let next = std::future::poll_fn(|cx| recv.poll_data(cx)).await;
            let chunk = match next {
                None => break,
                Some(Err(e)) => {
                    shutdown = true;
                    if e.is_reset() {
                        if let Some(handler) = reset_stream_handler.as_ref() {
                            let reason = e.reason().map(Reason::from_h2).unwrap_or(Reason::InternalError);
                            handler(stream_id, reason);
                        }
                    }
                    break;
                }
                Some(Ok(chunk)) => chunk,
            };
            let len = chunk.len();
            // §6 `raw-stream?`: "raw" forwards the `Bytes` chunk `h2` gave
            // us untouched (zero-copy); "cooked" (the default) makes a
            // defensive copy so the application never holds a view onto a
            // buffer shared with anything else in the codec.
            let chunk = if raw_stream {
                chunk
            } else {
                Bytes::copy_from_slice(&chunk)
            };
            if tx.push(chunk).await.is_err() {
                shutdown = true;
                break;
            }
            let _ = recv.flow_control().release_capacity(len);
        }
        if let Some(complete_tx) = complete_tx {
            let _ = complete_tx.send(shutdown);
        }
    };

    // Always spawned directly onto the runtime (see module docs above):
    // this never rejects, so there is no saturation/short-read path to
    // handle here the way there is for handler dispatch.
    tokio::spawn(pump);

    let adapted = stream::unfold(rx, |mut rx| async move {
        let chunk = rx.next_chunk().await?;
        Some((Ok::<Bytes, Error>(chunk), rx))
    });

    Body::Streaming(Box::pin(adapted))
}

/// Translates an inbound GOAWAY/reset into the engine's `Reason`/hint pair
/// and invokes the matching configured handler (§4.6, §6
/// `conn-go-away-handler` / `stream-go-away-handler`).
pub fn report_goaway(
    err: &Error,
    conn_handler: Option<&crate::config::ConnGoAwayHandler>,
    stream_handler: Option<&crate::config::StreamGoAwayHandler>,
    stream_id: Option<StreamId>,
) {
    if let Some(reason) = err.as_connection_reason() {
        log_shutdown(reason, err.is_noteworthy());
        if let Some(handler) = conn_handler {
            let hint = match err {
                Error::Connection { hint, .. } => *hint,
                _ => ShutdownHint::Hard,
            };
            handler(reason, hint);
        }
        return;
    }

    if let Some(reason) = err.as_stream_reason() {
        if let (Some(handler), Some(id)) = (stream_handler, stream_id) {
            handler(id, reason);
        }
    }
}

fn log_shutdown(reason: Reason, noteworthy: bool) {
    if noteworthy {
        tracing::warn!(%reason, "connection closing");
    } else {
        tracing::info!(%reason, "connection closing");
    }
}
