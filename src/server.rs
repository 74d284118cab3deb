//! Server Stream Handler (§4.5) and the public server API, shaped after
//! the teacher's `server.rs`: a `Builder` that performs the handshake and
//! hands back a `Connection` the embedder polls for `(Request, Respond)`
//! pairs, one per accepted stream.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::FutureExt;
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::body::Body;
use crate::config::{shared_builder_setters, Config};
use crate::connection::{recv_body, report_goaway};
use crate::dispatch::{apply_content_length, apply_default_response_headers};
use crate::error::{Error, Reason};
use crate::headers;
use crate::stream::StreamChannel;
use crate::stream_id::StreamId;

/// Builds a server-side handshake. Settings setters mirror the teacher's
/// `server::Builder`, plus the engine-wide knobs in §6.
pub struct Builder {
    inner: h2::server::Builder,
    config: Config,
    tls: bool,
}

impl Default for Builder {
    fn default() -> Builder {
        Builder::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            inner: h2::server::Builder::new(),
            config: Config::new(),
            tls: false,
        }
    }

    /// Marks the connection as TLS-wrapped (§4.2 scenario 4).
    pub fn tls(&mut self, active: bool) -> &mut Self {
        self.tls = active;
        self
    }

    pub fn initial_window_size(&mut self, size: u32) -> &mut Self {
        self.inner.initial_window_size(size);
        self
    }

    pub fn max_frame_size(&mut self, size: u32) -> &mut Self {
        self.inner.max_frame_size(size);
        self
    }

    pub fn max_concurrent_streams(&mut self, max: u32) -> &mut Self {
        self.inner.max_concurrent_streams(max);
        self
    }

    shared_builder_setters!();

    /// Reads the client preface and SETTINGS frame from `io` and returns
    /// a [`Connection`] ready to accept streams (§4.5/§4.6).
    pub async fn handshake<T>(&self, io: T) -> Result<Connection<T>, Error>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let inner = self.inner.handshake(io).await.map_err(Error::Transport)?;
        Ok(Connection {
            inner,
            config: Arc::new(self.config.clone()),
            tls: self.tls,
        })
    }
}

/// The server-side connection-driving loop (§4.5 steps 1-2, §4.6.1): each
/// accepted stream's request is handed to the user's handler, either
/// inline or via the configured executor, and the response is routed
/// back through `respond_with`.
pub struct Connection<T> {
    inner: h2::server::Connection<T, Bytes>,
    config: Arc<Config>,
    tls: bool,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    /// Drives the connection, dispatching each accepted request to
    /// `handler`. Returns once the peer (or an idle timeout, §6
    /// `idle-timeout`) closes the connection.
    pub async fn serve<F, Fut>(mut self, handler: F) -> Result<(), Error>
    where
        F: Fn(Request<Body>) -> Fut + Clone + Send + Sync + 'static,
        Fut: std::future::Future<Output = Response<Body>> + Send + 'static,
    {
        loop {
            let accepted = match self.config.idle_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, self.inner.accept()).await {
                    Ok(accepted) => accepted,
                    Err(_) => {
                        tracing::info!("connection idle-timed out");
                        return Ok(());
                    }
                },
                None => self.inner.accept().await,
            };

            let (request, mut respond) = match accepted {
                None => return Ok(()),
                Some(Err(e)) => {
                    let err = Error::Transport(e);
                    report_goaway(
                        &err,
                        self.config.conn_goaway_handler.as_ref(),
                        self.config.stream_goaway_handler.as_ref(),
                        None,
                    );
                    return Err(err);
                }
                Some(Ok(pair)) => pair,
            };

            let config = self.config.clone();
            let tls = self.tls;
            let handler = handler.clone();
            let method = request.method().clone();

            let work = Box::pin(async move {
                let (mut parts, recv_stream) = request.into_parts();
                let stream_id = StreamId::from(recv_stream.stream_id());

                // SPEC_FULL.md §3.1: "applied to inbound request parts
                // before dispatch" — runs before the body is even wired
                // up, so a transform can see (and rewrite) headers/URI but
                // never the body itself.
                if let Some(transform) = config.pipeline_transform.as_ref() {
                    parts = transform(parts);
                }

                // §4.3/§4.5 step 1: the request carries a `StreamChannel`
                // handle in its extensions so application code can observe
                // an asynchronous writable->false transition (a peer reset
                // that lands while the handler is still running) without
                // this layer having to poll the handler for it.
                let channel = Arc::new(StreamChannel::new(stream_id));
                parts.extensions.insert(channel.clone());

                let body = recv_body(
                    recv_stream,
                    config.request_buffer_size,
                    config.raw_stream,
                    stream_id,
                    config.reset_stream_handler.clone(),
                );
                let request = Request::from_parts(parts, body);

                // §4.5 step 2: "any exception from the user handler is
                // routed through the configured error handler". A user
                // future's output is infallible by construction, so the
                // only "exception" this layer can observe is a panic;
                // catch it the way a supervising executor would rather
                // than letting it take the whole connection task down.
                //
                // Raced against `respond.poll_reset()`: if the peer resets
                // this stream while the handler is still running, the
                // channel latches closed and the handler is dropped rather
                // than run to completion for a response nobody can receive
                // (§4.5 step 3: "if writable has gone false since dispatch,
                // drop the response silently").
                let response = tokio::select! {
                    biased;
                    reset = std::future::poll_fn(|cx| respond.poll_reset(cx)) => {
                        let reason = reset.map(Reason::from_h2).unwrap_or(Reason::InternalError);
                        channel.latch(Error::stream(stream_id, reason));
                        if let Some(handler) = config.reset_stream_handler.as_ref() {
                            handler(stream_id, reason);
                        }
                        None
                    }
                    response = AssertUnwindSafe(handler(request)).catch_unwind() => Some(match response {
                        Ok(response) => response,
                        Err(payload) => {
                            let message = panic_message(&payload);
                            tracing::warn!(panic = %message, "user handler panicked");
                            let err = Error::connection(Reason::InternalError, crate::error::ShutdownHint::Hard);
                            (config.error_handler)(&err)
                        }
                    }),
                };

                let response = match response {
                    Some(response) => response,
                    None => return,
                };

                if !channel.is_writable() {
                    tracing::debug!(%stream_id, "stream no longer writable; dropping response silently");
                    return;
                }

                if let Err(err) = respond_with(respond, response, &config, tls, &method).await {
                    tracing::warn!(error = %err, "failed to send response");
                }
            });

            let executor = self.config.executor();
            if let Err(work) = executor.try_spawn(work) {
                // §4.5 step 2: "executor rejects (saturation)". The
                // `SendResponse` handle lives inside `work`'s captured
                // state, so once the executor has declined it there is no
                // way to answer this stream directly; dropping the future
                // drops the handle, and `h2` resets the stream on the
                // peer's behalf. `rejected_handler`, if configured, still
                // runs so the embedder gets a metrics/logging hook for the
                // rejection even though its returned response is unused.
                drop(work);
                tracing::warn!("executor saturated; rejecting request");
                if let Some(rejected_handler) = self.config.rejected_handler.as_ref() {
                    let _ = rejected_handler();
                }
            }
        }
    }
}

/// Sends `response` on `respond`, applying the §4.5 step 3 response
/// normalization (default headers, `content-length`, HEAD body drop)
/// before handing the body to the dispatcher.
///
/// §4.5 step 4: "If sending fails, invoke the error handler once with the
/// exception and retry with its output; a second failure propagates." A
/// retry can only re-send HEADERS if the first attempt never reached the
/// wire (header validation, or the `send_response` call itself); once
/// HEADERS has gone out, a body-emission failure can't be retried without
/// sending a second HEADERS frame, so it propagates directly.
async fn respond_with(
    mut respond: h2::server::SendResponse<Bytes>,
    response: Response<Body>,
    config: &Config,
    tls: bool,
    request_method: &http::Method,
) -> Result<(), Error> {
    match try_send_headers(&mut respond, response, config, request_method) {
        Ok((mut send_stream, body, end_stream)) => {
            if !end_stream {
                let id = StreamId::from(send_stream.stream_id());
                crate::dispatch::send_body(&mut send_stream, id, body, config.chunk_size, tls).await?;
            }
            Ok(())
        }
        Err(err) => {
            tracing::warn!(error = %err, "response send failed; retrying with error handler output");
            let fallback = (config.error_handler)(&err);
            let (mut send_stream, body, end_stream) =
                try_send_headers(&mut respond, fallback, config, request_method)?;
            if !end_stream {
                let id = StreamId::from(send_stream.stream_id());
                crate::dispatch::send_body(&mut send_stream, id, body, config.chunk_size, tls).await?;
            }
            Ok(())
        }
    }
}

/// Extracts a human-readable message out of a caught panic payload, for
/// the warn-log in [`Connection::serve`].
fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Normalizes `response` per §4.5 step 3 and writes its HEADERS frame,
/// returning the opened `SendStream` plus the still-undispatched body for
/// the caller to drain.
fn try_send_headers(
    respond: &mut h2::server::SendResponse<Bytes>,
    response: Response<Body>,
    config: &Config,
    request_method: &http::Method,
) -> Result<(h2::SendStream<Bytes>, Body, bool), Error> {
    let (mut parts, mut body) = response.into_parts();

    if headers::should_drop_head_response_body(request_method) && !body.is_empty() {
        tracing::warn!("dropping response body on HEAD request");
        body = Body::empty();
    }

    let now = crate::dispatch::http_date_now();
    apply_default_response_headers(&mut parts.headers, &now);
    apply_content_length(&mut parts.headers, Some(parts.status), &body);
    headers::validate_outbound_headers(&parts.headers)?;

    let end_stream = body.is_empty();
    let wire_response = Response::from_parts(parts, ());
    let send_stream = respond.send_response(wire_response, end_stream).map_err(Error::Transport)?;

    Ok((send_stream, body, end_stream))
}
