//! Client Stream Handler (§4.4) and the public client API, shaped after
//! the teacher's `client.rs`: a `Builder` that performs the handshake and
//! hands back a `SendRequest`/`Connection` pair, where `SendRequest`
//! issues one logical exchange per call and `Connection` is the future
//! the embedder drives (directly, or via an executor).

use std::sync::Arc;

use bytes::Bytes;
use http::{Request, Response};
use tokio::io::{AsyncRead, AsyncWrite};

use crate::body::Body;
use crate::config::{shared_builder_setters, Config};
use crate::connection::{recv_body_with_complete, report_goaway, Complete};
use crate::error::Error;
use crate::headers;
use crate::stream_id::StreamId;

/// Builds a client-side handshake. Settings setters mirror the teacher's
/// `client::Builder` (`initial_window_size`, `max_frame_size`,
/// `max_concurrent_streams`, ...), plus the engine-wide knobs in §6.
pub struct Builder {
    inner: h2::client::Builder,
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
        let mut inner = h2::client::Builder::new();
        // §4.6 client-only detail: server push isn't supported by this
        // engine, so refuse it during SETTINGS negotiation rather than
        // accept PUSH_PROMISE frames we have no handler for (§1 Non-goals).
        inner.enable_push(false);
        Builder {
            inner,
            config: Config::new(),
            tls: false,
        }
    }

    /// Marks the connection as TLS-wrapped, which disables the zero-copy
    /// file-region body strategy (§4.2 scenario 4).
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

    /// Performs the HTTP/2 client preface and SETTINGS exchange over
    /// `io` (§4.4/§4.6: "a client connection begins by sending the
    /// connection preface").
    pub async fn handshake<T>(&self, io: T) -> Result<(SendRequest, Connection<T>), Error>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (send_request, connection) = self
            .inner
            .handshake(io)
            .await
            .map_err(Error::Transport)?;

        let config = Arc::new(self.config.clone());
        Ok((
            SendRequest {
                inner: send_request,
                config: config.clone(),
                tls: self.tls,
            },
            Connection {
                inner: connection,
                config,
            },
        ))
    }
}

/// Issues requests on an established connection (§4.4: "one call per
/// logical request/response exchange").
pub struct SendRequest {
    inner: h2::client::SendRequest<Bytes>,
    config: Arc<Config>,
    tls: bool,
}

impl SendRequest {
    /// Waits until the connection will accept another request without
    /// exceeding `max-concurrent-streams` (§4.4).
    pub async fn ready(&mut self) -> Result<(), Error> {
        std::future::poll_fn(|cx| self.inner.poll_ready(cx))
            .await
            .map_err(Error::Transport)
    }

    /// Validates and sends `request`'s headers immediately, then streams
    /// its body in the background (via the configured executor) if it
    /// has one, returning a handle to await the response (§4.4 steps
    /// 1-2).
    pub fn send_request(&mut self, request: Request<Body>) -> Result<ResponseFuture, Error> {
        let (mut parts, mut body) = request.into_parts();

        if headers::should_drop_trace_body(&parts.method) && !body.is_empty() {
            tracing::warn!("dropping body on TRACE request");
            body = Body::empty();
        }

        // §4.2: "attempts to set content-length when the body's length
        // is statically known" — a request has no status, so the 1xx/204
        // suppression in `apply_content_length` never applies here.
        crate::dispatch::apply_content_length(&mut parts.headers, None, &body);

        headers::validate_outbound_headers(&parts.headers)?;
        headers::validate_outbound_request_uri(&parts.uri)?;

        let end_stream = body.is_empty();
        let wire_request = Request::from_parts(parts, ());

        let (response_future, send_stream) = self
            .inner
            .send_request(wire_request, end_stream)
            .map_err(Error::Transport)?;

        if !end_stream {
            let chunk_size = self.config.chunk_size;
            let tls = self.tls;
            let executor = self.config.executor();
            let mut send_stream = send_stream;
            let fut = Box::pin(async move {
                let id = StreamId::from(send_stream.stream_id());
                if let Err(err) = crate::dispatch::send_body(&mut send_stream, id, body, chunk_size, tls).await {
                    tracing::warn!(error = %err, "request body send failed");
                }
            });
            if executor.try_spawn(fut).is_err() {
                tracing::warn!("executor saturated; request body was not sent");
            }
        }

        Ok(ResponseFuture {
            inner: response_future,
            config: self.config.clone(),
        })
    }
}

/// A pending response, resolved once the server's HEADERS frame arrives
/// (§4.4 step 3).
pub struct ResponseFuture {
    inner: h2::client::ResponseFuture,
    config: Arc<Config>,
}

impl ResponseFuture {
    /// §4.4: "construct a ResponseMap with status, headers, a `complete`
    /// promise ..., and a body source". The `complete` promise resolves
    /// once this stream's body has fully arrived, a RST_STREAM has hit
    /// it, or the connection has gone away — `true` if the connection
    /// must shut down, `false` if the stream merely closed cleanly (§5).
    pub async fn into_response(self) -> Result<(Response<Body>, Complete), Error> {
        let response = self.inner.await.map_err(Error::Transport)?;
        let (parts, recv_stream) = response.into_parts();
        let stream_id = StreamId::from(recv_stream.stream_id());
        let (body, complete) = recv_body_with_complete(
            recv_stream,
            self.config.request_buffer_size,
            self.config.raw_stream,
            stream_id,
            self.config.reset_stream_handler.clone(),
        );
        Ok((Response::from_parts(parts, body), complete))
    }
}

/// The connection-driving future (§4.6.1 "driving loop"): polls the
/// underlying `h2` connection to completion, translating a terminal
/// GOAWAY/error into the configured handlers before returning.
pub struct Connection<T> {
    inner: h2::client::Connection<T, Bytes>,
    config: Arc<Config>,
}

impl<T> Connection<T>
where
    T: AsyncRead + AsyncWrite + Unpin,
{
    /// Drives the connection until it closes. Intended to be spawned onto
    /// the embedder's runtime, mirroring the teacher's own doc-comment
    /// instruction to "submit the `Connection` instance to an executor."
    pub async fn run(self) -> Result<(), Error> {
        match self.inner.await {
            Ok(()) => Ok(()),
            Err(e) => {
                let err = Error::Transport(e);
                report_goaway(
                    &err,
                    self.config.conn_goaway_handler.as_ref(),
                    self.config.stream_goaway_handler.as_ref(),
                    None,
                );
                Err(err)
            }
        }
    }
}
