//! The shared configuration surface (§6, SPEC_FULL.md §3.1) built up by
//! [`crate::client::Builder`] and [`crate::server::Builder`], the way the
//! teacher's `client::Builder`/`server::Builder` each wrap a `Settings`
//! plus a handful of per-side knobs.

use std::sync::Arc;
use std::time::Duration;

use http::{Response, StatusCode};

use crate::body::Body;
use crate::error::{Error, Reason, ShutdownHint};
use crate::executor::{Executor, TokioExecutor};
use crate::stream_id::StreamId;

/// Default SETTINGS_MAX_FRAME_SIZE / chunk size (§4.2, §6).
pub const DEFAULT_CHUNK_SIZE: u32 = 16_384;
/// Default inbound body buffer capacity, in bytes (§4.4, §6).
pub const DEFAULT_REQUEST_BUFFER_SIZE: u32 = 16_384;
/// HTTP/2 caps frame length at 2^24 - 1 (§4.2).
pub const MAX_FRAME_SIZE: u32 = (1 << 24) - 1;

pub type ErrorHandler = Arc<dyn Fn(&Error) -> Response<Body> + Send + Sync>;
pub type ResetStreamHandler = Arc<dyn Fn(StreamId, Reason) + Send + Sync>;
pub type StreamGoAwayHandler = Arc<dyn Fn(StreamId, Reason) + Send + Sync>;
pub type ConnGoAwayHandler = Arc<dyn Fn(Reason, ShutdownHint) + Send + Sync>;
pub type PipelineTransform = Arc<dyn Fn(http::request::Parts) -> http::request::Parts + Send + Sync>;
pub type RejectedHandler = Arc<dyn Fn() -> Response<Body> + Send + Sync>;

/// Configuration shared by the client and server pipelines (§6's
/// configuration options, plus SPEC_FULL.md §3.1).
#[derive(Clone)]
pub struct Config {
    pub chunk_size: u32,
    pub request_buffer_size: u32,
    pub idle_timeout: Option<Duration>,
    pub raw_stream: bool,
    pub executor: Option<Arc<dyn Executor>>,
    pub reset_stream_handler: Option<ResetStreamHandler>,
    pub stream_goaway_handler: Option<StreamGoAwayHandler>,
    pub conn_goaway_handler: Option<ConnGoAwayHandler>,
    pub pipeline_transform: Option<PipelineTransform>,
    pub error_handler: ErrorHandler,
    pub rejected_handler: Option<RejectedHandler>,
}

impl Config {
    pub(crate) fn new() -> Config {
        Config {
            chunk_size: DEFAULT_CHUNK_SIZE,
            request_buffer_size: DEFAULT_REQUEST_BUFFER_SIZE,
            idle_timeout: None,
            raw_stream: false,
            executor: None,
            reset_stream_handler: None,
            stream_goaway_handler: None,
            conn_goaway_handler: None,
            pipeline_transform: None,
            error_handler: default_error_handler(),
            rejected_handler: None,
        }
    }

    pub(crate) fn executor(&self) -> Arc<dyn Executor> {
        self.executor
            .clone()
            .unwrap_or_else(|| Arc::new(TokioExecutor))
    }
}

/// §6: "error-handler (exception → response map; defaults to generic
/// 500)".
fn default_error_handler() -> ErrorHandler {
    Arc::new(|err: &Error| {
        tracing::warn!(error = %err, "user handler error; returning 500");
        Response::builder()
            .status(StatusCode::INTERNAL_SERVER_ERROR)
            .body(Body::empty())
            .expect("valid static response")
    })
}

/// Knobs shared between [`crate::client::Builder`] and
/// [`crate::server::Builder`]; both delegate their setter methods here so
/// the two builders stay in lockstep with §6, matching the way the
/// teacher's two `Builder` types duplicate the same handful of `Settings`
/// setters.
macro_rules! shared_builder_setters {
    () => {
        /// §6 `chunk-size`: overrides the default DATA frame chunk size.
        pub fn chunk_size(&mut self, size: u32) -> &mut Self {
            assert!(size > 0 && size <= crate::config::MAX_FRAME_SIZE);
            self.config.chunk_size = size;
            self
        }

        /// §6 `request-buffer-size`: inbound body backpressure capacity.
        pub fn request_buffer_size(&mut self, size: u32) -> &mut Self {
            self.config.request_buffer_size = size;
            self
        }

        /// §6 `idle-timeout`; `None` disables it.
        pub fn idle_timeout(&mut self, timeout: Option<std::time::Duration>) -> &mut Self {
            self.config.idle_timeout = timeout;
            self
        }

        /// §6 `raw-stream?`.
        pub fn raw_stream(&mut self, raw: bool) -> &mut Self {
            self.config.raw_stream = raw;
            self
        }

        /// §6 `executor`.
        pub fn executor(&mut self, executor: std::sync::Arc<dyn crate::executor::Executor>) -> &mut Self {
            self.config.executor = Some(executor);
            self
        }

        /// §6 `reset-stream-handler`.
        pub fn on_reset_stream<F>(&mut self, f: F) -> &mut Self
        where
            F: Fn(crate::stream_id::StreamId, crate::error::Reason) + Send + Sync + 'static,
        {
            self.config.reset_stream_handler = Some(std::sync::Arc::new(f));
            self
        }

        /// §6 `stream-go-away-handler`.
        pub fn on_stream_goaway<F>(&mut self, f: F) -> &mut Self
        where
            F: Fn(crate::stream_id::StreamId, crate::error::Reason) + Send + Sync + 'static,
        {
            self.config.stream_goaway_handler = Some(std::sync::Arc::new(f));
            self
        }

        /// §6 `conn-go-away-handler`.
        pub fn on_conn_goaway<F>(&mut self, f: F) -> &mut Self
        where
            F: Fn(crate::error::Reason, crate::error::ShutdownHint) + Send + Sync + 'static,
        {
            self.config.conn_goaway_handler = Some(std::sync::Arc::new(f));
            self
        }

        /// §6 `error-handler`.
        pub fn error_handler<F>(&mut self, f: F) -> &mut Self
        where
            F: Fn(&crate::error::Error) -> http::Response<crate::body::Body> + Send + Sync + 'static,
        {
            self.config.error_handler = std::sync::Arc::new(f);
            self
        }
    };
}

pub(crate) use shared_builder_setters;
