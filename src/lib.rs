//! A generic HTTP/2 request/response engine built on top of the `h2`
//! frame codec: header validation, body dispatch, stream lifecycle
//! tracking, and client/server stream handlers that turn `h2`'s raw
//! streams into `http::Request`/`http::Response` exchanges.
//!
//! The wire-level framing, HPACK compression and flow-control bookkeeping
//! are all handled by [`h2`] itself; this crate is the layer above it
//! that an embedder actually calls into.

mod body;
mod config;
mod connection;
mod dispatch;
mod error;
mod header_cache;
mod headers;
mod executor;
mod stream;
mod stream_id;

pub mod client;
pub mod server;

pub use body::Body;
pub use config::{ConnGoAwayHandler, ErrorHandler, PipelineTransform, ResetStreamHandler, RejectedHandler, StreamGoAwayHandler};
pub use connection::Complete;
pub use error::{Error, Reason, Result, ShutdownHint, UserError};
pub use executor::{BoundedExecutor, Executor, TokioExecutor};
pub use stream::StreamChannel;
pub use stream_id::StreamId;
