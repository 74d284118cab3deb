//! A thin, engine-owned stream identifier (§3 "stream id (positive,
//! monotonic within a connection)").
//!
//! The engine deliberately does not re-export `h2`'s own stream id type:
//! keeping our public API independent of the exact shape the underlying
//! frame codec happens to expose lets the "external collaborator" (§1)
//! boundary move without becoming a breaking change here.

use std::fmt;

/// An HTTP/2 stream identifier, or `ZERO` as a placeholder for errors
/// raised before a stream has been allocated (e.g. header validation
/// failures caught prior to `SendRequest::send_request`, per §8 scenario
/// 5: "StreamException(PROTOCOL_ERROR) before any frame is emitted").
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StreamId(u32);

impl StreamId {
    pub const ZERO: StreamId = StreamId(0);

    pub const fn new(id: u32) -> StreamId {
        StreamId(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn is_client_initiated(self) -> bool {
        self.0 % 2 == 1
    }
}

impl From<u32> for StreamId {
    fn from(id: u32) -> StreamId {
        StreamId(id)
    }
}

impl From<h2::StreamId> for StreamId {
    fn from(id: h2::StreamId) -> StreamId {
        StreamId(id.into())
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
