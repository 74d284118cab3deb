//! The heterogeneous outbound body tag (§3 "Body") and the bounded
//! inbound body source handed to callers (§4.4, §4.5, §9 "Body source
//! and sink bounded channels").
//!
//! Dispatch over [`Body`] is exhaustive and closed, per §9: adding a new
//! on-the-wire representation means adding a new variant and a new arm in
//! [`crate::dispatch`], not bolting a trait object onto the side.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures_core::Stream;
use tokio::io::AsyncRead;

use crate::error::Error;

/// A boxed stream of body chunks, used for the pre-chunked, streaming and
/// coercion dispatch paths.
pub type BoxBodyStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// A random-access file body: `offset`/`len` select the slice to send,
/// `chunk_size` overrides the engine default (§4.2's dispatch table entry
/// for "random-access file").
pub struct FileBody {
    pub file: Arc<tokio::fs::File>,
    pub offset: u64,
    pub len: Option<u64>,
    pub chunk_size: Option<u32>,
}

impl FileBody {
    pub fn new(file: tokio::fs::File) -> FileBody {
        FileBody {
            file: Arc::new(file),
            offset: 0,
            len: None,
            chunk_size: None,
        }
    }
}

/// A zero-copy file-region descriptor (§4.2 "file-region"). Rejected with
/// [`crate::error::UserError::FileRegionOnTls`] when the connection is
/// TLS-wrapped, since a TLS record layer cannot splice a raw file
/// descriptor onto the wire the way a plaintext socket can.
#[derive(Clone)]
pub struct FileRegion {
    pub file: Arc<tokio::fs::File>,
    pub offset: u64,
    pub len: u64,
}

/// Pre-chunked input with an optional known length (§4.2 "pre-chunked
/// input (known or unknown length)").
pub struct ChunkedBody {
    pub stream: BoxBodyStream,
    pub len_hint: Option<u64>,
}

/// The outbound body tag. See SPEC_FULL.md §3 for the full variant list
/// and §4.2 for the dispatch table each variant selects.
pub enum Body {
    /// Nil, or the "omitted" sentinel: no DATA frames at all.
    Empty,
    /// A contiguous in-memory buffer: string, byte array, byte buffer or
    /// wrapped buffer all normalize to this (§4.2 "contiguous").
    Full(Bytes),
    /// Pre-chunked input (§4.2 "chunked").
    Chunked(ChunkedBody),
    /// A random-access file, read in `chunk_size` pieces.
    File(FileBody),
    /// A zero-copy file-region descriptor.
    FileRegion(FileRegion),
    /// A lazy or asynchronous sequence of chunks, or any externally
    /// provided body coerced into one (§4.2 "streaming").
    Streaming(BoxBodyStream),
}

impl Body {
    pub fn empty() -> Body {
        Body::Empty
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Body::Empty)
    }

    /// The statically known length, if any, used by the dispatcher to set
    /// `content-length` (§4.2: "attempts to set content-length when the
    /// body's length is statically known").
    pub fn known_length(&self) -> Option<u64> {
        match self {
            Body::Empty => Some(0),
            Body::Full(b) => Some(b.len() as u64),
            Body::Chunked(c) => c.len_hint,
            Body::File(f) => f.len,
            Body::FileRegion(r) => Some(r.len),
            Body::Streaming(_) => None,
        }
    }

    pub fn from_static(bytes: &'static [u8]) -> Body {
        Body::Full(Bytes::from_static(bytes))
    }

    /// Coerces any `http_body::Body` implementor into the streaming
    /// variant (§4.2's "any other" row: "streaming via byte-buffer stream
    /// coercion" through an "external coercion collaborator").
    pub fn from_http_body<B>(body: B) -> Body
    where
        B: http_body::Body<Data = Bytes> + Send + 'static,
        B::Error: std::error::Error + Send + Sync + 'static,
    {
        use futures_util::StreamExt;
        use http_body_util::BodyStream;

        let stream = BodyStream::new(body).filter_map(|frame| async move {
            match frame {
                Ok(frame) => frame.into_data().ok().map(Ok),
                Err(e) => Some(Err(Error::Io(std::io::Error::other(e)))),
            }
        });

        Body::Streaming(Box::pin(stream))
    }
}

impl From<()> for Body {
    fn from(_: ()) -> Body {
        Body::Empty
    }
}

impl From<Bytes> for Body {
    fn from(b: Bytes) -> Body {
        Body::Full(b)
    }
}

impl From<Vec<u8>> for Body {
    fn from(b: Vec<u8>) -> Body {
        Body::Full(Bytes::from(b))
    }
}

impl From<String> for Body {
    fn from(s: String) -> Body {
        Body::Full(Bytes::from(s))
    }
}

impl From<&'static str> for Body {
    fn from(s: &'static str) -> Body {
        Body::Full(Bytes::from_static(s.as_bytes()))
    }
}

impl From<PathBuf> for Body {
    /// Opens lazily: the path is resolved to an open file the first time
    /// the dispatcher needs to read from it (§4.2 "path or file channel").
    fn from(path: PathBuf) -> Body {
        Body::Chunked(ChunkedBody {
            len_hint: None,
            stream: Box::pin(PathBodyStream::new(path)),
        })
    }
}

enum PathBodyState {
    Unopened(Option<PathBuf>),
    Opening(Pin<Box<dyn std::future::Future<Output = std::io::Result<tokio::fs::File>> + Send>>),
    Reading(tokio::fs::File),
    Done,
}

/// Reads a file path lazily in fixed-size chunks. Fully `Unpin`: the only
/// self-referential state is the boxed open future, which owns its pin.
struct PathBodyStream {
    state: PathBodyState,
}

impl PathBodyStream {
    fn new(path: PathBuf) -> PathBodyStream {
        PathBodyStream {
            state: PathBodyState::Unopened(Some(path)),
        }
    }
}

impl Stream for PathBodyStream {
    type Item = Result<Bytes, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match &mut this.state {
                PathBodyState::Unopened(path) => {
                    let path = path.take().expect("path taken twice");
                    this.state = PathBodyState::Opening(Box::pin(tokio::fs::File::open(path)));
                }
                PathBodyState::Opening(fut) => match fut.as_mut().poll(cx) {
                    Poll::Pending => return Poll::Pending,
                    Poll::Ready(Err(e)) => {
                        this.state = PathBodyState::Done;
                        return Poll::Ready(Some(Err(Error::Io(e))));
                    }
                    Poll::Ready(Ok(file)) => {
                        this.state = PathBodyState::Reading(file);
                    }
                },
                PathBodyState::Reading(file) => {
                    let mut buf = vec![0u8; 64 * 1024];
                    let mut read_buf = tokio::io::ReadBuf::new(&mut buf);
                    match Pin::new(file).poll_read(cx, &mut read_buf) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Err(e)) => {
                            this.state = PathBodyState::Done;
                            return Poll::Ready(Some(Err(Error::Io(e))));
                        }
                        Poll::Ready(Ok(())) => {
                            let n = read_buf.filled().len();
                            if n == 0 {
                                this.state = PathBodyState::Done;
                                return Poll::Ready(None);
                            }
                            buf.truncate(n);
                            return Poll::Ready(Some(Ok(Bytes::from(buf))));
                        }
                    }
                }
                PathBodyState::Done => return Poll::Ready(None),
            }
        }
    }
}
