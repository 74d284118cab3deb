//! Error taxonomy for the engine.
//!
//! Every failure the engine produces is either scoped to a single stream
//! (-> RST_STREAM) or to the whole connection (-> GOAWAY). [`h2::Error`]
//! values coming back from the underlying frame codec are folded into the
//! same taxonomy so callers never need to match on two different error
//! types depending on which layer failed.

use std::fmt;

use crate::StreamId;

/// RFC 9113 §7 error codes, plus the catch-all the spec allows for values
/// we don't otherwise recognize.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    NoError,
    ProtocolError,
    InternalError,
    FlowControlError,
    SettingsTimeout,
    StreamClosed,
    FrameSizeError,
    RefusedStream,
    Cancel,
    CompressionError,
    ConnectError,
    EnhanceYourCalm,
    InadequateSecurity,
    Http11Required,
    Other(u32),
}

impl Reason {
    pub(crate) fn from_h2(reason: h2::Reason) -> Reason {
        match reason {
            h2::Reason::NO_ERROR => Reason::NoError,
            h2::Reason::PROTOCOL_ERROR => Reason::ProtocolError,
            h2::Reason::INTERNAL_ERROR => Reason::InternalError,
            h2::Reason::FLOW_CONTROL_ERROR => Reason::FlowControlError,
            h2::Reason::SETTINGS_TIMEOUT => Reason::SettingsTimeout,
            h2::Reason::STREAM_CLOSED => Reason::StreamClosed,
            h2::Reason::FRAME_SIZE_ERROR => Reason::FrameSizeError,
            h2::Reason::REFUSED_STREAM => Reason::RefusedStream,
            h2::Reason::CANCEL => Reason::Cancel,
            h2::Reason::COMPRESSION_ERROR => Reason::CompressionError,
            h2::Reason::CONNECT_ERROR => Reason::ConnectError,
            h2::Reason::ENHANCE_YOUR_CALM => Reason::EnhanceYourCalm,
            h2::Reason::INADEQUATE_SECURITY => Reason::InadequateSecurity,
            h2::Reason::HTTP_1_1_REQUIRED => Reason::Http11Required,
            other => Reason::Other(other.into()),
        }
    }

    pub(crate) fn to_h2(self) -> h2::Reason {
        match self {
            Reason::NoError => h2::Reason::NO_ERROR,
            Reason::ProtocolError => h2::Reason::PROTOCOL_ERROR,
            Reason::InternalError => h2::Reason::INTERNAL_ERROR,
            Reason::FlowControlError => h2::Reason::FLOW_CONTROL_ERROR,
            Reason::SettingsTimeout => h2::Reason::SETTINGS_TIMEOUT,
            Reason::StreamClosed => h2::Reason::STREAM_CLOSED,
            Reason::FrameSizeError => h2::Reason::FRAME_SIZE_ERROR,
            Reason::RefusedStream => h2::Reason::REFUSED_STREAM,
            Reason::Cancel => h2::Reason::CANCEL,
            Reason::CompressionError => h2::Reason::COMPRESSION_ERROR,
            Reason::ConnectError => h2::Reason::CONNECT_ERROR,
            Reason::EnhanceYourCalm => h2::Reason::ENHANCE_YOUR_CALM,
            Reason::InadequateSecurity => h2::Reason::INADEQUATE_SECURITY,
            Reason::Http11Required => h2::Reason::HTTP_1_1_REQUIRED,
            Reason::Other(v) => v.into(),
        }
    }

    /// `true` for NO_ERROR, which is logged at info rather than warn (§7).
    pub fn is_no_error(&self) -> bool {
        matches!(self, Reason::NoError)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Whether a connection shutdown closes immediately or drains open streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownHint {
    /// Close as soon as GOAWAY has been flushed.
    Hard,
    /// Allow up to `extra_stream_ids` more peer-initiated streams to be
    /// processed before the connection is torn down.
    Graceful { extra_stream_ids: u32 },
}

impl ShutdownHint {
    pub const fn graceful_unbounded() -> ShutdownHint {
        ShutdownHint::Graceful {
            extra_stream_ids: u32::MAX,
        }
    }
}

/// Header validation failures that never reach the wire.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UserError {
    #[error("header name {0:?} is forbidden on an HTTP/2 connection")]
    ForbiddenHeader(http::HeaderName),
    #[error("transfer-encoding must be exactly \"trailers\" on HTTP/2")]
    BadTransferEncoding,
    #[error("missing required pseudo-header {0}")]
    MissingPseudoHeader(&'static str),
    #[error("header name must not be empty")]
    EmptyHeaderName,
    #[error("file-region bodies are not supported over a TLS-wrapped HTTP/2 connection")]
    FileRegionOnTls,
}

/// The engine's single error type. See SPEC_FULL.md §7.1.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Isolated to one stream; the engine answers with RST_STREAM and the
    /// rest of the connection continues unaffected. `user`, when set,
    /// carries the specific body/header rule that triggered the reset
    /// (e.g. [`UserError::FileRegionOnTls`]) for callers that want more
    /// than the wire-visible `Reason`.
    #[error("stream {id:?} reset: {reason}")]
    Stream {
        id: StreamId,
        reason: Reason,
        user: Option<UserError>,
    },

    /// Affects the whole connection; the engine answers with GOAWAY.
    #[error("connection closing: {reason} ({hint:?})")]
    Connection { reason: Reason, hint: ShutdownHint },

    /// A header/body shape was rejected before any frame was written.
    #[error("invalid request: {0}")]
    User(#[from] UserError),

    /// Propagated verbatim from the underlying `h2` frame codec.
    #[error("transport error: {0}")]
    Transport(#[from] h2::Error),

    /// An I/O error unrelated to the h2 wire protocol (e.g. file bodies).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn stream(id: StreamId, reason: Reason) -> Error {
        Error::Stream {
            id,
            reason,
            user: None,
        }
    }

    /// Builds a stream-scoped error out of a [`UserError`], picking the
    /// RST_STREAM reason that matches its kind (§7's StreamException
    /// shape: a `StreamId` plus a `Reason`, here with the originating
    /// `UserError` attached for diagnostics).
    pub fn user_stream(id: StreamId, err: UserError) -> Error {
        let reason = match &err {
            UserError::FileRegionOnTls => Reason::InternalError,
            UserError::ForbiddenHeader(_)
            | UserError::BadTransferEncoding
            | UserError::MissingPseudoHeader(_)
            | UserError::EmptyHeaderName => Reason::ProtocolError,
        };
        Error::Stream {
            id,
            reason,
            user: Some(err),
        }
    }

    pub fn connection(reason: Reason, hint: ShutdownHint) -> Error {
        Error::Connection { reason, hint }
    }

    /// The error is a transport-level GOAWAY/reset, translated to our
    /// `Reason`/hint pair, if this error came from (or implies) one.
    pub fn as_connection_reason(&self) -> Option<Reason> {
        match self {
            Error::Connection { reason, .. } => Some(*reason),
            Error::Transport(e) if e.is_go_away() => {
                Some(e.reason().map(Reason::from_h2).unwrap_or(Reason::InternalError))
            }
            _ => None,
        }
    }

    /// The error is a stream reset, translated to our `Reason`, if this
    /// error came from (or implies) one.
    pub fn as_stream_reason(&self) -> Option<Reason> {
        match self {
            Error::Stream { reason, .. } => Some(*reason),
            Error::Transport(e) if e.is_reset() => {
                Some(e.reason().map(Reason::from_h2).unwrap_or(Reason::InternalError))
            }
            _ => None,
        }
    }

    /// Whether this should be logged at `warn` (any non-NO_ERROR reason)
    /// rather than `info` (§7: "NO_ERROR shutdowns are logged at info").
    pub fn is_noteworthy(&self) -> bool {
        match self.as_connection_reason().or_else(|| self.as_stream_reason()) {
            Some(reason) => !reason.is_no_error(),
            None => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
