//! Header Codec (§4.1): validates and normalizes the headers and
//! pseudo-headers that flow between the generic request/response maps
//! (`http::Request<Body>` / `http::Response<Body>`, see §3) and the HEADERS
//! block the `h2` crate encodes on our behalf.
//!
//! The `h2` crate already knows how to turn an `http::request::Parts` /
//! `http::response::Parts` into pseudo-headers plus a HEADERS frame (that
//! conversion is exactly the "external collaborator" carved out by §1's
//! OUT OF SCOPE list). What's left for this module, per §4.1, is the
//! validation `h2` does *not* do on our behalf: rejecting
//! connection-specific headers, constraining `transfer-encoding`, and
//! catching missing pseudo-header components before a single frame is
//! written.

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method, StatusCode, Uri};

use crate::error::{Error, Reason, UserError};
use crate::header_cache::HEADER_NAME_CACHE;

/// Interns and validates a header name supplied as an arbitrarily-cased
/// string (§4.1: "a process-wide cache maps the incoming (cased) name to
/// its interned lower-cased form").
pub fn header_name(name: &str) -> Result<HeaderName, Error> {
    if name.is_empty() {
        return Err(UserError::EmptyHeaderName.into());
    }
    HEADER_NAME_CACHE
        .intern(name)
        .map_err(|_| UserError::EmptyHeaderName.into())
}

/// Header names forbidden on an HTTP/2 connection (§4.1, §8 invariant).
const FORBIDDEN: &[&str] = &["connection", "proxy-connection", "keep-alive", "upgrade"];

/// Validates headers destined for the wire. Runs in the fixed order fixed
/// by SPEC_FULL.md §4.1.1: forbidden names first, then the
/// `transfer-encoding` value.
///
/// Every outbound header name is funneled through the process-wide
/// [`header_name`] cache first: `http::HeaderMap` keys are already typed
/// `HeaderName`s, so this can't fail, but it's the one call site that
/// actually exercises the §4.1 interning cache on every request and
/// response this engine sends, rather than leaving it reachable only from
/// its own tests.
pub fn validate_outbound_headers(headers: &HeaderMap) -> Result<(), Error> {
    for name in headers.keys() {
        header_name(name.as_str())?;
    }

    for forbidden in FORBIDDEN {
        if headers.contains_key(*forbidden) {
            let name = HeaderName::from_static(forbidden);
            return Err(UserError::ForbiddenHeader(name).into());
        }
    }

    if let Some(te) = headers.get(http::header::TRANSFER_ENCODING) {
        if te.as_bytes() != b"trailers" {
            return Err(UserError::BadTransferEncoding.into());
        }
    }

    Ok(())
}

/// Validates the pseudo-header-bearing parts of an outbound request
/// (§4.1: missing `:method`/`:scheme`/`:authority`/`:path` is a
/// StreamException(PROTOCOL_ERROR)).
///
/// `http::Request` always carries a `Method`, so only the URI's scheme,
/// authority and path need checking here.
pub fn validate_outbound_request_uri(uri: &Uri) -> Result<(), Error> {
    if uri.scheme().is_none() {
        return Err(Error::stream(crate::StreamId::ZERO, Reason::ProtocolError));
    }
    if uri.authority().is_none() {
        return Err(Error::stream(crate::StreamId::ZERO, Reason::ProtocolError));
    }
    if uri.path().is_empty() {
        return Err(Error::stream(crate::StreamId::ZERO, Reason::ProtocolError));
    }
    Ok(())
}

/// §4.1: "A TRACE method with a non-nil body silently drops the body with
/// a warning." Called by the Body Dispatcher before it picks a strategy.
pub fn should_drop_trace_body(method: &Method) -> bool {
    *method == Method::TRACE
}

/// §4.5 step 3: "if the original request was HEAD, substitute the
/// 'omitted' body (drop any provided body with a warning)."
pub fn should_drop_head_response_body(method: &Method) -> bool {
    *method == Method::HEAD
}

/// §4.1: "Response side writes `:status` as the three-digit code text,
/// defaulting to 200 when absent (compatibility affordance)." `http`'s
/// own `Response::builder()` already defaults an unset status to 200, so
/// this helper exists mainly to document and test that the compatibility
/// affordance holds; see SPEC_FULL.md §9.1 for why it is not hardened
/// into an error.
pub fn response_status_or_default(status: Option<StatusCode>) -> StatusCode {
    status.unwrap_or(StatusCode::OK)
}

/// §4.1 inbound: splits a request path pseudo-header into `:path`/`:uri`
/// (the decoded path) and `:query-string` (empty becomes `None`).
pub fn split_path_and_query(uri: &Uri) -> (&str, Option<&str>) {
    let path = uri.path();
    let query = uri.query().filter(|q| !q.is_empty());
    (path, query)
}

/// Builds a single header into a `HeaderMap`, interning the name through
/// the process-wide cache. Used when assembling a `RequestMap`/
/// `ResponseMap` from loosely-typed (name, value) pairs rather than an
/// already-typed `http::HeaderMap`.
pub fn insert_header(map: &mut HeaderMap, name: &str, value: HeaderValue) -> Result<(), Error> {
    let name = header_name(name)?;
    map.append(name, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_connection_header() {
        let mut headers = HeaderMap::new();
        headers.insert("connection", HeaderValue::from_static("keep-alive"));
        assert!(validate_outbound_headers(&headers).is_err());
    }

    #[test]
    fn rejects_non_trailers_transfer_encoding() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", HeaderValue::from_static("chunked"));
        assert!(validate_outbound_headers(&headers).is_err());
    }

    #[test]
    fn allows_transfer_encoding_trailers() {
        let mut headers = HeaderMap::new();
        headers.insert("transfer-encoding", HeaderValue::from_static("trailers"));
        assert!(validate_outbound_headers(&headers).is_ok());
    }

    #[test]
    fn missing_authority_is_a_stream_error() {
        let uri: Uri = "/relative".parse().unwrap();
        assert!(validate_outbound_request_uri(&uri).is_err());
    }

    #[test]
    fn absolute_uri_is_valid() {
        let uri: Uri = "https://h.example/".parse().unwrap();
        assert!(validate_outbound_request_uri(&uri).is_ok());
    }

    #[test]
    fn splits_path_and_query() {
        let uri: Uri = "https://h.example/a/b?x=1".parse().unwrap();
        let (path, query) = split_path_and_query(&uri);
        assert_eq!(path, "/a/b");
        assert_eq!(query, Some("x=1"));
    }

    #[test]
    fn empty_query_is_none() {
        let uri: Uri = "https://h.example/a?".parse().unwrap();
        let (_, query) = split_path_and_query(&uri);
        assert_eq!(query, None);
    }
}
