//! Body Dispatcher (§4.2): given an already-open `h2::SendStream<Bytes>`
//! (HEADERS have already gone out — see §4.2.1 and the per-kind
//! dispatch below) and a [`Body`], drains it into DATA frames so that
//! exactly one frame carries END_STREAM.
//!
//! The capacity loop in [`write_buf`] is grounded directly on the
//! teacher's `server::Send` future (`src/server.rs`: `reserve_capacity` /
//! `poll_capacity` / `capacity` / `send_data`), generalized from a single
//! `futures::Stream<Item = Bytes>` source to the full [`Body`] sum type.

use bytes::{Buf, Bytes};
use http::{HeaderMap, HeaderValue, StatusCode};

use crate::body::{Body, BoxBodyStream, FileBody, FileRegion};
use crate::error::{Error, Reason, UserError};
use crate::stream_id::StreamId;

/// §4.2: "attempts to set `content-length` when the body's length is
/// statically known AND the message is not a 1xx or 204 response."
pub fn apply_content_length(headers: &mut HeaderMap, status: Option<StatusCode>, body: &Body) {
    if let Some(status) = status {
        if status.is_informational() || status == StatusCode::NO_CONTENT {
            return;
        }
    }

    if headers.contains_key(http::header::CONTENT_LENGTH) {
        return;
    }

    if let Some(len) = body.known_length() {
        if let Ok(value) = HeaderValue::from_str(&len.to_string()) {
            headers.insert(http::header::CONTENT_LENGTH, value);
        }
    }
}

const HTTP_DATE_FORMAT: &[time::format_description::FormatItem<'static>] = time::macros::format_description!(
    "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
);

/// Formats the current instant as an RFC 9110 IMF-fixdate, for the `date`
/// response header (§4.5 step 3).
pub fn http_date_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(HTTP_DATE_FORMAT)
        .unwrap_or_default()
}

/// §4.5 step 3 / §3 ResponseMap: inject `server`, `date` and a UTF-8
/// charset extension to `text/plain` when absent.
pub fn apply_default_response_headers(headers: &mut HeaderMap, now_http_date: &str) {
    headers
        .entry(http::header::SERVER)
        .or_insert_with(|| HeaderValue::from_static("h2-engine"));

    headers
        .entry(http::header::DATE)
        .or_insert_with(|| HeaderValue::from_str(now_http_date).expect("valid HTTP-date"));

    if let Some(content_type) = headers.get(http::header::CONTENT_TYPE).cloned() {
        if content_type.as_bytes() == b"text/plain" {
            headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=UTF-8"),
            );
        }
    }
}

/// Drains `body` into `send`, choosing the strategy named in §4.2's
/// dispatch table. `id` is used only to label a FileRegion-on-TLS
/// rejection as a stream error. Returns once END_STREAM has been sent
/// (or the stream has been reset).
pub async fn send_body(
    send: &mut h2::SendStream<Bytes>,
    id: StreamId,
    body: Body,
    chunk_size: u32,
    tls_active: bool,
) -> Result<(), Error> {
    match body {
        Body::Empty => {
            // HEADERS already carried END_STREAM for this case (§4.2 row
            // 1); nothing left to write.
            Ok(())
        }
        Body::Full(bytes) => write_buf(send, bytes, chunk_size).await,
        Body::Chunked(chunked) => drain_stream(send, chunked.stream, chunk_size).await,
        Body::File(file) => drain_stream(send, file_stream(file), chunk_size).await,
        Body::FileRegion(region) => {
            if tls_active {
                send.send_reset(Reason::InternalError.to_h2());
                return Err(Error::user_stream(id, UserError::FileRegionOnTls));
            }
            drain_stream(send, file_region_stream(region), chunk_size).await
        }
        Body::Streaming(stream) => drain_stream(send, stream, chunk_size).await,
    }
}

/// Contiguous strategy (§4.2 row 2): a single logical buffer, split only
/// as needed to respect flow-control capacity and the 2^24-1 frame size
/// cap, with the final split segment carrying END_STREAM.
async fn write_buf(send: &mut h2::SendStream<Bytes>, mut data: Bytes, chunk_size: u32) -> Result<(), Error> {
    if data.is_empty() {
        send.send_data(Bytes::new(), true)?;
        return Ok(());
    }

    while !data.is_empty() {
        let want = data.len().min(chunk_size as usize);
        send.reserve_capacity(want);
        let cap = std::future::poll_fn(|cx| send.poll_capacity(cx)).await;
        let cap = match cap {
            None => return Err(Error::stream(StreamId::from(send.stream_id()), Reason::StreamClosed)),
            Some(res) => res?,
        };
        if cap == 0 {
            continue;
        }
        let take = cap.min(data.len());
        let chunk = data.split_to(take);
        let is_last = data.is_empty();
        send.send_data(chunk, is_last)?;
    }

    Ok(())
}

/// Chunked / file / file-region / streaming strategies (§4.2 rows 3-8):
/// pull chunks from an async source and flush each through the same
/// capacity loop as [`write_buf`], finishing with an empty END_STREAM
/// frame once the source is exhausted (§4.2: "close yields a final empty
/// DATA(END_STREAM)").
async fn drain_stream(
    send: &mut h2::SendStream<Bytes>,
    mut source: BoxBodyStream,
    chunk_size: u32,
) -> Result<(), Error> {
    use futures_util::StreamExt;

    while let Some(next) = source.next().await {
        let chunk = next?;
        if chunk.is_empty() {
            continue;
        }
        write_chunk(send, chunk, chunk_size).await?;
    }

    send.send_data(Bytes::new(), true)?;
    Ok(())
}

/// Writes one already-sized chunk through the flow-control capacity
/// loop, splitting further if it exceeds `chunk_size` or the window.
async fn write_chunk(send: &mut h2::SendStream<Bytes>, mut chunk: Bytes, chunk_size: u32) -> Result<(), Error> {
    while chunk.has_remaining() {
        let want = chunk.remaining().min(chunk_size as usize);
        send.reserve_capacity(want);
        let cap = std::future::poll_fn(|cx| send.poll_capacity(cx)).await;
        let cap = match cap {
            None => return Err(Error::stream(StreamId::from(send.stream_id()), Reason::StreamClosed)),
            Some(res) => res?,
        };
        if cap == 0 {
            continue;
        }
        let take = cap.min(chunk.remaining());
        let piece = chunk.copy_to_bytes(take);
        send.send_data(piece, false)?;
    }
    Ok(())
}

/// Adapts a [`FileBody`] into a chunk stream (§4.2 rows 4-5: "random
/// access file" / "path or file channel").
fn file_stream(file: FileBody) -> BoxBodyStream {
    use futures_util::stream;

    let chunk_size = file.chunk_size.unwrap_or(crate::config::DEFAULT_CHUNK_SIZE) as usize;
    Box::pin(stream::unfold(
        (file.file, file.offset, file.len, chunk_size),
        move |(file, offset, remaining, chunk_size)| async move {
            read_one_chunk(file, offset, remaining, chunk_size).await
        },
    ))
}

/// Adapts a [`FileRegion`] into a chunk stream (§4.2 row 6, once the TLS
/// check in [`send_body`] has passed).
fn file_region_stream(region: FileRegion) -> BoxBodyStream {
    use futures_util::stream;

    let chunk_size = crate::config::DEFAULT_CHUNK_SIZE as usize;
    Box::pin(stream::unfold(
        (region.file, region.offset, Some(region.len), chunk_size),
        move |(file, offset, remaining, chunk_size)| async move {
            read_one_chunk(file, offset, remaining, chunk_size).await
        },
    ))
}

type FileReadState = (
    std::sync::Arc<tokio::fs::File>,
    u64,
    Option<u64>,
    usize,
);

async fn read_one_chunk(
    file: std::sync::Arc<tokio::fs::File>,
    offset: u64,
    remaining: Option<u64>,
    chunk_size: usize,
) -> Option<(Result<Bytes, Error>, FileReadState)> {
    use tokio::io::AsyncSeekExt;
    use tokio::io::AsyncReadExt;

    if let Some(0) = remaining {
        return None;
    }

    let want = match remaining {
        Some(r) => (r as usize).min(chunk_size),
        None => chunk_size,
    };

    // `Arc<tokio::fs::File>` is shared across reads from a single
    // sequential producer, so a `&File` positional read-and-seek pair
    // is safe: nothing else touches this handle concurrently.
    let mut buf = vec![0u8; want];
    let result = file.try_clone().await;

    let mut handle = match result {
        Ok(h) => h,
        Err(e) => return Some((Err(Error::Io(e)), (file, offset, remaining, chunk_size))),
    };

    if let Err(e) = handle.seek(std::io::SeekFrom::Start(offset)).await {
        return Some((Err(Error::Io(e)), (file, offset, remaining, chunk_size)));
    }

    let n = match handle.read(&mut buf).await {
        Ok(n) => n,
        Err(e) => return Some((Err(Error::Io(e)), (file, offset, remaining, chunk_size))),
    };

    if n == 0 {
        return None;
    }

    buf.truncate(n);
    let next_remaining = remaining.map(|r| r - n as u64);
    Some((
        Ok(Bytes::from(buf)),
        (file, offset + n as u64, next_remaining, chunk_size),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_content_length_for_1xx() {
        let mut headers = HeaderMap::new();
        apply_content_length(&mut headers, Some(StatusCode::CONTINUE), &Body::Full(Bytes::from_static(b"x")));
        assert!(!headers.contains_key(http::header::CONTENT_LENGTH));
    }

    #[test]
    fn no_content_length_for_204() {
        let mut headers = HeaderMap::new();
        apply_content_length(&mut headers, Some(StatusCode::NO_CONTENT), &Body::Full(Bytes::from_static(b"x")));
        assert!(!headers.contains_key(http::header::CONTENT_LENGTH));
    }

    #[test]
    fn content_length_for_known_body() {
        let mut headers = HeaderMap::new();
        apply_content_length(&mut headers, Some(StatusCode::OK), &Body::Full(Bytes::from_static(b"hello")));
        assert_eq!(headers.get(http::header::CONTENT_LENGTH).unwrap(), "5");
    }

    #[test]
    fn no_content_length_for_unknown_streaming_body() {
        let mut headers = HeaderMap::new();
        let stream = Box::pin(futures_util::stream::empty());
        apply_content_length(&mut headers, Some(StatusCode::OK), &Body::Streaming(stream));
        assert!(!headers.contains_key(http::header::CONTENT_LENGTH));
    }

    #[test]
    fn injects_server_date_and_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        apply_default_response_headers(&mut headers, "Sun, 01 Jan 2026 00:00:00 GMT");
        assert_eq!(
            headers.get(http::header::CONTENT_TYPE).unwrap(),
            "text/plain; charset=UTF-8"
        );
        assert!(headers.contains_key(http::header::SERVER));
        assert!(headers.contains_key(http::header::DATE));
    }

    #[test]
    fn does_not_override_existing_server_header() {
        let mut headers = HeaderMap::new();
        headers.insert(http::header::SERVER, HeaderValue::from_static("custom"));
        apply_default_response_headers(&mut headers, "Sun, 01 Jan 2026 00:00:00 GMT");
        assert_eq!(headers.get(http::header::SERVER).unwrap(), "custom");
    }
}
