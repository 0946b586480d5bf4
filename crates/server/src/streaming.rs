use std::io::SeekFrom;

use axum::body::Body;
use axum::extract::{Path as AxumPath, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use common::join_relpath;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::api::library_or_response;
use crate::range::{resolve_requested, ByteRange};
use crate::state::AppState;
use crate::utils::json_error_response;

const STREAM_CHUNK_SIZE: usize = 1024 * 1024;

/// Serve a track's file bytes, honoring a single `bytes=start-end?`
/// range. No header gets a plain 200 over the whole file; a header gets
/// a 206 over the requested window, where an unparseable header counts
/// as a request for the whole file. The body holds the file open only
/// while the client keeps reading.
pub async fn stream_track(
    State(state): State<AppState>,
    AxumPath(track_id): AxumPath<String>,
    headers: HeaderMap,
) -> Response {
    let library = match library_or_response(&state) {
        Ok(library) => library,
        Err(response) => return response,
    };
    let track = match library.get_track(&track_id) {
        Ok(Some(track)) => track,
        Ok(None) => return json_error_response(StatusCode::NOT_FOUND, "track not found"),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("library error: {}", err),
            )
        }
    };

    let path = join_relpath(library.root(), &track.file_relpath);
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(_) => return json_error_response(StatusCode::NOT_FOUND, "track file not found"),
    };
    let size = match file.metadata().await {
        Ok(meta) => meta.len(),
        Err(err) => {
            return json_error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to stat track file: {}", err),
            )
        }
    };
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();

    let range_header = headers.get(header::RANGE).and_then(|v| v.to_str().ok());

    // Empty files have no satisfiable range; always serve a plain 200.
    if range_header.is_none() || size == 0 {
        let stream = ReaderStream::with_capacity(file, STREAM_CHUNK_SIZE);
        let mut response = Response::new(Body::from_stream(stream));
        let response_headers = response.headers_mut();
        response_headers.insert(header::CONTENT_TYPE, content_type_value(content_type.as_ref()));
        response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(size));
        return response;
    }

    let range = resolve_requested(range_header, size);
    if let Err(err) = file.seek(SeekFrom::Start(range.start)).await {
        return json_error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to seek track file: {}", err),
        );
    }

    // A short read simply ends the stream; it is not an error.
    let window = file.take(range.len());
    let stream = ReaderStream::with_capacity(window, STREAM_CHUNK_SIZE);
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, content_type_value(content_type.as_ref()));
    response_headers.insert(
        header::CONTENT_RANGE,
        HeaderValue::from_str(&content_range_value(range, size))
            .unwrap_or_else(|_| HeaderValue::from_static("bytes */0")),
    );
    response_headers.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    response_headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
    response
}

fn content_range_value(range: ByteRange, size: u64) -> String {
    format!("bytes {}-{}/{}", range.start, range.end, size)
}

fn content_type_value(mime: &str) -> HeaderValue {
    HeaderValue::from_str(mime)
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn content_range_is_rfc_shaped() {
        let range = ByteRange { start: 0, end: 99 };
        assert_eq!(content_range_value(range, 1000), "bytes 0-99/1000");
    }

    #[tokio::test]
    async fn seek_and_take_yield_exactly_the_window() {
        let mut tmp = NamedTempFile::new().unwrap();
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let range = resolve_requested(Some("bytes=100-299"), 1000);
        assert_eq!(range.len(), 200);

        let mut file = tokio::fs::File::open(tmp.path()).await.unwrap();
        file.seek(SeekFrom::Start(range.start)).await.unwrap();
        let mut body = Vec::new();
        file.take(range.len()).read_to_end(&mut body).await.unwrap();

        assert_eq!(body.len(), 200);
        assert_eq!(body.as_slice(), &data[100..300]);
    }

    #[tokio::test]
    async fn malformed_range_reads_the_whole_file() {
        let mut tmp = NamedTempFile::new().unwrap();
        let data = vec![7u8; 1000];
        tmp.write_all(&data).unwrap();
        tmp.flush().unwrap();

        let range = resolve_requested(Some("bytes=abc"), 1000);
        assert_eq!(range, ByteRange::full(1000));

        let mut file = tokio::fs::File::open(tmp.path()).await.unwrap();
        file.seek(SeekFrom::Start(range.start)).await.unwrap();
        let mut body = Vec::new();
        file.take(range.len()).read_to_end(&mut body).await.unwrap();
        assert_eq!(body, data);
    }
}
