use std::io::SeekFrom;
use std::path::Path;

use axum::body::Body;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::Response;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::range::{parse_range_header, unsatisfiable_content_range, RangeError};

#[derive(Debug)]
pub enum StreamError {
    NotFound,
    NotAFile,
    Range { error: RangeError, size: u64 },
    Io(std::io::Error),
    Http(axum::http::Error),
}

impl StreamError {
    pub fn status(&self) -> StatusCode {
        match self {
            StreamError::NotFound => StatusCode::NOT_FOUND,
            StreamError::NotAFile => StatusCode::BAD_REQUEST,
            StreamError::Range {
                error: RangeError::Invalid,
                ..
            } => StatusCode::BAD_REQUEST,
            StreamError::Range {
                error: RangeError::Unsatisfiable,
                ..
            } => StatusCode::RANGE_NOT_SATISFIABLE,
            StreamError::Io(_) | StreamError::Http(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamError::NotFound => write!(f, "file not found"),
            StreamError::NotAFile => write!(f, "path is not a regular file"),
            StreamError::Range { error, .. } => write!(f, "{}", error),
            StreamError::Io(err) => write!(f, "io error: {}", err),
            StreamError::Http(err) => write!(f, "response error: {}", err),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            StreamError::NotFound
        } else {
            StreamError::Io(err)
        }
    }
}

impl From<axum::http::Error> for StreamError {
    fn from(err: axum::http::Error) -> Self {
        StreamError::Http(err)
    }
}

pub fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Streams `path` from disk, honoring a single `Range` header. The file is
/// read lazily as the body is polled.
pub async fn stream_file(path: &Path, headers: &HeaderMap) -> Result<Response, StreamError> {
    let metadata = tokio::fs::metadata(path).await?;
    if !metadata.is_file() {
        return Err(StreamError::NotAFile);
    }
    let size = metadata.len();
    let content_type = content_type_for(path);

    let range = match headers.get(header::RANGE) {
        None => None,
        Some(value) => {
            let value = value.to_str().map_err(|_| StreamError::Range {
                error: RangeError::Invalid,
                size,
            })?;
            let range = parse_range_header(value, size)
                .map_err(|error| StreamError::Range { error, size })?;
            Some(range)
        }
    };

    let mut file = File::open(path).await?;
    match range {
        None => {
            debug!("Streaming {:?} ({} bytes)", path, size);
            let body = Body::from_stream(ReaderStream::new(file));
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, content_type.as_str())
                .header(header::CONTENT_LENGTH, size.to_string())
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)?)
        }
        Some(range) => {
            debug!("Streaming {:?} bytes {}-{}/{}", path, range.start, range.end, size);
            file.seek(SeekFrom::Start(range.start)).await?;
            let body = Body::from_stream(ReaderStream::new(file.take(range.len())));
            Ok(Response::builder()
                .status(StatusCode::PARTIAL_CONTENT)
                .header(header::CONTENT_TYPE, content_type.as_str())
                .header(header::CONTENT_LENGTH, range.len().to_string())
                .header(header::CONTENT_RANGE, range.content_range(size))
                .header(header::ACCEPT_RANGES, "bytes")
                .body(body)?)
        }
    }
}

/// Header value for a 416 answer, when the error carries one.
pub fn error_content_range(err: &StreamError) -> Option<String> {
    match err {
        StreamError::Range {
            error: RangeError::Unsatisfiable,
            size,
        } => Some(unsatisfiable_content_range(*size)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn sample_file(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("clip.mp4");
        let bytes: Vec<u8> = (0u8..100).collect();
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn range_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, HeaderValue::from_str(value).unwrap());
        headers
    }

    async fn body_bytes(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn full_file_without_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir);
        let response = stream_file(&path, &HeaderMap::new()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");
        assert_eq!(response.headers()[header::ACCEPT_RANGES], "bytes");
        let body = body_bytes(response).await;
        assert_eq!(body, (0u8..100).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn closed_range_returns_slice() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir);
        let response = stream_file(&path, &range_headers("bytes=10-19")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 10-19/100");
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "10");
        let body = body_bytes(response).await;
        assert_eq!(body, (10u8..20).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn open_range_returns_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir);
        let response = stream_file(&path, &range_headers("bytes=90-")).await.unwrap();
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 90-99/100");
        let body = body_bytes(response).await;
        assert_eq!(body, (90u8..100).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn range_errors_map_to_statuses() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample_file(&dir);

        let err = stream_file(&path, &range_headers("bytes=200-")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(error_content_range(&err).as_deref(), Some("bytes */100"));

        let err = stream_file(&path, &range_headers("bytes=20-10")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_content_range(&err), None);
    }

    #[tokio::test]
    async fn missing_and_directory_paths() {
        let dir = tempfile::tempdir().unwrap();
        let err = stream_file(&dir.path().join("gone.mp4"), &HeaderMap::new())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = stream_file(dir.path(), &HeaderMap::new()).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn content_types_follow_extension() {
        assert_eq!(content_type_for(Path::new("a.MKV")), "video/x-matroska");
        assert_eq!(content_type_for(Path::new("a.mp4")), "video/mp4");
        assert_eq!(content_type_for(Path::new("cover.jpeg")), "image/jpeg");
        assert_eq!(content_type_for(Path::new("README")), "application/octet-stream");
    }
}
