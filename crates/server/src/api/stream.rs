use std::path::Path;

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::paths::{resolve_virtual_path, PathError};
use crate::state::{AppState, StreamQuery};
use crate::stream::{error_content_range, stream_file};
use crate::utils::json_error_response;

use super::catalog_or_json_error;

pub async fn stream_media(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Response {
    let catalog = match catalog_or_json_error(&state) {
        Ok(catalog) => catalog,
        Err(err) => return err.into_response(),
    };
    let requested = query.path.unwrap_or_default();
    let path = match resolve_virtual_path(catalog.root(), catalog.virtual_prefix(), &requested) {
        Ok(path) => path,
        Err(PathError::Empty) => {
            return json_error_response(StatusCode::BAD_REQUEST, PathError::Empty.to_string())
        }
        Err(err @ PathError::OutsideRoot) => {
            warn!("Rejected stream request outside media root: {}", requested);
            return json_error_response(StatusCode::FORBIDDEN, err.to_string());
        }
    };

    if !state.config.follow_links && escapes_root(catalog.root(), &path).await {
        warn!("Rejected stream request through a link: {}", requested);
        return json_error_response(StatusCode::FORBIDDEN, PathError::OutsideRoot.to_string());
    }

    match stream_file(&path, &headers).await {
        Ok(response) => response,
        Err(err) => {
            let mut response = json_error_response(err.status(), err.to_string());
            if let Some(value) = error_content_range(&err) {
                if let Ok(value) = HeaderValue::from_str(&value) {
                    response.headers_mut().insert(header::CONTENT_RANGE, value);
                }
            }
            response
        }
    }
}

/// True when `path` exists but resolves, through links, to somewhere outside
/// `root`. Missing paths are left for the streamer to report.
async fn escapes_root(root: &Path, path: &Path) -> bool {
    let real_root = match tokio::fs::canonicalize(root).await {
        Ok(real_root) => real_root,
        Err(_) => return false,
    };
    match tokio::fs::canonicalize(path).await {
        Ok(real_path) => !real_path.starts_with(&real_root),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::api::tests::{json_body, login_token, test_server};

    async fn get(app: &axum::Router, uri: &str, token: &str, range: Option<&str>) -> Response {
        let mut request = Request::get(uri).header(header::AUTHORIZATION, format!("Bearer {}", token));
        if let Some(range) = range {
            request = request.header(header::RANGE, range);
        }
        app.clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    fn write_clip(root: &Path) {
        fs::create_dir_all(root.join("drive1/Movies")).unwrap();
        let bytes: Vec<u8> = (0u8..100).collect();
        fs::write(root.join("drive1/Movies/Heat (1995).mp4"), bytes).unwrap();
    }

    #[tokio::test]
    async fn streams_full_and_partial_content() {
        let server = test_server();
        let token = login_token(&server.state);
        write_clip(server.media.path());
        let uri = "/stream?path=/usb/drive1/Movies/Heat%20(1995).mp4";

        let response = get(&server.app, uri, &token, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "100");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp4");

        let response = get(&server.app, uri, &token, Some("bytes=10-19")).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes 10-19/100");
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), &(10u8..20).collect::<Vec<u8>>()[..]);
    }

    #[tokio::test]
    async fn range_errors_reach_the_client() {
        let server = test_server();
        let token = login_token(&server.state);
        write_clip(server.media.path());
        let uri = "/stream?path=/usb/drive1/Movies/Heat%20(1995).mp4";

        let response = get(&server.app, uri, &token, Some("bytes=500-")).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(response.headers()[header::CONTENT_RANGE], "bytes */100");

        let response = get(&server.app, uri, &token, Some("bytes=0-1,5-6")).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn path_checks() {
        let server = test_server();
        let token = login_token(&server.state);
        write_clip(server.media.path());

        let response = get(&server.app, "/stream?path=/usb/../../etc/passwd", &token, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = get(&server.app, "/stream?path=/usb/drive1/nope.mp4", &token, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = get(&server.app, "/stream?path=/usb/drive1", &token, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = get(&server.app, "/stream", &token, None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["error"], "path is required");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn links_out_of_the_root_are_refused() {
        let server = test_server();
        let token = login_token(&server.state);
        let outside = tempfile::tempdir().unwrap();
        fs::write(outside.path().join("secret.mp4"), b"secret").unwrap();
        std::os::unix::fs::symlink(
            outside.path().join("secret.mp4"),
            server.media.path().join("link.mp4"),
        )
        .unwrap();

        let response = get(&server.app, "/stream?path=/usb/link.mp4", &token, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
