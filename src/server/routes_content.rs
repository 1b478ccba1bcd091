//! Archive files under the virtual content prefix.

use crate::server::AppContext;
use crate::vfs::CONTENT_PREFIX;
use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};

pub fn content_routes() -> Router<AppContext> {
    // GET routes answer HEAD as well, without a body.
    Router::new().route("/scorm-content/*path", get(serve_content))
}

pub async fn serve_content(State(ctx): State<AppContext>, uri: Uri) -> Response {
    let requested = uri
        .path()
        .strip_prefix(CONTENT_PREFIX)
        .unwrap_or_else(|| uri.path());

    match ctx.vfs.resolve(requested).await {
        Ok(Some(file)) => {
            tracing::trace!("Serving {} as {}", file.path, file.content_type);
            (
                [
                    (header::CONTENT_TYPE, file.content_type),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                Body::from(file.bytes),
            )
                .into_response()
        }
        Ok(None) => {
            tracing::debug!("Not in archive: {}", requested);
            (
                StatusCode::NOT_FOUND,
                [
                    (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
                    (header::CACHE_CONTROL, "no-store"),
                ],
                format!("Not found in package: {}", requested),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!("Failed to resolve {}: {}", requested, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                format!("Content server error: {}", e),
            )
                .into_response()
        }
    }
}
