//! Endpoint the runtime bridge forwards content calls to.

use crate::runtime::RuntimeCallError;
use crate::server::AppContext;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

pub fn runtime_routes() -> Router<AppContext> {
    Router::new().route("/runtime/:generation/:method", post(runtime_call))
}

#[derive(Debug, Default, Deserialize)]
pub struct RuntimeCallBody {
    #[serde(default)]
    pub args: Vec<String>,
}

pub async fn runtime_call(
    State(ctx): State<AppContext>,
    Path((generation, method)): Path<(String, String)>,
    body: Option<Json<RuntimeCallBody>>,
) -> Response {
    let args = body.map(|Json(b)| b.args).unwrap_or_default();

    match ctx.shims.call(&generation, &method, &args) {
        Ok(value) => (
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            value,
        )
            .into_response(),
        Err(e @ RuntimeCallError::NotInstalled) => {
            tracing::debug!("Runtime call {} with no runtime installed", method);
            (StatusCode::GONE, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::warn!("Rejected runtime call: {}", e);
            (StatusCode::BAD_REQUEST, e.to_string()).into_response()
        }
    }
}
