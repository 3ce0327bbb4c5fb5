use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State, rejection::BytesRejection},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use http::{
    HeaderValue, StatusCode, Uri,
    header::{
        ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
        ACCESS_CONTROL_MAX_AGE, CONTENT_TYPE,
    },
};
use serde_json::Value;
use tokio::net::TcpListener;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};

use super::{Shutdown, Transport};
use crate::protocol::{
    Dispatcher,
    types::{self, ErrorObject, INVALID_REQUEST, PARSE_ERROR},
};

/// Largest request body accepted; snippets travel inline, so this sits well
/// above axum's 2 MiB default.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/", get(identity).post(rpc).options(preflight))
        .fallback(not_found)
        .with_state(dispatcher)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(SetResponseHeaderLayer::overriding(
            ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(TraceLayer::new_for_http())
}

pub(super) async fn serve(listener: TcpListener, dispatcher: Arc<Dispatcher>, shutdown: Shutdown) {
    if let Err(err) = axum::serve(listener, router(dispatcher))
        .with_graceful_shutdown(shutdown.wait())
        .await
    {
        tracing::error!(?err, "http server failed");
    }
}

fn rpc_error(status: StatusCode, code: i64, message: impl Into<String>) -> Response {
    let body = types::Response::error(Value::Null, ErrorObject::new(code, message));
    (status, Json(body)).into_response()
}

async fn identity(State(dispatcher): State<Arc<Dispatcher>>) -> Json<Value> {
    Json(dispatcher.protocol().identity(Transport::Http))
}

async fn rpc(
    State(dispatcher): State<Arc<Dispatcher>>,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            return rpc_error(
                rejection.status(),
                PARSE_ERROR,
                format!("Failed to read request: {}", rejection.body_text()),
            );
        }
    };
    if body.is_empty() {
        return rpc_error(StatusCode::BAD_REQUEST, PARSE_ERROR, "Empty request body");
    }
    if let Err(err) = std::str::from_utf8(&body) {
        return rpc_error(
            StatusCode::BAD_REQUEST,
            PARSE_ERROR,
            format!("Failed to read request: {err}"),
        );
    }

    match dispatcher.dispatch(&body).await {
        Some(reply) => ([(CONTENT_TYPE, "application/json")], reply).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

async fn preflight() -> impl IntoResponse {
    (
        StatusCode::NO_CONTENT,
        [
            (ACCESS_CONTROL_ALLOW_METHODS, "POST, OPTIONS"),
            (ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
            (ACCESS_CONTROL_MAX_AGE, "86400"),
        ],
    )
}

async fn not_found(uri: Uri) -> Response {
    rpc_error(
        StatusCode::NOT_FOUND,
        INVALID_REQUEST,
        format!("Not found: {}", uri.path()),
    )
}
