//! Feature-gated inbound HTTP listener adapting the transport contract
//! onto a [`Gateway`]: any non-POST request and any malformed JSON body
//! get an immediate empty 200, and every reply carries `Connection: close`
//! with an exact `Content-Length`.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use serde_json::Value;

use crate::gateway::Gateway;

/// Router answering callback pushes on `/`.
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new()
        .route("/", any(handle_callback))
        .with_state(gateway)
}

/// Bind and serve until the listener fails.
pub async fn serve(gateway: Arc<Gateway>, addr: std::net::SocketAddr) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(gateway)).await
}

async fn handle_callback(
    State(gateway): State<Arc<Gateway>>,
    method: Method,
    body: Bytes,
) -> Response {
    if method != Method::POST {
        return plain_response("");
    }

    let Ok(body) = serde_json::from_slice::<Value>(&body) else {
        return plain_response("");
    };

    let reply = gateway.handle(body).await;
    plain_response(reply.body())
}

fn plain_response(body: &str) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONNECTION, "close")
        .header(header::CONTENT_TYPE, "text/plain")
        .header(header::CONTENT_LENGTH, body.len().to_string())
        .body(Body::from(body.to_owned()))
        .unwrap_or_default()
}
