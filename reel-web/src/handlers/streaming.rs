//! Stream dispatcher: authorize, then hand the request to the responder.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Method, header};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::debug;

use crate::auth::Credentials;
use crate::server::AppState;

/// Query parameters accepted by the stream route
#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    /// Access token for clients that cannot set headers, such as `<video src>`
    pub token: Option<String>,
}

/// `GET`/`HEAD /stream/{id}`
pub async fn stream_content(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<StreamQuery>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let credentials = Credentials::from_request(&headers, query.token.as_deref());
    if let Err(denied) = state.access_policy.authorize(&credentials, &id) {
        debug!("Refusing stream of {}: {}", id, denied);
        return denied.into_response();
    }

    // A Range header that is not visible ASCII cannot be a valid byte range
    let range = headers
        .get(header::RANGE)
        .map(|value| value.to_str().unwrap_or(""));

    if method == Method::HEAD {
        state.responder.respond_head(&id, range).await
    } else {
        state.responder.respond(&id, range).await
    }
}
