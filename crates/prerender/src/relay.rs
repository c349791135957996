//! Relays a [`RenderResult`] onto the outbound HTTP response.

use axum::body::Body;
use axum::http::header::{HeaderName, HeaderValue};
use axum::response::Response;
use tracing::warn;

use crate::types::RenderResult;

/// Build the response that short-circuits normal request handling.
///
/// Every header is appended, so repeated keys keep all their values in
/// order.
pub fn into_response(result: RenderResult) -> Response {
    let mut response = Response::new(Body::from(result.body));
    *response.status_mut() = result.status;

    let headers = response.headers_mut();
    for (key, value) in result.headers {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(e) => {
                warn!(header = %key, error = %e, "skipping invalid header name");
                continue;
            }
        };
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                headers.append(name, value);
            }
            Err(e) => warn!(header = %key, error = %e, "skipping invalid header value"),
        }
    }

    response
}
