//! Small constructors for pipeline responses.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, LOCATION};
use http::{HeaderValue, StatusCode};
use serde::Serialize;

use crate::Response;

/// An empty response with the given status.
pub fn status(status: StatusCode) -> Response {
    let mut response = Response::new(Bytes::new());
    *response.status_mut() = status;
    response
}

/// `302 Found` to `location`.
///
/// A location that can't be put in a header (control characters) yields
/// a 500 rather than a malformed redirect.
pub fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = status(StatusCode::FOUND);
            response.headers_mut().insert(LOCATION, value);
            response
        }
        Err(_) => {
            tracing::error!(%location, "redirect target is not a valid header value");
            status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// A JSON body with the given status.
pub fn json<T: Serialize + ?Sized>(status_code: StatusCode, body: &T) -> Response {
    match serde_json::to_vec(body) {
        Ok(bytes) => with_body(status_code, "application/json", bytes),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode JSON response");
            status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// `{"error": message}` with the given status.
pub fn error(status_code: StatusCode, message: &str) -> Response {
    json(status_code, &serde_json::json!({ "error": message }))
}

pub fn html(body: impl Into<Bytes>) -> Response {
    with_body(StatusCode::OK, "text/html; charset=utf-8", body)
}

fn with_body(status_code: StatusCode, content_type: &'static str, body: impl Into<Bytes>) -> Response {
    let mut response = Response::new(body.into());
    *response.status_mut() = status_code;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redirect_sets_found_and_location() {
        let response = redirect("/login");

        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[LOCATION], "/login");
    }

    #[test]
    fn test_redirect_invalid_location_is_server_error() {
        let response = redirect("/login\r\nSet-Cookie: x=y");

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(LOCATION).is_none());
    }

    #[test]
    fn test_error_wraps_message_in_json() {
        let response = error(StatusCode::UNAUTHORIZED, "nope");

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(response.body().as_ref(), br#"{"error":"nope"}"#);
    }
}
