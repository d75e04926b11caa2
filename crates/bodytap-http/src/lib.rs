//! # bodytap http
//!
//! Wires [`bodytap_core`] into `http`/`hyper` types: converts request and
//! response parts into recorder metadata and wraps bodies in [`TapBody`].
//!
//! ```
//! use bodytap_core::{InMemoryCollector, TransactionRecorder};
//! use bodytap_http::{tap_request, tap_response};
//! use std::sync::Arc;
//!
//! let collector = Arc::new(InMemoryCollector::default());
//! let recorder = TransactionRecorder::new(collector.clone());
//!
//! let request = http::Request::get("http://localhost/health").body(String::new()).unwrap();
//! let (exchange, request) = tap_request(&recorder, request);
//! # drop(request);
//!
//! let response = http::Response::builder().status(204).body(String::new()).unwrap();
//! let _response = tap_response(&exchange, response);
//!
//! assert_eq!(collector.recent(1)[0].response_code(), Some(204));
//! ```

mod body;

pub use body::TapBody;

use bodytap_core::{BodyInfo, Exchange, Headers, RequestInfo, ResponseInfo, TransactionRecorder};
use http::header::{CONTENT_ENCODING, CONTENT_TYPE};
use http::HeaderMap;
use hyper::body::Body;

/// Copy a header map, keeping order and original values.
///
/// Values that are not visible ASCII are decoded lossily.
pub fn headers_from(map: &HeaderMap) -> Headers {
    map.iter()
        .map(|(name, value)| {
            let value = match value.to_str() {
                Ok(v) => v.to_string(),
                Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Describe a body from its headers.
pub fn body_info(map: &HeaderMap) -> BodyInfo {
    let mut info = BodyInfo::new().content_encoding(
        map.get(CONTENT_ENCODING).and_then(|v| v.to_str().ok()),
    );
    if let Some(content_type) = map.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) {
        info = info.content_type(content_type);
    }
    info
}

/// Recorder metadata for a request.
pub fn request_info(parts: &http::request::Parts) -> RequestInfo {
    RequestInfo::new(parts.method.as_str(), parts.uri.to_string())
        .protocol(format!("{:?}", parts.version))
        .headers(headers_from(&parts.headers))
}

/// Recorder metadata for a response.
pub fn response_info(parts: &http::response::Parts) -> ResponseInfo {
    let mut info = ResponseInfo::new(parts.status.as_u16())
        .protocol(format!("{:?}", parts.version))
        .headers(headers_from(&parts.headers));
    if let Some(reason) = parts.status.canonical_reason() {
        info = info.message(reason);
    }
    info
}

/// Begin recording `request` and tap its body.
pub fn tap_request<B: Body>(
    recorder: &TransactionRecorder,
    request: http::Request<B>,
) -> (Exchange, http::Request<TapBody<B>>) {
    let (parts, body) = request.into_parts();
    let exchange = recorder.begin(request_info(&parts));
    let body = TapBody::request(&exchange, body, body_info(&parts.headers));
    (exchange, http::Request::from_parts(parts, body))
}

/// Record the response head and tap its body.
pub fn tap_response<B: Body>(
    exchange: &Exchange,
    response: http::Response<B>,
) -> http::Response<TapBody<B>> {
    let (parts, body) = response.into_parts();
    exchange.response_received(response_info(&parts));
    let body = TapBody::response(exchange, body, body_info(&parts.headers));
    http::Response::from_parts(parts, body)
}
