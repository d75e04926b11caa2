//! The record of one HTTP exchange.

use crate::buffer::truncate_text;
use crate::capture::CaptureOutcome;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single header as it appeared on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpHeader {
    pub name: String,
    pub value: String,
}

impl HttpHeader {
    /// Create a header
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Ordered header list. Lookups ignore case; stored names keep theirs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(Vec<HttpHeader>);

impl Headers {
    /// Create an empty header list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a header, keeping any existing ones with the same name.
    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push(HttpHeader::new(name, value));
    }

    /// Builder form of [`push`](Headers::push).
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(name, value);
        self
    }

    /// First value for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// All values for `name`, case-insensitively, in order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.0
            .iter()
            .filter(move |h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Whether a header named `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Iterate headers in order.
    pub fn iter(&self) -> std::slice::Iter<'_, HttpHeader> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace the value of every header whose name satisfies `redact`.
    pub fn redact(&mut self, redact: impl Fn(&str) -> bool, replacement: &str) {
        for header in self.0.iter_mut().filter(|h| redact(&h.name)) {
            header.value = replacement.to_string();
        }
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for Headers {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(n, v)| HttpHeader::new(n, v)).collect())
    }
}

impl<'a> IntoIterator for &'a Headers {
    type Item = &'a HttpHeader;
    type IntoIter = std::slice::Iter<'a, HttpHeader>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// One HTTP exchange: request metadata and body, then either a response or
/// an error.
///
/// A record holds a response code or an error, never both. Setting one
/// clears the other. Plain-text flags start `true` and only ever go to
/// `false` for a given body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub(crate) id: u64,
    pub(crate) request_date: Option<DateTime<Utc>>,
    pub(crate) response_date: Option<DateTime<Utc>>,
    pub(crate) took_ms: Option<u64>,
    pub(crate) protocol: Option<String>,
    pub(crate) method: Option<String>,
    pub(crate) url: Option<String>,
    pub(crate) scheme: Option<String>,
    pub(crate) host: Option<String>,
    pub(crate) path: Option<String>,

    pub(crate) request_headers: Headers,
    pub(crate) request_content_type: Option<String>,
    pub(crate) request_content_length: Option<i64>,
    pub(crate) request_body: Option<String>,
    pub(crate) is_request_body_plain_text: bool,

    pub(crate) response_code: Option<u16>,
    pub(crate) response_message: Option<String>,
    pub(crate) error: Option<String>,

    pub(crate) response_headers: Headers,
    pub(crate) response_content_type: Option<String>,
    pub(crate) response_content_length: Option<i64>,
    pub(crate) response_body: Option<String>,
    pub(crate) is_response_body_plain_text: bool,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    /// Create an empty, unpersisted transaction.
    pub fn new() -> Self {
        Self {
            id: 0,
            request_date: None,
            response_date: None,
            took_ms: None,
            protocol: None,
            method: None,
            url: None,
            scheme: None,
            host: None,
            path: None,
            request_headers: Headers::new(),
            request_content_type: None,
            request_content_length: None,
            request_body: None,
            is_request_body_plain_text: true,
            response_code: None,
            response_message: None,
            error: None,
            response_headers: Headers::new(),
            response_content_type: None,
            response_content_length: None,
            response_body: None,
            is_response_body_plain_text: true,
        }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Store-assigned identity; 0 until persisted.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn request_date(&self) -> Option<DateTime<Utc>> {
        self.request_date
    }

    pub fn response_date(&self) -> Option<DateTime<Utc>> {
        self.response_date
    }

    pub fn took_ms(&self) -> Option<u64> {
        self.took_ms
    }

    pub fn protocol(&self) -> Option<&str> {
        self.protocol.as_deref()
    }

    pub fn method(&self) -> Option<&str> {
        self.method.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn scheme(&self) -> Option<&str> {
        self.scheme.as_deref()
    }

    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Path including the query string, if any.
    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    pub fn request_headers(&self) -> &Headers {
        &self.request_headers
    }

    pub fn request_content_type(&self) -> Option<&str> {
        self.request_content_type.as_deref()
    }

    pub fn request_content_length(&self) -> Option<i64> {
        self.request_content_length
    }

    pub fn request_body(&self) -> Option<&str> {
        self.request_body.as_deref()
    }

    pub fn is_request_body_plain_text(&self) -> bool {
        self.is_request_body_plain_text
    }

    pub fn response_code(&self) -> Option<u16> {
        self.response_code
    }

    pub fn response_message(&self) -> Option<&str> {
        self.response_message.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn response_headers(&self) -> &Headers {
        &self.response_headers
    }

    pub fn response_content_type(&self) -> Option<&str> {
        self.response_content_type.as_deref()
    }

    pub fn response_content_length(&self) -> Option<i64> {
        self.response_content_length
    }

    pub fn response_body(&self) -> Option<&str> {
        self.response_body.as_deref()
    }

    pub fn is_response_body_plain_text(&self) -> bool {
        self.is_response_body_plain_text
    }

    /// Whether a response or an error has been recorded.
    pub fn is_terminal(&self) -> bool {
        self.response_code.is_some() || self.error.is_some()
    }

    /// Set the store-assigned identity.
    pub fn set_id(&mut self, id: u64) {
        self.id = id;
    }

    /// Set the method.
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Set the full URL without touching scheme, host or path.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Set scheme, host and path (path may include a query string).
    pub fn with_location(
        mut self,
        scheme: Option<&str>,
        host: Option<&str>,
        path: Option<&str>,
    ) -> Self {
        self.scheme = scheme.map(str::to_string);
        self.host = host.map(str::to_string);
        self.path = path.map(str::to_string);
        self
    }

    /// Set the path (including any query string).
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Set the protocol, e.g. `HTTP/1.1`.
    pub fn with_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the request timestamp.
    pub fn with_request_date(mut self, date: DateTime<Utc>) -> Self {
        self.request_date = Some(date);
        self
    }

    /// Set the elapsed time between request and response.
    pub fn with_took_ms(mut self, took_ms: u64) -> Self {
        self.took_ms = Some(took_ms);
        self
    }

    /// Set request headers.
    pub fn with_request_headers(mut self, headers: Headers) -> Self {
        self.request_headers = headers;
        self
    }

    /// Set the declared request content type and length.
    pub fn with_request_content(
        mut self,
        content_type: Option<String>,
        content_length: Option<i64>,
    ) -> Self {
        self.request_content_type = content_type;
        self.request_content_length = content_length;
        self
    }

    /// Set the declared response content type and length.
    pub fn with_response_content(
        mut self,
        content_type: Option<String>,
        content_length: Option<i64>,
    ) -> Self {
        self.response_content_type = content_type;
        self.response_content_length = content_length;
        self
    }

    /// Record a response code, clearing any error.
    pub fn with_response_code(mut self, code: u16) -> Self {
        self.response_code = Some(code);
        self.error = None;
        self
    }

    /// Set the response reason phrase.
    pub fn with_response_message(mut self, message: impl Into<String>) -> Self {
        self.response_message = Some(message.into());
        self
    }

    /// Set the response timestamp.
    pub fn with_response_date(mut self, date: DateTime<Utc>) -> Self {
        self.response_date = Some(date);
        self
    }

    /// Set response headers.
    pub fn with_response_headers(mut self, headers: Headers) -> Self {
        self.response_headers = headers;
        self
    }

    /// Record an error, clearing any response code.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self.response_code = None;
        self
    }

    /// Apply the outcome of the request body capture.
    pub(crate) fn apply_request_capture(&mut self, outcome: CaptureOutcome) {
        self.request_body = outcome.text.map(truncate_text);
        if !outcome.plain_text {
            self.is_request_body_plain_text = false;
        }
    }

    /// Apply the outcome of the response body capture.
    pub(crate) fn apply_response_capture(&mut self, outcome: CaptureOutcome) {
        self.response_body = outcome.text.map(truncate_text);
        if !outcome.plain_text {
            self.is_response_body_plain_text = false;
        }
    }

    pub(crate) fn set_response(
        &mut self,
        code: u16,
        message: Option<String>,
        protocol: Option<String>,
        headers: Headers,
        date: DateTime<Utc>,
        took_ms: u64,
    ) {
        self.response_code = Some(code);
        self.error = None;
        self.response_message = message;
        if protocol.is_some() {
            self.protocol = protocol;
        }
        self.response_headers = headers;
        self.response_date = Some(date);
        self.took_ms = Some(took_ms);
    }

    /// Failures carry no response timestamp, so `took_ms` stays unset.
    pub(crate) fn set_error(&mut self, error: String) {
        self.error = Some(error);
        self.response_code = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MAX_CONTENT_LENGTH;

    #[test]
    fn test_headers_lookup_ignores_case() {
        let headers = Headers::new()
            .with("Content-Type", "application/json")
            .with("X-Trace", "a")
            .with("x-trace", "b");

        assert_eq!(headers.get("content-type"), Some("application/json"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("application/json"));
        assert_eq!(headers.get_all("X-TRACE").collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(!headers.contains("accept"));
        assert_eq!(headers.iter().next().unwrap().name, "Content-Type");
    }

    #[test]
    fn test_headers_redaction() {
        let mut headers: Headers = [("Authorization", "Bearer secret"), ("Accept", "*/*")]
            .into_iter()
            .collect();
        headers.redact(|name| name.eq_ignore_ascii_case("authorization"), "[REDACTED]");

        assert_eq!(headers.get("authorization"), Some("[REDACTED]"));
        assert_eq!(headers.get("accept"), Some("*/*"));
    }

    #[test]
    fn test_new_transaction_defaults() {
        let tx = Transaction::new();
        assert_eq!(tx.id(), 0);
        assert!(tx.is_request_body_plain_text());
        assert!(tx.is_response_body_plain_text());
        assert!(!tx.is_terminal());
        assert!(tx.request_body().is_none());
    }

    #[test]
    fn test_response_and_error_are_exclusive() {
        let tx = Transaction::new().with_response_code(200).with_error("reset");
        assert_eq!(tx.error(), Some("reset"));
        assert_eq!(tx.response_code(), None);

        let tx = tx.with_response_code(204);
        assert_eq!(tx.error(), None);
        assert_eq!(tx.response_code(), Some(204));
    }

    #[test]
    fn test_plain_text_flag_never_returns_to_true() {
        let mut tx = Transaction::new();
        tx.apply_request_capture(CaptureOutcome {
            text: None,
            plain_text: false,
            byte_count: 3,
        });
        assert!(!tx.is_request_body_plain_text());

        tx.apply_request_capture(CaptureOutcome {
            text: Some("text".to_string()),
            plain_text: true,
            byte_count: 4,
        });
        assert!(!tx.is_request_body_plain_text());
        assert!(tx.is_response_body_plain_text());
    }

    #[test]
    fn test_applied_body_text_is_capped() {
        let mut tx = Transaction::new();
        tx.apply_response_capture(CaptureOutcome {
            text: Some("y".repeat(MAX_CONTENT_LENGTH + 50)),
            plain_text: true,
            byte_count: (MAX_CONTENT_LENGTH + 50) as u64,
        });
        assert_eq!(
            tx.response_body().map(|body| body.chars().count()),
            Some(MAX_CONTENT_LENGTH)
        );

        tx.apply_request_capture(CaptureOutcome {
            text: Some("é".repeat(MAX_CONTENT_LENGTH + 1)),
            plain_text: true,
            byte_count: 0,
        });
        assert_eq!(
            tx.request_body().map(|body| body.chars().count()),
            Some(MAX_CONTENT_LENGTH)
        );
    }

    #[test]
    fn test_error_leaves_timing_unset() {
        let mut tx = Transaction::new();
        tx.set_error("refused".to_string());
        assert_eq!(tx.error(), Some("refused"));
        assert_eq!(tx.took_ms(), None);
        assert_eq!(tx.response_date(), None);
    }

    #[test]
    fn test_json_round_trip() {
        let tx = Transaction::new()
            .with_method("POST")
            .with_path("/upload")
            .with_request_headers(Headers::new().with("Content-Type", "text/plain"))
            .with_response_code(201);

        let json = tx.to_json().unwrap();
        let back: Transaction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tx);
        assert!(json.contains("\"Content-Type\""));
    }
}
