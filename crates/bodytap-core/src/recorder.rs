//! Per-exchange lifecycle: open a record, tap the bodies, publish milestones.
//!
//! Each side of an exchange (request, response) moves through
//! `Started → BodyCapturing → Completed`, and is published to the
//! [`TransactionCollector`] at most once. A failure before the response
//! arrives completes the response side with the error instead.
//!
//! ```
//! use bodytap_core::{
//!     BodyInfo, BodySink, InMemoryCollector, RequestInfo, ResponseInfo,
//!     TransactionRecorder, WriteSink,
//! };
//! use std::sync::Arc;
//!
//! let collector = Arc::new(InMemoryCollector::default());
//! let recorder = TransactionRecorder::new(collector.clone());
//!
//! let exchange = recorder.begin(
//!     RequestInfo::new("POST", "https://api.example.com/items?page=2")
//!         .header("Content-Type", "application/json"),
//! );
//! let mut body = exchange.intercept_request_body(
//!     WriteSink::new(Vec::new()),
//!     BodyInfo::new().content_type("application/json"),
//! );
//! body.write_str("{\"name\":\"widget\"}").unwrap();
//! body.close().unwrap();
//!
//! exchange.response_received(ResponseInfo::new(201).message("Created"));
//! exchange.response_complete();
//!
//! let stored = collector.recent(1).remove(0);
//! assert_eq!(stored.path(), Some("/items?page=2"));
//! assert_eq!(stored.request_body(), Some("{\"name\":\"widget\"}"));
//! assert_eq!(stored.response_code(), Some(201));
//! ```

use crate::capture::{BodyInfo, CaptureOutcome, Tap};
use crate::collector::TransactionCollector;
use crate::config::{RecorderConfig, REDACTED};
use crate::sink::{BodySink, InterceptingSink};
use crate::transaction::{Headers, Transaction};
use chrono::Utc;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// What the host client reports when a request begins.
#[derive(Debug, Clone, Default)]
pub struct RequestInfo {
    pub method: String,
    pub url: String,
    pub protocol: Option<String>,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
}

impl RequestInfo {
    /// Create request metadata for `method` and an absolute `url`.
    pub fn new(method: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the protocol, e.g. `HTTP/1.1`.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the declared content type. Defaults to the `Content-Type` header.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the declared content length. Defaults to the `Content-Length` header.
    pub fn content_length(mut self, length: i64) -> Self {
        self.content_length = Some(length);
        self
    }
}

/// What the host client reports when response headers arrive.
#[derive(Debug, Clone, Default)]
pub struct ResponseInfo {
    pub code: u16,
    pub message: Option<String>,
    pub protocol: Option<String>,
    pub headers: Headers,
    pub content_type: Option<String>,
    pub content_length: Option<i64>,
}

impl ResponseInfo {
    /// Create response metadata for a status code.
    pub fn new(code: u16) -> Self {
        Self {
            code,
            ..Self::default()
        }
    }

    /// Set the reason phrase.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(name, value);
        self
    }

    /// Replace all headers.
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Set the protocol, e.g. `HTTP/2.0`.
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Set the declared content type. Defaults to the `Content-Type` header.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the declared content length. Defaults to the `Content-Length` header.
    pub fn content_length(mut self, length: i64) -> Self {
        self.content_length = Some(length);
        self
    }
}

/// How a side of an exchange ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failure,
}

/// Lifecycle of one side of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeState {
    Started,
    BodyCapturing,
    Completed(Completion),
}

impl ExchangeState {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Request,
    Response,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => f.write_str("request"),
            Self::Response => f.write_str("response"),
        }
    }
}

/// Opens one [`Exchange`] per request and publishes to a collector.
#[derive(Clone)]
pub struct TransactionRecorder {
    collector: Arc<dyn TransactionCollector>,
    config: Arc<RecorderConfig>,
}

impl TransactionRecorder {
    /// Create a recorder with the default configuration.
    pub fn new<C: TransactionCollector>(collector: C) -> Self {
        Self {
            collector: Arc::new(collector),
            config: Arc::new(RecorderConfig::default()),
        }
    }

    /// Use a custom configuration.
    pub fn with_config(mut self, config: RecorderConfig) -> Self {
        self.config = Arc::new(config);
        self
    }

    /// Get a reference to the configuration.
    pub fn config(&self) -> &RecorderConfig {
        &self.config
    }

    /// Start recording an exchange.
    ///
    /// Populates method, URL components, headers and the request timestamp.
    /// Nothing is published until the request side completes.
    pub fn begin(&self, request: RequestInfo) -> Exchange {
        let mut transaction = Transaction::new();

        let RequestInfo {
            method,
            url,
            protocol,
            mut headers,
            content_type,
            content_length,
        } = request;

        match url.parse::<http::Uri>() {
            Ok(uri) => {
                transaction.scheme = uri.scheme_str().map(str::to_string);
                transaction.host = uri.host().map(str::to_string);
                transaction.path = uri.path_and_query().map(|pq| pq.as_str().to_string());
            }
            Err(err) => {
                tracing::debug!(%url, error = %err, "url rejected by uri parser, splitting by hand");
                let (scheme, host, path) = split_url(&url);
                transaction.scheme = scheme;
                transaction.host = host;
                transaction.path = path;
            }
        }

        transaction.request_content_type =
            content_type.or_else(|| headers.get("content-type").map(str::to_string));
        transaction.request_content_length = content_length.or_else(|| declared_length(&headers));
        headers.redact(|name| self.config.is_redacted(name), REDACTED);

        transaction.method = Some(method);
        transaction.url = Some(url);
        transaction.protocol = protocol;
        transaction.request_headers = headers;
        transaction.request_date = Some(Utc::now());

        Exchange {
            shared: Arc::new(Shared {
                collector: self.collector.clone(),
                config: self.config.clone(),
                started: Instant::now(),
                inner: Mutex::new(Inner {
                    transaction,
                    request: ExchangeState::Started,
                    response: ExchangeState::Started,
                }),
            }),
        }
    }
}

impl fmt::Debug for TransactionRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionRecorder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn declared_length(headers: &Headers) -> Option<i64> {
    headers
        .get("content-length")
        .and_then(|v| v.trim().parse::<i64>().ok())
}

/// Scheme, host and path+query of a URL that `http::Uri` rejects, such as
/// one carrying a raw space in its query.
fn split_url(url: &str) -> (Option<String>, Option<String>, Option<String>) {
    let url = url.split_once('#').map_or(url, |(before, _)| before);
    let Some((scheme, rest)) = url.split_once("://") else {
        return (None, None, url.starts_with('/').then(|| url.to_string()));
    };

    let end = rest.find(['/', '?']).unwrap_or(rest.len());
    let (authority, target) = rest.split_at(end);
    let authority = authority.rsplit_once('@').map_or(authority, |(_, host)| host);
    let host = match authority.strip_prefix('[') {
        Some(v6) => v6.split_once(']').map(|(addr, _)| format!("[{addr}]")),
        None => authority.split(':').next().map(str::to_string),
    }
    .filter(|host| !host.is_empty());

    let path = match target.chars().next() {
        None => "/".to_string(),
        Some('?') => format!("/{target}"),
        Some(_) => target.to_string(),
    };

    (Some(scheme.to_ascii_lowercase()), host, Some(path))
}

struct Inner {
    transaction: Transaction,
    request: ExchangeState,
    response: ExchangeState,
}

impl Inner {
    fn state_mut(&mut self, side: Side) -> &mut ExchangeState {
        match side {
            Side::Request => &mut self.request,
            Side::Response => &mut self.response,
        }
    }
}

struct Shared {
    collector: Arc<dyn TransactionCollector>,
    config: Arc<RecorderConfig>,
    started: Instant,
    inner: Mutex<Inner>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic inside a collector must not stop later milestones.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn took_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }

    fn captures(&self, side: Side) -> bool {
        match side {
            Side::Request => self.config.captures_request_body(),
            Side::Response => self.config.captures_response_body(),
        }
    }

    /// Publish the current record. Holds the lock so milestones reach the
    /// collector in the order they happened.
    fn publish(&self, inner: &mut Inner, side: Side) {
        match self.collector.on_transaction_update(&inner.transaction) {
            Ok(id) => {
                if inner.transaction.id == 0 {
                    inner.transaction.id = id;
                }
                tracing::debug!(transaction_id = id, %side, "published transaction");
            }
            Err(err) => {
                tracing::warn!(error = %err, %side, "collector rejected transaction update");
            }
        }
    }

    fn complete_side(&self, side: Side, outcome: Option<CaptureOutcome>) {
        let mut inner = self.lock();
        if inner.state_mut(side).is_completed() {
            tracing::trace!(%side, "side already completed");
            return;
        }

        if let Some(outcome) = outcome {
            match side {
                Side::Request => inner.transaction.apply_request_capture(outcome),
                Side::Response => inner.transaction.apply_response_capture(outcome),
            }
        }
        *inner.state_mut(side) = ExchangeState::Completed(Completion::Success);
        self.publish(&mut inner, side);
    }

    fn tap(self: &Arc<Self>, side: Side, body: BodyInfo) -> Tap {
        let mut inner = self.lock();
        if *inner.state_mut(side) != ExchangeState::Started {
            tracing::debug!(%side, "body already tapped or side completed");
            return Tap::disabled();
        }

        if let Some(content_type) = &body.content_type {
            let declared = match side {
                Side::Request => &mut inner.transaction.request_content_type,
                Side::Response => &mut inner.transaction.response_content_type,
            };
            declared.get_or_insert_with(|| content_type.clone());
        }

        let skipped = if !self.captures(side) {
            Some(None)
        } else {
            body.mode
                .omitted_marker()
                .map(|marker| Some(CaptureOutcome::omitted(marker)))
        };
        if let Some(outcome) = skipped {
            drop(inner);
            self.complete_side(side, outcome);
            return Tap::disabled();
        }

        *inner.state_mut(side) = ExchangeState::BodyCapturing;
        let shared = self.clone();
        Tap::new(
            body,
            Box::new(move |outcome| shared.complete_side(side, Some(outcome))),
        )
    }
}

/// Handle to one in-flight exchange. Cheap to clone and `Send`.
#[derive(Clone)]
pub struct Exchange {
    shared: Arc<Shared>,
}

impl Exchange {
    /// A snapshot of the record as it stands.
    pub fn transaction(&self) -> Transaction {
        self.shared.lock().transaction.clone()
    }

    pub fn request_state(&self) -> ExchangeState {
        self.shared.lock().request
    }

    pub fn response_state(&self) -> ExchangeState {
        self.shared.lock().response
    }

    /// The request went out with no body; publish the request milestone.
    pub fn request_sent(&self) {
        self.shared.complete_side(Side::Request, None);
    }

    /// Splice capture into the outgoing request body.
    ///
    /// One-shot and duplex bodies, or a disabled request capture, publish
    /// immediately and return a sink that only forwards.
    pub fn intercept_request_body<S: BodySink>(&self, sink: S, body: BodyInfo) -> InterceptingSink<S> {
        InterceptingSink::with_tap(sink, self.request_tap(body))
    }

    /// A tap for the request body, for adapters that drive capture
    /// themselves.
    pub fn request_tap(&self, body: BodyInfo) -> Tap {
        self.shared.tap(Side::Request, body)
    }

    /// Record response metadata. Publishing waits for the response body.
    ///
    /// Ignored once the exchange has failed.
    pub fn response_received(&self, response: ResponseInfo) {
        let took_ms = self.shared.took_ms();
        let mut inner = self.shared.lock();
        if inner.transaction.error.is_some() {
            tracing::debug!(code = response.code, "response after failure ignored");
            return;
        }

        let ResponseInfo {
            code,
            message,
            protocol,
            mut headers,
            content_type,
            content_length,
        } = response;

        inner.transaction.response_content_type =
            content_type.or_else(|| headers.get("content-type").map(str::to_string));
        inner.transaction.response_content_length =
            content_length.or_else(|| declared_length(&headers));
        headers.redact(|name| self.shared.config.is_redacted(name), REDACTED);
        inner
            .transaction
            .set_response(code, message, protocol, headers, Utc::now(), took_ms);
    }

    /// The response had no body; publish the response milestone.
    pub fn response_complete(&self) {
        self.shared.complete_side(Side::Response, None);
    }

    /// Splice capture into the inbound response body stream.
    pub fn intercept_response_body<S: BodySink>(&self, sink: S, body: BodyInfo) -> InterceptingSink<S> {
        InterceptingSink::with_tap(sink, self.response_tap(body))
    }

    /// A tap for the response body.
    pub fn response_tap(&self, body: BodyInfo) -> Tap {
        self.shared.tap(Side::Response, body)
    }

    /// The exchange failed before a response arrived.
    ///
    /// Records the error and publishes. Ignored once a response has been
    /// recorded or the response side has completed.
    pub fn fail(&self, error: impl fmt::Display) {
        let mut inner = self.shared.lock();
        if inner.response.is_completed() || inner.transaction.response_code.is_some() {
            tracing::debug!(error = %error, "failure after response ignored");
            return;
        }

        inner.transaction.set_error(error.to_string());
        inner.response = ExchangeState::Completed(Completion::Failure);
        self.shared.publish(&mut inner, Side::Response);
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("Exchange")
            .field("request", &inner.request)
            .field("response", &inner.response)
            .field("transaction_id", &inner.transaction.id)
            .finish()
    }
}
