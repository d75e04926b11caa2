//! Configuration for the transaction recorder.

use std::collections::HashSet;

/// Value stored in place of a redacted header.
pub const REDACTED: &str = "[REDACTED]";

/// Configuration for [`TransactionRecorder`](crate::TransactionRecorder).
///
/// ```
/// use bodytap_core::RecorderConfig;
///
/// let config = RecorderConfig::new()
///     .redact_header("Authorization")
///     .redact_headers(["cookie", "x-api-key"])
///     .capture_response_body(false);
///
/// assert!(config.is_redacted("AUTHORIZATION"));
/// assert!(!config.captures_response_body());
/// ```
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Lowercased names of headers whose values are redacted.
    pub(crate) redacted_headers: HashSet<String>,

    /// Whether request bodies are tapped. Default: true.
    pub(crate) capture_request_body: bool,

    /// Whether response bodies are tapped. Default: true.
    pub(crate) capture_response_body: bool,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl RecorderConfig {
    /// Create a configuration that captures both bodies and redacts nothing.
    pub fn new() -> Self {
        Self {
            redacted_headers: HashSet::new(),
            capture_request_body: true,
            capture_response_body: true,
        }
    }

    /// Redact a header by name (case-insensitive).
    pub fn redact_header(mut self, name: impl Into<String>) -> Self {
        self.redacted_headers.insert(name.into().to_lowercase());
        self
    }

    /// Redact several headers.
    pub fn redact_headers(mut self, names: impl IntoIterator<Item = impl Into<String>>) -> Self {
        for name in names {
            self.redacted_headers.insert(name.into().to_lowercase());
        }
        self
    }

    /// Enable or disable request body capture.
    pub fn capture_request_body(mut self, capture: bool) -> Self {
        self.capture_request_body = capture;
        self
    }

    /// Enable or disable response body capture.
    pub fn capture_response_body(mut self, capture: bool) -> Self {
        self.capture_response_body = capture;
        self
    }

    /// Whether `name` is redacted.
    pub fn is_redacted(&self, name: &str) -> bool {
        self.redacted_headers.contains(&name.to_lowercase())
    }

    pub fn captures_request_body(&self) -> bool {
        self.capture_request_body
    }

    pub fn captures_response_body(&self) -> bool {
        self.capture_response_body
    }
}
