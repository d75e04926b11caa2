//! Display fields derived from a [`Transaction`].
//!
//! Nothing here is cached; every accessor recomputes from the record.

use crate::transaction::{Headers, Transaction};
use humansize::{format_size, BINARY};
use std::borrow::Cow;
use std::fmt;

/// Where an exchange stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Requested,
    Complete,
    Failed,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => f.write_str("Requested"),
            Self::Complete => f.write_str("Complete"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Read-only projection of a transaction.
///
/// ```
/// use bodytap_core::{Status, Transaction};
///
/// let tx = Transaction::new()
///     .with_method("GET")
///     .with_path("/a?x=b c")
///     .with_response_code(200)
///     .with_took_ms(123);
///
/// let view = tx.view();
/// assert_eq!(view.status(), Status::Complete);
/// assert_eq!(view.duration().as_deref(), Some("123 ms"));
/// assert_eq!(view.formatted_path(true), "/a?x=b%20c");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct TransactionView<'a> {
    transaction: &'a Transaction,
}

impl Transaction {
    /// Derive display fields from this record.
    pub fn view(&self) -> TransactionView<'_> {
        TransactionView { transaction: self }
    }
}

impl<'a> TransactionView<'a> {
    pub fn new(transaction: &'a Transaction) -> Self {
        Self { transaction }
    }

    /// `Failed` if an error is present, `Requested` until a response code
    /// arrives, `Complete` afterwards.
    pub fn status(&self) -> Status {
        if self.transaction.error().is_some() {
            Status::Failed
        } else if self.transaction.response_code().is_none() {
            Status::Requested
        } else {
            Status::Complete
        }
    }

    /// Elapsed time, e.g. `"123 ms"`.
    pub fn duration(&self) -> Option<String> {
        self.transaction.took_ms().map(|ms| format!("{ms} ms"))
    }

    pub fn request_size(&self) -> String {
        format_size(length(self.transaction.request_content_length()), BINARY)
    }

    pub fn response_size(&self) -> String {
        format_size(length(self.transaction.response_content_length()), BINARY)
    }

    /// Combined request and response size in binary units.
    pub fn total_size(&self) -> String {
        let total = length(self.transaction.request_content_length())
            .saturating_add(length(self.transaction.response_content_length()));
        format_size(total, BINARY)
    }

    /// The path, with the query string percent-encoded when `encode` is set.
    pub fn formatted_path(&self, encode: bool) -> String {
        self.transaction
            .path()
            .map(|path| format_target(path, encode))
            .unwrap_or_default()
    }

    /// The full URL, with the query string percent-encoded when `encode` is set.
    pub fn formatted_url(&self, encode: bool) -> String {
        self.transaction
            .url()
            .map(|url| format_target(url, encode))
            .unwrap_or_default()
    }

    pub fn is_ssl(&self) -> bool {
        self.transaction
            .scheme()
            .is_some_and(|s| s.eq_ignore_ascii_case("https"))
    }

    /// `"200 OK"` once complete, the error text once failed.
    pub fn response_summary(&self) -> Option<String> {
        match self.status() {
            Status::Requested => None,
            Status::Failed => self.transaction.error().map(str::to_string),
            Status::Complete => {
                let code = self.transaction.response_code()?;
                Some(match self.transaction.response_message() {
                    Some(message) if !message.is_empty() => format!("{code} {message}"),
                    _ => code.to_string(),
                })
            }
        }
    }

    /// One-line summary for a notification list.
    pub fn notification_text(&self) -> String {
        let prefix = match self.status() {
            Status::Failed => " ! ! ! ".to_string(),
            Status::Requested => " . . . ".to_string(),
            Status::Complete => self
                .transaction
                .response_code()
                .map(|code| code.to_string())
                .unwrap_or_default(),
        };
        format!(
            "{prefix} {} {}",
            self.transaction.method().unwrap_or_default(),
            self.formatted_path(false)
        )
    }

    pub fn formatted_request_headers(&self) -> String {
        format_headers(self.transaction.request_headers())
    }

    pub fn formatted_response_headers(&self) -> String {
        format_headers(self.transaction.response_headers())
    }

    /// Request body, pretty-printed when it is JSON.
    pub fn formatted_request_body(&self) -> String {
        format_body(
            self.transaction.request_body(),
            self.transaction.request_content_type(),
        )
    }

    /// Response body, pretty-printed when it is JSON.
    pub fn formatted_response_body(&self) -> String {
        format_body(
            self.transaction.response_body(),
            self.transaction.response_content_type(),
        )
    }
}

fn length(declared: Option<i64>) -> u64 {
    declared.and_then(|n| u64::try_from(n).ok()).unwrap_or(0)
}

fn format_target(target: &str, encode: bool) -> String {
    let Some((base, query)) = target.split_once('?').filter(|_| encode) else {
        return target.to_string();
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => format!("{}={}", encode_component(key), encode_component(value)),
            None => encode_component(pair),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}

/// Percent-encode a query component, decoding existing escapes first.
fn encode_component(raw: &str) -> String {
    let decoded = urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw));
    urlencoding::encode(&decoded).into_owned()
}

fn format_headers(headers: &Headers) -> String {
    headers
        .iter()
        .map(|h| format!("{}: {}", h.name, h.value))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_body(body: Option<&str>, content_type: Option<&str>) -> String {
    let Some(body) = body else {
        return String::new();
    };
    let is_json = content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("json"));
    if is_json {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
            if let Ok(pretty) = serde_json::to_string_pretty(&value) {
                return pretty;
            }
        }
    }
    body.to_string()
}
