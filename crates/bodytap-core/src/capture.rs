//! Capture resolution and exactly-once completion.
//!
//! A [`Tap`] is the capture half of an interception: it owns the
//! [`CaptureBuffer`] for one body, and when the stream completes it resolves
//! the buffered content into text (or nothing) and hands the result to a
//! [`CompletionHook`] exactly once. [`InterceptingSink`](crate::InterceptingSink)
//! pairs a tap with a forwarded writer; body adapters pair it with a stream.

use crate::buffer::{truncate_text, CaptureBuffer, Captured};
use crate::encoding::{charset_or_default, decode_text, ContentEncoding};
use crate::gzip;
use crate::sniff::{is_probably_plain_str, is_probably_plain_text};
use encoding_rs::{Encoding, UTF_8};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

/// Published in place of a body whose content encoding cannot be decoded.
pub const ENCODED_BODY_OMITTED: &str = "(encoded body omitted)";

/// Published in place of a body that can only be consumed once.
pub const ONE_SHOT_BODY_OMITTED: &str = "(one-shot body omitted)";

/// Published in place of a duplex request body.
pub const DUPLEX_BODY_OMITTED: &str = "(duplex request body omitted)";

/// How the producer of a body lets it be consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyMode {
    /// Ordinary body; safe to tap
    #[default]
    Buffered,
    /// Streamed exactly once; capture is skipped
    OneShot,
    /// Written while the response is read; capture is skipped
    Duplex,
}

impl BodyMode {
    /// The marker published instead of the body, if capture is skipped.
    pub fn omitted_marker(&self) -> Option<&'static str> {
        match self {
            Self::Buffered => None,
            Self::OneShot => Some(ONE_SHOT_BODY_OMITTED),
            Self::Duplex => Some(DUPLEX_BODY_OMITTED),
        }
    }
}

/// A form-encoded body, kept as fields so its string form can be rebuilt
/// when nothing was written through the tap.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormBody {
    fields: Vec<(String, String)>,
}

impl FormBody {
    /// Create an empty form
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }

    /// The fields in insertion order.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// `application/x-www-form-urlencoded` serialization of the fields.
    pub fn canonical(&self) -> String {
        serde_urlencoded::to_string(&self.fields).unwrap_or_default()
    }
}

/// What the pipeline knows about a body before its bytes flow.
#[derive(Debug, Clone, Default)]
pub struct BodyInfo {
    pub content_type: Option<String>,
    pub content_encoding: ContentEncoding,
    pub mode: BodyMode,
    pub form: Option<FormBody>,
}

impl BodyInfo {
    /// Create a descriptor for an ordinary body with no declared type.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the declared content type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Set the declared content encoding from a header value.
    pub fn content_encoding(mut self, value: Option<&str>) -> Self {
        self.content_encoding = ContentEncoding::from_header(value);
        self
    }

    /// Set how the body may be consumed.
    pub fn mode(mut self, mode: BodyMode) -> Self {
        self.mode = mode;
        self
    }

    /// Mark the body as a form with the given fields.
    pub fn form(mut self, form: FormBody) -> Self {
        self.form = Some(form);
        self
    }
}

/// The result of finalizing one body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Captured text, at most [`MAX_CONTENT_LENGTH`](crate::MAX_CONTENT_LENGTH) characters
    pub text: Option<String>,
    /// Whether the body was confidently decoded as text
    pub plain_text: bool,
    /// Bytes written to the body, including those past the capture cap
    pub byte_count: u64,
}

impl CaptureOutcome {
    /// An outcome that publishes `marker` and flags the body as not plain text.
    pub fn omitted(marker: &str) -> Self {
        Self {
            text: Some(marker.to_string()),
            plain_text: false,
            byte_count: 0,
        }
    }

    fn binary(byte_count: u64) -> Self {
        Self {
            text: None,
            plain_text: false,
            byte_count,
        }
    }

    fn text(text: String, byte_count: u64) -> Self {
        Self {
            text: Some(truncate_text(text)),
            plain_text: true,
            byte_count,
        }
    }
}

/// Resolve frozen capture contents into the outcome to publish.
///
/// A stream written only through string paths is published as that text.
/// Otherwise the ordered capture is decoded through the declared content
/// encoding and charset. With nothing written, a form body publishes its
/// canonical form. A raw numeric write anywhere in the stream disables
/// plain-text capture outright.
pub fn resolve(captured: Captured, info: &BodyInfo) -> CaptureOutcome {
    let byte_count = captured.byte_count;

    if captured.unsupported {
        tracing::debug!(bytes = byte_count, "interception unsupported for raw writes");
        return CaptureOutcome::binary(byte_count);
    }

    // String writes are captured before encoding, cut on character boundaries.
    if captured.text_only {
        return match String::from_utf8(captured.bytes.to_vec()) {
            Ok(text) => CaptureOutcome::text(text, byte_count),
            Err(_) => CaptureOutcome::binary(byte_count),
        };
    }

    if !captured.bytes.is_empty() {
        let mut complete = !captured.truncated;
        let decoded = match &info.content_encoding {
            ContentEncoding::Identity => captured.bytes.to_vec(),
            ContentEncoding::Gzip => {
                let decompressed = if complete {
                    gzip::decompress(&captured.bytes)
                } else {
                    gzip::decompress_prefix(&captured.bytes)
                };
                let Some(decompressed) = decompressed else {
                    return CaptureOutcome::binary(byte_count);
                };
                complete &= !decompressed.truncated;
                decompressed.bytes
            }
            ContentEncoding::Unsupported(encoding) => {
                tracing::debug!(%encoding, "body omitted for unsupported content encoding");
                return CaptureOutcome {
                    byte_count,
                    ..CaptureOutcome::omitted(ENCODED_BODY_OMITTED)
                };
            }
        };

        let charset = charset_or_default(info.content_type.as_deref());
        return match decode_body(&decoded, charset, complete) {
            Some(text) => CaptureOutcome::text(text, byte_count),
            None => CaptureOutcome::binary(byte_count),
        };
    }

    if let Some(form) = &info.form {
        return CaptureOutcome::text(form.canonical(), byte_count);
    }

    CaptureOutcome::binary(byte_count)
}

/// Sniff and decode a body. When `complete` is false the bytes are a prefix,
/// so a trailing cut character is dropped.
fn decode_body(bytes: &[u8], charset: &'static Encoding, complete: bool) -> Option<String> {
    if charset == UTF_8 {
        if !is_probably_plain_text(bytes) {
            tracing::debug!(bytes = bytes.len(), "body sniffed as binary");
            return None;
        }
        return decode_text(bytes, charset, complete);
    }

    // The byte sniffer reads UTF-8; other charsets are checked once decoded.
    let text = decode_text(bytes, charset, complete)?;
    if !is_probably_plain_str(&text) {
        tracing::debug!(charset = charset.name(), "decoded body sniffed as binary");
        return None;
    }
    Some(text)
}

/// Callback receiving the outcome of a finalized capture.
pub type CompletionHook = Box<dyn FnOnce(CaptureOutcome) + Send + 'static>;

const PENDING: u8 = 0;
const COMPLETING: u8 = 1;
const COMPLETED: u8 = 2;

/// Tri-state guard making finalization run once per capture.
#[derive(Debug, Default)]
struct CompletionGuard {
    state: AtomicU8,
}

impl CompletionGuard {
    fn completed() -> Self {
        Self {
            state: AtomicU8::new(COMPLETED),
        }
    }

    /// Claim finalization. Only the first caller gets `true`.
    fn try_begin(&self) -> bool {
        self.state
            .compare_exchange(PENDING, COMPLETING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.state.store(COMPLETED, Ordering::Release);
    }

    fn is_completed(&self) -> bool {
        self.state.load(Ordering::Acquire) == COMPLETED
    }
}

/// Observes whether a capture has been finalized, from any thread.
#[derive(Debug, Clone)]
pub struct CompletionHandle {
    guard: Arc<CompletionGuard>,
}

impl CompletionHandle {
    /// Whether the completion hook has run.
    pub fn is_completed(&self) -> bool {
        self.guard.is_completed()
    }
}

/// The capture side of one intercepted body.
///
/// Finalizes on [`complete`](Tap::complete) or on drop, whichever comes
/// first; later writes are ignored.
pub struct Tap {
    buffer: CaptureBuffer,
    info: BodyInfo,
    hook: Option<CompletionHook>,
    guard: Arc<CompletionGuard>,
}

impl Tap {
    /// Create a tap that reports to `hook` when the body completes.
    pub fn new(info: BodyInfo, hook: CompletionHook) -> Self {
        Self {
            buffer: CaptureBuffer::new(),
            info,
            hook: Some(hook),
            guard: Arc::new(CompletionGuard::default()),
        }
    }

    /// Create a tap that captures nothing and never reports.
    pub fn disabled() -> Self {
        Self {
            buffer: CaptureBuffer::new(),
            info: BodyInfo::default(),
            hook: None,
            guard: Arc::new(CompletionGuard::completed()),
        }
    }

    /// Whether writes are still being captured.
    pub fn is_capturing(&self) -> bool {
        self.hook.is_some()
    }

    /// Capture text written through a string path.
    pub fn capture_str(&mut self, s: &str) {
        if self.is_capturing() {
            self.buffer.push_str(s);
        }
    }

    /// Capture bytes written through a byte-sequence path.
    pub fn capture_bytes(&mut self, bytes: &[u8]) {
        if self.is_capturing() {
            tracing::trace!(bytes = bytes.len(), "captured body bytes");
            self.buffer.push_bytes(bytes);
        }
    }

    /// Record a raw numeric write of `width` bytes.
    pub fn capture_unsupported(&mut self, width: usize) {
        if self.is_capturing() {
            self.buffer.mark_unsupported(width);
        }
    }

    /// A handle that observes completion.
    pub fn handle(&self) -> CompletionHandle {
        CompletionHandle {
            guard: self.guard.clone(),
        }
    }

    /// Finalize the capture. Runs the hook on the first call only.
    pub fn complete(&mut self) {
        if !self.guard.try_begin() {
            return;
        }
        if let Some(hook) = self.hook.take() {
            let captured = std::mem::take(&mut self.buffer).freeze();
            hook(resolve(captured, &self.info));
        }
        self.guard.finish();
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        self.complete();
    }
}

impl std::fmt::Debug for Tap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tap")
            .field("buffer", &self.buffer)
            .field("info", &self.info)
            .field("completed", &self.guard.is_completed())
            .finish()
    }
}
