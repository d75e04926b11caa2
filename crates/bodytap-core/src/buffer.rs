//! Bounded side-copy of an intercepted body.

use bytes::{Bytes, BytesMut};

/// Maximum number of characters kept for any captured body text.
pub const MAX_CONTENT_LENGTH: usize = 500_000;

/// Maximum number of bytes retained from the writes to one body.
///
/// Enough for [`MAX_CONTENT_LENGTH`] characters in any UTF-8 width.
pub const MAX_CAPTURE_BYTES: usize = MAX_CONTENT_LENGTH * 4;

/// Truncate `text` to at most [`MAX_CONTENT_LENGTH`] characters.
pub fn truncate_text(mut text: String) -> String {
    if let Some((end, _)) = text.char_indices().nth(MAX_CONTENT_LENGTH) {
        text.truncate(end);
    }
    text
}

/// Accumulates the bytes and characters written to one body stream.
///
/// Every write lands in one ordered byte sequence: string writes as their
/// UTF-8 bytes, byte-sequence writes as given. The sequence is capped at
/// [`MAX_CAPTURE_BYTES`]; the total number of bytes seen keeps counting past
/// the cap. A stream made only of string writes is known to be text.
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    bytes: BytesMut,
    byte_count: u64,
    wrote_str: bool,
    wrote_bytes: bool,
    truncated: bool,
    unsupported: bool,
}

impl CaptureBuffer {
    /// Create an empty buffer
    pub fn new() -> Self {
        Self::default()
    }

    /// Append text written through a string path.
    ///
    /// A string cut at the cap is cut on a character boundary.
    pub fn push_str(&mut self, s: &str) {
        self.wrote_str = true;
        self.byte_count += s.len() as u64;

        let room = MAX_CAPTURE_BYTES - self.bytes.len();
        if s.len() <= room {
            self.bytes.extend_from_slice(s.as_bytes());
            return;
        }

        let mut end = room;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        self.bytes.extend_from_slice(&s.as_bytes()[..end]);
        self.truncated = true;
    }

    /// Append bytes written through a byte-sequence path.
    pub fn push_bytes(&mut self, bytes: &[u8]) {
        self.wrote_bytes = true;
        self.byte_count += bytes.len() as u64;

        let room = MAX_CAPTURE_BYTES - self.bytes.len();
        if bytes.len() > room {
            self.bytes.extend_from_slice(&bytes[..room]);
            self.truncated = true;
        } else {
            self.bytes.extend_from_slice(bytes);
        }
    }

    /// Record a raw numeric write that capture cannot interpret.
    pub fn mark_unsupported(&mut self, width: usize) {
        self.byte_count += width as u64;
        self.unsupported = true;
    }

    /// Whether every captured write came through a string path.
    pub fn is_text_only(&self) -> bool {
        self.wrote_str && !self.wrote_bytes
    }

    /// Whether any byte-sequence write was captured.
    pub fn has_bytes(&self) -> bool {
        self.wrote_bytes
    }

    /// Whether a raw numeric write disabled plain-text capture.
    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    /// Whether anything was dropped at the cap.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Number of bytes written, including those past the cap.
    pub fn byte_count(&self) -> u64 {
        self.byte_count
    }

    /// Freeze the buffer into its captured parts.
    pub fn freeze(self) -> Captured {
        Captured {
            text_only: self.is_text_only(),
            wrote: self.wrote_str || self.wrote_bytes,
            bytes: self.bytes.freeze(),
            byte_count: self.byte_count,
            truncated: self.truncated,
            unsupported: self.unsupported,
        }
    }
}

/// The frozen contents of a [`CaptureBuffer`].
#[derive(Debug, Clone, Default)]
pub struct Captured {
    /// Every write in order, up to the cap
    pub bytes: Bytes,
    /// Only string writes were made, so `bytes` is valid UTF-8
    pub text_only: bool,
    /// At least one string or byte-sequence write was made
    pub wrote: bool,
    pub byte_count: u64,
    pub truncated: bool,
    pub unsupported: bool,
}
