//! Pass-through write proxy that taps a body as it is written.
//!
//! [`InterceptingSink`] wraps any [`BodySink`] and forwards every call to it
//! unchanged, in order, returning exactly what the wrapped sink returned.
//! Alongside, successful writes are copied into a [`Tap`]:
//!
//! - string writes are captured as the string itself, before encoding
//! - byte-sequence writes are captured as raw bytes
//! - raw numeric writes (single bytes, ints, longs) usually carry framing
//!   rather than payload; they mark the capture as unsupported
//!
//! The capture finalizes on the first of [`close`](BodySink::close),
//! [`finish`](BodySink::finish), [`InterceptingSink::into_inner`] or drop.
//!
//! # Example
//!
//! ```
//! use bodytap_core::{BodyInfo, BodySink, InterceptingSink, WriteSink};
//! use std::sync::{Arc, Mutex};
//!
//! let published = Arc::new(Mutex::new(None));
//! let slot = published.clone();
//!
//! let mut sink = InterceptingSink::new(
//!     WriteSink::new(Vec::new()),
//!     BodyInfo::new().content_type("text/plain"),
//!     Box::new(move |outcome| *slot.lock().unwrap() = outcome.text),
//! );
//! sink.write_str("hello").unwrap();
//! sink.close().unwrap();
//!
//! assert_eq!(sink.get_ref().get_ref().as_slice(), b"hello");
//! assert_eq!(published.lock().unwrap().as_deref(), Some("hello"));
//! ```

use crate::capture::{BodyInfo, CompletionHandle, CompletionHook, Tap};
use crate::encoding::encode_text;
use encoding_rs::{Encoding, UTF_8};
use std::io;

/// The operations a streaming body writer may use.
///
/// Only [`write_bytes`](BodySink::write_bytes), [`flush`](BodySink::flush)
/// and [`close`](BodySink::close) are required; the rest default to them.
pub trait BodySink {
    /// Write a sequence of bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Write a single raw byte.
    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.write_bytes(&[byte])
    }

    /// Write a big-endian 32-bit integer.
    fn write_int(&mut self, value: i32) -> io::Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write a big-endian 64-bit integer.
    fn write_long(&mut self, value: i64) -> io::Result<()> {
        self.write_bytes(&value.to_be_bytes())
    }

    /// Write a string in the default charset (UTF-8).
    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.write_str_with(s, UTF_8)
    }

    /// Write a string in an explicit charset.
    fn write_str_with(&mut self, s: &str, charset: &'static Encoding) -> io::Result<()> {
        self.write_bytes(&encode_text(s, charset))
    }

    /// Flush buffered output.
    fn flush(&mut self) -> io::Result<()>;

    /// Flush the final segment; no more body data follows.
    fn finish(&mut self) -> io::Result<()> {
        self.flush()
    }

    /// Close the sink.
    fn close(&mut self) -> io::Result<()>;
}

impl<S: BodySink + ?Sized> BodySink for Box<S> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        (**self).write_byte(byte)
    }

    fn write_int(&mut self, value: i32) -> io::Result<()> {
        (**self).write_int(value)
    }

    fn write_long(&mut self, value: i64) -> io::Result<()> {
        (**self).write_long(value)
    }

    fn write_str(&mut self, s: &str) -> io::Result<()> {
        (**self).write_str(s)
    }

    fn write_str_with(&mut self, s: &str, charset: &'static Encoding) -> io::Result<()> {
        (**self).write_str_with(s, charset)
    }

    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        (**self).finish()
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any [`io::Write`] as a [`BodySink`]. Closing flushes.
#[derive(Debug, Default)]
pub struct WriteSink<W> {
    inner: W,
}

impl<W: io::Write> WriteSink<W> {
    /// Wrap a writer
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Get a reference to the writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    /// Unwrap the writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: io::Write> BodySink for WriteSink<W> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.inner, bytes)
    }

    fn flush(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }

    fn close(&mut self) -> io::Result<()> {
        io::Write::flush(&mut self.inner)
    }
}

/// A transparent proxy over a [`BodySink`] that captures what is written.
#[derive(Debug)]
pub struct InterceptingSink<S> {
    inner: S,
    tap: Tap,
}

impl<S: BodySink> InterceptingSink<S> {
    /// Wrap `inner`, reporting the capture of a body described by `info`
    /// to `on_complete`.
    pub fn new(inner: S, info: BodyInfo, on_complete: CompletionHook) -> Self {
        Self::with_tap(inner, Tap::new(info, on_complete))
    }

    /// Wrap `inner` with an existing tap.
    pub fn with_tap(inner: S, tap: Tap) -> Self {
        Self { inner, tap }
    }

    /// Wrap `inner` without capturing anything.
    pub fn passthrough(inner: S) -> Self {
        Self::with_tap(inner, Tap::disabled())
    }

    /// Whether writes are still being captured.
    pub fn is_capturing(&self) -> bool {
        self.tap.is_capturing()
    }

    /// A handle that observes when the capture finalizes.
    pub fn completion_handle(&self) -> CompletionHandle {
        self.tap.handle()
    }

    /// Get a reference to the wrapped sink.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Get a mutable reference to the wrapped sink.
    ///
    /// Writes made directly through it are not captured.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Finalize the capture and hand back the wrapped sink.
    pub fn into_inner(self) -> S {
        let Self { inner, mut tap } = self;
        tap.complete();
        inner
    }
}

impl<S: BodySink> BodySink for InterceptingSink<S> {
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_bytes(bytes)?;
        self.tap.capture_bytes(bytes);
        Ok(())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.inner.write_byte(byte)?;
        self.tap.capture_unsupported(1);
        Ok(())
    }

    fn write_int(&mut self, value: i32) -> io::Result<()> {
        self.inner.write_int(value)?;
        self.tap.capture_unsupported(4);
        Ok(())
    }

    fn write_long(&mut self, value: i64) -> io::Result<()> {
        self.inner.write_long(value)?;
        self.tap.capture_unsupported(8);
        Ok(())
    }

    fn write_str(&mut self, s: &str) -> io::Result<()> {
        self.inner.write_str(s)?;
        self.tap.capture_str(s);
        Ok(())
    }

    fn write_str_with(&mut self, s: &str, charset: &'static Encoding) -> io::Result<()> {
        self.inner.write_str_with(s, charset)?;
        self.tap.capture_str(s);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    fn finish(&mut self) -> io::Result<()> {
        let result = self.inner.finish();
        self.tap.complete();
        result
    }

    fn close(&mut self) -> io::Result<()> {
        let result = self.inner.close();
        self.tap.complete();
        result
    }
}

impl<S: BodySink> io::Write for InterceptingSink<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_bytes(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        BodySink::flush(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CaptureOutcome, ENCODED_BODY_OMITTED};
    use crate::{gzip, MAX_CONTENT_LENGTH};
    use proptest::prelude::*;
    use std::sync::{Arc, Mutex};

    /// Records every call made on it, in order.
    #[derive(Debug, Default)]
    struct RecordingSink {
        calls: Vec<String>,
        bytes: Vec<u8>,
        fail_writes: bool,
    }

    impl BodySink for RecordingSink {
        fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "peer gone"));
            }
            self.calls.push(format!("bytes:{}", bytes.len()));
            self.bytes.extend_from_slice(bytes);
            Ok(())
        }

        fn write_byte(&mut self, byte: u8) -> io::Result<()> {
            self.calls.push("byte".to_string());
            self.bytes.push(byte);
            Ok(())
        }

        fn write_str_with(&mut self, s: &str, charset: &'static Encoding) -> io::Result<()> {
            self.calls.push(format!("str:{}", charset.name()));
            self.bytes.extend_from_slice(&encode_text(s, charset));
            Ok(())
        }

        fn flush(&mut self) -> io::Result<()> {
            self.calls.push("flush".to_string());
            Ok(())
        }

        fn finish(&mut self) -> io::Result<()> {
            self.calls.push("finish".to_string());
            Ok(())
        }

        fn close(&mut self) -> io::Result<()> {
            self.calls.push("close".to_string());
            Ok(())
        }
    }

    type Outcomes = Arc<Mutex<Vec<CaptureOutcome>>>;

    fn intercept(info: BodyInfo) -> (InterceptingSink<RecordingSink>, Outcomes) {
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let slot = outcomes.clone();
        let sink = InterceptingSink::new(
            RecordingSink::default(),
            info,
            Box::new(move |outcome| slot.lock().unwrap().push(outcome)),
        );
        (sink, outcomes)
    }

    #[test]
    fn test_forwards_every_call_in_order() {
        let (mut sink, _) = intercept(BodyInfo::new());
        sink.write_bytes(b"abc").unwrap();
        sink.write_str("def").unwrap();
        sink.write_str_with("ghi", encoding_rs::WINDOWS_1252).unwrap();
        sink.flush().unwrap();
        sink.close().unwrap();

        assert_eq!(
            sink.get_ref().calls,
            vec!["bytes:3", "str:UTF-8", "str:windows-1252", "flush", "close"]
        );
        assert_eq!(sink.get_ref().bytes, b"abcdefghi");
    }

    #[test]
    fn test_string_writes_are_captured_before_encoding() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.write_str_with("café", encoding_rs::WINDOWS_1252).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.get_ref().bytes, [0x63, 0x61, 0x66, 0xe9]);
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].text.as_deref(), Some("café"));
        assert!(outcomes[0].plain_text);
    }

    #[test]
    fn test_byte_writes_are_pieced_together() {
        let (mut sink, outcomes) = intercept(BodyInfo::new().content_type("application/json"));
        for chunk in [&b"{\"na"[..], b"me\":", b"\"bodytap\"}"] {
            sink.write_bytes(chunk).unwrap();
        }
        sink.close().unwrap();

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].text.as_deref(), Some("{\"name\":\"bodytap\"}"));
        assert_eq!(outcomes[0].byte_count, 18);
    }

    #[test]
    fn test_string_and_byte_writes_are_captured_in_order() {
        let (mut sink, outcomes) = intercept(BodyInfo::new().content_type("multipart/form-data"));
        sink.write_str("--boundary\r\n").unwrap();
        sink.write_bytes(b"payload-bytes").unwrap();
        sink.write_str("\r\n--boundary--").unwrap();
        sink.close().unwrap();

        let expected = "--boundary\r\npayload-bytes\r\n--boundary--";
        assert_eq!(sink.get_ref().bytes, expected.as_bytes());
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].text.as_deref(), Some(expected));
        assert!(outcomes[0].plain_text);
        assert_eq!(outcomes[0].byte_count, expected.len() as u64);
    }

    #[test]
    fn test_raw_byte_writes_disable_capture() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.write_bytes(b"payload").unwrap();
        sink.write_byte(0x0a).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.get_ref().calls, vec!["bytes:7", "byte", "close"]);
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].text, None);
        assert!(!outcomes[0].plain_text);
    }

    #[test]
    fn test_numeric_writes_are_forwarded() {
        let (mut sink, _) = intercept(BodyInfo::new());
        sink.write_int(1).unwrap();
        sink.write_long(-1).unwrap();
        sink.close().unwrap();

        assert_eq!(sink.get_ref().bytes, [0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_close_and_finish_complete_once() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        let handle = sink.completion_handle();
        sink.write_str("once").unwrap();
        sink.finish().unwrap();
        sink.close().unwrap();
        sink.finish().unwrap();
        sink.close().unwrap();

        assert!(handle.is_completed());
        assert_eq!(outcomes.lock().unwrap().len(), 1);
        assert_eq!(
            sink.get_ref().calls,
            vec!["str:UTF-8", "finish", "close", "finish", "close"]
        );
    }

    #[test]
    fn test_plain_flush_does_not_complete() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.write_str("part").unwrap();
        sink.flush().unwrap();
        assert!(outcomes.lock().unwrap().is_empty());
        sink.write_str(" two").unwrap();
        sink.close().unwrap();
        assert_eq!(outcomes.lock().unwrap()[0].text.as_deref(), Some("part two"));
    }

    #[test]
    fn test_writes_after_completion_are_not_captured() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.write_str("before").unwrap();
        sink.finish().unwrap();
        sink.write_str(" after").unwrap();
        drop(sink);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].text.as_deref(), Some("before"));
    }

    #[test]
    fn test_drop_completes() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.write_str("abandoned").unwrap();
        drop(sink);
        assert_eq!(outcomes.lock().unwrap()[0].text.as_deref(), Some("abandoned"));
    }

    #[test]
    fn test_into_inner_completes() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.write_bytes(b"materialized").unwrap();
        let inner = sink.into_inner();
        assert_eq!(inner.bytes, b"materialized");
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_write_is_returned_and_not_captured() {
        let (mut sink, outcomes) = intercept(BodyInfo::new());
        sink.get_mut().fail_writes = true;
        let err = sink.write_bytes(b"lost").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        sink.get_mut().fail_writes = false;
        sink.write_bytes(b"kept").unwrap();
        sink.close().unwrap();
        assert_eq!(outcomes.lock().unwrap()[0].text.as_deref(), Some("kept"));
    }

    #[test]
    fn test_gzip_body_is_decoded() {
        let compressed = gzip::compress("compressed payload".as_bytes()).unwrap();
        let (mut sink, outcomes) = intercept(BodyInfo::new().content_encoding(Some("gzip")));
        for chunk in compressed.chunks(7) {
            sink.write_bytes(chunk).unwrap();
        }
        sink.close().unwrap();

        assert_eq!(sink.get_ref().bytes, compressed);
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].text.as_deref(), Some("compressed payload"));
        assert!(outcomes[0].plain_text);
    }

    #[test]
    fn test_unsupported_encoding_is_omitted() {
        let (mut sink, outcomes) = intercept(BodyInfo::new().content_encoding(Some("br")));
        sink.write_bytes(&[0x1b, 0x03, 0x00, 0xf8]).unwrap();
        sink.close().unwrap();

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes[0].text.as_deref(), Some(ENCODED_BODY_OMITTED));
        assert!(!outcomes[0].plain_text);
    }

    #[test]
    fn test_passthrough_forwards_without_capture() {
        let mut sink = InterceptingSink::passthrough(RecordingSink::default());
        assert!(!sink.is_capturing());
        sink.write_bytes(b"raw").unwrap();
        sink.close().unwrap();
        assert_eq!(sink.get_ref().bytes, b"raw");
    }

    #[test]
    fn test_io_write_adapter() {
        use std::io::Write;

        let (mut sink, outcomes) = intercept(BodyInfo::new());
        write!(sink, "{}-{}", "io", 42).unwrap();
        sink.close().unwrap();
        assert_eq!(outcomes.lock().unwrap()[0].text.as_deref(), Some("io-42"));
    }

    #[test]
    fn test_write_sink_over_vec() {
        let mut sink = WriteSink::new(Vec::new());
        sink.write_str("vec").unwrap();
        sink.close().unwrap();
        assert_eq!(sink.into_inner(), b"vec");
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_published_text_is_truncated_string(len in 0usize..(MAX_CONTENT_LENGTH + 2000)) {
            let text = "z".repeat(len);
            let (mut sink, outcomes) = intercept(BodyInfo::new());
            sink.write_str(&text).unwrap();
            sink.close().unwrap();

            let published = outcomes.lock().unwrap()[0].text.clone().unwrap();
            prop_assert_eq!(published.len(), len.min(MAX_CONTENT_LENGTH));
            if len <= MAX_CONTENT_LENGTH {
                prop_assert_eq!(published, text);
            }
        }

        #[test]
        fn prop_completion_triggers_are_idempotent(triggers in proptest::collection::vec(0u8..4, 1..8)) {
            let (mut sink, outcomes) = intercept(BodyInfo::new());
            sink.write_str("x").unwrap();
            for trigger in triggers {
                match trigger {
                    0 => sink.close().unwrap(),
                    1 => sink.finish().unwrap(),
                    2 => sink.flush().unwrap(),
                    _ => sink.write_str("y").unwrap(),
                }
            }
            drop(sink);
            prop_assert_eq!(outcomes.lock().unwrap().len(), 1);
        }
    }
}
