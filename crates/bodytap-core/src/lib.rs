//! # bodytap core
//!
//! Streaming capture of HTTP request and response bodies.
//!
//! An [`InterceptingSink`] wraps the sink a client writes a body into,
//! forwards every write unchanged, and keeps a bounded copy. When the body
//! is closed the copy is sniffed, decompressed and decoded, then handed to
//! the [`TransactionRecorder`], which publishes the [`Transaction`] to a
//! [`TransactionCollector`]. [`TransactionView`] derives display fields.
//!
//! Adapters for specific HTTP stacks live in separate crates.

mod buffer;
mod capture;
mod collector;
mod config;
pub mod encoding;
mod error;
pub mod gzip;
mod recorder;
mod sink;
pub mod sniff;
mod transaction;
mod view;

// Public API
pub use buffer::{truncate_text, CaptureBuffer, Captured, MAX_CAPTURE_BYTES, MAX_CONTENT_LENGTH};
pub use capture::{
    resolve, BodyInfo, BodyMode, CaptureOutcome, CompletionHandle, CompletionHook, FormBody, Tap,
    DUPLEX_BODY_OMITTED, ENCODED_BODY_OMITTED, ONE_SHOT_BODY_OMITTED,
};
pub use collector::{InMemoryCollector, NullCollector, TransactionCollector, DEFAULT_COLLECTOR_CAPACITY};
pub use config::{RecorderConfig, REDACTED};
pub use encoding::ContentEncoding;
pub use error::{Error, Result};
pub use recorder::{Completion, Exchange, ExchangeState, RequestInfo, ResponseInfo, TransactionRecorder};
pub use sink::{BodySink, InterceptingSink, WriteSink};
pub use transaction::{Headers, HttpHeader, Transaction};
pub use view::{Status, TransactionView};
