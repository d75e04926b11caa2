//! Content-Encoding and charset resolution.

use encoding_rs::{DecoderResult, Encoding, UTF_8};
use serde::{Deserialize, Serialize};

/// The declared `Content-Encoding` of a body, as far as capture cares.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContentEncoding {
    /// No encoding, or `identity`
    #[default]
    Identity,
    /// `gzip` or `x-gzip`
    Gzip,
    /// Anything else; the body is recorded as omitted
    Unsupported(String),
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value.
    ///
    /// Matching is case-insensitive and ignores surrounding whitespace.
    pub fn from_header(value: Option<&str>) -> Self {
        let Some(value) = value.map(str::trim) else {
            return Self::Identity;
        };

        if value.is_empty() || value.eq_ignore_ascii_case("identity") {
            Self::Identity
        } else if value.eq_ignore_ascii_case("gzip") || value.eq_ignore_ascii_case("x-gzip") {
            Self::Gzip
        } else {
            Self::Unsupported(value.to_string())
        }
    }

    /// Whether the pipeline can turn a body with this encoding back into text.
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported(_))
    }
}

/// Resolve the `charset` parameter of a content type.
///
/// Returns `None` when the parameter is missing or names an unknown label.
///
/// ```
/// use bodytap_core::encoding::charset_from_content_type;
///
/// let charset = charset_from_content_type("text/plain; charset=ISO-8859-1").unwrap();
/// assert_eq!(charset.name(), "windows-1252");
/// assert!(charset_from_content_type("application/json").is_none());
/// ```
pub fn charset_from_content_type(content_type: &str) -> Option<&'static Encoding> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if !name.trim().eq_ignore_ascii_case("charset") {
            return None;
        }
        let label = value.trim().trim_matches('"');
        Encoding::for_label(label.as_bytes())
    })
}

/// The charset to decode a body with: the declared one, else UTF-8.
pub fn charset_or_default(content_type: Option<&str>) -> &'static Encoding {
    content_type
        .and_then(charset_from_content_type)
        .unwrap_or(UTF_8)
}

/// Strictly decode `bytes` with `encoding`.
///
/// Any malformed sequence fails the whole decode. When `complete` is false
/// the input is a prefix of a longer body, and a trailing partial character
/// is dropped instead of counting as malformed.
pub fn decode_text(bytes: &[u8], encoding: &'static Encoding, complete: bool) -> Option<String> {
    let mut decoder = encoding.new_decoder_without_bom_handling();
    let capacity = decoder.max_utf8_buffer_length_without_replacement(bytes.len())?;
    let mut text = String::with_capacity(capacity);

    let (result, read) = decoder.decode_to_string_without_replacement(bytes, &mut text, complete);
    match result {
        DecoderResult::InputEmpty if read == bytes.len() => Some(text),
        DecoderResult::InputEmpty | DecoderResult::OutputFull => None,
        DecoderResult::Malformed(_, _) => {
            tracing::debug!(charset = encoding.name(), "charset decoding failed");
            None
        }
    }
}

/// Encode `text` with `encoding`, as a string write would put it on the wire.
///
/// UTF-16 labels encode as UTF-8, matching the `encoding_rs` encoder.
pub fn encode_text<'a>(text: &'a str, encoding: &'static Encoding) -> std::borrow::Cow<'a, [u8]> {
    let (bytes, _, _) = encoding.encode(text);
    bytes
}
