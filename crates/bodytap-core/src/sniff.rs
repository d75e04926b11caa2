//! Plain-text sniffing for captured bodies.
//!
//! A cheap heuristic that looks at the first few code points of a body and
//! decides whether it is worth decoding as text. It is not a general
//! text/binary classifier and it never fails: anything it cannot decode is
//! simply "binary".

/// Number of leading bytes inspected by [`is_probably_plain_text`].
pub const SNIFF_PREFIX_BYTES: usize = 64;

/// Maximum number of code points decoded from the prefix.
pub const SNIFF_CODE_POINTS: usize = 16;

/// Returns `true` if `bytes` plausibly holds human-readable text.
///
/// Up to [`SNIFF_CODE_POINTS`] UTF-8 code points are decoded from the first
/// [`SNIFF_PREFIX_BYTES`] bytes. Malformed sequences and control characters
/// other than whitespace mark the input as binary. Empty input is text.
///
/// ```
/// use bodytap_core::sniff::is_probably_plain_text;
///
/// assert!(is_probably_plain_text(b"{\"id\": 1}\n"));
/// assert!(is_probably_plain_text(b""));
/// assert!(!is_probably_plain_text(&[0x1f, 0x8b, 0x08, 0x00]));
/// ```
pub fn is_probably_plain_text(bytes: &[u8]) -> bool {
    let prefix = &bytes[..bytes.len().min(SNIFF_PREFIX_BYTES)];
    let mut pos = 0;

    for _ in 0..SNIFF_CODE_POINTS {
        if pos >= prefix.len() {
            break;
        }
        let Some((code_point, width)) = decode_code_point(&prefix[pos..]) else {
            return false;
        };
        pos += width;

        // Code points beyond the Unicode range or in the surrogate block are
        // not control characters, so they do not count against the body.
        if let Some(c) = char::from_u32(code_point) {
            if is_binary_control(c) {
                return false;
            }
        }
    }

    true
}

/// Returns `true` if the leading characters of `text` look human-readable.
///
/// The same check as [`is_probably_plain_text`], applied to text that was
/// already decoded from a declared charset.
pub fn is_probably_plain_str(text: &str) -> bool {
    !text.chars().take(SNIFF_CODE_POINTS).any(is_binary_control)
}

/// An ISO control character that is not whitespace.
///
/// Whitespace here is the ISO set: tab, line feed, vertical tab, form feed,
/// carriage return and the four separators U+001C..=U+001F. NEL (U+0085) is a
/// control character like the rest of the C1 block.
fn is_binary_control(c: char) -> bool {
    c.is_control() && !matches!(c, '\t'..='\r' | '\u{1c}'..='\u{1f}')
}

/// Decodes one UTF-8 code point from the front of `bytes`.
///
/// Accepts the historical 1-6 byte lead patterns. Returns the code point and
/// the number of bytes consumed, or `None` on an invalid lead byte, an invalid
/// continuation byte, or a sequence cut short by the end of input.
fn decode_code_point(bytes: &[u8]) -> Option<(u32, usize)> {
    let lead = *bytes.first()?;

    let (width, initial) = match lead {
        0x00..=0x7f => return Some((lead as u32, 1)),
        0xc0..=0xdf => (2, lead & 0x1f),
        0xe0..=0xef => (3, lead & 0x0f),
        0xf0..=0xf7 => (4, lead & 0x07),
        0xf8..=0xfb => (5, lead & 0x03),
        0xfc..=0xfd => (6, lead & 0x01),
        // stray continuation byte, or 0xfe/0xff
        _ => return None,
    };

    if bytes.len() < width {
        return None;
    }

    let mut code_point = initial as u32;
    for &byte in &bytes[1..width] {
        if byte & 0xc0 != 0x80 {
            return None;
        }
        code_point = (code_point << 6) | (byte & 0x3f) as u32;
    }

    Some((code_point, width))
}
