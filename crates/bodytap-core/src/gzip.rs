//! Best-effort gzip decoding for captured bodies.
//!
//! Decoding never fails loudly: every error path returns `None` and the
//! caller treats the body as opaque.

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::{self, Read, Write};

/// Upper bound on decompressed output kept from a single body.
pub const MAX_DECODED_BYTES: u64 = 16 * 1024 * 1024;

/// Output of a successful decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decompressed {
    pub bytes: Vec<u8>,
    /// `bytes` is a prefix of the payload: the stream was cut off, or the
    /// output hit [`MAX_DECODED_BYTES`].
    pub truncated: bool,
}

/// Decompress a complete gzip stream.
///
/// Returns `None` on a bad header, a truncated stream, a bad checksum or any
/// other I/O error. Output beyond [`MAX_DECODED_BYTES`] is dropped and the
/// result is marked truncated.
pub fn decompress(bytes: &[u8]) -> Option<Decompressed> {
    let mut decoded = Vec::new();
    match read_capped(bytes, &mut decoded) {
        Ok(truncated) => Some(Decompressed {
            bytes: decoded,
            truncated,
        }),
        Err(err) => {
            tracing::debug!(error = %err, bytes = bytes.len(), "gzip decoding failed");
            None
        }
    }
}

/// Decompress the leading part of a gzip stream whose tail was cut off.
///
/// Used when capture stopped before the producer finished writing: whatever
/// decodes cleanly up to the cut is returned, marked truncated. A stream that
/// yields nothing before failing is still `None`.
pub fn decompress_prefix(bytes: &[u8]) -> Option<Decompressed> {
    let mut decoded = Vec::new();
    match read_capped(bytes, &mut decoded) {
        Ok(truncated) => Some(Decompressed {
            bytes: decoded,
            truncated,
        }),
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof && !decoded.is_empty() => {
            tracing::trace!(decoded = decoded.len(), "decoded truncated gzip prefix");
            Some(Decompressed {
                bytes: decoded,
                truncated: true,
            })
        }
        Err(err) => {
            tracing::debug!(error = %err, bytes = bytes.len(), "gzip prefix decoding failed");
            None
        }
    }
}

/// Reads at most one byte past the cap so a cut can be told from an exact fit.
fn read_capped(bytes: &[u8], decoded: &mut Vec<u8>) -> io::Result<bool> {
    GzDecoder::new(bytes)
        .take(MAX_DECODED_BYTES + 1)
        .read_to_end(decoded)?;

    let cap = MAX_DECODED_BYTES as usize;
    if decoded.len() > cap {
        decoded.truncate(cap);
        tracing::debug!(cap, "gzip output cut at the decode limit");
        return Ok(true);
    }
    Ok(false)
}

/// Gzip-compress `bytes` with the default level.
pub fn compress(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
