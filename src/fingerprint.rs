//! Content hashing over a stable, non-cryptographic checksum.
//!
//! Equal fingerprint is taken to mean equal content everywhere else in the
//! crate; this module is the single place that decision is made.

use crate::error::{Error, Result};
use std::path::Path;

/// Hashes the bytes of a file on disk.
///
/// Deterministic across runs and machines for identical bytes.
pub fn file_fingerprint(path: impl AsRef<Path>) -> Result<u64> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| Error::io(path, e))?;
    Ok(bytes_fingerprint(&bytes))
}

/// Hashes an in-memory byte slice (used for flag sets, tool identity
/// strings, and anything else fingerprinted that didn't come from a file).
pub fn bytes_fingerprint(data: &[u8]) -> u64 {
    xxhash_rust::xxh3::xxh3_64(data)
}

/// Hashes a string using the same primitive as [`bytes_fingerprint`].
pub fn str_fingerprint(s: &str) -> u64 {
    bytes_fingerprint(s.as_bytes())
}

/// Combines an ordered sequence of fingerprints into one, used wherever a
/// prebuild key is built from several inputs (source content, tool
/// identity, flags, and recursively the fingerprints of dependencies).
///
/// The caller is responsible for sorting inputs that have no natural order
/// (e.g. a file's set of module dependencies) before calling this, since the
/// combination is order-sensitive.
pub fn combine(parts: &[u64]) -> u64 {
    let mut buf = Vec::with_capacity(parts.len() * 8);
    for p in parts {
        buf.extend_from_slice(&p.to_le_bytes());
    }
    bytes_fingerprint(&buf)
}

/// Renders a fingerprint as the lowercase hex string used in prebuild
/// filenames (`STEM.HEX.SUFFIX`).
pub fn to_hex(fp: u64) -> String {
    hex::encode(fp.to_be_bytes())
}
