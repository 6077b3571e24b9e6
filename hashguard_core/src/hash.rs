//! Digest engine: streaming content hashing and digest format checks.

use crate::error::{Error, Result};
use serde::{Serialize, Serializer};
use sha2::Digest as _;
use std::fmt;
use std::io::{self, Read, Write};

/// Chunk size used when streaming content through the hasher (64 KiB).
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Supported hash algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// SHA-256.
    #[default]
    Sha256,
    /// BLAKE3 with 256-bit output.
    Blake3,
}

impl Algorithm {
    /// Returns the string representation of the algorithm (for config files).
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Blake3 => "blake3",
        }
    }

    /// Parse algorithm from string.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Algorithm::Sha256),
            "blake3" | "blake3-256" => Ok(Algorithm::Blake3),
            _ => Err(Error::unsupported_algorithm(s)),
        }
    }

    /// Raw hash output size in bytes.
    pub fn output_size(&self) -> usize {
        match self {
            Algorithm::Sha256 => <sha2::Sha256 as sha2::digest::OutputSizeUser>::output_size(),
            Algorithm::Blake3 => blake3::OUT_LEN,
        }
    }

    /// Length of a hex digest produced by this algorithm.
    pub fn digest_len(&self) -> usize {
        self.output_size() * 2
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A hex-encoded content digest.
///
/// Only produced by hashing, so it is always lowercase hex of the
/// algorithm's digest length.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest(String);

impl Digest {
    /// Hash an in-memory buffer.
    pub fn of_bytes(algorithm: Algorithm, data: &[u8]) -> Self {
        let mut writer = DigestWriter::new(algorithm);
        writer.update(data);
        writer.finalize()
    }

    /// Hash the UTF-8 bytes of a string.
    pub fn of_str(algorithm: Algorithm, s: &str) -> Self {
        Self::of_bytes(algorithm, s.as_bytes())
    }

    /// The hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Shard prefix: the first two hex characters.
    pub fn shard(&self) -> &str {
        &self.0[..2]
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.0)
    }
}

impl AsRef<str> for Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

enum HasherState {
    Sha256(sha2::Sha256),
    Blake3(Box<blake3::Hasher>),
}

/// Incremental hasher that accepts bytes through [`std::io::Write`].
pub struct DigestWriter {
    state: HasherState,
}

impl DigestWriter {
    pub fn new(algorithm: Algorithm) -> Self {
        let state = match algorithm {
            Algorithm::Sha256 => HasherState::Sha256(sha2::Sha256::new()),
            Algorithm::Blake3 => HasherState::Blake3(Box::new(blake3::Hasher::new())),
        };
        Self { state }
    }

    /// Feed a chunk into the accumulator.
    pub fn update(&mut self, data: &[u8]) {
        match &mut self.state {
            HasherState::Sha256(h) => h.update(data),
            HasherState::Blake3(h) => {
                h.update(data);
            }
        }
    }

    /// Consume the hasher and produce the hex digest.
    pub fn finalize(self) -> Digest {
        let hex = match self.state {
            HasherState::Sha256(h) => hex::encode(h.finalize()),
            HasherState::Blake3(h) => hex::encode(h.finalize().as_bytes()),
        };
        Digest(hex)
    }
}

impl Write for DigestWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Hash everything a reader yields, in chunks of [`DEFAULT_BUFFER_SIZE`].
pub fn compute_digest<R: Read>(algorithm: Algorithm, reader: R) -> Result<Digest> {
    compute_digest_with_buffer(algorithm, reader, DEFAULT_BUFFER_SIZE)
}

/// Hash everything a reader yields using a fixed buffer of `buffer_size` bytes.
pub fn compute_digest_with_buffer<R: Read>(
    algorithm: Algorithm,
    mut reader: R,
    buffer_size: usize,
) -> Result<Digest> {
    let mut writer = DigestWriter::new(algorithm);
    let mut buf = vec![0u8; buffer_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        writer.update(&buf[..n]);
    }
    Ok(writer.finalize())
}

/// Syntactic digest check: exact length for `algorithm`, and only ASCII
/// letters, digits, `-` and `_`.
///
/// Says nothing about whether an object with this digest is stored.
pub fn is_well_formed(algorithm: Algorithm, candidate: &str) -> bool {
    candidate.len() == algorithm.digest_len()
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Like [`is_well_formed`], but returns an `InvalidDigest` error describing the problem.
pub fn validate(algorithm: Algorithm, candidate: &str) -> Result<()> {
    if candidate.len() != algorithm.digest_len() {
        return Err(Error::invalid_digest(format!(
            "Expected {} characters, got {}",
            algorithm.digest_len(),
            candidate.len()
        )));
    }
    if !is_well_formed(algorithm, candidate) {
        return Err(Error::invalid_digest(
            "Only letters, digits, '-' and '_' are allowed",
        ));
    }
    Ok(())
}
