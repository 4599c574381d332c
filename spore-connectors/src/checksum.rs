//! Payload checksums
//!
//! Config files and firmware images arrive with a hex SHA-256 line. We hash
//! what actually arrived and compare case-insensitively; leading and
//! trailing whitespace on the expected value is ignored.

use sha2::{Digest, Sha256};
use std::fmt::Write as _;

/// Lowercase hex SHA-256 of `bytes`
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut stream = ChecksumStream::new();
    stream.update(bytes);
    stream.finish()
}

/// True if `bytes` hash to `expected`
pub fn matches(bytes: &[u8], expected: &str) -> bool {
    hex_eq(&sha256_hex(bytes), expected)
}

/// Compare a computed digest with one received from the wire
pub fn hex_eq(computed: &str, expected: &str) -> bool {
    let expected = expected.trim();
    !expected.is_empty() && computed.eq_ignore_ascii_case(expected)
}

/// Incremental SHA-256 for payloads streamed in chunks
#[derive(Debug, Clone, Default)]
pub struct ChecksumStream {
    hasher: Sha256,
    len: usize,
}

impl ChecksumStream {
    /// Start a new digest
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed the next chunk
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len();
    }

    /// Bytes hashed so far
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if nothing has been hashed
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Lowercase hex digest
    pub fn finish(self) -> String {
        let digest = self.hasher.finalize();
        let mut digest_hex = String::with_capacity(64);
        for byte in digest {
            // Writing to a String cannot fail
            let _ = write!(&mut digest_hex, "{byte:02x}");
        }
        digest_hex
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ABC: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    #[test]
    fn known_digest() {
        assert_eq!(sha256_hex(b"abc"), ABC);
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..5_000u32).map(|i| (i * 7) as u8).collect();
        let mut stream = ChecksumStream::new();
        for chunk in data.chunks(1024) {
            stream.update(chunk);
        }
        assert_eq!(stream.len(), data.len());
        assert_eq!(stream.finish(), sha256_hex(&data));
    }

    #[test]
    fn comparison_ignores_case_and_whitespace() {
        assert!(matches(b"abc", ABC));
        assert!(matches(b"abc", &format!("  {}\r", ABC.to_ascii_uppercase())));
        assert!(!matches(b"abd", ABC));
        assert!(!matches(b"abc", ""));
    }
}
