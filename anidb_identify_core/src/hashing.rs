//! ed2k hashing: a chunked two-level MD4 engine and the worker pool that
//! drives it
//!
//! Files are read in 102400 byte chunks. Every 95 chunks form a block whose
//! MD4 digest is folded into a second running MD4; see [`Ed2kEngine`] for
//! how the final digest is chosen.

mod engine;
mod pool;

pub use engine::{Ed2kEngine, IoGate};
pub use pool::{HasherPool, MAX_WORKERS, PoolConfig};

use std::fmt;

/// Bytes per read and per progress part
pub const CHUNK_SIZE: usize = 102_400;

/// Chunks folded into one intermediate digest
pub const CHUNKS_PER_BLOCK: u64 = 95;

/// Number of parts reported for a file of `size` bytes, never zero
pub fn parts_total(size: u64) -> u64 {
    size.div_ceil(CHUNK_SIZE as u64).max(1)
}

/// Digest of one file plus what is needed to build its link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ed2kHash {
    pub filename: String,
    pub size: u64,
    pub digest: [u8; 16],
}

impl Ed2kHash {
    /// 32 lowercase hex characters
    pub fn hex(&self) -> String {
        self.digest.iter().map(|byte| format!("{byte:02x}")).collect()
    }

    /// `ed2k://|file|<name>|<size>|<hex>|/`
    pub fn link(&self) -> String {
        format!("ed2k://|file|{}|{}|{}|/", self.filename, self.size, self.hex())
    }
}

impl fmt::Display for Ed2kHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.link())
    }
}

/// How a single hash job ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashOutcome {
    Hashed(Ed2kHash),
    /// Cancelled between chunks; no digest is produced
    Stopped,
    /// The file could not be opened or read
    Failed(String),
}

impl HashOutcome {
    pub fn hash(&self) -> Option<&Ed2kHash> {
        match self {
            Self::Hashed(hash) => Some(hash),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parts_total() {
        assert_eq!(parts_total(0), 1);
        assert_eq!(parts_total(1), 1);
        assert_eq!(parts_total(102_400), 1);
        assert_eq!(parts_total(102_401), 2);
        assert_eq!(parts_total(300 * 1024), 3);
    }

    #[test]
    fn test_link_format() {
        let hash = Ed2kHash {
            filename: "[Group] Show - 01.mkv".into(),
            size: 734_003_200,
            digest: [0xab; 16],
        };
        assert_eq!(hash.hex(), "ab".repeat(16));
        assert_eq!(
            hash.link(),
            format!("ed2k://|file|[Group] Show - 01.mkv|734003200|{}|/", "ab".repeat(16))
        );
    }
}
