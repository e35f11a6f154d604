//! Database model definitions
//!
//! Rows of the packet log and the local file table, plus the small value
//! types repositories hand back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a file found on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT")]
pub enum FileStatus {
    #[sqlx(rename = "unhashed")]
    Unhashed,
    #[sqlx(rename = "hashed")]
    Hashed,
    /// The server knows the file
    #[sqlx(rename = "confirmed")]
    Confirmed,
    /// The server answered NO SUCH FILE
    #[sqlx(rename = "not_found")]
    NotFound,
    #[sqlx(rename = "deleted")]
    Deleted,
}

impl FileStatus {
    pub const ALL: [FileStatus; 5] = [
        Self::Unhashed,
        Self::Hashed,
        Self::Confirmed,
        Self::NotFound,
        Self::Deleted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unhashed => "unhashed",
            Self::Hashed => "hashed",
            Self::Confirmed => "confirmed",
            Self::NotFound => "not_found",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the packet log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketRecord {
    pub tag: i64,
    /// Command text without session or tag
    pub command: String,
    pub processed: bool,
    pub got_reply: bool,
    pub retry_count: i64,
    pub reply: Option<String>,
    pub sent_at: Option<i64>,
}

/// Reply text stored for a packet that ran out of retries
pub const TIMEOUT_REPLY: &str = "TIMEOUT";

/// Packet log totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PacketCounts {
    pub waiting: u64,
    pub in_flight: u64,
    pub replied: u64,
    pub timed_out: u64,
}

/// A file found on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalFile {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub size: i64,
    /// Hex ed2k digest once hashed
    pub hash: Option<String>,
    pub status: FileStatus,
}

/// What local storage already knows about a (size, hash) pair
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LocalFlags(u8);

impl LocalFlags {
    /// A file row with fid > 0 exists
    pub const IN_LOCAL_STORE: LocalFlags = LocalFlags(1);
    /// A mylist row with lid > 0 exists for that fid
    pub const IN_MYLIST: LocalFlags = LocalFlags(1 << 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn contains(self, other: LocalFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: LocalFlags) {
        self.0 |= other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for LocalFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Time helpers
pub mod time_utils {
    use std::time::{SystemTime, UNIX_EPOCH};

    /// Get current time as milliseconds since Unix epoch
    pub fn now_millis() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }

    /// Get current time as seconds since Unix epoch
    pub fn now_secs() -> i64 {
        now_millis() / 1000
    }
}
