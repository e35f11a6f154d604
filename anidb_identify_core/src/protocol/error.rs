//! Protocol-specific error types
//!
//! Errors raised while talking to the AniDB UDP API, plus the numeric reply
//! code type shared by the decoder and the reply parser.

use std::fmt;
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Protocol-specific error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Network I/O error
    #[error("Network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Packet too large
    #[error("Packet size {size} exceeds maximum {max_size}")]
    PacketTooLarge { size: usize, max_size: usize },

    /// Reply bytes did not follow `<tag> <code> <text>`
    #[error("Decoding error: {message}")]
    Decoding { message: String },

    /// Fewer reply fields than the request mask selected
    #[error("Mask selects {expected} fields but reply carries {actual}")]
    MaskMismatch { expected: usize, actual: usize },

    /// AniDB server error
    #[error("AniDB server error: {code} - {message}")]
    ServerError { code: u16, message: String },

    /// The session is banned; sending is suspended
    #[error("Client is banned: {reason}")]
    Banned { reason: String },

    /// A reply arrived for a tag that is not open
    #[error("Unknown reply tag: {tag}")]
    UnknownTag { tag: u64 },
}

impl ProtocolError {
    pub fn decoding(message: impl Into<String>) -> Self {
        Self::Decoding {
            message: message.into(),
        }
    }

    pub fn packet_too_large(size: usize, max_size: usize) -> Self {
        Self::PacketTooLarge { size, max_size }
    }

    pub fn mask_mismatch(expected: usize, actual: usize) -> Self {
        Self::MaskMismatch { expected, actual }
    }

    pub fn server_error(code: u16, message: impl Into<String>) -> Self {
        Self::ServerError {
            code,
            message: message.into(),
        }
    }

    pub fn banned(reason: impl Into<String>) -> Self {
        Self::Banned {
            reason: reason.into(),
        }
    }

    /// Check if this error is transient and can be retried
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::ServerError {
                    code: 600..=604,
                    ..
                }
        )
    }

    /// Check if this error indicates a need to re-authenticate
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::ServerError {
                code: 403 | 501 | 506,
                ..
            }
        )
    }
}

/// Response code returned by AniDB server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResponseCode(pub u16);

impl ResponseCode {
    pub const LOGIN_ACCEPTED: Self = Self(200);
    pub const LOGIN_ACCEPTED_NEW_VERSION: Self = Self(201);
    pub const LOGGED_OUT: Self = Self(203);
    pub const MYLIST_ENTRY_ADDED: Self = Self(210);
    pub const FILE: Self = Self(220);
    pub const MYLIST: Self = Self(221);
    pub const MYLIST_STATS: Self = Self(222);
    pub const ANIME: Self = Self(230);
    pub const EPISODE: Self = Self(240);
    pub const NOTIFICATION_ENABLED: Self = Self(270);
    pub const PUSHACK_CONFIRMED: Self = Self(271);
    pub const NO_SUCH_PACKET_PENDING: Self = Self(272);
    pub const NOTIFY_LIST: Self = Self(290);
    pub const NOTIFY_LIST_ENTRY: Self = Self(291);
    pub const NOTIFY_GET_MESSAGE: Self = Self(292);
    pub const NOTIFY_GET_NOTIFY: Self = Self(293);
    pub const FILE_ALREADY_IN_MYLIST: Self = Self(310);
    pub const MYLIST_ENTRY_EDITED: Self = Self(311);
    pub const NO_SUCH_FILE: Self = Self(320);
    pub const NOT_LOGGED_IN: Self = Self(403);
    pub const LOGIN_FAILED: Self = Self(500);
    pub const LOGIN_FIRST: Self = Self(501);
    pub const INVALID_SESSION: Self = Self(506);
    pub const BANNED: Self = Self(555);
    pub const UNKNOWN_COMMAND: Self = Self(598);

    /// Check if the response code indicates success
    pub fn is_success(&self) -> bool {
        matches!(self.0, 200..=299)
    }

    /// Check if the response code indicates an error
    pub fn is_error(&self) -> bool {
        self.0 >= 500
    }

    /// The session is gone and the next request must log in again
    pub fn requires_reauth(&self) -> bool {
        matches!(self.0, 403 | 501 | 506)
    }

    /// Get a human-readable description of the response code
    pub fn description(&self) -> &'static str {
        match self.0 {
            200 => "LOGIN ACCEPTED",
            201 => "LOGIN ACCEPTED - NEW VERSION AVAILABLE",
            203 => "LOGGED OUT",
            210 => "MYLIST ENTRY ADDED",
            220 => "FILE",
            221 => "MYLIST",
            222 => "MYLIST STATS",
            230 => "ANIME",
            240 => "EPISODE",
            270 => "NOTIFICATION",
            271 => "NOTIFICATION ACKNOWLEDGED",
            272 => "NO SUCH NOTIFICATION",
            290 | 291 => "NOTIFYLIST",
            292 => "NOTIFYGET MESSAGE",
            293 => "NOTIFYGET NOTIFY",
            310 => "FILE ALREADY IN MYLIST",
            311 => "MYLIST ENTRY EDITED",
            320 => "NO SUCH FILE",
            321 => "NO SUCH ENTRY",
            330 => "NO SUCH ANIME",
            340 => "NO SUCH EPISODE",
            403 => "NOT LOGGED IN",
            500 => "LOGIN FAILED",
            501 => "LOGIN FIRST",
            502 => "ACCESS DENIED",
            503 => "CLIENT VERSION OUTDATED",
            504 => "CLIENT BANNED",
            505 => "ILLEGAL INPUT OR ACCESS DENIED",
            506 => "INVALID SESSION",
            555 => "BANNED",
            598 => "UNKNOWN COMMAND",
            600 => "INTERNAL SERVER ERROR",
            601 => "ANIDB OUT OF SERVICE",
            602 => "SERVER BUSY",
            604 => "TIMEOUT - DELAY AND RESUBMIT",
            _ => "UNKNOWN RESPONSE CODE",
        }
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.0, self.description())
    }
}
