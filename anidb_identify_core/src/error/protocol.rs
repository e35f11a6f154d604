//! Protocol errors as seen by library callers

use thiserror::Error;

/// Failures reported for AniDB requests
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// The server banned this client; nothing more may be sent
    #[error("Banned by AniDB: {reason}")]
    Banned { reason: String },

    /// AniDB API error with response code
    #[error("AniDB API error: {code} - {message}")]
    ServerError { code: u16, message: String },

    /// Reply bytes could not be interpreted
    #[error("Malformed reply: {message}")]
    MalformedReply { message: String },

    /// Generic protocol error
    #[error("Protocol error: {message}")]
    Other { message: String },
}

impl ProtocolError {
    pub fn server_error(code: u16, message: &str) -> Self {
        Self::ServerError {
            code,
            message: message.to_string(),
        }
    }

    pub fn malformed_reply(message: impl Into<String>) -> Self {
        Self::MalformedReply {
            message: message.into(),
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}
