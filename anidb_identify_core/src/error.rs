//! Error types for the identification pipeline
//!
//! Errors are grouped by where they originate. Wire-level failures from
//! [`crate::protocol::error`] fold into [`ProtocolError`] here.

use thiserror::Error;

pub mod internal;
pub mod io;
pub mod protocol;
pub mod validation;

pub use self::io::{IoError, IoErrorKind};
pub use self::protocol::ProtocolError;
pub use self::validation::ValidationError;
pub use internal::InternalError;

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the library
///
/// - I/O errors: file system access while hashing or opening the database
/// - Protocol errors: AniDB wire failures, bans, and malformed replies
/// - Validation errors: bad input or configuration
/// - Internal errors: storage and worker failures
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors
    #[error(transparent)]
    Io(#[from] IoError),

    /// Protocol related errors
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Validation related errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Internal library errors
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl From<std::io::Error> for Error {
    fn from(source: std::io::Error) -> Self {
        Self::Io(IoError::from_std(source))
    }
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(InternalError::database(err.to_string()))
    }
}

impl From<crate::protocol::error::ProtocolError> for Error {
    fn from(err: crate::protocol::error::ProtocolError) -> Self {
        use crate::protocol::error::ProtocolError as WireError;

        match err {
            WireError::Io(io_err) => Self::Io(IoError::from_std(io_err)),
            WireError::Banned { reason } => Self::Protocol(ProtocolError::Banned { reason }),
            WireError::ServerError { code, message } => {
                Self::Protocol(ProtocolError::server_error(code, &message))
            }
            WireError::MaskMismatch { expected, actual } => Self::Protocol(
                ProtocolError::malformed_reply(format!(
                    "mask expects {expected} fields but reply carries {actual}"
                )),
            ),
            other => Self::Protocol(ProtocolError::other(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;
    use std::io;
    use std::path::Path;

    #[test]
    fn test_file_not_found_error_creation() {
        let path = Path::new("/anime/missing.mkv");
        let error = Error::Io(IoError::file_not_found(path));

        match error {
            Error::Io(io_err) => {
                assert_eq!(io_err.kind, IoErrorKind::FileNotFound);
                assert_eq!(io_err.path, Some(path.to_path_buf()));
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error: Error = io_error.into();

        assert!(matches!(
            error,
            Error::Io(IoError {
                kind: IoErrorKind::FileNotFound,
                ..
            })
        ));
    }

    #[test]
    fn test_wire_ban_maps_to_protocol_ban() {
        let wire = crate::protocol::error::ProtocolError::banned("Excessive requests");
        let error: Error = wire.into();

        assert!(matches!(
            error,
            Error::Protocol(ProtocolError::Banned { ref reason }) if reason == "Excessive requests"
        ));
    }

    #[test]
    fn test_wire_mask_mismatch_is_malformed_reply() {
        let wire = crate::protocol::error::ProtocolError::mask_mismatch(12, 9);
        let error: Error = wire.into();

        assert!(error.to_string().contains("12"));
        assert!(error.to_string().contains("9"));
    }

    #[test]
    fn test_error_source_chain() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "Access denied");
        let error = Error::Io(IoError::permission_denied(Path::new("/x.mkv"), io_error));

        assert!(error.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }

    #[test]
    fn test_server_errors_include_response_codes() {
        for code in [500, 501, 506, 555, 598, 600, 602] {
            let error = Error::Protocol(ProtocolError::server_error(code, "Test response"));
            assert!(error.to_string().contains(&code.to_string()));
        }
    }
}
