//! Internal library error types

use thiserror::Error;

/// Failures inside the library that are not caused by the caller's input
#[derive(Error, Debug)]
pub enum InternalError {
    /// Storage layer failure
    #[error("Database error: {message}")]
    Database { message: String },

    /// A hashing worker could not be started or went away
    #[error("Hasher worker {worker} failed: {message}")]
    Worker { worker: usize, message: String },

    /// The transport loop is gone and cannot accept requests
    #[error("Client loop is not running")]
    ClientStopped,

    /// Internal assertion failure
    #[error("Internal assertion failed: {message}")]
    Assertion { message: String },
}

impl InternalError {
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn worker(worker: usize, message: impl Into<String>) -> Self {
        Self::Worker {
            worker,
            message: message.into(),
        }
    }

    pub fn assertion(message: impl Into<String>) -> Self {
        Self::Assertion {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_error_names_worker() {
        let error = InternalError::worker(3, "spawn failed");
        assert_eq!(error.to_string(), "Hasher worker 3 failed: spawn failed");
    }

    #[test]
    fn test_database_error() {
        let error = InternalError::database("no such table: packets");
        assert!(error.to_string().starts_with("Database error"));
    }
}
