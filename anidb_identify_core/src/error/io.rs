//! Local I/O errors raised while hashing files or opening storage

use std::path::{Path, PathBuf};
use thiserror::Error;

/// I/O failure with the path it happened on, when known
#[derive(Error, Debug)]
#[error("{}", describe(self))]
pub struct IoError {
    pub kind: IoErrorKind,
    pub path: Option<PathBuf>,
    #[source]
    pub source: Option<std::io::Error>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoErrorKind {
    FileNotFound,
    PermissionDenied,
    Other,
}

impl IoError {
    pub fn file_not_found(path: &Path) -> Self {
        Self {
            kind: IoErrorKind::FileNotFound,
            path: Some(path.to_path_buf()),
            source: None,
        }
    }

    pub fn permission_denied(path: &Path, source: std::io::Error) -> Self {
        Self {
            kind: IoErrorKind::PermissionDenied,
            path: Some(path.to_path_buf()),
            source: Some(source),
        }
    }

    /// Classify a standard I/O error
    pub fn from_std(source: std::io::Error) -> Self {
        let kind = match source.kind() {
            std::io::ErrorKind::NotFound => IoErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => IoErrorKind::PermissionDenied,
            _ => IoErrorKind::Other,
        };

        Self {
            kind,
            path: None,
            source: Some(source),
        }
    }

    /// Attach the path the failing operation was working on
    pub fn at(mut self, path: &Path) -> Self {
        self.path = Some(path.to_path_buf());
        self
    }
}

fn describe(error: &IoError) -> String {
    let subject = match &error.path {
        Some(path) => format!(" ({})", path.display()),
        None => String::new(),
    };

    match error.kind {
        IoErrorKind::FileNotFound => format!("File does not exist{subject}"),
        IoErrorKind::PermissionDenied => format!("Permission denied{subject}"),
        IoErrorKind::Other => match &error.source {
            Some(source) => format!("I/O error{subject}: {source}"),
            None => format!("I/O error{subject}"),
        },
    }
}
