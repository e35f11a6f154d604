//! Validation errors for caller-supplied input

use thiserror::Error;

/// Input or configuration rejected before any work starts
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A mask string that is not hexadecimal or is too wide
    #[error("Invalid mask '{mask}': expected at most {width} hex bytes")]
    InvalidMask { mask: String, width: usize },
}

impl ValidationError {
    pub fn invalid_configuration(message: &str) -> Self {
        Self::InvalidConfiguration {
            message: message.to_string(),
        }
    }

    pub fn invalid_mask(mask: &str, width: usize) -> Self {
        Self::InvalidMask {
            mask: mask.to_string(),
            width,
        }
    }
}
