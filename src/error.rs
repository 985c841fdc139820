//! Error types for result persistence.
//!
//! `ResultsError` is the single error type returned by the library. It follows
//! a simple taxonomy:
//!
//! - **`Configuration`** and **`CageOutOfRange`**: precondition violations such as a
//!   subject-ID list whose length does not match the cage count. These surface
//!   synchronously at the call that detects them and are never retried.
//! - **`Io`**, **`Tiff`** and **`EmptyStack`**: failures from the record writer or the
//!   image saver. They are propagated to the caller unchanged.
//! - **`RoiDecode`**: a malformed region-of-interest file. The provenance builder
//!   logs and skips these, so callers of the save operations never see them.
//! - **`Config`**: failure to load the experiment configuration.

use std::path::PathBuf;
use thiserror::Error;

/// Convenience alias for results using the library error type.
pub type ResultsResult<T> = std::result::Result<T, ResultsError>;

/// Every failure the library reports.
#[derive(Error, Debug)]
pub enum ResultsError {
    /// The configuration could not be loaded or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    /// A precondition on configuration or call arguments was violated.
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// A cage index outside `0..cage_count`.
    #[error("Cage {cage} is out of range (cage count {cage_count})")]
    CageOutOfRange {
        /// Requested index
        cage: usize,
        /// Configured number of cages
        cage_count: usize,
    },

    /// Writing a result file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Encoding an image stack failed.
    #[error("TIFF encoding error: {0}")]
    Tiff(#[from] tiff::TiffError),

    /// An image save was asked to write no frames.
    #[error("Cannot write empty frame stack to {0:?}")]
    EmptyStack(PathBuf),

    /// A region-of-interest file could not be decoded.
    #[error("Failed to decode ROI {path:?}: {reason}")]
    RoiDecode {
        /// The `.roi` file
        path: PathBuf,
        /// What was wrong with it
        reason: String,
    },
}

impl ResultsError {
    /// Shorthand for a cardinality mismatch between a per-cage argument and the cage count.
    pub(crate) fn cardinality(what: &str, expected: usize, actual: usize) -> Self {
        ResultsError::Configuration(format!(
            "{what} count doesn't match cage count: expected {expected}, got {actual}"
        ))
    }

    /// Returns true for errors that indicate a caller bug rather than an I/O failure.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ResultsError::Config(_)
                | ResultsError::Configuration(_)
                | ResultsError::CageOutOfRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cardinality_message_names_both_counts() {
        let err = ResultsError::cardinality("subject ID", 4, 3);
        let msg = err.to_string();
        assert!(msg.contains("subject ID"));
        assert!(msg.contains("expected 4"));
        assert!(msg.contains("got 3"));
        assert!(err.is_configuration());
    }

    #[test]
    fn io_errors_are_not_configuration_errors() {
        let err: ResultsError = std::io::Error::from(std::io::ErrorKind::NotFound).into();
        assert!(!err.is_configuration());
        assert!(err.to_string().starts_with("I/O error"));
    }
}
