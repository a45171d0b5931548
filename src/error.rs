//! Error type shared by every catalog operation.
//!
//! Unknown ids are not errors: lookups return `Option` and deletes return
//! `bool`. Duplicate titles found by the bulk importer are reported in its
//! outcome. What remains here is bad input and storage failure.

use thiserror::Error;

/// Errors that can occur while reading or writing the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Input had the wrong shape, such as an empty title.
    #[error("invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    /// SQLite rejected a statement or could not be reached.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Reading or writing a data file failed.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored timestamp is out of range.
    #[error("invalid timestamp: {0}")]
    Timestamp(#[from] time::error::ComponentRange),
}

impl CatalogError {
    /// Creates a validation error for the named input field.
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field,
            message: message.into(),
        }
    }

    /// Returns true when the persistence layer failed rather than the input.
    pub fn is_storage_failure(&self) -> bool {
        !matches!(self, Self::Validation { .. })
    }
}

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, CatalogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_the_field() {
        let err = CatalogError::validation("title", "must not be empty");
        assert_eq!(err.to_string(), "invalid title: must not be empty");
        assert!(!err.is_storage_failure());
    }

    #[test]
    fn io_error_is_a_storage_failure() {
        let err: CatalogError = std::io::Error::other("disk full").into();
        assert!(err.is_storage_failure());
        assert!(err.to_string().contains("disk full"));
    }
}
