use std::path::{Path, PathBuf};

use crate::annotation::AnnotationError;

/// Dataset tooling error enum.
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    /// Invalid configuration, raised before any file is touched.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Filesystem error on a specific path.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// Path being read, written, listed or removed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Malformed annotation line.
    #[error(transparent)]
    Annotation(#[from] AnnotationError),
}

impl DatasetError {
    /// Creates a configuration error.
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// The file an I/O error happened on.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Io { path, .. } => Some(path),
            _ => None,
        }
    }

    /// Wraps an I/O error with the path it happened on.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A per-file failure collected while processing a batch.
#[derive(Debug)]
pub struct FileFailure {
    /// The file whose processing failed.
    pub path: PathBuf,
    /// What went wrong.
    pub error: DatasetError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_names_path() {
        let err = DatasetError::io(
            Path::new("data/a.txt"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("data/a.txt"));
        assert!(msg.contains("denied"));
        assert_eq!(err.path(), Some(Path::new("data/a.txt")));
        assert_eq!(DatasetError::configuration("x").path(), None);
    }

    #[test]
    fn test_configuration_error() {
        let err = DatasetError::configuration("keep_ids must not be empty");
        assert!(matches!(err, DatasetError::Configuration(_)));
        assert!(err.to_string().contains("keep_ids"));
    }
}
