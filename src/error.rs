use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while tailing a log file.
#[derive(Debug, Error)]
pub enum TailError {
    #[error("log file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("log file shrank from {previous} to {current} bytes (rotated or truncated)")]
    Truncated { previous: u64, current: u64 },

    #[error("no supported encoding could decode {}", .0.display())]
    Decode(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TailError {
    pub(crate) fn from_io(path: &std::path::Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::NotFound {
            TailError::NotFound(path.to_path_buf())
        } else {
            TailError::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    /// Rotation is recoverable with a full reload.
    pub fn is_rotation(&self) -> bool {
        matches!(self, TailError::Truncated { .. })
    }
}

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("collapse threshold must be at least 1, got {0}")]
    InvalidThreshold(usize),

    #[error("truncate threshold must be at least 1")]
    InvalidTruncateThreshold,

    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Errors raised while persisting group-name overrides.
#[derive(Debug, Error)]
pub enum OverrideStoreError {
    #[error("failed to encode group names: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to write group names: {0}")]
    Write(#[from] io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_io_error_maps_to_not_found() {
        let err = TailError::from_io(
            std::path::Path::new("/nope.log"),
            io::Error::new(io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, TailError::NotFound(_)));
        assert!(!err.is_rotation());
    }

    #[test]
    fn test_truncated_is_rotation() {
        let err = TailError::Truncated {
            previous: 10,
            current: 2,
        };
        assert!(err.is_rotation());
        assert!(err.to_string().contains("10"));
    }
}
