use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by the content update core
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    #[error("download interrupted: {0}")]
    Interrupted(String),

    #[error("malformed version descriptor: {0}")]
    MalformedDescriptor(#[from] serde_json::Error),

    #[error("failed to extract {}", .0.display())]
    Extraction(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UpdateError {
    /// Network-side failures that a later attempt may not hit again
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            UpdateError::Network(_) | UpdateError::Status(_) | UpdateError::Interrupted(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(UpdateError::Status(reqwest::StatusCode::BAD_GATEWAY).is_transient());
        assert!(UpdateError::Interrupted("reset".into()).is_transient());
        assert!(!UpdateError::Extraction(PathBuf::from("update.zip")).is_transient());

        let malformed = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!UpdateError::from(malformed).is_transient());
    }

    #[test]
    fn test_extraction_message_names_archive() {
        let err = UpdateError::Extraction(PathBuf::from("/data/update.zip"));
        assert_eq!(err.to_string(), "failed to extract /data/update.zip");
    }
}
