// Scrub Preview Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("Frame extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Sprite {partition} build failed: {reason}")]
    BuildFailed { partition: u32, reason: String },

    #[error("Build already in progress for {0}")]
    Busy(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("FFprobe error: {0}")]
    FFprobe(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PreviewError {
    pub fn build_failed(partition: u32, reason: impl Into<String>) -> Self {
        PreviewError::BuildFailed {
            partition,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PreviewError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_failed_names_partition() {
        let err = PreviewError::build_failed(3, "missing frame thumb-000077.jpg");
        assert_eq!(
            err.to_string(),
            "Sprite 3 build failed: missing frame thumb-000077.jpg"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: PreviewError = io.into();
        assert!(matches!(err, PreviewError::Io(_)));
    }
}
