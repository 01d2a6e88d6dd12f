//! User-facing failure taxonomy

/// Terminal failure surfaced to the embedding UI
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreviewError {
    /// Backend reports the resource is missing
    #[error("file not found: {path}")]
    NotFound { path: String },

    /// Fetch or connection error
    #[error("network failure: {0}")]
    NetworkFailure(String),

    /// Bytes are not valid for the classified category
    #[error("could not decode file: {0}")]
    DecodeFailure(String),

    /// No response within the bounded window
    #[error("request timed out")]
    Timeout,

    /// No renderer matches the file
    #[error("no preview available for {name}")]
    Unsupported { name: String },
}

impl PreviewError {
    /// NetworkFailure and Timeout may succeed on another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, PreviewError::NetworkFailure(_) | PreviewError::Timeout)
    }

    /// Stable machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            PreviewError::NotFound { .. } => "not_found",
            PreviewError::NetworkFailure(_) => "network_failure",
            PreviewError::DecodeFailure(_) => "decode_failure",
            PreviewError::Timeout => "timeout",
            PreviewError::Unsupported { .. } => "unsupported",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(PreviewError::NetworkFailure("reset".into()).is_retryable());
        assert!(PreviewError::Timeout.is_retryable());
        assert!(!PreviewError::NotFound { path: "x".into() }.is_retryable());
        assert!(!PreviewError::DecodeFailure("bad".into()).is_retryable());
        assert!(!PreviewError::Unsupported { name: "x".into() }.is_retryable());
    }

    #[test]
    fn test_messages() {
        let err = PreviewError::NotFound { path: "cases/1/a.pdf".into() };
        assert_eq!(err.to_string(), "file not found: cases/1/a.pdf");
        assert_eq!(err.kind(), "not_found");
    }
}
