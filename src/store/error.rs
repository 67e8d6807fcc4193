//! Error types for object store operations

use std::io;
use thiserror::Error;

/// Result type alias for object store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur talking to the object store
#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// AWS SDK error
    #[error("AWS SDK error: {0}")]
    Sdk(String),

    /// S3 service error with specific error code
    #[error("S3 service error ({code}): {message}")]
    Service { code: String, message: String },

    /// Object not found in bucket
    #[error("object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Access denied error
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Local file error while streaming to or from the store
    #[error("I/O error: {0}")]
    Io(String),

    /// Network error
    #[error("network error: {0}")]
    Network(String),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::NotFound { .. } => true,
            StoreError::Service { code, .. } => code == "NoSuchKey" || code == "NotFound",
            _ => false,
        }
    }

    /// The write was rejected because a conditional header did not hold
    pub fn is_precondition_failed(&self) -> bool {
        matches!(
            self,
            StoreError::Service { code, .. }
                if code == "PreconditionFailed" || code == "ConditionalRequestConflict"
        )
    }
}

impl From<io::Error> for StoreError {
    fn from(err: io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Convert AWS SDK errors to StoreError
impl<E> From<aws_sdk_s3::error::SdkError<E>> for StoreError
where
    E: aws_sdk_s3::error::ProvideErrorMetadata + std::error::Error + 'static,
{
    fn from(error: aws_sdk_s3::error::SdkError<E>) -> Self {
        use aws_sdk_s3::error::SdkError;

        match error {
            SdkError::DispatchFailure(e) => {
                StoreError::Network(format!("network dispatch failure: {:?}", e))
            }
            SdkError::ResponseError(e) => StoreError::Network(format!("response error: {:?}", e)),
            SdkError::TimeoutError(_) => StoreError::Network("request timed out".to_string()),
            SdkError::ServiceError(e) => {
                let err = e.err();
                let code = err.code().unwrap_or("Unknown").to_string();
                let message = err.message().unwrap_or("no message").to_string();
                if code == "AccessDenied" {
                    StoreError::AccessDenied(message)
                } else {
                    StoreError::Service { code, message }
                }
            }
            other => StoreError::Sdk(format!("{:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_detection() {
        let err = StoreError::Service {
            code: "NoSuchKey".to_string(),
            message: "gone".to_string(),
        };
        assert!(err.is_not_found());
        assert!(StoreError::NotFound {
            bucket: "b".into(),
            key: "k".into()
        }
        .is_not_found());
        assert!(!StoreError::Network("x".into()).is_not_found());
    }

    #[test]
    fn test_precondition_detection() {
        let err = StoreError::Service {
            code: "PreconditionFailed".to_string(),
            message: "At least one of the pre-conditions you specified did not hold".to_string(),
        };
        assert!(err.is_precondition_failed());
        assert!(!StoreError::AccessDenied("x".into()).is_precondition_failed());
    }

    #[test]
    fn test_io_conversion() {
        let err: StoreError = io::Error::new(io::ErrorKind::NotFound, "missing").into();
        assert!(matches!(err, StoreError::Io(_)));
    }
}
