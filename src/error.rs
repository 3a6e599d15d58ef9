// Error handling module
// Defines the failure taxonomy of a benchmark run

use thiserror::Error;

/// Errors that can occur while configuring or running a benchmark
#[derive(Error, Debug)]
pub enum BenchError {
    /// A required input is missing or invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// KMS answered with a non-success status
    #[error("KMS error: {status} - {message}")]
    Kms { status: u16, message: String },

    /// Transport failure talking to the KMS
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Key material or sealing failure
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// An iteration failed and the run was aborted
    #[error("Operation failed on iteration {iteration}: {source}")]
    Operation {
        iteration: usize,
        #[source]
        source: Box<BenchError>,
    },

    /// Console output failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl BenchError {
    /// Wrap a provider failure with the iteration it happened on
    pub fn operation(iteration: usize, source: BenchError) -> Self {
        BenchError::Operation {
            iteration,
            source: Box::new(source),
        }
    }

    /// Build a configuration error for a required variable that is not set
    pub fn missing(name: &str) -> Self {
        BenchError::Config(format!("required environment variable not set: {}", name))
    }
}

/// Result type alias for benchmark operations
pub type Result<T> = std::result::Result<T, BenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = BenchError::Config("requests must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: requests must be positive"
        );

        let err = BenchError::Kms {
            status: 400,
            message: "InvalidCiphertextException".to_string(),
        };
        assert_eq!(err.to_string(), "KMS error: 400 - InvalidCiphertextException");
    }

    #[test]
    fn test_missing_variable_message() {
        let err = BenchError::missing("AWS_KEY_ID");
        assert_eq!(
            err.to_string(),
            "Configuration error: required environment variable not set: AWS_KEY_ID"
        );
    }

    #[test]
    fn test_operation_error_keeps_iteration_and_source() {
        let err = BenchError::operation(
            500,
            BenchError::Kms {
                status: 500,
                message: "Simulated failure".to_string(),
            },
        );
        assert_eq!(
            err.to_string(),
            "Operation failed on iteration 500: KMS error: 500 - Simulated failure"
        );

        match err {
            BenchError::Operation { iteration, source } => {
                assert_eq!(iteration, 500);
                assert!(matches!(*source, BenchError::Kms { status: 500, .. }));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_internal_error_message() {
        let err = BenchError::Internal(anyhow::anyhow!("Something went wrong"));
        assert_eq!(err.to_string(), "Internal error: Something went wrong");
    }
}
