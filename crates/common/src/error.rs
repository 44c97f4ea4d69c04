//! Common error types for InferLink
//!
//! Batch-shape problems are reported before anything is sent. Codec,
//! transport and server failures are scoped to a single request and end up
//! in that request's slot of a batch result.

use std::fmt;
use thiserror::Error;

/// Failure converting one tensor between raw bytes and structured text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Datatype the codec cannot convert (FP16, BF16 or an unknown name)
    #[error("unsupported datatype '{0}'")]
    UnsupportedDatatype(String),

    /// Value outside the domain of the target datatype
    #[error("value {value} is out of range for datatype {datatype}")]
    ValueOutOfRange { datatype: String, value: String },

    /// Buffer length does not match the element count
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// Element count or byte size too large to address
    #[error("size overflow: {0}")]
    SizeOverflow(String),

    /// Structured-text value of the wrong kind for the datatype
    #[error("malformed {datatype} value: {reason}")]
    MalformedValue { datatype: String, reason: String },

    /// BYTES element that cannot be carried as text
    #[error("BYTES element {index} is not valid UTF-8")]
    InvalidUtf8 { index: usize },
}

impl CodecError {
    /// Create an unsupported datatype error
    pub fn unsupported(datatype: impl Into<String>) -> Self {
        CodecError::UnsupportedDatatype(datatype.into())
    }

    /// Create an out-of-range error
    pub fn out_of_range(datatype: impl Into<String>, value: impl fmt::Display) -> Self {
        CodecError::ValueOutOfRange {
            datatype: datatype.into(),
            value: value.to_string(),
        }
    }

    /// Create a size overflow error
    pub fn overflow(what: impl Into<String>) -> Self {
        CodecError::SizeOverflow(what.into())
    }

    /// Create a malformed value error
    pub fn malformed(datatype: impl Into<String>, reason: impl Into<String>) -> Self {
        CodecError::MalformedValue {
            datatype: datatype.into(),
            reason: reason.into(),
        }
    }
}

/// A codec failure attributed to a named tensor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TensorFailure {
    pub tensor: String,
    pub error: CodecError,
}

impl fmt::Display for TensorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tensor '{}': {}", self.tensor, self.error)
    }
}

/// Main error type for InferLink
#[derive(Error, Debug)]
pub enum ClientError {
    /// Options count is neither 1 nor the number of requests
    #[error("mismatched options count: expected 1 or {requests}, got {options}")]
    MismatchedOptionsCount { options: usize, requests: usize },

    /// Outputs count is neither 0, 1 nor the number of requests
    #[error("mismatched outputs count: expected 0, 1 or {requests}, got {outputs}")]
    MismatchedOutputsCount { outputs: usize, requests: usize },

    /// Single codec failure outside of a request
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Every tensor that failed conversion while building or reading one request
    #[error("tensor conversion failed: {}", join_failures(.0))]
    TensorConversion(Vec<TensorFailure>),

    /// Opaque failure from the transport collaborator
    #[error("transport error: {0}")]
    Transport(String),

    /// Request rejected by the serving system
    #[error("server error: {0}")]
    Server(String),

    /// Invalid input
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error
    #[error("internal error: {0}")]
    Internal(String),
}

fn join_failures(failures: &[TensorFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ClientError {
    /// True for batch-shape errors detected before dispatch
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ClientError::MismatchedOptionsCount { .. } | ClientError::MismatchedOutputsCount { .. }
        )
    }

    /// True for failures raised by the transport collaborator
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }

    /// Codec failures carried by this error, if any
    pub fn codec_failures(&self) -> Vec<&CodecError> {
        match self {
            ClientError::Codec(err) => vec![err],
            ClientError::TensorConversion(failures) => failures.iter().map(|f| &f.error).collect(),
            _ => Vec::new(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ClientError::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        ClientError::InvalidInput(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        ClientError::Transport(msg.into())
    }

    /// Create a server error
    pub fn server(msg: impl Into<String>) -> Self {
        ClientError::Server(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ClientError::Internal(msg.into())
    }
}

/// Result type alias for InferLink operations
pub type Result<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let err = ClientError::MismatchedOptionsCount { options: 2, requests: 3 };
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "mismatched options count: expected 1 or 3, got 2"
        );

        assert!(!ClientError::transport("connection reset").is_validation());
        assert!(ClientError::transport("connection reset").is_transport());
    }

    #[test]
    fn test_tensor_conversion_lists_every_failure() {
        let err = ClientError::TensorConversion(vec![
            TensorFailure {
                tensor: "INPUT0".to_string(),
                error: CodecError::unsupported("FP16"),
            },
            TensorFailure {
                tensor: "INPUT1".to_string(),
                error: CodecError::SizeMismatch { expected: 64, actual: 60 },
            },
        ]);

        let message = err.to_string();
        assert!(message.contains("tensor 'INPUT0': unsupported datatype 'FP16'"));
        assert!(message.contains("tensor 'INPUT1': size mismatch: expected 64 bytes, got 60"));
        assert_eq!(err.codec_failures().len(), 2);
    }
}
