//! Error types for the RPC crate.

use std::fmt;

/// Errors from RPC client and adapter operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcError {
    /// Could not connect to the endpoint.
    Connect { endpoint: String, reason: String },
    /// The call ended with a non-OK status.
    Status { code: String, message: String },
}

impl RpcError {
    /// Builds an error from a gRPC status.
    #[must_use]
    pub fn from_status(status: &tonic::Status) -> Self {
        Self::Status {
            code: format!("{:?}", status.code()),
            message: status.message().to_string(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { endpoint, reason } => {
                write!(f, "failed to connect to '{endpoint}': {reason}")
            }
            Self::Status { code, message } => write!(f, "rpc failed ({code}): {message}"),
        }
    }
}

impl std::error::Error for RpcError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_conversion() {
        let err = RpcError::from_status(&tonic::Status::invalid_argument("bad role"));
        assert_eq!(err.to_string(), "rpc failed (InvalidArgument): bad role");
    }
}
