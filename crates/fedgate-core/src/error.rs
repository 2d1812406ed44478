//! Shared error type across fedgate crates.
//!
//! Admission denials are not errors; they are carried as decisions by the
//! gateway. This type covers malformed input, configuration defects and
//! internal faults only.

use thiserror::Error;

/// Client-facing error codes (stable API).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientCode {
    /// Invalid request envelope (not the query itself).
    BadRequest,
    /// Query text could not be parsed or lowered.
    QueryInvalid,
    /// Configuration rejected at load time.
    Config,
    /// Unsupported config/manifest version.
    UnsupportedVersion,
    /// Internal server error.
    Internal,
}

impl ClientCode {
    /// String representation used in JSON responses.
    pub fn as_str(self) -> &'static str {
        match self {
            ClientCode::BadRequest => "BAD_REQUEST",
            ClientCode::QueryInvalid => "QUERY_INVALID",
            ClientCode::Config => "CONFIG",
            ClientCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ClientCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, FedgateError>;

/// Unified error type used by core and gateway.
#[derive(Debug, Error)]
pub enum FedgateError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("query invalid: {0}")]
    QueryInvalid(String),
    #[error("config: {0}")]
    Config(String),
    #[error("unsupported version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl FedgateError {
    /// Map internal error to a stable client-facing code.
    pub fn client_code(&self) -> ClientCode {
        match self {
            FedgateError::BadRequest(_) => ClientCode::BadRequest,
            FedgateError::QueryInvalid(_) => ClientCode::QueryInvalid,
            FedgateError::Config(_) => ClientCode::Config,
            FedgateError::UnsupportedVersion => ClientCode::UnsupportedVersion,
            FedgateError::Internal(_) => ClientCode::Internal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_invalid_is_distinct_from_bad_request() {
        let e = FedgateError::QueryInvalid("unexpected token".into());
        assert_eq!(e.client_code().as_str(), "QUERY_INVALID");
        assert!(e.to_string().contains("unexpected token"));
        assert_ne!(e.client_code(), FedgateError::BadRequest(String::new()).client_code());
    }
}
