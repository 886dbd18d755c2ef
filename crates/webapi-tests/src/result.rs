//! Result and error types for the WebAPI suite.

use thiserror::Error;

/// Result type for suite operations
pub type WebApiResult<T> = Result<T, WebApiError>;

/// Errors that can occur while driving a device Web API
#[derive(Debug, Error)]
pub enum WebApiError {
    /// A probe never became true within the wait budget
    #[error("Timed out after {ms}ms waiting for {waited_for}")]
    WaitTimeout {
        /// Description of what was waited for
        waited_for: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// The injected script explicitly signalled failure
    #[error("{operation} failed: error received")]
    RemoteOperation {
        /// Name of the remote operation
        operation: String,
    },

    /// Neither outcome flag was set before the wait expired
    #[error("{operation} failed: no response after {ms}ms")]
    NoResponse {
        /// Name of the remote operation
        operation: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Host-side postcondition violated
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// JavaScript error reported by the remote session
    #[error("Script error ({kind}): {message}")]
    Script {
        /// Error kind reported by the remote end
        kind: String,
        /// Error message
        message: String,
    },

    /// Connection or protocol failure talking to the remote session
    #[error("Session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// Illegal test environment transition
    #[error("Environment error: {message}")]
    Environment {
        /// Error message
        message: String,
    },

    /// The coordination server worker did not exit in time
    #[error("Coordination server did not shut down within {ms}ms")]
    ShutdownTimeout {
        /// Join deadline in milliseconds
        ms: u64,
    },

    /// A human prompt could not be answered
    #[error("Prompt failed: {message}")]
    Prompt {
        /// Error message
        message: String,
    },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl WebApiError {
    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create an environment error
    #[must_use]
    pub fn environment(message: impl Into<String>) -> Self {
        Self::Environment {
            message: message.into(),
        }
    }

    /// Create a prompt error
    #[must_use]
    pub fn prompt(message: impl Into<String>) -> Self {
        Self::Prompt {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// True for a wait that ran out of budget
    #[must_use]
    pub const fn is_wait_timeout(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_operation_names_operation_and_error() {
        let err = WebApiError::RemoteOperation {
            operation: "mozBluetooth.getDefaultAdapter".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("mozBluetooth.getDefaultAdapter"));
        assert!(msg.contains("error received"));
    }

    #[test]
    fn test_no_response_names_operation_and_timeout() {
        let err = WebApiError::NoResponse {
            operation: "BluetoothAdapter.setDiscoverableTimeout".to_string(),
            ms: 30_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("BluetoothAdapter.setDiscoverableTimeout"));
        assert!(msg.contains("no response"));
        assert!(!msg.contains("error received"));
    }

    #[test]
    fn test_wait_timeout_detection() {
        let err = WebApiError::WaitTimeout {
            waited_for: "flag".to_string(),
            ms: 10,
        };
        assert!(err.is_wait_timeout());
        assert!(!WebApiError::assertion("x").is_wait_timeout());
    }

    #[test]
    fn test_helper_constructors() {
        assert!(WebApiError::assertion("adapter is null")
            .to_string()
            .contains("adapter is null"));
        assert!(WebApiError::session("closed")
            .to_string()
            .starts_with("Session error"));
        assert!(WebApiError::environment("stopped")
            .to_string()
            .starts_with("Environment error"));
        assert!(WebApiError::config("bad")
            .to_string()
            .starts_with("Configuration error"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: WebApiError = io.into();
        assert!(matches!(err, WebApiError::Io(_)));
    }
}
