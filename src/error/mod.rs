use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Human-readable detail.
        message: String,
    },

    /// Rejected input. Raised before any session row is written.
    #[error("Validation failed: {field} - {reason}")]
    Validation {
        /// Name of the rejected input.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Persistence failure.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Upstream model failure.
    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    /// Protocol-level failure.
    #[error("MCP protocol error: {0}")]
    Mcp(#[from] McpError),

    /// Unexpected internal failure.
    #[error("Internal error: {message}")]
    Internal {
        /// Human-readable detail.
        message: String,
    },
}

impl AppError {
    /// Build a validation error for `field`.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error rejected the caller's input.
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation { .. })
    }
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Could not open the database.
    #[error("Database connection failed: {message}")]
    Connection {
        /// Human-readable detail.
        message: String,
    },

    /// A statement failed or touched no rows.
    #[error("Query failed: {message}")]
    Query {
        /// Human-readable detail.
        message: String,
    },

    /// No session with this id.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The missing session id.
        session_id: String,
    },

    /// Embedded migrations failed.
    #[error("Migration failed: {message}")]
    Migration {
        /// Human-readable detail.
        message: String,
    },

    /// Raw driver error.
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// LLM invocation errors (upstream failures during a pipeline stage)
#[derive(Debug, Error)]
pub enum LlmError {
    /// All attempts failed.
    #[error("LLM unavailable: {message} (retries: {retries})")]
    Unavailable {
        /// Human-readable detail.
        message: String,
        /// Retries attempted before giving up.
        retries: u32,
    },

    /// Non-success HTTP status.
    #[error("API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Human-readable detail.
        message: String,
    },

    /// Body missing or malformed.
    #[error("Invalid response: {message}")]
    InvalidResponse {
        /// Human-readable detail.
        message: String,
    },

    /// No response within the timeout.
    #[error("Request timeout after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// MCP protocol errors
#[derive(Debug, Error)]
pub enum McpError {
    /// No tool with this name.
    #[error("Unknown tool: {tool_name}")]
    UnknownTool {
        /// Requested tool name.
        tool_name: String,
    },

    /// Arguments did not match the tool schema.
    #[error("Invalid parameters for {tool_name}: {message}")]
    InvalidParameters {
        /// Requested tool name.
        tool_name: String,
        /// Human-readable detail.
        message: String,
    },

    /// The tool ran and failed.
    #[error("Tool execution failed: {message}")]
    ExecutionFailed {
        /// Human-readable detail.
        message: String,
    },

    /// Serialization failure.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Document text extraction errors.
///
/// Never returned to callers of ingestion; the message is stored on the
/// document record instead.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The PDF parser rejected the file.
    #[error("PDF extraction failed: {message}")]
    Pdf {
        /// Human-readable detail.
        message: String,
    },
}

impl From<AppError> for McpError {
    fn from(err: AppError) -> Self {
        McpError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for LLM operations
pub type LlmResult<T> = Result<T, LlmError>;

/// Result type alias for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::validation("query", "cannot be empty");
        assert_eq!(err.to_string(), "Validation failed: query - cannot be empty");
        assert!(err.is_validation());
    }

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::SessionNotFound {
            session_id: "sess-123".to_string(),
        };
        assert_eq!(err.to_string(), "Session not found: sess-123");

        let err = StorageError::Migration {
            message: "version mismatch".to_string(),
        };
        assert_eq!(err.to_string(), "Migration failed: version mismatch");
    }

    #[test]
    fn test_llm_error_display() {
        let err = LlmError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "LLM unavailable: server down (retries: 3)");

        let err = LlmError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = LlmError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_extraction_error_display() {
        let err = ExtractionError::Pdf {
            message: "no xref table".to_string(),
        };
        assert_eq!(err.to_string(), "PDF extraction failed: no xref table");
    }

    #[test]
    fn test_conversions() {
        let app_err: AppError = LlmError::Timeout { timeout_ms: 1000 }.into();
        assert!(matches!(app_err, AppError::Llm(_)));
        assert!(!app_err.is_validation());

        let app_err: AppError = StorageError::SessionNotFound {
            session_id: "x".to_string(),
        }
        .into();
        assert!(matches!(app_err, AppError::Storage(_)));

        let mcp_err: McpError = AppError::validation("query", "too short").into();
        assert!(matches!(mcp_err, McpError::ExecutionFailed { .. }));
        assert!(mcp_err.to_string().contains("too short"));
    }
}
