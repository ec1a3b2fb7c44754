//! Error types for the hut CLI.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=remote, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for hut operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Remote (exit 2)
    GraphQlError,
    HttpError,
    UnexpectedStatus,
    InvalidContentRange,

    // Not Found (exit 3)
    InstanceNotFound,
    ResourceNotFound,

    // Validation (exit 4)
    InvalidArgument,
    InvalidMarker,
    MarkerExists,

    // Subprocess (exit 5)
    CommandFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Cancelled (exit 130)
    Cancelled,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::GraphQlError => "GRAPHQL_ERROR",
            Self::HttpError => "HTTP_ERROR",
            Self::UnexpectedStatus => "UNEXPECTED_STATUS",
            Self::InvalidContentRange => "INVALID_CONTENT_RANGE",
            Self::InstanceNotFound => "INSTANCE_NOT_FOUND",
            Self::ResourceNotFound => "RESOURCE_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidMarker => "INVALID_MARKER",
            Self::MarkerExists => "MARKER_EXISTS",
            Self::CommandFailed => "COMMAND_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::Cancelled => "CANCELLED",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::GraphQlError
            | Self::HttpError
            | Self::UnexpectedStatus
            | Self::InvalidContentRange => 2,
            Self::InstanceNotFound | Self::ResourceNotFound => 3,
            Self::InvalidArgument | Self::InvalidMarker | Self::MarkerExists => 4,
            Self::CommandFailed => 5,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
            Self::Cancelled => 130,
        }
    }

    /// Whether re-running the same command may succeed.
    ///
    /// True for transport-level failures. Exports are resumable, so a
    /// second run only repeats the work that did not complete.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HttpError | Self::UnexpectedStatus | Self::Cancelled | Self::CommandFailed
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in hut operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("GraphQL error: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected HTTP status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Invalid Content-Range header: {0:?}")]
    InvalidContentRange(String),

    #[error("Instance not found: {name}")]
    InstanceNotFound { name: String },

    #[error("Resource not found: {name}")]
    ResourceNotFound { name: String },

    #[error("Invalid marker {}: {message}", path.display())]
    InvalidMarker { path: PathBuf, message: String },

    #[error("Marker already exists: {}", path.display())]
    MarkerExists { path: PathBuf },

    #[error("`{program}` exited with {status}: {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::GraphQl { .. } => ErrorCode::GraphQlError,
            Self::Http(_) => ErrorCode::HttpError,
            Self::UnexpectedStatus { .. } => ErrorCode::UnexpectedStatus,
            Self::InvalidContentRange(_) => ErrorCode::InvalidContentRange,
            Self::InstanceNotFound { .. } => ErrorCode::InstanceNotFound,
            Self::ResourceNotFound { .. } => ErrorCode::ResourceNotFound,
            Self::InvalidMarker { .. } => ErrorCode::InvalidMarker,
            Self::MarkerExists { .. } => ErrorCode::MarkerExists,
            Self::Command { .. } => ErrorCode::CommandFailed,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::InstanceNotFound { name } => Some(format!(
                "No instance named '{name}' in the config file. \
                 Check `instances` in config.json or drop --instance."
            )),
            Self::Config(_) => Some(
                "Set HUT_TOKEN, or create config.json with an `instances` entry \
                 holding an `access_token`."
                    .to_string(),
            ),
            Self::Command { program, .. } => Some(format!(
                "Make sure `{program}` is installed and your SSH key is registered \
                 with the instance."
            )),
            Self::Cancelled | Self::Http(_) | Self::UnexpectedStatus { .. } => Some(
                "Re-run the same command: finished resources are skipped.".to_string(),
            ),
            Self::InvalidMarker { path, .. } => Some(format!(
                "Remove or fix {} and re-run the import.",
                path.display()
            )),
            Self::GraphQl { .. }
            | Self::InvalidContentRange(_)
            | Self::ResourceNotFound { .. }
            | Self::MarkerExists { .. }
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
