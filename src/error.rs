//! Unified error taxonomy for the session runtime.

use std::fmt;

/// Stable error code from the taxonomy table, used for wire/audit serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidParams,
    NotFound,
    Forbidden,
    Conflict,
    FilesystemError,
    ParseFailed,
    ValidationFailed,
    Busy,
    Timeout,
    SubscriptionError,
    TransientIo,
    RendererTransient,
    InternalError,
}

impl ErrorCode {
    /// True for codes the reliability layer is allowed to retry automatically.
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorCode::TransientIo | ErrorCode::RendererTransient)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::InvalidParams => "invalid_params",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::Conflict => "conflict",
            ErrorCode::FilesystemError => "filesystem_error",
            ErrorCode::ParseFailed => "parse_failed",
            ErrorCode::ValidationFailed => "validation_failed",
            ErrorCode::Busy => "busy",
            ErrorCode::Timeout => "timeout",
            ErrorCode::SubscriptionError => "subscription_error",
            ErrorCode::TransientIo => "transient_io",
            ErrorCode::RendererTransient => "renderer_transient",
            ErrorCode::InternalError => "internal_error",
        }
    }
}

/// Top-level error type returned by every fallible crate operation.
///
/// Every error carries `{code, message, details}` per the taxonomy; `details`
/// is a bounded JSON bag used for remediation lists, per-field validation
/// paths, and retry hints without growing the enum's variant surface.
#[derive(Debug, Clone)]
pub struct FolioError {
    pub code: ErrorCode,
    pub message: String,
    pub details: serde_json::Value,
}

impl FolioError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidParams, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// Build a `conflict` error carrying the remediation list the spec requires.
    pub fn conflict(message: impl Into<String>, remediation: &[&str]) -> Self {
        Self::new(ErrorCode::Conflict, message).with_details(serde_json::json!({
            "remediation": remediation,
        }))
    }

    pub fn filesystem_error(reason: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::FilesystemError, message)
            .with_details(serde_json::json!({ "reason": reason }))
    }

    /// Build a `parse_failed` error carrying the offending line number.
    pub fn parse_failed(line: usize, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ParseFailed, message)
            .with_details(serde_json::json!({ "line": line }))
    }

    /// Build a `validation_failed` error carrying per-field paths.
    pub fn validation_failed(errors: Vec<FieldError>) -> Self {
        Self::new(ErrorCode::ValidationFailed, "schema validation failed")
            .with_details(serde_json::json!({ "errors": errors }))
    }

    pub fn busy(retry_after_ms: u64, degraded_mode: bool) -> Self {
        Self::new(ErrorCode::Busy, "renderer circuit is open").with_details(serde_json::json!({
            "retry_after_ms": retry_after_ms,
            "degraded_mode": degraded_mode,
        }))
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Timeout, message)
    }

    pub fn subscription_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SubscriptionError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl fmt::Display for FolioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for FolioError {}

/// One field-level validation failure (§6 Schema adapter contract).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl From<std::io::Error> for FolioError {
    fn from(e: std::io::Error) -> Self {
        FolioError::filesystem_error("io", e.to_string())
    }
}

impl From<reqwest::Error> for FolioError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            FolioError::new(ErrorCode::RendererTransient, e.to_string())
        } else {
            FolioError::new(ErrorCode::InternalError, format!("renderer http error: {e}"))
        }
    }
}

pub type Result<T> = std::result::Result<T, FolioError>;
