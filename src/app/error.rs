use serde::Serialize;
use std::fmt;

pub const ERR_LAUNCH: &str = "ERR_LAUNCH";
pub const ERR_BUNDLE_CORRUPT: &str = "ERR_BUNDLE_CORRUPT";
pub const ERR_BUNDLE_EMPTY: &str = "ERR_BUNDLE_EMPTY";
pub const ERR_DEVICE_NOT_FOUND: &str = "ERR_DEVICE_NOT_FOUND";
pub const ERR_BUSY: &str = "ERR_BUSY";
pub const ERR_VALIDATION: &str = "ERR_VALIDATION";
pub const ERR_SYSTEM: &str = "ERR_SYSTEM";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AppError {
    pub error: String,
    pub code: String,
    pub trace_id: String,
}

impl AppError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        trace_id: impl Into<String>,
    ) -> Self {
        Self {
            error: message.into(),
            code: code.into(),
            trace_id: trace_id.into(),
        }
    }

    pub fn launch(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_LAUNCH, message, trace_id)
    }

    pub fn bundle_corrupt(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_BUNDLE_CORRUPT, message, trace_id)
    }

    pub fn bundle_empty(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_BUNDLE_EMPTY, message, trace_id)
    }

    pub fn device_not_found(serial: &str, trace_id: impl Into<String>) -> Self {
        Self::new(
            ERR_DEVICE_NOT_FOUND,
            format!("Unknown device serial: {serial}"),
            trace_id,
        )
    }

    pub fn busy(trace_id: impl Into<String>) -> Self {
        Self::new(
            ERR_BUSY,
            "Another operation is already in flight",
            trace_id,
        )
    }

    pub fn validation(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_VALIDATION, message, trace_id)
    }

    pub fn system(message: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self::new(ERR_SYSTEM, message, trace_id)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.error, self.code)
    }
}

impl std::error::Error for AppError {}
