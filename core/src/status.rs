//! Classification of numeric HTTP status codes.
//!
//! Codes 100–399 are successes. Everything else is a `StatusCodeError` that
//! keeps the original code and can be asked for a coarse category and, for
//! the handful of codes callers branch on, a named reason.

use std::fmt;

use thiserror::Error;

/// Result of classifying a status code: the code itself on success.
pub type StatusOutcome = Result<u16, StatusCodeError>;

/// Classify a status code.
pub fn classify(code: u16) -> StatusOutcome {
    if (100..400).contains(&code) {
        Ok(code)
    } else {
        Err(StatusCodeError { code })
    }
}

/// A status code that classified as failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
#[error("HTTP {code} ({})", self.describe())]
pub struct StatusCodeError {
    pub code: u16,
}

/// Coarse grouping of a failing status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// 4xx
    Client,
    /// 5xx
    Server,
    /// Anything else that is not a success (0xx, 6xx and beyond).
    Other,
}

/// Named reasons for the failure codes callers react to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusReason {
    BadRequest,
    Unauthorized,
    Forbidden,
    NotFound,
}

impl StatusCodeError {
    pub fn category(&self) -> StatusCategory {
        match self.code / 100 {
            4 => StatusCategory::Client,
            5 => StatusCategory::Server,
            _ => StatusCategory::Other,
        }
    }

    pub fn reason(&self) -> Option<StatusReason> {
        match self.code {
            400 => Some(StatusReason::BadRequest),
            401 => Some(StatusReason::Unauthorized),
            403 => Some(StatusReason::Forbidden),
            404 => Some(StatusReason::NotFound),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.reason() == Some(StatusReason::Unauthorized)
    }

    /// The named reason if there is one, otherwise the category.
    fn describe(&self) -> &'static str {
        if let Some(reason) = self.reason() {
            return reason.as_str();
        }
        match self.category() {
            StatusCategory::Client => "client error",
            StatusCategory::Server => "server error",
            StatusCategory::Other => "unexpected status",
        }
    }
}

impl StatusReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusReason::BadRequest => "bad request",
            StatusReason::Unauthorized => "unauthorized",
            StatusReason::Forbidden => "forbidden",
            StatusReason::NotFound => "not found",
        }
    }
}

impl fmt::Display for StatusReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
