//! Error types for the shelter API client.
//!
//! # Design
//! Classified HTTP failures keep their own type (`StatusCodeError`) because
//! the auth layer needs to recognise `401 Unauthorized` without string
//! matching. Everything that happens before a status code exists (connection
//! refused, DNS, timeouts) lands in `Transport` with the transport library's
//! own message.

use thiserror::Error;

use crate::status::StatusCodeError;

/// Errors surfaced by the transport, auth, catalog and media layers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    /// The request never produced a status code.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The server answered with a status outside 100–399.
    #[error(transparent)]
    Status(#[from] StatusCodeError),

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request parameters could not be encoded.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// The endpoint did not resolve to a valid URL.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// Downloaded bytes were not a decodable image.
    #[error("image decode failed: {0}")]
    ImageDecode(String),

    /// Client configuration is missing or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// The classified status failure, if this error carries one.
    pub fn status(&self) -> Option<&StatusCodeError> {
        match self {
            ApiError::Status(err) => Some(err),
            _ => None,
        }
    }

    /// True when the server rejected the credentials with `401`.
    pub fn is_unauthorized(&self) -> bool {
        self.status().is_some_and(StatusCodeError::is_unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_is_detected_only_for_401() {
        assert!(ApiError::Status(StatusCodeError { code: 401 }).is_unauthorized());
        assert!(!ApiError::Status(StatusCodeError { code: 403 }).is_unauthorized());
        assert!(!ApiError::Transport("refused".to_string()).is_unauthorized());
    }

    #[test]
    fn status_error_display_is_transparent() {
        let err = ApiError::from(StatusCodeError { code: 404 });
        assert_eq!(err.to_string(), "HTTP 404 (not found)");
    }
}
