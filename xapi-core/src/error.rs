//! Error types for the protocol engine.
//!
//! Server-side rejections (`status = false` replies) are surfaced as
//! [`Error::Api`]; every local failure of the transport itself collapses into
//! [`Error::TransportClosed`], which pending calls receive exactly once when a
//! connection dies.

use std::borrow::Cow;
use std::fmt;

use thiserror::Error;

/// Result type alias for all engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// A command rejection reported by the server (`status = false`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// Server-assigned error code (e.g. `BE005`).
    pub code: String,
    /// Human-readable description accompanying the code.
    pub description: String,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error code: {}, desc: {}", self.code, self.description)
    }
}

impl std::error::Error for ApiError {}

/// The primary error type for the engine.
///
/// String payloads use `Cow<'static, str>` so static messages never allocate.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The server answered a correlated call with `status = false`.
    #[error("API error: {0}")]
    Api(Box<ApiError>),

    /// The transport failed or was closed while the operation was in flight.
    ///
    /// Terminal for the owning connection; there is no automatic reconnect.
    #[error("transport closed: {0}")]
    TransportClosed(Cow<'static, str>),

    /// A correlation tag was reused while a call with that tag was in flight.
    #[error("duplicate correlation tag: {0}")]
    DuplicateTag(Cow<'static, str>),

    /// A stream key was opened while a subscription with that key was active.
    #[error("duplicate subscription key: {0}")]
    DuplicateSubscription(Cow<'static, str>),

    /// A payload could not be encoded or decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The socket could not be established.
    #[error("dial error: {0}")]
    Dial(Cow<'static, str>),

    /// An operation exceeded its deadline.
    #[error("timeout: {0}")]
    Timeout(Cow<'static, str>),

    /// The operation was cancelled before completion.
    #[error("cancelled: {0}")]
    Cancelled(Cow<'static, str>),

    /// The request was malformed before it reached the wire.
    #[error("invalid request: {0}")]
    InvalidRequest(Cow<'static, str>),
}

impl Error {
    /// Creates an [`Error::Api`] from a server error code and description.
    pub fn api(code: impl Into<String>, description: impl Into<String>) -> Self {
        Self::Api(Box::new(ApiError {
            code: code.into(),
            description: description.into(),
        }))
    }

    /// Creates an [`Error::TransportClosed`].
    pub fn transport_closed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::TransportClosed(message.into())
    }

    /// Creates an [`Error::DuplicateTag`].
    pub fn duplicate_tag(tag: impl Into<Cow<'static, str>>) -> Self {
        Self::DuplicateTag(tag.into())
    }

    /// Creates an [`Error::DuplicateSubscription`].
    pub fn duplicate_subscription(key: impl Into<Cow<'static, str>>) -> Self {
        Self::DuplicateSubscription(key.into())
    }

    /// Creates an [`Error::Dial`].
    pub fn dial(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Dial(message.into())
    }

    /// Creates an [`Error::Timeout`].
    pub fn timeout(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Timeout(message.into())
    }

    /// Creates an [`Error::Cancelled`].
    pub fn cancelled(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Cancelled(message.into())
    }

    /// Creates an [`Error::InvalidRequest`].
    pub fn invalid_request(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// Returns `true` when the connection carrying the operation is gone.
    #[inline]
    #[must_use]
    pub fn is_transport_closed(&self) -> bool {
        matches!(self, Self::TransportClosed(_))
    }

    /// Returns the server rejection details, if this is an [`Error::Api`].
    #[must_use]
    pub fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(details) => Some(details),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_display_matches_wire_convention() {
        let err = Error::api("BE005", "userPasswordCheck: invalid login or password");
        assert_eq!(
            err.to_string(),
            "API error: error code: BE005, desc: userPasswordCheck: invalid login or password"
        );
    }

    #[test]
    fn as_api_exposes_details() {
        let err = Error::api("EX000", "invalid parameters");
        let details = err.as_api().unwrap();
        assert_eq!(details.code, "EX000");
        assert_eq!(details.description, "invalid parameters");
        assert!(Error::timeout("late").as_api().is_none());
    }

    #[test]
    fn transport_closed_detection() {
        assert!(Error::transport_closed("socket gone").is_transport_closed());
        assert!(!Error::duplicate_tag("a").is_transport_closed());
    }

    #[test]
    fn decode_error_wraps_serde() {
        let inner = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err = Error::from(inner);
        assert!(matches!(err, Error::Decode(_)));
    }
}
