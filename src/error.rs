use std::sync::Arc;

/// Represents a result type for operations in the A/B testing client.
///
/// This is a standard Rust `Result` where the error variant defaults to the crate-specific
/// [`Error`] enum.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Enum representing possible errors that can occur in the A/B testing client.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The request was rejected before any network or cache activity.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `api_url` was not configured.
    #[error("api_url must not be empty")]
    EmptyApiUrl,

    /// Invalid `api_url` configuration.
    #[error("invalid api_url configuration")]
    InvalidApiUrl(#[source] url::ParseError),

    /// The experiment request did not complete within the requested timeout.
    #[error("experiment request timed out")]
    Timeout,

    /// Network error.
    #[error(transparent)]
    Network(Arc<reqwest::Error>),

    /// The server responded with a non-2xx HTTP status.
    #[error("received non-2xx response from experiment server: {0}")]
    HttpStatus(u16),

    /// The server response body could not be parsed.
    #[error("malformed experiment response")]
    MalformedResponse(#[source] Arc<serde_json::Error>),

    /// The server responded with a status other than `SUCCESS`.
    #[error("experiment server returned status {status:?}: {message}")]
    ServerStatus {
        /// Status reported by the server.
        status: String,
        /// Error message reported by the server, if any.
        message: String,
    },

    /// Dumped assignments could not be loaded.
    #[error(transparent)]
    Serialization(#[from] SerializationError),
}

impl From<reqwest::Error> for Error {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            return Error::Timeout;
        }
        if let Some(status) = value.status() {
            return Error::HttpStatus(status.as_u16());
        }
        Error::Network(Arc::new(value.without_url()))
    }
}

/// Request validation failures. These are always surfaced to the caller and never retried.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationError {
    /// The distinct id of the user is empty.
    #[error("distinct_id must not be empty")]
    EmptyDistinctId,

    /// The requested parameter name is empty.
    #[error("param_name must not be empty")]
    EmptyParamName,

    /// A property key is empty, too long, reserved or not a valid identifier.
    #[error("invalid property key {key:?}: {reason}")]
    InvalidPropertyKey {
        /// The offending key.
        key: String,
        /// Why the key was rejected.
        reason: &'static str,
    },

    /// A property value is not acceptable.
    #[error("invalid value for property {key:?}: {reason}")]
    InvalidPropertyValue {
        /// Key of the offending value.
        key: String,
        /// Why the value was rejected.
        reason: &'static str,
    },

    /// A custom subject id is not acceptable.
    #[error("invalid custom id {key:?}: {reason}")]
    InvalidCustomId {
        /// Key of the offending custom id.
        key: String,
        /// Why the custom id was rejected.
        reason: &'static str,
    },
}

/// Errors loading dumped fetch-all results.
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum SerializationError {
    /// The payload is not valid JSON or does not have the expected shape.
    #[error("malformed dumped assignments")]
    Malformed(#[source] Arc<serde_json::Error>),

    /// A required field is missing or empty.
    #[error("invalid dumped assignments: missing {0} field")]
    MissingField(&'static str),

    /// The identity embedded in the payload does not match the caller's identity.
    #[error("user identity ({0}) mismatch")]
    IdentityMismatch(&'static str),

    /// The embedded server response is malformed or not a successful response.
    #[error("invalid response_body in dumped assignments")]
    InvalidResponseBody(#[source] Arc<Error>),
}

impl From<serde_json::Error> for SerializationError {
    fn from(value: serde_json::Error) -> Self {
        SerializationError::Malformed(Arc::new(value))
    }
}

/// Error reported by an [`AnalyticsTracker`](crate::AnalyticsTracker) when an event could not
/// be delivered. Delivery errors are logged and never fail the originating call.
#[derive(thiserror::Error, Debug, Clone)]
#[error("analytics delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Error returned by fetch operations.
///
/// Every fetch can still produce a usable result even if it failed: `fallback` holds the
/// caller's default value (or an empty result). Callers that prefer to "fail open" can use
/// [`FetchError::into_fallback`]:
///
/// ```no_run
/// # use abtesting::{Client, FetchError, FetchRequest, UserIdentity};
/// # fn test(client: &Client) {
/// let assignment = client
///     .fetch_cache_first(&UserIdentity::login("user-1"), &FetchRequest::new("btn_type", "default"))
///     .unwrap_or_else(FetchError::into_fallback);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FetchError<T> {
    /// Why the fetch failed.
    pub source: Error,
    /// A usable result built from the caller's defaults.
    pub fallback: T,
}

impl<T> FetchError<T> {
    pub(crate) fn new(source: impl Into<Error>, fallback: T) -> Self {
        FetchError {
            source: source.into(),
            fallback,
        }
    }

    /// Discard the error and return the fallback result.
    pub fn into_fallback(self) -> T {
        self.fallback
    }
}

impl<T> std::fmt::Display for FetchError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.source, f)
    }
}

impl<T: std::fmt::Debug> std::error::Error for FetchError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
