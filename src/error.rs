use http::Method;
use thiserror::Error;

use crate::response::ErrorEnvelope;
use crate::util::now_epoch_ms;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified failure type for every stage of request execution.
///
/// Each variant carries the context of its failure site; wrapping layers
/// chain the prior error through `#[source]` instead of replacing it. The
/// short machine code for a variant is available via [`RequestError::code`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RequestError {
    #[error("authentication failed: {message}")]
    Auth {
        message: String,
        #[source]
        source: Option<BoxError>,
    },
    #[error("transport failure for {method} {url}: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: BoxError,
    },
    #[error("request timed out after {timeout_ms}ms for {method} {url}")]
    Timeout {
        timeout_ms: u128,
        method: Method,
        url: String,
    },
    #[error("http status error {status} for {method} {url}")]
    Http {
        status: u16,
        method: Method,
        url: String,
        details: Option<serde_json::Value>,
    },
    /// The origin answered with the standardized error envelope; its own
    /// error code is authoritative and replaces the generic http error.
    #[error("service error {error} (code {code}) for {method} {url}")]
    Envelope {
        error: String,
        code: i64,
        message: Option<String>,
        details: Option<serde_json::Value>,
        trace_id: Option<String>,
        status: u16,
        method: Method,
        url: String,
    },
    #[error("failed to decode response json: {source}; body={body}")]
    ResponseParse {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("failed to read response body: {source}")]
    ResponseRead {
        #[source]
        source: BoxError,
    },
    /// The caller-supplied retry hook itself failed; retries stop here and
    /// the error that triggered the retry is kept as the cause.
    #[error("retry callback failed on attempt {attempt}: {message}")]
    RetryCallback {
        attempt: u32,
        message: String,
        #[source]
        cause: Box<RequestError>,
    },
    #[error("invalid request url: {url}")]
    InvalidUrl { url: String },
    #[error("invalid header name {name}: {source}")]
    InvalidHeaderName {
        name: String,
        #[source]
        source: http::header::InvalidHeaderName,
    },
    #[error("invalid header value for {name}: {source}")]
    InvalidHeaderValue {
        name: String,
        #[source]
        source: http::header::InvalidHeaderValue,
    },
    #[error("failed to serialize request json: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to serialize request query: {source}")]
    SerializeQuery {
        #[source]
        source: serde_urlencoded::ser::Error,
    },
    #[error("failed to build http request: {source}")]
    RequestBuild {
        #[source]
        source: http::Error,
    },
    #[error("failed to initialize tls transport: {message}")]
    Tls { message: String },
}

impl RequestError {
    /// Short machine code discriminating the failure class.
    ///
    /// Envelope failures return the origin's own error code; everything that
    /// only a programmer can cause maps to `CONFIG_ERROR`.
    pub fn code(&self) -> &str {
        match self {
            Self::Auth { .. } => "AUTH_ERROR",
            Self::Transport { .. } | Self::Timeout { .. } => "FETCH_ERROR",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Envelope { error, .. } => error,
            Self::ResponseParse { .. } => "RESPONSE_PARSE_ERROR",
            Self::ResponseRead { .. } => "RESPONSE_READ_ERROR",
            Self::RetryCallback { .. } => "RETRY_CALLBACK_ERROR",
            Self::InvalidUrl { .. }
            | Self::InvalidHeaderName { .. }
            | Self::InvalidHeaderValue { .. }
            | Self::Serialize { .. }
            | Self::SerializeQuery { .. }
            | Self::RequestBuild { .. }
            | Self::Tls { .. } => "CONFIG_ERROR",
        }
    }

    /// HTTP status of the answer that produced this error, when one exists.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } | Self::Envelope { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Renders this error as the standardized wire envelope, stamped with
    /// the current epoch-ms timestamp. Services that proxy a downstream
    /// failure onward serialize this shape.
    pub fn to_envelope(&self, trace_id: Option<String>) -> ErrorEnvelope {
        match self {
            Self::Envelope {
                error,
                code,
                message,
                details,
                trace_id: origin_trace_id,
                ..
            } => ErrorEnvelope {
                success: false,
                error: error.clone(),
                code: *code,
                message: message.clone(),
                details: details.clone(),
                trace_id: trace_id.or_else(|| origin_trace_id.clone()),
                timestamp: Some(now_epoch_ms()),
            },
            other => ErrorEnvelope {
                success: false,
                error: other.code().to_owned(),
                code: i64::from(other.status_code().unwrap_or(0)),
                message: Some(other.to_string()),
                details: None,
                trace_id,
                timestamp: Some(now_epoch_ms()),
            },
        }
    }
}
