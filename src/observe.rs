use std::time::Duration;

use http::Method;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Read-only source of the ambient trace id. The engine reads it once per
/// request, at build time, when tracing is enabled; it never writes back.
pub trait TraceContextReader: Send + Sync {
    fn trace_id(&self) -> Option<String>;
}

/// One completed attempt, as handed to the metrics sink. The URL is the
/// redacted form (no query, no userinfo).
#[derive(Clone, Debug)]
pub struct RequestObservation {
    pub method: Method,
    pub url: String,
    pub status_code: Option<u16>,
    pub duration: Duration,
    pub success: bool,
    pub retry_count: u32,
}

/// Destination for attempt observations. Recording is best-effort: a sink
/// error is logged at debug level and discarded, never failing the request.
pub trait MetricsSink: Send + Sync {
    fn record(&self, observation: &RequestObservation) -> Result<(), BoxError>;
}
