use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HeaderName, HeaderValue, USER_AGENT};
use http::{HeaderMap, Method, StatusCode, Uri};
use hyper_rustls::HttpsConnectorBuilder;
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use tokio::time::{sleep, timeout};
use tracing::{Instrument, debug, info_span, warn};

use crate::HttpResult;
use crate::auth::{AuthScheme, RequestDraft, apply_auth};
use crate::body::{ReqBody, build_http_request, read_all_body};
use crate::error::RequestError;
use crate::observe::{MetricsSink, RequestObservation, TraceContextReader};
use crate::request::RequestBuilder;
use crate::response::{ResponseBody, ResponseSuccess, classify_response};
use crate::retry::RetryPolicy;
use crate::util::{
    build_url, merge_headers, parse_header_name, parse_header_value, parse_uri,
    redact_url_for_logs,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_millis(30_000);
const DEFAULT_CLIENT_NAME: &str = "onebun-http";

pub(crate) const TRACE_ID_HEADER: &str = "x-trace-id";

type HttpsConnector = hyper_rustls::HttpsConnector<HttpConnector>;
type HyperClient = Client<HttpsConnector, ReqBody>;

/// Per-call overrides collected by [`RequestBuilder`]; anything left `None`
/// falls back to the client default.
pub(crate) struct RequestExecutionOptions {
    pub(crate) timeout: Option<Duration>,
    pub(crate) retry_policy: Option<RetryPolicy>,
    pub(crate) auth: Option<AuthScheme>,
    pub(crate) tracing_enabled: Option<bool>,
    pub(crate) metrics_enabled: Option<bool>,
}

pub struct HttpClientBuilder {
    base_url: Option<String>,
    default_headers: HeaderMap,
    timeout: Duration,
    retry_policy: RetryPolicy,
    auth: Option<AuthScheme>,
    tracing_enabled: bool,
    metrics_enabled: bool,
    client_name: String,
    trace_reader: Option<Arc<dyn TraceContextReader>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
}

impl HttpClientBuilder {
    pub(crate) fn new() -> Self {
        Self {
            base_url: None,
            default_headers: HeaderMap::new(),
            timeout: DEFAULT_TIMEOUT,
            retry_policy: RetryPolicy::disabled(),
            auth: None,
            tracing_enabled: true,
            metrics_enabled: true,
            client_name: DEFAULT_CLIENT_NAME.to_owned(),
            trace_reader: None,
            metrics_sink: None,
        }
    }

    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn auth(mut self, auth: AuthScheme) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn default_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.default_headers.insert(name, value);
        self
    }

    pub fn try_default_header(self, name: &str, value: &str) -> HttpResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.default_header(name, value))
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = enabled;
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn client_name(mut self, client_name: impl Into<String>) -> Self {
        self.client_name = client_name.into();
        self
    }

    pub fn trace_reader(mut self, trace_reader: Arc<dyn TraceContextReader>) -> Self {
        self.trace_reader = Some(trace_reader);
        self
    }

    pub fn metrics_sink(mut self, metrics_sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics_sink = Some(metrics_sink);
        self
    }

    pub fn try_build(self) -> HttpResult<HttpClient> {
        let https = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|source| RequestError::Tls {
                message: source.to_string(),
            })?
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .build();
        let transport = Client::builder(TokioExecutor::new()).build(https);

        Ok(HttpClient {
            base_url: self.base_url,
            default_headers: self.default_headers,
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            auth: self.auth,
            tracing_enabled: self.tracing_enabled,
            metrics_enabled: self.metrics_enabled,
            client_name: self.client_name,
            trace_reader: self.trace_reader,
            metrics_sink: self.metrics_sink,
            transport,
        })
    }

    pub fn build(self) -> HttpClient {
        self.try_build()
            .unwrap_or_else(|error| panic!("failed to build onebun http client: {error}"))
    }
}

/// Per-instance facade holding default options. All verb methods funnel into
/// the same execution loop; instances are cheap to clone and hold no mutable
/// state across calls.
#[derive(Clone)]
pub struct HttpClient {
    base_url: Option<String>,
    default_headers: HeaderMap,
    timeout: Duration,
    retry_policy: RetryPolicy,
    auth: Option<AuthScheme>,
    tracing_enabled: bool,
    metrics_enabled: bool,
    client_name: String,
    trace_reader: Option<Arc<dyn TraceContextReader>>,
    metrics_sink: Option<Arc<dyn MetricsSink>>,
    transport: HyperClient,
}

impl HttpClient {
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::new()
    }

    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path.into())
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    pub fn patch(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PATCH, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn head(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::HEAD, path)
    }

    pub fn options(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::OPTIONS, path)
    }

    fn base_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::try_from(self.client_name.as_str()) {
            headers.insert(USER_AGENT, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    /// The request execution loop: Build, Auth, then Send/Parse/Decide per
    /// attempt until success, terminal failure, or an exhausted budget.
    pub(crate) async fn execute(
        &self,
        method: Method,
        path: String,
        query_pairs: Vec<(String, Option<String>)>,
        headers: HeaderMap,
        body: Option<Bytes>,
        options: RequestExecutionOptions,
    ) -> HttpResult<ResponseSuccess> {
        // Build: defaults merged under per-call values, trace id read once.
        let url_text = build_url(self.base_url.as_deref(), &path, &query_pairs);
        let tracing_on = options.tracing_enabled.unwrap_or(true) && self.tracing_enabled;
        let metrics_on = options.metrics_enabled.unwrap_or(true) && self.metrics_enabled;
        let trace_id = if tracing_on {
            self.trace_reader
                .as_ref()
                .and_then(|reader| reader.trace_id())
        } else {
            None
        };

        let merged = merge_headers(
            &merge_headers(&self.base_headers(), &self.default_headers),
            &headers,
        );

        // Auth: terminal on failure, applied once for the whole request.
        let mut draft = RequestDraft {
            method,
            url: url_text,
            headers: merged,
        };
        if let Some(scheme) = options.auth.as_ref().or(self.auth.as_ref()) {
            apply_auth(scheme, &mut draft)?;
        }
        if let Some(id) = &trace_id {
            let value = parse_header_value(TRACE_ID_HEADER, id)?;
            draft
                .headers
                .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
        }

        let RequestDraft {
            method,
            url: url_text,
            headers,
        } = draft;
        let uri = parse_uri(&url_text)?;
        let redacted_url = redact_url_for_logs(&url_text);

        let body = match method {
            Method::POST | Method::PUT | Method::PATCH => body.unwrap_or_default(),
            _ => Bytes::new(),
        };
        let timeout_value = options
            .timeout
            .unwrap_or(self.timeout)
            .max(Duration::from_millis(1));
        let retry_policy = options
            .retry_policy
            .unwrap_or_else(|| self.retry_policy.clone());
        let max_retries = retry_policy.max_retries();

        let request_started_at = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            let span = info_span!(
                "onebun.request",
                client = %self.client_name,
                method = %method,
                url = %redacted_url,
                attempt = attempt + 1,
                max_attempts = max_retries + 1
            );

            let attempt_started_at = Instant::now();
            let attempt_result = async {
                debug!("sending request");
                self.send_once(&method, &uri, &url_text, &headers, &body, timeout_value)
                    .await
            }
            .instrument(span.clone())
            .await;
            let attempt_duration = attempt_started_at.elapsed();

            if metrics_on {
                self.record_observation(
                    &method,
                    &redacted_url,
                    &attempt_result,
                    attempt_duration,
                    attempt,
                );
            }

            match attempt_result {
                Ok((status, response_headers, data)) => {
                    span.in_scope(|| {
                        debug!(
                            status = status.as_u16(),
                            elapsed_ms = attempt_duration.as_millis() as u64,
                            "request completed"
                        );
                    });
                    return Ok(ResponseSuccess {
                        data,
                        status,
                        headers: response_headers,
                        duration: request_started_at.elapsed(),
                        trace_id,
                        url: url_text,
                        method,
                        retry_count: attempt,
                    });
                }
                Err(error) => {
                    if attempt >= max_retries || !retry_policy.should_retry(&error) {
                        return Err(error);
                    }

                    let retry_number = attempt + 1;
                    if let Some(hook) = retry_policy.on_retry_hook() {
                        if let Err(source) = hook.on_retry(&error, retry_number) {
                            return Err(RequestError::RetryCallback {
                                attempt: retry_number,
                                message: source.to_string(),
                                cause: Box::new(error),
                            });
                        }
                    }

                    let retry_delay = retry_policy.backoff_for_retry(retry_number);
                    span.in_scope(|| {
                        warn!(
                            delay_ms = retry_delay.as_millis() as u64,
                            error = %error,
                            "retrying request"
                        );
                    });
                    if !retry_delay.is_zero() {
                        sleep(retry_delay).await;
                    }
                    attempt = retry_number;
                }
            }
        }
    }

    /// One full send/parse cycle.
    async fn send_once(
        &self,
        method: &Method,
        uri: &Uri,
        url_text: &str,
        headers: &HeaderMap,
        body: &Bytes,
        timeout_value: Duration,
    ) -> HttpResult<(StatusCode, HeaderMap, ResponseBody)> {
        let request = build_http_request(method.clone(), uri.clone(), headers, body.clone())?;

        let response = match timeout(timeout_value, self.transport.request(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(source)) => {
                return Err(RequestError::Transport {
                    method: method.clone(),
                    url: url_text.to_owned(),
                    source: Box::new(source),
                });
            }
            Err(_) => {
                return Err(RequestError::Timeout {
                    timeout_ms: timeout_value.as_millis(),
                    method: method.clone(),
                    url: url_text.to_owned(),
                });
            }
        };

        let status = response.status();
        let response_headers = response.headers().clone();
        let response_body = match timeout(timeout_value, read_all_body(response.into_body())).await
        {
            Ok(Ok(body)) => body,
            Ok(Err(error)) => return Err(error),
            Err(_) => {
                return Err(RequestError::Timeout {
                    timeout_ms: timeout_value.as_millis(),
                    method: method.clone(),
                    url: url_text.to_owned(),
                });
            }
        };

        let data = classify_response(status, &response_headers, response_body, method, url_text)?;
        Ok((status, response_headers, data))
    }

    fn record_observation(
        &self,
        method: &Method,
        redacted_url: &str,
        attempt_result: &HttpResult<(StatusCode, HeaderMap, ResponseBody)>,
        duration: Duration,
        retry_count: u32,
    ) {
        let Some(sink) = &self.metrics_sink else {
            return;
        };

        let status_code = match attempt_result {
            Ok((status, ..)) => Some(status.as_u16()),
            Err(error) => error.status_code(),
        };
        let observation = RequestObservation {
            method: method.clone(),
            url: redacted_url.to_owned(),
            status_code,
            duration,
            success: attempt_result.is_ok(),
            retry_count,
        };
        if let Err(error) = sink.record(&observation) {
            debug!(error = %error, "metrics sink rejected observation");
        }
    }
}
