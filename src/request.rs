use std::time::Duration;

use bytes::Bytes;
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use serde::Serialize;

use crate::HttpResult;
use crate::auth::AuthScheme;
use crate::client::{HttpClient, RequestExecutionOptions};
use crate::error::RequestError;
use crate::response::ResponseSuccess;
use crate::retry::RetryPolicy;
use crate::util::{parse_header_name, parse_header_value};

/// One intended HTTP call. Collects per-call settings and hands them to the
/// client's execution loop; the builder is consumed by `send` and nothing
/// here outlives the call.
pub struct RequestBuilder<'a> {
    client: &'a HttpClient,
    method: Method,
    path: String,
    query_pairs: Vec<(String, Option<String>)>,
    headers: HeaderMap,
    body: Option<Bytes>,
    timeout: Option<Duration>,
    retry_policy: Option<RetryPolicy>,
    auth: Option<AuthScheme>,
    tracing_enabled: Option<bool>,
    metrics_enabled: Option<bool>,
}

impl<'a> RequestBuilder<'a> {
    pub(crate) fn new(client: &'a HttpClient, method: Method, path: String) -> Self {
        Self {
            client,
            method,
            path,
            query_pairs: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            retry_policy: None,
            auth: None,
            tracing_enabled: None,
            metrics_enabled: None,
        }
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn try_header(self, name: &str, value: &str) -> HttpResult<Self> {
        let name = parse_header_name(name)?;
        let value = parse_header_value(name.as_str(), value)?;
        Ok(self.header(name, value))
    }

    pub fn query_pair(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_pairs.push((name.into(), Some(value.into())));
        self
    }

    /// Adds a query pair whose value may be absent; `None` is dropped at
    /// URL-build time.
    pub fn query_opt(mut self, name: impl Into<String>, value: Option<String>) -> Self {
        self.query_pairs.push((name.into(), value));
        self
    }

    pub fn query<T>(mut self, params: &T) -> HttpResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let encoded = serde_urlencoded::to_string(params)
            .map_err(|source| RequestError::SerializeQuery { source })?;
        self.query_pairs.extend(
            url::form_urlencoded::parse(encoded.as_bytes())
                .map(|(name, value)| (name.into_owned(), Some(value.into_owned()))),
        );
        Ok(self)
    }

    /// JSON-serializes the payload as the request body.
    pub fn json<T>(mut self, payload: &T) -> HttpResult<Self>
    where
        T: Serialize + ?Sized,
    {
        let body =
            serde_json::to_vec(payload).map_err(|source| RequestError::Serialize { source })?;
        self.body = Some(Bytes::from(body));
        Ok(self)
    }

    /// Attaches a string body verbatim, without serialization.
    pub fn body_text(mut self, body: impl Into<String>) -> Self {
        self.body = Some(Bytes::from(body.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.max(Duration::from_millis(1)));
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = Some(retry_policy);
        self
    }

    /// Overrides the client-level auth scheme for this call only.
    pub fn auth(mut self, auth: AuthScheme) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn tracing(mut self, enabled: bool) -> Self {
        self.tracing_enabled = Some(enabled);
        self
    }

    pub fn metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = Some(enabled);
        self
    }

    /// Runs the request. The returned future is lazy: holding it composes
    /// with combinators, awaiting it is the eager convention.
    pub async fn send(self) -> HttpResult<ResponseSuccess> {
        let execution_options = RequestExecutionOptions {
            timeout: self.timeout,
            retry_policy: self.retry_policy,
            auth: self.auth,
            tracing_enabled: self.tracing_enabled,
            metrics_enabled: self.metrics_enabled,
        };
        self.client
            .execute(
                self.method,
                self.path,
                self.query_pairs,
                self.headers,
                self.body,
                execution_options,
            )
            .await
    }

    /// Shorthand for `send` plus a typed JSON decode.
    pub async fn send_json<T>(self) -> HttpResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let response = self.send().await?;
        response.json()
    }
}
