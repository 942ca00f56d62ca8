//! `onebun-http` is the outbound HTTP transport crate for OneBun services:
//! pluggable authentication (including the OneBun HMAC service-to-service
//! scheme), retries with configurable backoff, trace propagation, and
//! metrics hooks.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::time::Duration;
//! use onebun_http::prelude::{AuthScheme, HttpClient, RetryPolicy, SigningAlgorithm};
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! struct CreateItemResponse {
//!     id: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = HttpClient::builder()
//!         .base_url("https://items.internal.onebun.dev")
//!         .client_name("catalog-service")
//!         .timeout(Duration::from_secs(3))
//!         .retry_policy(
//!             RetryPolicy::standard()
//!                 .max(3)
//!                 .delay(Duration::from_millis(100)),
//!         )
//!         .auth(AuthScheme::OneBun {
//!             service_id: "catalog-service".to_owned(),
//!             secret_key: "shared-secret".to_owned(),
//!             algorithm: SigningAlgorithm::HmacSha256,
//!         })
//!         .try_build()?;
//!
//!     let created: CreateItemResponse = client
//!         .post("/v1/items")
//!         .json(&serde_json::json!({ "name": "demo" }))?
//!         .send_json()
//!         .await?;
//!
//!     println!("created id={}", created.id);
//!     Ok(())
//! }
//! ```
//!
//! # Recommended Defaults
//!
//! - Use `RetryPolicy::standard()` for service-to-service traffic.
//! - Always set a per-client timeout; the built-in default is 30 seconds.
//! - Wire a `TraceContextReader` so outbound calls carry `X-Trace-Id`.

mod auth;
mod body;
mod client;
mod error;
mod observe;
mod request;
mod response;
mod retry;
mod util;

pub use crate::auth::{
    ApiKeyLocation, AuthInterceptor, AuthScheme, DEFAULT_ONEBUN_MAX_AGE, ONEBUN_ALGORITHM_HEADER,
    ONEBUN_NONCE_HEADER, ONEBUN_SERVICE_ID_HEADER, ONEBUN_SIGNATURE_HEADER,
    ONEBUN_TIMESTAMP_HEADER, OneBunValidation, RequestDraft, SigningAlgorithm, validate_onebun,
};
pub use crate::client::{HttpClient, HttpClientBuilder};
pub use crate::error::RequestError;
pub use crate::observe::{MetricsSink, RequestObservation, TraceContextReader};
pub use crate::request::RequestBuilder;
pub use crate::response::{
    ErrorEnvelope, ResponseBody, ResponseSuccess, SuccessEnvelope,
};
pub use crate::retry::{Backoff, RetryHook, RetryPolicy};

pub type HttpResult<T> = std::result::Result<T, RequestError>;

pub mod prelude {
    pub use crate::{
        ApiKeyLocation, AuthInterceptor, AuthScheme, Backoff, ErrorEnvelope, HttpClient,
        HttpResult, MetricsSink, OneBunValidation, RequestBuilder, RequestError,
        RequestObservation, ResponseBody, ResponseSuccess, RetryHook, RetryPolicy,
        SigningAlgorithm, SuccessEnvelope, TraceContextReader, validate_onebun,
    };
}

#[cfg(test)]
mod tests;
