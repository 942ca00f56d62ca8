use std::time::Duration;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RequestError;
use crate::util::truncate_body;

/// Decoded response payload. A declared-JSON body with no bytes is `Empty`;
/// non-JSON content types come back as raw text.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseBody {
    Empty,
    Json(Value),
    Text(String),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Successful outcome of a request: the decoded body plus everything a
/// caller needs to correlate and account for the call.
#[derive(Clone, Debug)]
pub struct ResponseSuccess {
    pub data: ResponseBody,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub duration: Duration,
    pub trace_id: Option<String>,
    pub url: String,
    pub method: Method,
    /// Retries performed before this answer; zero when the first attempt won.
    pub retry_count: u32,
}

impl ResponseSuccess {
    /// Decodes the body into a typed value.
    pub fn json<T>(&self) -> Result<T, RequestError>
    where
        T: DeserializeOwned,
    {
        match &self.data {
            ResponseBody::Json(value) => serde_json::from_value(value.clone()).map_err(|source| {
                RequestError::ResponseParse {
                    source,
                    body: truncate_body(value.to_string().as_bytes()),
                }
            }),
            ResponseBody::Text(text) => {
                serde_json::from_str(text).map_err(|source| RequestError::ResponseParse {
                    source,
                    body: truncate_body(text.as_bytes()),
                })
            }
            ResponseBody::Empty => match serde_json::from_str::<T>("") {
                Ok(value) => Ok(value),
                Err(source) => Err(RequestError::ResponseParse {
                    source,
                    body: String::new(),
                }),
            },
        }
    }
}

/// Standardized wire error shape. Recognized in response bodies (even on a
/// 2xx transport status) and produced when proxying failures onward.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub success: bool,
    pub error: String,
    pub code: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

/// Standardized wire success shape.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope<T> {
    pub success: bool,
    pub result: T,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

/// Decodes raw bytes by content type. A body declared as JSON must parse as
/// JSON; a decode failure there is an error, not a fallback to text.
pub(crate) fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<ResponseBody, RequestError> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.contains("application/json") {
        if body.is_empty() {
            return Ok(ResponseBody::Empty);
        }
        let text = String::from_utf8_lossy(body);
        return match serde_json::from_str(&text) {
            Ok(value) => Ok(ResponseBody::Json(value)),
            Err(source) => Err(RequestError::ResponseParse {
                source,
                body: truncate_body(body),
            }),
        };
    }

    Ok(ResponseBody::Text(String::from_utf8_lossy(body).into_owned()))
}

pub(crate) fn recognize_error_envelope(value: &Value) -> Option<ErrorEnvelope> {
    let envelope: ErrorEnvelope = serde_json::from_value(value.clone()).ok()?;
    if envelope.success {
        return None;
    }
    Some(envelope)
}

/// Classifies one raw answer into success data or a failure. An embedded
/// error envelope wins over the transport status; otherwise 2xx is success
/// and everything else is `HTTP_ERROR` carrying the parsed body as details.
pub(crate) fn classify_response(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
    method: &Method,
    url: &str,
) -> Result<ResponseBody, RequestError> {
    let data = parse_body(headers, &body)?;

    if let ResponseBody::Json(value) = &data {
        if let Some(envelope) = recognize_error_envelope(value) {
            return Err(RequestError::Envelope {
                error: envelope.error,
                code: envelope.code,
                message: envelope.message,
                details: envelope.details,
                trace_id: envelope.trace_id,
                status: status.as_u16(),
                method: method.clone(),
                url: url.to_owned(),
            });
        }
    }

    if status.is_success() {
        return Ok(data);
    }

    let details = match data {
        ResponseBody::Json(value) => Some(value),
        ResponseBody::Text(text) => Some(Value::String(text)),
        ResponseBody::Empty => None,
    };
    Err(RequestError::Http {
        status: status.as_u16(),
        method: method.clone(),
        url: url.to_owned(),
        details,
    })
}
