use std::time::{SystemTime, UNIX_EPOCH};

use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, Uri};

use crate::error::RequestError;

const MAX_ERROR_BODY_LEN: usize = 2048;

/// Joins a base URL and a path, trimming exactly one trailing slash from the
/// base and one leading slash from the path.
pub(crate) fn join_base_path(base_url: &str, path: &str) -> String {
    let base = base_url.strip_suffix('/').unwrap_or(base_url);
    let relative = path.strip_prefix('/').unwrap_or(path);
    match (base.is_empty(), relative.is_empty()) {
        (true, true) => String::new(),
        (true, false) => relative.to_owned(),
        (false, true) => base.to_owned(),
        (false, false) => format!("{base}/{relative}"),
    }
}

/// Builds the full request URL from an optional base, a path, and query
/// pairs. `None` values are dropped; present values are form-encoded.
pub(crate) fn build_url(
    base_url: Option<&str>,
    path: &str,
    query_pairs: &[(String, Option<String>)],
) -> String {
    let url = match base_url {
        Some(base) => join_base_path(base, path),
        None => path.to_owned(),
    };
    append_query_pairs(&url, query_pairs)
}

pub(crate) fn append_query_pairs(url: &str, query_pairs: &[(String, Option<String>)]) -> String {
    let mut serializer = url::form_urlencoded::Serializer::new(String::new());
    let mut appended = false;
    for (name, value) in query_pairs {
        if let Some(value) = value {
            serializer.append_pair(name, value);
            appended = true;
        }
    }
    if !appended {
        return url.to_owned();
    }

    let query = serializer.finish();
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{url}{separator}{query}")
}

pub(crate) fn merge_headers(base: &HeaderMap, overrides: &HeaderMap) -> HeaderMap {
    let mut merged = base.clone();
    for (name, value) in overrides {
        merged.insert(name.clone(), value.clone());
    }
    merged
}

/// Strips query, fragment, and userinfo before a URL reaches a log line or
/// an error message.
pub(crate) fn redact_url_for_logs(url_text: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(url_text) else {
        return url_text.split('?').next().unwrap_or(url_text).to_owned();
    };

    let _ = parsed.set_username("");
    let _ = parsed.set_password(None);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

pub(crate) fn parse_uri(url_text: &str) -> Result<Uri, RequestError> {
    url_text.parse().map_err(|_| RequestError::InvalidUrl {
        url: url_text.to_owned(),
    })
}

pub(crate) fn parse_header_name(name: &str) -> Result<HeaderName, RequestError> {
    name.parse()
        .map_err(|source| RequestError::InvalidHeaderName {
            name: name.to_owned(),
            source,
        })
}

pub(crate) fn parse_header_value(name: &str, value: &str) -> Result<HeaderValue, RequestError> {
    value
        .parse()
        .map_err(|source| RequestError::InvalidHeaderValue {
            name: name.to_owned(),
            source,
        })
}

pub(crate) fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis().min(u64::MAX as u128) as u64)
        .unwrap_or(0)
}

pub(crate) fn truncate_body(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    if text.chars().count() <= MAX_ERROR_BODY_LEN {
        return text.into_owned();
    }

    let truncated: String = text.chars().take(MAX_ERROR_BODY_LEN).collect();
    format!("{truncated}...(truncated)")
}
