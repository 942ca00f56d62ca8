use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use hmac::{Hmac, Mac};
use http::header::AUTHORIZATION;
use http::{HeaderMap, Method};
use rand::Rng;
use sha2::{Sha256, Sha512};

use crate::error::RequestError;
use crate::util::{append_query_pairs, now_epoch_ms, parse_header_name, parse_header_value};

type BoxError = Box<dyn std::error::Error + Send + Sync>;
type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub const ONEBUN_SERVICE_ID_HEADER: &str = "x-onebun-service-id";
pub const ONEBUN_TIMESTAMP_HEADER: &str = "x-onebun-timestamp";
pub const ONEBUN_NONCE_HEADER: &str = "x-onebun-nonce";
pub const ONEBUN_ALGORITHM_HEADER: &str = "x-onebun-algorithm";
pub const ONEBUN_SIGNATURE_HEADER: &str = "x-onebun-signature";

/// Default freshness window for signed requests: five minutes.
pub const DEFAULT_ONEBUN_MAX_AGE: Duration = Duration::from_millis(300_000);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiKeyLocation {
    Header,
    Query,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SigningAlgorithm {
    HmacSha256,
    HmacSha512,
}

impl SigningAlgorithm {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HmacSha256 => "hmac-sha256",
            Self::HmacSha512 => "hmac-sha512",
        }
    }

    pub(crate) fn parse(text: &str) -> Option<Self> {
        match text {
            "hmac-sha256" => Some(Self::HmacSha256),
            "hmac-sha512" => Some(Self::HmacSha512),
            _ => None,
        }
    }
}

impl std::fmt::Display for SigningAlgorithm {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// The request under construction as authentication sees it: the final URL,
/// the method, and the headers assembled so far. Interceptors may rewrite
/// any of it.
#[derive(Clone, Debug)]
pub struct RequestDraft {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
}

/// Caller-supplied transform over the draft request, run after the static
/// header/query additions of [`AuthScheme::Custom`].
pub trait AuthInterceptor: Send + Sync {
    fn intercept(&self, draft: &mut RequestDraft) -> Result<(), BoxError>;
}

/// Authentication strategy descriptor. Exactly one variant applies per
/// request; only `Custom` and `OneBun` have failure modes.
#[derive(Clone)]
pub enum AuthScheme {
    Bearer {
        token: String,
    },
    ApiKey {
        key: String,
        value: String,
        location: ApiKeyLocation,
    },
    Basic {
        username: String,
        password: String,
    },
    Custom {
        headers: Vec<(String, String)>,
        query: Vec<(String, String)>,
        interceptor: Option<Arc<dyn AuthInterceptor>>,
    },
    /// OneBun service-to-service signing: five `X-OneBun-*` headers carrying
    /// an HMAC over the canonical request payload.
    OneBun {
        service_id: String,
        secret_key: String,
        algorithm: SigningAlgorithm,
    },
}

impl std::fmt::Debug for AuthScheme {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer { .. } => formatter.write_str("AuthScheme::Bearer"),
            Self::ApiKey { key, location, .. } => formatter
                .debug_struct("AuthScheme::ApiKey")
                .field("key", key)
                .field("location", location)
                .finish_non_exhaustive(),
            Self::Basic { username, .. } => formatter
                .debug_struct("AuthScheme::Basic")
                .field("username", username)
                .finish_non_exhaustive(),
            Self::Custom { headers, query, .. } => formatter
                .debug_struct("AuthScheme::Custom")
                .field("headers", &headers.len())
                .field("query", &query.len())
                .finish_non_exhaustive(),
            Self::OneBun {
                service_id,
                algorithm,
                ..
            } => formatter
                .debug_struct("AuthScheme::OneBun")
                .field("service_id", service_id)
                .field("algorithm", algorithm)
                .finish_non_exhaustive(),
        }
    }
}

/// Applies the scheme to the draft. Bearer/apikey/basic only add headers or
/// query pairs; custom runs the interceptor; onebun signs the request.
pub(crate) fn apply_auth(scheme: &AuthScheme, draft: &mut RequestDraft) -> Result<(), RequestError> {
    match scheme {
        AuthScheme::Bearer { token } => {
            let mut value = parse_header_value("authorization", &format!("Bearer {token}"))?;
            value.set_sensitive(true);
            draft.headers.insert(AUTHORIZATION, value);
            Ok(())
        }
        AuthScheme::ApiKey {
            key,
            value,
            location,
        } => match location {
            ApiKeyLocation::Header => {
                let name = parse_header_name(key)?;
                let mut header_value = parse_header_value(key, value)?;
                header_value.set_sensitive(true);
                draft.headers.insert(name, header_value);
                Ok(())
            }
            ApiKeyLocation::Query => {
                draft.url =
                    append_query_pairs(&draft.url, &[(key.clone(), Some(value.clone()))]);
                Ok(())
            }
        },
        AuthScheme::Basic { username, password } => {
            let encoded = BASE64_STANDARD.encode(format!("{username}:{password}"));
            let mut value = parse_header_value("authorization", &format!("Basic {encoded}"))?;
            value.set_sensitive(true);
            draft.headers.insert(AUTHORIZATION, value);
            Ok(())
        }
        AuthScheme::Custom {
            headers,
            query,
            interceptor,
        } => {
            for (name, value) in headers {
                let header_name = parse_header_name(name)?;
                let header_value = parse_header_value(name, value)?;
                draft.headers.insert(header_name, header_value);
            }
            if !query.is_empty() {
                let pairs: Vec<(String, Option<String>)> = query
                    .iter()
                    .map(|(name, value)| (name.clone(), Some(value.clone())))
                    .collect();
                draft.url = append_query_pairs(&draft.url, &pairs);
            }
            if let Some(interceptor) = interceptor {
                interceptor
                    .intercept(draft)
                    .map_err(|source| RequestError::Auth {
                        message: "auth interceptor failed".to_owned(),
                        source: Some(source),
                    })?;
            }
            Ok(())
        }
        AuthScheme::OneBun {
            service_id,
            secret_key,
            algorithm,
        } => sign_onebun(service_id, secret_key, *algorithm, draft),
    }
}

fn sign_onebun(
    service_id: &str,
    secret_key: &str,
    algorithm: SigningAlgorithm,
    draft: &mut RequestDraft,
) -> Result<(), RequestError> {
    let timestamp = now_epoch_ms().to_string();
    let nonce = generate_nonce();
    let payload = canonical_payload(&draft.method, &draft.url, &timestamp, &nonce, service_id);
    let signature =
        compute_signature(algorithm, secret_key, &payload).map_err(|source| RequestError::Auth {
            message: "onebun signature computation failed".to_owned(),
            source: Some(source),
        })?;

    let entries = [
        (ONEBUN_SERVICE_ID_HEADER, service_id),
        (ONEBUN_TIMESTAMP_HEADER, timestamp.as_str()),
        (ONEBUN_NONCE_HEADER, nonce.as_str()),
        (ONEBUN_ALGORITHM_HEADER, algorithm.as_str()),
        (ONEBUN_SIGNATURE_HEADER, signature.as_str()),
    ];
    for (name, value) in entries {
        let header_name = parse_header_name(name)?;
        draft.headers.insert(header_name, parse_header_value(name, value)?);
    }
    Ok(())
}

/// The exact newline-joined string both sides sign: method, url, timestamp,
/// nonce, service id, one per line.
pub(crate) fn canonical_payload(
    method: &Method,
    url: &str,
    timestamp: &str,
    nonce: &str,
    service_id: &str,
) -> String {
    format!("{method}\n{url}\n{timestamp}\n{nonce}\n{service_id}")
}

pub(crate) fn compute_signature(
    algorithm: SigningAlgorithm,
    secret_key: &str,
    payload: &str,
) -> Result<String, BoxError> {
    match algorithm {
        SigningAlgorithm::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
                .map_err(|source| Box::new(source) as BoxError)?;
            mac.update(payload.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
        SigningAlgorithm::HmacSha512 => {
            let mut mac = HmacSha512::new_from_slice(secret_key.as_bytes())
                .map_err(|source| Box::new(source) as BoxError)?;
            mac.update(payload.as_bytes());
            Ok(hex::encode(mac.finalize().into_bytes()))
        }
    }
}

fn generate_nonce() -> String {
    let mut nonce = [0_u8; 16];
    rand::rng().fill(&mut nonce[..]);
    hex::encode(nonce)
}

/// Verification outcome for a signed inbound request. `service_id` is
/// `"unknown"` when the header is missing entirely.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OneBunValidation {
    pub service_id: String,
    pub valid: bool,
}

impl OneBunValidation {
    fn rejected(service_id: String) -> Self {
        Self {
            service_id,
            valid: false,
        }
    }
}

fn header_text<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

/// Validates the five `X-OneBun-*` headers against a shared secret.
///
/// `method` and `url` come from the verifier out-of-band; the request line
/// itself is not part of the signed header set. Missing headers, an unknown
/// algorithm, a timestamp older than `max_age`, or a signature mismatch all
/// reject. Nonce uniqueness is not enforced here.
pub fn validate_onebun(
    headers: &HeaderMap,
    secret_key: &str,
    method: &Method,
    url: &str,
    max_age: Duration,
) -> OneBunValidation {
    let service_id = header_text(headers, ONEBUN_SERVICE_ID_HEADER)
        .unwrap_or("unknown")
        .to_owned();

    let Some(timestamp) = header_text(headers, ONEBUN_TIMESTAMP_HEADER) else {
        return OneBunValidation::rejected(service_id);
    };
    let Some(nonce) = header_text(headers, ONEBUN_NONCE_HEADER) else {
        return OneBunValidation::rejected(service_id);
    };
    let Some(algorithm_text) = header_text(headers, ONEBUN_ALGORITHM_HEADER) else {
        return OneBunValidation::rejected(service_id);
    };
    let Some(signature) = header_text(headers, ONEBUN_SIGNATURE_HEADER) else {
        return OneBunValidation::rejected(service_id);
    };
    if !headers.contains_key(ONEBUN_SERVICE_ID_HEADER) {
        return OneBunValidation::rejected(service_id);
    }

    let Some(algorithm) = SigningAlgorithm::parse(algorithm_text) else {
        return OneBunValidation::rejected(service_id);
    };
    let Ok(timestamp_ms) = timestamp.parse::<u64>() else {
        return OneBunValidation::rejected(service_id);
    };
    let age_ms = now_epoch_ms().saturating_sub(timestamp_ms);
    if u128::from(age_ms) > max_age.as_millis() {
        return OneBunValidation::rejected(service_id);
    }

    let payload = canonical_payload(method, url, timestamp, nonce, &service_id);
    let Ok(expected) = compute_signature(algorithm, secret_key, &payload) else {
        return OneBunValidation::rejected(service_id);
    };
    let valid = expected == signature;
    OneBunValidation { service_id, valid }
}
