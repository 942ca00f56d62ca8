use bytes::Bytes;
use http::{HeaderMap, Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;

use crate::error::RequestError;

pub(crate) type ReqBody = Full<Bytes>;

pub(crate) fn build_http_request(
    method: Method,
    uri: Uri,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Request<ReqBody>, RequestError> {
    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        request_builder = request_builder.header(name, value);
    }
    request_builder
        .body(Full::new(body))
        .map_err(|source| RequestError::RequestBuild { source })
}

pub(crate) async fn read_all_body(mut body: Incoming) -> Result<Bytes, RequestError> {
    let mut collected = Vec::new();
    while let Some(frame) = body.frame().await {
        let frame = frame.map_err(|source| RequestError::ResponseRead {
            source: Box::new(source),
        })?;
        if let Some(data) = frame.data_ref() {
            collected.extend_from_slice(data);
        }
    }
    Ok(Bytes::from(collected))
}
