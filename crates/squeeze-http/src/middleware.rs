//! The squeezing middleware.
//!
//! Every response of the wrapped service passes through
//! [`squeeze_middleware`]:
//!
//! 1. HTML documents are processed on a blocking worker and their cache
//!    headers adjusted.
//! 2. Responses for known sub-resources feed the raw resource cache of the
//!    exchange's Vary axis.
//!
//! Anything else passes through untouched.

use axum::{
    body::{Body, HttpBody},
    extract::{Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Router,
};
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use http_body_util::BodyExt;
use squeeze_core::{
    host_url, mime_essence, ResourceResponse, ResponseObservation, SqueezeError, Squeezer,
};
use std::sync::Arc;

use crate::headers;
use crate::metrics::{DocumentOutcome, RawCacheUpdate, SqueezeMetrics};
use crate::vary::vary_key;

const HTML_TYPE: &str = "text/html";

/// Shared state of the squeezing middleware.
#[derive(Clone, Debug)]
pub struct SqueezeState {
    /// The engine.
    pub squeezer: Arc<Squeezer>,
    /// Metrics.
    pub metrics: Arc<SqueezeMetrics>,
}

impl SqueezeState {
    /// Creates middleware state.
    pub fn new(squeezer: Arc<Squeezer>, metrics: Arc<SqueezeMetrics>) -> Self {
        Self { squeezer, metrics }
    }
}

/// Wraps every route of `router` with the squeezing middleware.
pub fn squeeze<S>(router: Router<S>, state: SqueezeState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    router.layer(axum::middleware::from_fn_with_state(
        state,
        squeeze_middleware,
    ))
}

/// Where a request was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLocation {
    /// `scheme://host[:port]`.
    pub host_url: String,
    /// Path and query.
    pub path: String,
    /// Absolute request URL.
    pub url: String,
}

impl RequestLocation {
    /// Reconstructs the location of a request from its URI and `Host` header.
    pub fn from_parts(parts: &Parts) -> squeeze_core::Result<Self> {
        let host = parts
            .uri
            .authority()
            .map(|authority| authority.as_str().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get(header::HOST)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string)
            })
            .ok_or_else(|| SqueezeError::InvalidUrl("request has no host".into()))?;
        let scheme = parts.uri.scheme_str().unwrap_or("http");

        let host_url = host_url(scheme, &host)
            .ok_or_else(|| SqueezeError::InvalidUrl(format!("{scheme}://{host}")))?;
        let path = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let url = format!("{host_url}{path}");

        Ok(Self {
            host_url,
            path,
            url,
        })
    }
}

/// Processes the response of the inner service.
pub async fn squeeze_middleware(
    State(state): State<SqueezeState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();
    let location = RequestLocation::from_parts(&parts);
    let request_headers = parts.headers.clone();

    let response = next.run(Request::from_parts(parts, body)).await;

    let location = match location {
        Ok(location) => location,
        Err(e) => {
            tracing::debug!(error = %e, "Passing through request without location");
            return response;
        }
    };
    let axis_key = vary_key(&request_headers, response.headers());

    if is_html(response.headers()) {
        return process_document(&state, axis_key, location, response).await;
    }
    observe_resource(&state, axis_key, location, response).await
}

fn is_html(headers: &HeaderMap) -> bool {
    headers::content_type(headers)
        .is_some_and(|ct| mime_essence(ct).eq_ignore_ascii_case(HTML_TYPE))
}

/// Returns the body length from `Content-Length` or an exact size hint.
fn declared_length(response: &Response) -> Option<usize> {
    headers::content_length(response.headers()).or_else(|| {
        response
            .body()
            .size_hint()
            .exact()
            .and_then(|len| usize::try_from(len).ok())
    })
}

/// A response body read up to a size limit.
enum Buffered {
    Complete(Bytes),
    /// The limit was exceeded. The body replays the frames read so far
    /// followed by the rest of the stream.
    Overflow(Body),
}

async fn buffer_body(mut body: Body, max: usize) -> Result<Buffered, axum::Error> {
    let mut chunks: Vec<Bytes> = Vec::new();
    let mut len = 0usize;
    while let Some(frame) = body.frame().await {
        let Ok(data) = frame?.into_data() else {
            continue;
        };
        len += data.len();
        chunks.push(data);
        if len > max {
            let prefix = stream::iter(chunks.into_iter().map(Ok::<_, axum::Error>));
            let rest = prefix.chain(body.into_data_stream());
            return Ok(Buffered::Overflow(Body::from_stream(rest)));
        }
    }

    if chunks.len() == 1 {
        return Ok(Buffered::Complete(chunks.swap_remove(0)));
    }
    let mut bytes = BytesMut::with_capacity(len);
    for chunk in chunks {
        bytes.extend_from_slice(&chunk);
    }
    Ok(Buffered::Complete(bytes.freeze()))
}

async fn process_document(
    state: &SqueezeState,
    axis_key: String,
    location: RequestLocation,
    response: Response,
) -> Response {
    let max = state.squeezer.config().max_document_bytes;
    if !response.status().is_success() || declared_length(&response).is_some_and(|len| len > max)
    {
        state.metrics.record_document(DocumentOutcome::Skipped);
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match buffer_body(body, max).await {
        Ok(Buffered::Complete(bytes)) => bytes,
        Ok(Buffered::Overflow(body)) => {
            tracing::debug!(path = %location.path, max, "Document exceeds size limit");
            state.metrics.record_document(DocumentOutcome::Skipped);
            return Response::from_parts(parts, body);
        }
        Err(e) => {
            tracing::warn!(error = %e, path = %location.path, "Failed to buffer document");
            state.metrics.record_document(DocumentOutcome::Skipped);
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let text = match String::from_utf8(bytes.to_vec()) {
        Ok(text) => text,
        Err(_) => {
            state.metrics.record_document(DocumentOutcome::Skipped);
            return Response::from_parts(parts, Body::from(bytes));
        }
    };

    let squeezer = Arc::clone(&state.squeezer);
    let host_url = location.host_url.clone();
    let path = location.path.clone();
    let processed = tokio::task::spawn_blocking(move || {
        squeezer.process_html(&axis_key, &host_url, &path, &text)
    })
    .await;

    let processed = match processed {
        Ok(processed) => processed,
        Err(e) => {
            tracing::error!(error = %e, path = %location.path, "Document processing panicked");
            state.metrics.record_document(DocumentOutcome::Skipped);
            return Response::from_parts(parts, Body::from(bytes));
        }
    };

    state.metrics.record_merge_failures(processed.merge_failures);

    match processed.body {
        Some(body) if processed.changed => {
            headers::set_content_length(&mut parts.headers, body.len());
            headers::lower_expires(&mut parts.headers, processed.expires);
            state.metrics.record_document(DocumentOutcome::Changed);
            tracing::debug!(path = %location.path, "Squeezed document");
            Response::from_parts(parts, Body::from(body))
        }
        _ => {
            headers::mark_unchanged(&mut parts.headers);
            state.metrics.record_document(DocumentOutcome::Unchanged);
            Response::from_parts(parts, Body::from(bytes))
        }
    }
}

async fn observe_resource(
    state: &SqueezeState,
    axis_key: String,
    location: RequestLocation,
    response: Response,
) -> Response {
    let status = response.status();
    if status != StatusCode::OK && status != StatusCode::NOT_MODIFIED {
        return response;
    }
    if !state
        .squeezer
        .is_tracked(&axis_key, &location.host_url, &location.url)
    {
        return response;
    }

    let expires = headers::expires(response.headers());

    if status == StatusCode::NOT_MODIFIED {
        let observed = state.squeezer.observe_response(
            &axis_key,
            &location.host_url,
            ResourceResponse {
                url: &location.url,
                status: status.as_u16(),
                content_type: None,
                expires,
                body: Bytes::new(),
            },
        );
        if observed == ResponseObservation::Refreshed {
            state.metrics.record_raw_cache_update(RawCacheUpdate::Refreshed);
        }
        return response;
    }

    let max = state.squeezer.config().max_document_bytes;
    if declared_length(&response).is_some_and(|len| len > max) {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match buffer_body(body, max).await {
        Ok(Buffered::Complete(bytes)) => bytes,
        Ok(Buffered::Overflow(body)) => {
            tracing::debug!(url = %location.url, max, "Resource exceeds size limit");
            return Response::from_parts(parts, body);
        }
        Err(e) => {
            tracing::warn!(error = %e, url = %location.url, "Failed to buffer resource");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let content_type = headers::content_type(&parts.headers).map(str::to_string);
    let observed = state.squeezer.observe_response(
        &axis_key,
        &location.host_url,
        ResourceResponse {
            url: &location.url,
            status: status.as_u16(),
            content_type: content_type.as_deref(),
            expires,
            body: bytes.clone(),
        },
    );

    match observed {
        ResponseObservation::Stored { body, rebased } => {
            state.metrics.record_raw_cache_update(RawCacheUpdate::Stored);
            if rebased {
                headers::set_content_length(&mut parts.headers, body.len());
                return Response::from_parts(parts, Body::from(body));
            }
            Response::from_parts(parts, Body::from(bytes))
        }
        _ => Response::from_parts(parts, Body::from(bytes)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    fn parts(uri: &str, host: Option<&str>) -> Parts {
        let mut builder = HttpRequest::builder().uri(uri);
        if let Some(host) = host {
            builder = builder.header(header::HOST, host);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn test_location_from_host_header() {
        let location = RequestLocation::from_parts(&parts("/a/b.css?v=1", Some("Example.com:8080")))
            .unwrap();
        assert_eq!(location.host_url, "http://example.com:8080");
        assert_eq!(location.path, "/a/b.css?v=1");
        assert_eq!(location.url, "http://example.com:8080/a/b.css?v=1");
    }

    #[test]
    fn test_location_from_absolute_uri() {
        let location =
            RequestLocation::from_parts(&parts("https://example.com/index.html", None)).unwrap();
        assert_eq!(location.host_url, "https://example.com");
        assert_eq!(location.path, "/index.html");
    }

    #[test]
    fn test_location_without_host() {
        let err = RequestLocation::from_parts(&parts("/index.html", None)).unwrap_err();
        assert!(matches!(err, SqueezeError::InvalidUrl(_)));
    }

    #[test]
    fn test_is_html() {
        let mut headers = HeaderMap::new();
        assert!(!is_html(&headers));
        headers.insert(
            header::CONTENT_TYPE,
            "text/html; charset=utf-8".parse().unwrap(),
        );
        assert!(is_html(&headers));
        headers.insert(header::CONTENT_TYPE, "text/css".parse().unwrap());
        assert!(!is_html(&headers));
    }

    fn chunked(count: usize, size: usize) -> Body {
        let chunks = (0..count).map(move |_| Ok::<_, axum::Error>(Bytes::from(vec![b'x'; size])));
        Body::from_stream(stream::iter(chunks))
    }

    #[tokio::test]
    async fn test_buffer_body_within_limit() {
        let Buffered::Complete(bytes) = buffer_body(chunked(4, 256), 1024).await.unwrap() else {
            panic!("body within the limit should be buffered");
        };
        assert_eq!(bytes.len(), 1024);
    }

    #[tokio::test]
    async fn test_buffer_body_overflow_replays_prefix() {
        let Buffered::Overflow(body) = buffer_body(chunked(8, 512), 1024).await.unwrap() else {
            panic!("body over the limit should overflow");
        };
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        assert_eq!(bytes.len(), 4096);
        assert!(bytes.iter().all(|b| *b == b'x'));
    }
}
