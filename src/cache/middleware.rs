//! Response cache middleware.
//!
//! Caches successful GET responses on public routes and serves them back
//! through the two-tier store. Responses that set cookies are never cached.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, instrument};

use super::{
    CacheConfig, CacheRegistry, deps,
    facade::CacheStore,
    keys::{CacheKey, ResponseKey, hash_query},
    store::CachedResponse,
};

const MAX_CACHED_BODY_BYTES: usize = 1024 * 1024;

/// Shared cache state for middleware.
#[derive(Clone)]
pub struct CacheState {
    pub config: CacheConfig,
    pub store: Arc<CacheStore>,
    pub registry: Arc<CacheRegistry>,
}

/// Middleware for response caching.
///
/// Only GET requests that return 200 OK are cached. The dependency
/// collector records which entities the handler touched so the entry can be
/// invalidated precisely later.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn response_cache_layer(
    State(cache): State<CacheState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !cache.config.enable_response_cache {
        return next.run(request).await;
    }

    if request.method() != Method::GET {
        return next.run(request).await;
    }

    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or("");

    let response_key = ResponseKey::Response {
        path: path.clone(),
        query_hash: hash_query(query),
    };

    if let Some(cached) = cache.store.get_response(&response_key).await {
        debug!(cache = "response", outcome = "hit", "serving cached response");
        return build_response(cached);
    }

    debug!(
        cache = "response",
        outcome = "miss",
        "cache miss, executing handler"
    );

    let (response, deps) = deps::with_collector(next.run(request)).await;

    if !should_store(&response) {
        return response;
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_CACHED_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(_) => {
            // Oversized or failed body collection; serve nothing rather
            // than a truncated payload.
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let cached = CachedResponse {
        status: parts.status.as_u16(),
        headers: parts
            .headers
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect(),
        body: bytes.to_vec(),
    };

    debug!(
        cache = "response",
        deps_count = deps.len(),
        "caching response"
    );

    let evicted = cache
        .store
        .store_response(response_key.clone(), cached)
        .await;
    if let Some(evicted_key) = evicted {
        cache.registry.unregister(&CacheKey::Response(evicted_key));
    }
    cache
        .registry
        .register(CacheKey::Response(response_key), deps);

    Response::from_parts(parts, Body::from(bytes))
}

/// Only plain 200 responses without cookies are cacheable.
fn should_store(response: &Response) -> bool {
    response.status() == StatusCode::OK && !response.headers().contains_key(header::SET_COOKIE)
}

/// Build a response from cached data.
fn build_response(cached: CachedResponse) -> Response {
    use axum::http::HeaderValue;

    let mut builder = Response::builder().status(cached.status);

    for (name, value) in cached.headers {
        if let Ok(header_value) = HeaderValue::from_str(&value) {
            builder = builder.header(name, header_value);
        }
    }

    builder
        .body(Body::from(cached.body))
        .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_response() -> Response {
        Response::builder()
            .status(StatusCode::OK)
            .body(Body::empty())
            .expect("response")
    }

    #[test]
    fn stores_plain_ok_responses() {
        assert!(should_store(&ok_response()));
    }

    #[test]
    fn skips_non_ok_responses() {
        let response = Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Body::empty())
            .expect("response");
        assert!(!should_store(&response));
    }

    #[test]
    fn skips_responses_with_cookies() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(header::SET_COOKIE, "session=abc")
            .body(Body::empty())
            .expect("response");
        assert!(!should_store(&response));
    }

    #[test]
    fn build_response_restores_headers() {
        let cached = CachedResponse {
            status: 200,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: b"{}".to_vec(),
        };
        let response = build_response(cached);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
            Some("application/json")
        );
    }
}
