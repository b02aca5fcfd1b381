use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::header::USER_AGENT;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use moka::sync::Cache;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use otelbase_core::config::CacheConfig;

const KEY_PREFIX: &str = "api:cache:";
const X_CACHE: &str = "x-cache";

/// Request bodies beyond this are not fingerprinted into the key.
const MAX_FINGERPRINT_BODY: usize = 64 * 1024;

/// TTL cache over read-endpoint responses, keyed by request fingerprint.
#[derive(Clone)]
pub struct ResponseCache {
    inner: Option<Cache<String, CachedResponse>>,
}

#[derive(Clone)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ResponseCache {
    pub fn new(cfg: &CacheConfig) -> Self {
        let inner = cfg.enabled.then(|| {
            Cache::builder()
                .max_capacity(cfg.max_entries)
                .time_to_live(cfg.ttl)
                .build()
        });
        Self { inner }
    }

    pub fn disabled() -> Self {
        Self { inner: None }
    }

    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    pub fn get(&self, key: &str) -> Option<CachedResponse> {
        self.inner.as_ref()?.get(key)
    }

    pub fn put(&self, key: String, response: CachedResponse) {
        if let Some(cache) = &self.inner {
            cache.insert(key, response);
        }
    }

    /// Drops every entry for the path and, for nested paths, the parent
    /// path as well.
    pub fn invalidate_path(&self, path: &str) {
        let Some(cache) = &self.inner else {
            return;
        };
        // Recent inserts are not visible to iter() until pending
        // maintenance runs.
        cache.run_pending_tasks();

        let mut prefixes = vec![format!("{KEY_PREFIX}{path}:")];
        if path.matches('/').count() > 2 {
            if let Some((parent, _)) = path.rsplit_once('/') {
                prefixes.push(format!("{KEY_PREFIX}{parent}:"));
            }
        }

        let doomed: Vec<String> = cache
            .iter()
            .filter(|(key, _)| prefixes.iter().any(|p| key.starts_with(p.as_str())))
            .map(|(key, _)| (*key).clone())
            .collect();
        for key in doomed {
            cache.invalidate(&key);
        }
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map(|c| c.entry_count()).unwrap_or(0)
    }
}

/// `{prefix}{path}:{hash16}` where the hash covers the path, the sorted
/// query pairs, the request body, and the User-Agent header.
pub fn cache_key(path: &str, query: Option<&str>, body: &[u8], user_agent: &str) -> String {
    let mut pairs: Vec<&str> = query
        .unwrap_or_default()
        .split('&')
        .filter(|p| !p.is_empty())
        .collect();
    pairs.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    for pair in pairs {
        hasher.update(pair.as_bytes());
    }
    if !body.is_empty() {
        hasher.update(body);
    }
    if !user_agent.is_empty() {
        hasher.update(user_agent.as_bytes());
    }

    let digest = hasher.finalize();
    let hash16: String = digest[..8].iter().map(|b| format!("{b:02x}")).collect();
    format!("{KEY_PREFIX}{path}:{hash16}")
}

/// Caching middleware: replays cached 2xx GET responses with
/// `X-Cache: HIT`; successful write methods invalidate the path's
/// entries.
pub async fn cache_middleware(
    State(cache): State<ResponseCache>,
    req: Request,
    next: Next,
) -> Response {
    if req.method() != Method::GET {
        let path = req.uri().path().to_string();
        let response = next.run(req).await;
        if cache.enabled() && response.status().is_success() {
            debug!(path = %path, "write method succeeded, invalidating cached responses");
            cache.invalidate_path(&path);
        }
        return response;
    }

    if !cache.enabled() {
        return next.run(req).await;
    }

    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_FINGERPRINT_BODY)
        .await
        .unwrap_or_default();

    let user_agent = parts
        .headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let key = cache_key(
        parts.uri.path(),
        parts.uri.query(),
        &body_bytes,
        user_agent,
    );

    if let Some(hit) = cache.get(&key) {
        debug!(key = %key, "cache hit");
        return replay(hit);
    }
    debug!(key = %key, "cache miss");

    let req = Request::from_parts(parts, Body::from(body_bytes));
    let response = next.run(req).await;

    if !response.status().is_success() {
        return with_cache_header(response, "MISS");
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, "failed to buffer response for caching");
            return Response::from_parts(parts, Body::empty());
        }
    };

    cache.put(
        key,
        CachedResponse {
            status: parts.status,
            headers: parts.headers.clone(),
            body: bytes.clone(),
        },
    );

    parts
        .headers
        .insert(X_CACHE, HeaderValue::from_static("MISS"));
    Response::from_parts(parts, Body::from(bytes))
}

fn replay(cached: CachedResponse) -> Response {
    let mut response = Response::new(Body::from(cached.body));
    *response.status_mut() = cached.status;
    *response.headers_mut() = cached.headers;
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static("HIT"));
    response
}

fn with_cache_header(mut response: Response, value: &'static str) -> Response {
    response
        .headers_mut()
        .insert(X_CACHE, HeaderValue::from_static(value));
    response
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use axum::middleware::from_fn_with_state;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    use super::*;

    fn test_cache() -> ResponseCache {
        ResponseCache::new(&CacheConfig {
            enabled: true,
            ttl: Duration::from_secs(60),
            max_entries: 128,
        })
    }

    #[test]
    fn key_is_stable_under_query_reordering() {
        let a = cache_key("/api/telemetry/logs", Some("a=1&b=2"), b"", "ua");
        let b = cache_key("/api/telemetry/logs", Some("b=2&a=1"), b"", "ua");
        assert_eq!(a, b);
        assert!(a.starts_with("api:cache:/api/telemetry/logs:"));
        assert_eq!(a.rsplit(':').next().unwrap().len(), 16);
    }

    #[test]
    fn key_fragments_per_client() {
        let a = cache_key("/logs", None, b"", "curl/8");
        let b = cache_key("/logs", None, b"", "chrome");
        assert_ne!(a, b);
    }

    #[test]
    fn invalidate_clears_path_and_parent() {
        let cache = test_cache();
        let nested = cache_key("/api/telemetry/logs/123", None, b"", "");
        let parent = cache_key("/api/telemetry/logs", None, b"", "");
        let other = cache_key("/api/telemetry/traces", None, b"", "");
        let stub = CachedResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(b"{}"),
        };
        cache.put(nested.clone(), stub.clone());
        cache.put(parent.clone(), stub.clone());
        cache.put(other.clone(), stub);
        cache.invalidate_path("/api/telemetry/logs/123");

        assert!(cache.get(&nested).is_none());
        assert!(cache.get(&parent).is_none());
        assert!(cache.get(&other).is_some());
    }

    #[tokio::test]
    async fn second_identical_get_is_a_hit_with_identical_body() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let app = Router::new()
            .route(
                "/logs",
                get(move || {
                    let counter = counter.clone();
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        "[\"log-a\"]"
                    }
                }),
            )
            .layer(from_fn_with_state(test_cache(), cache_middleware));

        let first = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/logs?limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(first.headers()[X_CACHE], "MISS");
        let first_body = axum::body::to_bytes(first.into_body(), usize::MAX)
            .await
            .unwrap();

        let second = app
            .oneshot(
                Request::builder()
                    .uri("/logs?limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(second.headers()[X_CACHE], "HIT");
        let second_body = axum::body::to_bytes(second.into_body(), usize::MAX)
            .await
            .unwrap();

        assert_eq!(first_body, second_body);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn errors_are_never_cached() {
        let app = Router::new()
            .route("/boom", get(|| async { StatusCode::BAD_GATEWAY }))
            .layer(from_fn_with_state(test_cache(), cache_middleware));

        for _ in 0..2 {
            let res = app
                .clone()
                .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.headers()[X_CACHE], "MISS");
        }
    }
}
