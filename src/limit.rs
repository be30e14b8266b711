use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::error::ApiError;
use crate::state::AppState;

const CLEANUP_INTERVAL: u64 = 100;

/// Sliding-window request counter keyed by client identity. State is kept
/// in-process; each bucket holds the timestamps still inside the window.
pub struct RateLimiter {
    window: Duration,
    buckets: Mutex<HashMap<String, VecDeque<Instant>>>,
    checks: AtomicU64,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

impl RateLimiter {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            buckets: Mutex::new(HashMap::new()),
            checks: AtomicU64::new(0),
        }
    }

    /// Records one request for `key` and reports whether it fits inside the
    /// `max`-per-window quota.
    pub fn allow(&self, key: &str, max: u32) -> bool {
        let now = Instant::now();
        let mut buckets = self.buckets.lock().expect("limiter lock poisoned");

        if self.checks.fetch_add(1, Ordering::Relaxed) % CLEANUP_INTERVAL == 0 {
            let window = self.window;
            buckets.retain(|_, hits| hits.back().is_some_and(|t| now - *t < window));
        }

        let hits = buckets.entry(key.to_string()).or_default();
        while hits.front().is_some_and(|t| now - *t >= self.window) {
            hits.pop_front();
        }

        if hits.len() >= max as usize {
            return false;
        }
        hits.push_back(now);
        true
    }
}

/// Client identity for throttling: the bearer token when one is presented,
/// otherwise the forwarded or socket peer address.
fn client_key(req: &Request) -> String {
    if let Some(auth) = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
    {
        return auth.to_string();
    }
    if let Some(forwarded) = req
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
    {
        return forwarded.split(',').next().unwrap_or(forwarded).trim().to_string();
    }
    if let Some(ConnectInfo(addr)) = req.extensions().get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }
    "unknown".into()
}

async fn enforce(state: AppState, scope: &str, max: u32, req: Request, next: Next) -> Response {
    if !state.config.rate.enabled {
        return next.run(req).await;
    }

    let key = format!("{scope}:{}", client_key(&req));
    if !state.limiter.allow(&key, max) {
        warn!(scope, "rate limit exceeded");
        return ApiError::TooManyRequests.into_response();
    }

    next.run(req).await
}

pub async fn throttle_register(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let max = state.config.rate.register_per_min;
    enforce(state, "register", max, req, next).await
}

pub async fn throttle_login(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let max = state.config.rate.login_per_min;
    enforce(state, "login", max, req, next).await
}

pub async fn throttle_api(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let max = state.config.rate.api_per_min;
    enforce(state, "api", max, req, next).await
}

pub async fn throttle_public(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let max = state.config.rate.public_per_min;
    enforce(state, "public", max, req, next).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_quota_then_rejects() {
        let limiter = RateLimiter::default();
        for _ in 0..5 {
            assert!(limiter.allow("register:1.2.3.4", 5));
        }
        assert!(!limiter.allow("register:1.2.3.4", 5));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = RateLimiter::default();
        for _ in 0..3 {
            assert!(limiter.allow("login:alice", 3));
        }
        assert!(!limiter.allow("login:alice", 3));
        assert!(limiter.allow("login:bob", 3));
    }

    #[test]
    fn window_expiry_frees_the_bucket() {
        let limiter = RateLimiter::new(Duration::from_millis(40));
        assert!(limiter.allow("k", 1));
        assert!(!limiter.allow("k", 1));
        std::thread::sleep(Duration::from_millis(60));
        assert!(limiter.allow("k", 1));
    }
}
