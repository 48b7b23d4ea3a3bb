// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-caller token-bucket rate limiting.
//!
//! Each caller key gets a bucket holding up to `requests` tokens, refilled
//! at `requests / window` tokens per second. Buckets are created on first
//! sight and the whole table is dropped every sweep interval, which bounds
//! memory at the cost of forgiving callers right after a sweep.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use switchboard_config::model::RateLimitConfig;

use crate::error::error_response;

struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

/// Token buckets keyed by caller.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    /// Tokens added per second.
    rate: f64,
    capacity: f64,
}

impl RateLimiter {
    /// Allows `requests` per `window`, with bursts of up to `requests`.
    pub fn new(requests: u32, window: Duration) -> Self {
        let capacity = f64::from(requests.max(1));
        let window = window.as_secs_f64().max(f64::EPSILON);
        Self {
            buckets: DashMap::new(),
            rate: capacity / window,
            capacity,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests, Duration::from_secs(config.window_secs))
    }

    /// Takes one token from `key`'s bucket. Returns false when it is empty.
    pub fn check(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut bucket = self.buckets.entry(key.to_string()).or_insert_with(|| Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill).as_secs_f64();
        bucket.tokens = (bucket.tokens + elapsed * self.rate).min(self.capacity);
        bucket.last_refill = now;
        if bucket.tokens < 1.0 {
            return false;
        }
        bucket.tokens -= 1.0;
        true
    }

    /// Drops every bucket.
    pub fn clear(&self) {
        self.buckets.clear();
    }

    /// Number of tracked caller keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Clears all buckets every `every` until `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        debug!(keys = limiter.len(), "sweeping rate limit buckets");
                        limiter.clear();
                    }
                    _ = cancel.cancelled() => {
                        info!("rate limit sweeper shutting down");
                        break;
                    }
                }
            }
        })
    }
}

/// The caller key: first `X-Forwarded-For` entry, else the peer address.
pub fn caller_key(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());

    match (forwarded, peer) {
        (Some(ip), _) => ip.to_string(),
        (None, Some(addr)) => addr.ip().to_string(),
        (None, None) => "unknown".to_string(),
    }
}

/// Middleware answering `429` once the caller's bucket is empty.
pub async fn rate_limit_middleware(
    State(limiter): State<Arc<RateLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let key = caller_key(request.headers(), peer);

    if !limiter.check(&key) {
        debug!(caller = %key, "rate limited");
        switchboard_prometheus::record_rate_limited();
        return error_response(StatusCode::TOO_MANY_REQUESTS, "too many requests");
    }
    next.run(request).await
}
