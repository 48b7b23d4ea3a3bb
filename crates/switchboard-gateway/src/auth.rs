// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! API key authentication for protected routes.
//!
//! The key is accepted from either header (checked in order):
//! 1. `X-API-Key: <key>`
//! 2. `Authorization: Bearer <key>`
//!
//! When no key is configured, all requests are rejected (fail-closed).

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::error::error_response;

/// Authentication configuration for the gateway.
#[derive(Clone)]
pub struct AuthConfig {
    /// Expected API key. `None` rejects every protected request.
    pub api_key: Option<String>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

impl AuthConfig {
    /// Whether `headers` carry the configured key.
    pub fn authorizes(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.api_key.as_deref() else {
            return false;
        };

        let api_key = headers.get("x-api-key").and_then(|v| v.to_str().ok());
        if api_key == Some(expected) {
            return true;
        }

        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected)
    }
}

/// Middleware rejecting requests without a valid API key.
pub async fn auth_middleware(
    State(auth): State<AuthConfig>,
    request: Request,
    next: Next,
) -> Response {
    if auth.api_key.is_none() {
        tracing::error!("gateway has no api key configured -- rejecting request");
        return error_response(StatusCode::UNAUTHORIZED, "unauthorized");
    }

    if auth.authorizes(request.headers()) {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "rejected unauthenticated request");
    error_response(StatusCode::UNAUTHORIZED, "unauthorized")
}
