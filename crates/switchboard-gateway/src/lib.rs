// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP and WebSocket surface of the Switchboard gateway.
//!
//! Exposes the tenant REST API behind API-key auth, a per-caller token
//! bucket rate limiter, and the per-tenant dashboard rooms that receive live
//! status and message frames.

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod ratelimit;
pub mod rooms;
pub mod server;
pub mod tenant;
pub mod ws;

pub use auth::AuthConfig;
pub use error::ApiError;
pub use ratelimit::RateLimiter;
pub use rooms::RoomBroadcaster;
pub use server::{AppState, HealthState, build_router, start_server};
