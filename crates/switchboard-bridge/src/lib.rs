// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session client for the messaging protocol sidecar.
//!
//! The sidecar owns encryption and device keys. Each tenant gets one
//! WebSocket to it, carrying id-correlated requests one way and session
//! events the other.

pub mod client;
pub mod factory;
pub mod protocol;

pub use client::BridgeClient;
pub use factory::BridgeFactory;
