// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base adapter trait for long-lived backends.

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::types::{AdapterType, HealthStatus};

/// The base trait for Switchboard adapters (storage, session factories, sinks).
///
/// Provides identity, health reporting, and a shutdown hook.
#[async_trait]
pub trait PluginAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this adapter instance.
    fn name(&self) -> &str;

    /// Returns the semantic version of this adapter.
    fn version(&self) -> semver::Version;

    /// Returns the type of adapter.
    fn adapter_type(&self) -> AdapterType;

    /// Performs a health check and returns the adapter's current status.
    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError>;

    /// Gracefully shuts down the adapter, releasing any held resources.
    async fn shutdown(&self) -> Result<(), SwitchboardError>;
}
