// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Instance lifecycle and event routing for the Switchboard gateway.
//!
//! The [`InstanceManager`] is the single owner of every tenant's session
//! client. It:
//! - Persists lifecycle transitions for each tenant
//! - Runs one event router per client, fanning events out to the webhook
//!   sink, the room broadcaster and the automation rules
//! - Rehydrates paired tenants on startup
//!
//! The tenant-facing services ([`AutomationService`], [`CallService`],
//! [`SyncService`]) are thin layers over a shared manager handle.

pub mod automation;
pub mod calls;
pub mod manager;
pub mod media;
pub mod qr;
pub mod scheduler;
pub mod sync;
pub mod tasks;

mod router;

pub use automation::{AutomationService, BulkJob, BulkRequest};
pub use calls::CallService;
pub use manager::{InstanceManager, InstanceUpdate, ManagerDeps, ProvisioningQr};
pub use scheduler::{deliver_due, run_scheduler};
pub use sync::SyncService;
pub use tasks::TaskRunner;
