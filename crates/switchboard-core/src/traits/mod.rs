// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions for adapters, session clients, and capabilities.
//!
//! Async traits use `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod capability;
pub mod session;
pub mod storage;

pub use adapter::PluginAdapter;
pub use capability::{Broadcaster, EventSink, SessionRegistry};
pub use session::{EventStream, SessionClient, SessionFactory};
pub use storage::{
    InstanceStore, JobQueue, KeyValueCache, MessageStore, ScheduleStore, SettingsStore,
    StorageAdapter, Store, WebhookStore,
};
