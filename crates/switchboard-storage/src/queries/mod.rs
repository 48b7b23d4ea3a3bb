// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod cache;
pub mod instances;
pub mod messages;
pub mod queue;
pub mod scheduled;
pub mod settings;
pub mod webhooks;
