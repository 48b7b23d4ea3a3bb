// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook delivery for the Switchboard gateway.
//!
//! The [`WebhookDispatcher`] is shared by the instance manager (session
//! events) and the queue worker (send acknowledgements).

pub mod dispatcher;
pub mod signing;

pub use dispatcher::WebhookDispatcher;
